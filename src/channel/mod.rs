//! The backend side of the command channel.
//!
//! The channel is strictly half-duplex: the wrapper sends one command frame
//! and waits for exactly one reply frame (a log notification opens a nested
//! exchange, but never overlaps another command). The transport is anything
//! `Read + Write`; production uses a `TcpStream` pair, tests drive the loop
//! over in-memory pipes.

mod frame;
mod handshake;

use std::io::{Read, Write};
use std::net::TcpStream;

pub use frame::{encode_frame, FrameError, FrameReader, FrameWriter, FRAME_HEADER_LEN};
pub use handshake::{
    decode_handshake, encode_handshake, HandshakeError, HandshakeReply, HandshakeStatus,
    WireFormat,
};

pub struct CommandChannel<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl CommandChannel<TcpStream, TcpStream> {
    /// Connect to the wrapper's dispatcher endpoint and send the handshake.
    pub fn connect(endpoint: &str, max_frame_bytes: usize) -> crate::Result<Self> {
        let stream = TcpStream::connect(endpoint)?;
        stream.set_nodelay(true)?;
        let mut channel = Self::from_parts(stream.try_clone()?, stream, max_frame_bytes);
        channel.send_handshake(&HandshakeReply::ok())?;
        tracing::info!(endpoint, "connected to dispatcher");
        Ok(channel)
    }
}

impl<R: Read, W: Write> CommandChannel<R, W> {
    pub fn from_parts(reader: R, writer: W, max_frame_bytes: usize) -> Self {
        Self {
            reader: FrameReader::new(reader, max_frame_bytes),
            writer: FrameWriter::new(writer, max_frame_bytes),
        }
    }

    pub fn send_handshake(&mut self, reply: &HandshakeReply) -> crate::Result<()> {
        let body = encode_handshake(reply)?;
        self.writer.write_frame(&body)?;
        Ok(())
    }

    pub fn recv_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        self.reader.read_frame()
    }

    pub fn send_frame(&mut self, body: &[u8]) -> Result<(), FrameError> {
        self.writer.write_frame(body)
    }
}

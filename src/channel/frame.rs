//! Command-channel framing (length + crc32c).
//!
//! Every message on the half-duplex channel travels in one frame:
//! a little-endian `u32` body length, a `u32` crc32c of the body, then the
//! body bytes. A truncated, oversized, or corrupt frame means the channel
//! can no longer be trusted; framing errors are always protocol-fatal.

use std::io::{Read, Write};

use crc32c::crc32c;
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the channel")]
    Closed,
    #[error("frame length invalid: {reason}")]
    LengthInvalid { reason: &'static str },
    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    TooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
    #[error("frame crc mismatch: expected {expected} got {got}")]
    CrcMismatch { expected: u32, got: u32 },
}

pub struct FrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
        }
    }

    /// Read exactly one frame body. A clean EOF before the first header
    /// byte is reported as `Closed`; EOF mid-frame is an io error.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let mut read = 0usize;
        while read < header.len() {
            let n = self.reader.read(&mut header[read..])?;
            if n == 0 {
                if read == 0 {
                    return Err(FrameError::Closed);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "frame header truncated",
                )
                .into());
            }
            read += n;
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length == 0 {
            return Err(FrameError::LengthInvalid {
                reason: "frame length cannot be zero",
            });
        }
        if length > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                max_frame_bytes: self.max_frame_bytes,
                got_bytes: length,
            });
        }
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut body = vec![0u8; length];
        let mut read_body = 0usize;
        while read_body < length {
            let n = self.reader.read(&mut body[read_body..])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "frame body truncated",
                )
                .into());
            }
            read_body += n;
        }

        let got = crc32c(&body);
        if got != expected_crc {
            return Err(FrameError::CrcMismatch {
                expected: expected_crc,
                got,
            });
        }

        Ok(body)
    }
}

pub struct FrameWriter<W> {
    writer: W,
    max_frame_bytes: usize,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, max_frame_bytes: usize) -> Self {
        Self {
            writer,
            max_frame_bytes,
        }
    }

    pub fn write_frame(&mut self, body: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(body, self.max_frame_bytes)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub fn encode_frame(body: &[u8], max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    if body.is_empty() {
        return Err(FrameError::LengthInvalid {
            reason: "frame body cannot be empty",
        });
    }
    if body.len() > max_frame_bytes {
        return Err(FrameError::TooLarge {
            max_frame_bytes,
            got_bytes: body.len(),
        });
    }
    let length = u32::try_from(body.len()).map_err(|_| FrameError::LengthInvalid {
        reason: "frame length exceeds u32",
    })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc32c(body).to_le_bytes());
    buf.extend_from_slice(body);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_roundtrip_validates_crc() {
        let body = b"doStep";
        let frame = encode_frame(body, 1024).unwrap();

        let mut reader = FrameReader::new(Cursor::new(frame), 1024);
        assert_eq!(reader.read_frame().unwrap(), body);
    }

    #[test]
    fn corrupt_body_is_rejected() {
        let mut frame = encode_frame(b"doStep", 1024).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;

        let mut reader = FrameReader::new(Cursor::new(frame), 1024);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_on_both_sides() {
        let body = vec![1u8; 64];
        assert!(matches!(
            encode_frame(&body, 32),
            Err(FrameError::TooLarge { .. })
        ));

        let frame = encode_frame(&body, 1024).unwrap();
        let mut reader = FrameReader::new(Cursor::new(frame), 32);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn clean_eof_reports_closed() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()), 1024);
        assert!(matches!(reader.read_frame(), Err(FrameError::Closed)));
    }
}

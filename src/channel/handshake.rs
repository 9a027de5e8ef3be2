//! Handshake reply sent by the backend before the command loop starts.

use std::convert::Infallible;

use minicbor::{Decoder, Encoder};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeStatus {
    Ok,
    Error,
}

/// Serialization format of the command channel. Closed set; the wrapper
/// picks its rpc implementation off this field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Cbor,
}

impl WireFormat {
    fn as_str(self) -> &'static str {
        match self {
            WireFormat::Cbor => "cbor",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cbor" => Some(WireFormat::Cbor),
            _ => None,
        }
    }
}

/// First frame on the wire after the backend connects.
///
/// `command_endpoint` is populated when the backend binds its own reply
/// socket and the wrapper must connect back; `None` means the established
/// channel doubles as the command channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeReply {
    pub status: HandshakeStatus,
    pub serialization_format: WireFormat,
    pub command_endpoint: Option<String>,
}

impl HandshakeReply {
    pub fn ok() -> Self {
        Self {
            status: HandshakeStatus::Ok,
            serialization_format: WireFormat::Cbor,
            command_endpoint: None,
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            status: HandshakeStatus::Ok,
            serialization_format: WireFormat::Cbor,
            command_endpoint: Some(endpoint.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("cbor encode: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("cbor decode: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

pub fn encode_handshake(reply: &HandshakeReply) -> Result<Vec<u8>, HandshakeError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    let len = 2 + u64::from(reply.command_endpoint.is_some());
    enc.map(len)?;
    enc.str("status")?;
    enc.u8(match reply.status {
        HandshakeStatus::Ok => 0,
        HandshakeStatus::Error => 1,
    })?;
    enc.str("format")?;
    enc.str(reply.serialization_format.as_str())?;
    if let Some(endpoint) = &reply.command_endpoint {
        enc.str("command_endpoint")?;
        enc.str(endpoint)?;
    }
    Ok(buf)
}

pub fn decode_handshake(bytes: &[u8]) -> Result<HandshakeReply, HandshakeError> {
    let mut dec = Decoder::new(bytes);
    let len = dec.map()?.ok_or(HandshakeError::InvalidField {
        field: "handshake",
        reason: "indefinite-length map".to_string(),
    })?;

    let mut status = None;
    let mut format = None;
    let mut command_endpoint = None;

    for _ in 0..len {
        match dec.str()? {
            "status" => {
                status = Some(match dec.u8()? {
                    0 => HandshakeStatus::Ok,
                    1 => HandshakeStatus::Error,
                    other => {
                        return Err(HandshakeError::InvalidField {
                            field: "status",
                            reason: format!("unknown status {other}"),
                        })
                    }
                })
            }
            "format" => {
                let raw = dec.str()?;
                format = Some(WireFormat::parse(raw).ok_or_else(|| {
                    HandshakeError::InvalidField {
                        field: "format",
                        reason: format!("unknown format {raw}"),
                    }
                })?)
            }
            "command_endpoint" => command_endpoint = Some(dec.str()?.to_string()),
            _ => dec.skip()?,
        }
    }

    Ok(HandshakeReply {
        status: status.ok_or(HandshakeError::MissingField("status"))?,
        serialization_format: format.ok_or(HandshakeError::MissingField("format"))?,
        command_endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_roundtrip() {
        for reply in [
            HandshakeReply::ok(),
            HandshakeReply::with_endpoint("127.0.0.1:7001"),
        ] {
            let bytes = encode_handshake(&reply).unwrap();
            assert_eq!(decode_handshake(&bytes).unwrap(), reply);
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.str("status").unwrap();
        enc.u8(0).unwrap();
        enc.str("format").unwrap();
        enc.str("pickle").unwrap();
        assert!(matches!(
            decode_handshake(&buf),
            Err(HandshakeError::InvalidField { field: "format", .. })
        ));
    }
}

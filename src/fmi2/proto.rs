//! FMI2 command/reply message schemas and CBOR encoding.
//!
//! Envelope: `map(2) { "type": <tag>, "body": <positional array> }`. The
//! command set is closed; an unknown tag or a malformed body is a protocol
//! violation the dispatcher treats as fatal.

use std::convert::Infallible;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use thiserror::Error;

use super::model::{Fmi2Instantiate, LogRecord};
use super::{Fmi2Status, Fmi2ValueBatch, Fmi2ValueKind, ValueRef};

#[derive(Clone, Debug, PartialEq)]
pub enum Fmi2Command {
    Instantiate(Fmi2Instantiate),
    SetupExperiment {
        start_time: f64,
        stop_time: Option<f64>,
        tolerance: Option<f64>,
    },
    EnterInitializationMode,
    ExitInitializationMode,
    DoStep {
        current_time: f64,
        step_size: f64,
        no_step_prior: bool,
    },
    CancelStep,
    SetDebugLogging {
        categories: Vec<String>,
        logging_on: bool,
    },
    Get {
        kind: Fmi2ValueKind,
        references: Vec<ValueRef>,
    },
    Set {
        references: Vec<ValueRef>,
        values: Fmi2ValueBatch,
    },
    SerializeFmuState,
    DeserializeFmuState {
        state: Vec<u8>,
    },
    Terminate,
    Reset,
    FreeInstance,
    /// Acknowledgement of a log notification; only valid inside the nested
    /// log exchange.
    CallbackContinue,
}

impl Fmi2Command {
    pub fn tag(&self) -> &'static str {
        match self {
            Fmi2Command::Instantiate(_) => "FMI2_INSTANTIATE",
            Fmi2Command::SetupExperiment { .. } => "FMI2_SETUP_EXPERIMENT",
            Fmi2Command::EnterInitializationMode => "FMI2_ENTER_INITIALIZATION_MODE",
            Fmi2Command::ExitInitializationMode => "FMI2_EXIT_INITIALIZATION_MODE",
            Fmi2Command::DoStep { .. } => "FMI2_DO_STEP",
            Fmi2Command::CancelStep => "FMI2_CANCEL_STEP",
            Fmi2Command::SetDebugLogging { .. } => "FMI2_SET_DEBUG_LOGGING",
            Fmi2Command::Get { kind, .. } => get_tag(*kind),
            Fmi2Command::Set { values, .. } => set_tag(values.kind()),
            Fmi2Command::SerializeFmuState => "FMI2_SERIALIZE_FMU_STATE",
            Fmi2Command::DeserializeFmuState { .. } => "FMI2_DESERIALIZE_FMU_STATE",
            Fmi2Command::Terminate => "FMI2_TERMINATE",
            Fmi2Command::Reset => "FMI2_RESET",
            Fmi2Command::FreeInstance => "FMI2_FREE_INSTANCE",
            Fmi2Command::CallbackContinue => "FMI2_CALLBACK_CONTINUE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fmi2Return {
    Empty,
    Status(Fmi2Status),
    GetValues {
        status: Fmi2Status,
        values: Fmi2ValueBatch,
    },
    Serialize {
        status: Fmi2Status,
        state: Vec<u8>,
    },
    FreeInstance,
    Log(LogRecord),
}

impl Fmi2Return {
    pub fn tag(&self) -> &'static str {
        match self {
            Fmi2Return::Empty => "FMI2_EMPTY_RETURN",
            Fmi2Return::Status(_) => "FMI2_STATUS_RETURN",
            Fmi2Return::GetValues { values, .. } => get_return_tag(values.kind()),
            Fmi2Return::Serialize { .. } => "FMI2_SERIALIZE_RETURN",
            Fmi2Return::FreeInstance => "FMI2_FREE_INSTANCE_RETURN",
            Fmi2Return::Log(_) => "FMI2_LOG_RETURN",
        }
    }
}

fn get_tag(kind: Fmi2ValueKind) -> &'static str {
    match kind {
        Fmi2ValueKind::Real => "FMI2_GET_REAL",
        Fmi2ValueKind::Integer => "FMI2_GET_INTEGER",
        Fmi2ValueKind::Boolean => "FMI2_GET_BOOLEAN",
        Fmi2ValueKind::String => "FMI2_GET_STRING",
    }
}

fn set_tag(kind: Fmi2ValueKind) -> &'static str {
    match kind {
        Fmi2ValueKind::Real => "FMI2_SET_REAL",
        Fmi2ValueKind::Integer => "FMI2_SET_INTEGER",
        Fmi2ValueKind::Boolean => "FMI2_SET_BOOLEAN",
        Fmi2ValueKind::String => "FMI2_SET_STRING",
    }
}

fn get_return_tag(kind: Fmi2ValueKind) -> &'static str {
    match kind {
        Fmi2ValueKind::Real => "FMI2_GET_REAL_RETURN",
        Fmi2ValueKind::Integer => "FMI2_GET_INTEGER_RETURN",
        Fmi2ValueKind::Boolean => "FMI2_GET_BOOLEAN_RETURN",
        Fmi2ValueKind::String => "FMI2_GET_STRING_RETURN",
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("cbor encode: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("cbor decode: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
    #[error("setter arity mismatch: {references} references, {values} values")]
    ArityMismatch { references: usize, values: usize },
    #[error("indefinite-length CBOR not allowed")]
    IndefiniteLength,
    #[error("trailing bytes after message body")]
    TrailingBytes,
}

// ---------------------------------------------------------------- envelope

fn encode_envelope<F>(tag: &str, body: F) -> Result<Vec<u8>, ProtoError>
where
    F: FnOnce(&mut Encoder<&mut Vec<u8>>) -> Result<(), ProtoError>,
{
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(2)?;
    enc.str("type")?;
    enc.str(tag)?;
    enc.str("body")?;
    body(&mut enc)?;
    Ok(buf)
}

/// Split the envelope into its tag and the body's byte span.
fn decode_envelope(bytes: &[u8]) -> Result<(String, &[u8]), ProtoError> {
    let mut dec = Decoder::new(bytes);
    let map_len = dec.map()?.ok_or(ProtoError::IndefiniteLength)?;

    let mut tag = None;
    let mut body_span = None;

    for _ in 0..map_len {
        match dec.str()? {
            "type" => tag = Some(dec.str()?.to_string()),
            "body" => {
                let start = dec.position();
                dec.skip()?;
                body_span = Some((start, dec.position()));
            }
            _ => dec.skip()?,
        }
    }

    if dec.datatype().is_ok() {
        return Err(ProtoError::TrailingBytes);
    }

    let tag = tag.ok_or(ProtoError::MissingField("type"))?;
    let (start, end) = body_span.ok_or(ProtoError::MissingField("body"))?;
    Ok((tag, &bytes[start..end]))
}

fn expect_array(dec: &mut Decoder, expected: u64) -> Result<(), ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    if len != expected {
        return Err(ProtoError::InvalidField {
            field: "body",
            reason: format!("expected array of {expected} fields, got {len}"),
        });
    }
    Ok(())
}

fn finish(dec: &Decoder) -> Result<(), ProtoError> {
    if dec.datatype().is_ok() {
        return Err(ProtoError::TrailingBytes);
    }
    Ok(())
}

// ------------------------------------------------------------- field codecs

fn encode_opt_f64(
    enc: &mut Encoder<&mut Vec<u8>>,
    value: Option<f64>,
) -> Result<(), ProtoError> {
    match value {
        Some(v) => enc.f64(v)?,
        None => enc.null()?,
    };
    Ok(())
}

fn decode_opt_f64(dec: &mut Decoder) -> Result<Option<f64>, ProtoError> {
    if dec.datatype()? == Type::Null {
        dec.null()?;
        Ok(None)
    } else {
        Ok(Some(dec.f64()?))
    }
}

fn encode_references(
    enc: &mut Encoder<&mut Vec<u8>>,
    references: &[ValueRef],
) -> Result<(), ProtoError> {
    enc.array(references.len() as u64)?;
    for r in references {
        enc.u32(*r)?;
    }
    Ok(())
}

fn decode_references(dec: &mut Decoder) -> Result<Vec<ValueRef>, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(dec.u32()?);
    }
    Ok(out)
}

fn encode_batch(enc: &mut Encoder<&mut Vec<u8>>, batch: &Fmi2ValueBatch) -> Result<(), ProtoError> {
    match batch {
        Fmi2ValueBatch::Real(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.f64(*v)?;
            }
        }
        Fmi2ValueBatch::Integer(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.i32(*v)?;
            }
        }
        Fmi2ValueBatch::Boolean(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.bool(*v)?;
            }
        }
        Fmi2ValueBatch::String(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.str(v)?;
            }
        }
    }
    Ok(())
}

fn decode_batch(dec: &mut Decoder, kind: Fmi2ValueKind) -> Result<Fmi2ValueBatch, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)? as usize;
    Ok(match kind {
        Fmi2ValueKind::Real => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.f64()?);
            }
            Fmi2ValueBatch::Real(out)
        }
        Fmi2ValueKind::Integer => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.i32()?);
            }
            Fmi2ValueBatch::Integer(out)
        }
        Fmi2ValueKind::Boolean => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.bool()?);
            }
            Fmi2ValueBatch::Boolean(out)
        }
        Fmi2ValueKind::String => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.str()?.to_string());
            }
            Fmi2ValueBatch::String(out)
        }
    })
}

fn decode_status(dec: &mut Decoder) -> Result<Fmi2Status, ProtoError> {
    let code = dec.u8()?;
    Fmi2Status::from_code(code).ok_or(ProtoError::InvalidField {
        field: "status",
        reason: format!("unknown status code {code}"),
    })
}

// ---------------------------------------------------------------- commands

pub fn encode_command(command: &Fmi2Command) -> Result<Vec<u8>, ProtoError> {
    encode_envelope(command.tag(), |enc| {
        match command {
            Fmi2Command::Instantiate(args) => {
                enc.array(5)?;
                enc.str(&args.instance_name)?;
                enc.str(&args.fmu_guid)?;
                enc.str(&args.resource_location)?;
                enc.bool(args.visible)?;
                enc.bool(args.logging_on)?;
            }
            Fmi2Command::SetupExperiment {
                start_time,
                stop_time,
                tolerance,
            } => {
                enc.array(3)?;
                enc.f64(*start_time)?;
                encode_opt_f64(enc, *stop_time)?;
                encode_opt_f64(enc, *tolerance)?;
            }
            Fmi2Command::DoStep {
                current_time,
                step_size,
                no_step_prior,
            } => {
                enc.array(3)?;
                enc.f64(*current_time)?;
                enc.f64(*step_size)?;
                enc.bool(*no_step_prior)?;
            }
            Fmi2Command::SetDebugLogging {
                categories,
                logging_on,
            } => {
                enc.array(2)?;
                enc.array(categories.len() as u64)?;
                for c in categories {
                    enc.str(c)?;
                }
                enc.bool(*logging_on)?;
            }
            Fmi2Command::Get { references, .. } => {
                enc.array(1)?;
                encode_references(enc, references)?;
            }
            Fmi2Command::Set { references, values } => {
                enc.array(2)?;
                encode_references(enc, references)?;
                encode_batch(enc, values)?;
            }
            Fmi2Command::DeserializeFmuState { state } => {
                enc.array(1)?;
                enc.bytes(state)?;
            }
            Fmi2Command::EnterInitializationMode
            | Fmi2Command::ExitInitializationMode
            | Fmi2Command::CancelStep
            | Fmi2Command::SerializeFmuState
            | Fmi2Command::Terminate
            | Fmi2Command::Reset
            | Fmi2Command::FreeInstance
            | Fmi2Command::CallbackContinue => {
                enc.array(0)?;
            }
        }
        Ok(())
    })
}

pub fn decode_command(bytes: &[u8]) -> Result<Fmi2Command, ProtoError> {
    let (tag, body) = decode_envelope(bytes)?;
    let mut dec = Decoder::new(body);

    let command = match tag.as_str() {
        "FMI2_INSTANTIATE" => {
            expect_array(&mut dec, 5)?;
            Fmi2Command::Instantiate(Fmi2Instantiate {
                instance_name: dec.str()?.to_string(),
                fmu_guid: dec.str()?.to_string(),
                resource_location: dec.str()?.to_string(),
                visible: dec.bool()?,
                logging_on: dec.bool()?,
            })
        }
        "FMI2_SETUP_EXPERIMENT" => {
            expect_array(&mut dec, 3)?;
            Fmi2Command::SetupExperiment {
                start_time: dec.f64()?,
                stop_time: decode_opt_f64(&mut dec)?,
                tolerance: decode_opt_f64(&mut dec)?,
            }
        }
        "FMI2_ENTER_INITIALIZATION_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::EnterInitializationMode
        }
        "FMI2_EXIT_INITIALIZATION_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::ExitInitializationMode
        }
        "FMI2_DO_STEP" => {
            expect_array(&mut dec, 3)?;
            Fmi2Command::DoStep {
                current_time: dec.f64()?,
                step_size: dec.f64()?,
                no_step_prior: dec.bool()?,
            }
        }
        "FMI2_CANCEL_STEP" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::CancelStep
        }
        "FMI2_SET_DEBUG_LOGGING" => {
            expect_array(&mut dec, 2)?;
            let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
            let mut categories = Vec::with_capacity(len as usize);
            for _ in 0..len {
                categories.push(dec.str()?.to_string());
            }
            Fmi2Command::SetDebugLogging {
                categories,
                logging_on: dec.bool()?,
            }
        }
        "FMI2_GET_REAL" => decode_get(&mut dec, Fmi2ValueKind::Real)?,
        "FMI2_GET_INTEGER" => decode_get(&mut dec, Fmi2ValueKind::Integer)?,
        "FMI2_GET_BOOLEAN" => decode_get(&mut dec, Fmi2ValueKind::Boolean)?,
        "FMI2_GET_STRING" => decode_get(&mut dec, Fmi2ValueKind::String)?,
        "FMI2_SET_REAL" => decode_set(&mut dec, Fmi2ValueKind::Real)?,
        "FMI2_SET_INTEGER" => decode_set(&mut dec, Fmi2ValueKind::Integer)?,
        "FMI2_SET_BOOLEAN" => decode_set(&mut dec, Fmi2ValueKind::Boolean)?,
        "FMI2_SET_STRING" => decode_set(&mut dec, Fmi2ValueKind::String)?,
        "FMI2_SERIALIZE_FMU_STATE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::SerializeFmuState
        }
        "FMI2_DESERIALIZE_FMU_STATE" => {
            expect_array(&mut dec, 1)?;
            Fmi2Command::DeserializeFmuState {
                state: dec.bytes()?.to_vec(),
            }
        }
        "FMI2_TERMINATE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::Terminate
        }
        "FMI2_RESET" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::Reset
        }
        "FMI2_FREE_INSTANCE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::FreeInstance
        }
        "FMI2_CALLBACK_CONTINUE" => {
            expect_array(&mut dec, 0)?;
            Fmi2Command::CallbackContinue
        }
        _ => return Err(ProtoError::UnknownMessageType(tag)),
    };

    finish(&dec)?;
    Ok(command)
}

fn decode_get(dec: &mut Decoder, kind: Fmi2ValueKind) -> Result<Fmi2Command, ProtoError> {
    expect_array(dec, 1)?;
    Ok(Fmi2Command::Get {
        kind,
        references: decode_references(dec)?,
    })
}

fn decode_set(dec: &mut Decoder, kind: Fmi2ValueKind) -> Result<Fmi2Command, ProtoError> {
    expect_array(dec, 2)?;
    let references = decode_references(dec)?;
    let values = decode_batch(dec, kind)?;
    if references.len() != values.len() {
        return Err(ProtoError::ArityMismatch {
            references: references.len(),
            values: values.len(),
        });
    }
    Ok(Fmi2Command::Set { references, values })
}

// ----------------------------------------------------------------- replies

pub fn encode_return(reply: &Fmi2Return) -> Result<Vec<u8>, ProtoError> {
    encode_envelope(reply.tag(), |enc| {
        match reply {
            Fmi2Return::Empty | Fmi2Return::FreeInstance => {
                enc.array(0)?;
            }
            Fmi2Return::Status(status) => {
                enc.array(1)?;
                enc.u8(status.code())?;
            }
            Fmi2Return::GetValues { status, values } => {
                enc.array(2)?;
                enc.u8(status.code())?;
                encode_batch(enc, values)?;
            }
            Fmi2Return::Serialize { status, state } => {
                enc.array(2)?;
                enc.u8(status.code())?;
                enc.bytes(state)?;
            }
            Fmi2Return::Log(record) => {
                enc.array(3)?;
                enc.u8(record.status.code())?;
                enc.str(&record.category)?;
                enc.str(&record.message)?;
            }
        }
        Ok(())
    })
}

pub fn decode_return(bytes: &[u8]) -> Result<Fmi2Return, ProtoError> {
    let (tag, body) = decode_envelope(bytes)?;
    let mut dec = Decoder::new(body);

    let reply = match tag.as_str() {
        "FMI2_EMPTY_RETURN" => {
            expect_array(&mut dec, 0)?;
            Fmi2Return::Empty
        }
        "FMI2_FREE_INSTANCE_RETURN" => {
            expect_array(&mut dec, 0)?;
            Fmi2Return::FreeInstance
        }
        "FMI2_STATUS_RETURN" => {
            expect_array(&mut dec, 1)?;
            Fmi2Return::Status(decode_status(&mut dec)?)
        }
        "FMI2_GET_REAL_RETURN" => decode_get_return(&mut dec, Fmi2ValueKind::Real)?,
        "FMI2_GET_INTEGER_RETURN" => decode_get_return(&mut dec, Fmi2ValueKind::Integer)?,
        "FMI2_GET_BOOLEAN_RETURN" => decode_get_return(&mut dec, Fmi2ValueKind::Boolean)?,
        "FMI2_GET_STRING_RETURN" => decode_get_return(&mut dec, Fmi2ValueKind::String)?,
        "FMI2_SERIALIZE_RETURN" => {
            expect_array(&mut dec, 2)?;
            Fmi2Return::Serialize {
                status: decode_status(&mut dec)?,
                state: dec.bytes()?.to_vec(),
            }
        }
        "FMI2_LOG_RETURN" => {
            expect_array(&mut dec, 3)?;
            Fmi2Return::Log(LogRecord {
                status: decode_status(&mut dec)?,
                category: dec.str()?.to_string(),
                message: dec.str()?.to_string(),
            })
        }
        _ => return Err(ProtoError::UnknownMessageType(tag)),
    };

    finish(&dec)?;
    Ok(reply)
}

fn decode_get_return(dec: &mut Decoder, kind: Fmi2ValueKind) -> Result<Fmi2Return, ProtoError> {
    expect_array(dec, 2)?;
    Ok(Fmi2Return::GetValues {
        status: decode_status(dec)?,
        values: decode_batch(dec, kind)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_roundtrip() {
        let commands = vec![
            Fmi2Command::Instantiate(Fmi2Instantiate {
                instance_name: "adder".into(),
                fmu_guid: "77236337-210e-4e9c-8f2c-c1a0677db21b".into(),
                resource_location: "file:///tmp/adder/resources".into(),
                visible: false,
                logging_on: true,
            }),
            Fmi2Command::SetupExperiment {
                start_time: 0.0,
                stop_time: Some(10.0),
                tolerance: None,
            },
            Fmi2Command::DoStep {
                current_time: 0.0,
                step_size: 0.5,
                no_step_prior: false,
            },
            Fmi2Command::Get {
                kind: Fmi2ValueKind::Real,
                references: vec![0, 1, 2],
            },
            Fmi2Command::Set {
                references: vec![9, 10],
                values: Fmi2ValueBatch::String(vec!["Hello ".into(), "World!".into()]),
            },
            Fmi2Command::SetDebugLogging {
                categories: vec!["logAll".into()],
                logging_on: true,
            },
            Fmi2Command::DeserializeFmuState {
                state: vec![1, 2, 3],
            },
            Fmi2Command::FreeInstance,
            Fmi2Command::CallbackContinue,
        ];
        for command in commands {
            let bytes = encode_command(&command).unwrap();
            assert_eq!(decode_command(&bytes).unwrap(), command);
        }
    }

    #[test]
    fn return_roundtrip() {
        let replies = vec![
            Fmi2Return::Empty,
            Fmi2Return::Status(Fmi2Status::Warning),
            Fmi2Return::GetValues {
                status: Fmi2Status::Ok,
                values: Fmi2ValueBatch::Boolean(vec![true, false]),
            },
            Fmi2Return::Serialize {
                status: Fmi2Status::Ok,
                state: vec![0xde, 0xad],
            },
            Fmi2Return::Log(LogRecord {
                status: Fmi2Status::Ok,
                category: "logStatusWarning".into(),
                message: "step size clamped".into(),
            }),
            Fmi2Return::FreeInstance,
        ];
        for reply in replies {
            let bytes = encode_return(&reply).unwrap();
            assert_eq!(decode_return(&bytes).unwrap(), reply);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.str("type").unwrap();
        enc.str("FMI2_WARP_DRIVE").unwrap();
        enc.str("body").unwrap();
        enc.array(0).unwrap();

        assert!(matches!(
            decode_command(&buf),
            Err(ProtoError::UnknownMessageType(tag)) if tag == "FMI2_WARP_DRIVE"
        ));
    }

    #[test]
    fn setter_arity_mismatch_is_rejected() {
        // Hand-built FMI2_SET_REAL with 2 references and 1 value.
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.str("type").unwrap();
        enc.str("FMI2_SET_REAL").unwrap();
        enc.str("body").unwrap();
        enc.array(2).unwrap();
        enc.array(2).unwrap();
        enc.u32(0).unwrap();
        enc.u32(1).unwrap();
        enc.array(1).unwrap();
        enc.f64(1.0).unwrap();

        assert!(matches!(
            decode_command(&buf),
            Err(ProtoError::ArityMismatch {
                references: 2,
                values: 1
            })
        ));
    }
}

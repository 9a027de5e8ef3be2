//! FMI3 command/reply message schemas and CBOR encoding.
//!
//! Same envelope discipline as the FMI2 protocol: `map(2) { "type": <tag>,
//! "body": <positional array> }`, a closed tag set, and decode-time
//! validation of setter arity. The FMI3 set is wider: fourteen value kinds,
//! clock timing accessors, and the richer doStep/updateDiscreteStates
//! replies.

use std::convert::Infallible;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use thiserror::Error;

use super::model::{DoStepResult, Fmi3Instantiate, LogRecord, UpdateDiscreteStatesResult};
use super::{Fmi3Status, Fmi3ValueBatch, Fmi3ValueKind, ValueRef};

/// Arguments common to the model-exchange and scheduled-execution
/// instantiation stubs.
#[derive(Clone, Debug, PartialEq)]
pub struct Fmi3InstantiateStub {
    pub instance_name: String,
    pub instantiation_token: String,
    pub resource_path: String,
    pub visible: bool,
    pub logging_on: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fmi3Command {
    InstantiateModelExchange(Fmi3InstantiateStub),
    InstantiateCoSimulation(Fmi3Instantiate),
    InstantiateScheduledExecution(Fmi3InstantiateStub),
    EnterInitializationMode {
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    },
    ExitInitializationMode,
    EnterEventMode,
    EnterStepMode,
    EnterConfigurationMode,
    ExitConfigurationMode,
    DoStep {
        current_time: f64,
        step_size: f64,
        no_step_prior: bool,
    },
    UpdateDiscreteStates,
    SetDebugLogging {
        categories: Vec<String>,
        logging_on: bool,
    },
    Get {
        kind: Fmi3ValueKind,
        references: Vec<ValueRef>,
    },
    Set {
        references: Vec<ValueRef>,
        values: Fmi3ValueBatch,
    },
    GetIntervalDecimal {
        references: Vec<ValueRef>,
    },
    GetIntervalFraction {
        references: Vec<ValueRef>,
    },
    GetShiftDecimal {
        references: Vec<ValueRef>,
    },
    GetShiftFraction {
        references: Vec<ValueRef>,
    },
    SetIntervalDecimal {
        references: Vec<ValueRef>,
        intervals: Vec<f64>,
    },
    SetIntervalFraction {
        references: Vec<ValueRef>,
        counters: Vec<u64>,
        resolutions: Vec<u64>,
    },
    SetShiftDecimal {
        references: Vec<ValueRef>,
        shifts: Vec<f64>,
    },
    SetShiftFraction {
        references: Vec<ValueRef>,
        counters: Vec<u64>,
        resolutions: Vec<u64>,
    },
    SerializeFmuState,
    DeserializeFmuState {
        state: Vec<u8>,
    },
    Terminate,
    Reset,
    FreeInstance,
    CallbackContinue,
}

impl Fmi3Command {
    pub fn tag(&self) -> &'static str {
        match self {
            Fmi3Command::InstantiateModelExchange(_) => "FMI3_INSTANTIATE_MODEL_EXCHANGE",
            Fmi3Command::InstantiateCoSimulation(_) => "FMI3_INSTANTIATE_CO_SIMULATION",
            Fmi3Command::InstantiateScheduledExecution(_) => {
                "FMI3_INSTANTIATE_SCHEDULED_EXECUTION"
            }
            Fmi3Command::EnterInitializationMode { .. } => "FMI3_ENTER_INITIALIZATION_MODE",
            Fmi3Command::ExitInitializationMode => "FMI3_EXIT_INITIALIZATION_MODE",
            Fmi3Command::EnterEventMode => "FMI3_ENTER_EVENT_MODE",
            Fmi3Command::EnterStepMode => "FMI3_ENTER_STEP_MODE",
            Fmi3Command::EnterConfigurationMode => "FMI3_ENTER_CONFIGURATION_MODE",
            Fmi3Command::ExitConfigurationMode => "FMI3_EXIT_CONFIGURATION_MODE",
            Fmi3Command::DoStep { .. } => "FMI3_DO_STEP",
            Fmi3Command::UpdateDiscreteStates => "FMI3_UPDATE_DISCRETE_STATES",
            Fmi3Command::SetDebugLogging { .. } => "FMI3_SET_DEBUG_LOGGING",
            Fmi3Command::Get { kind, .. } => get_tag(*kind),
            Fmi3Command::Set { values, .. } => set_tag(values.kind()),
            Fmi3Command::GetIntervalDecimal { .. } => "FMI3_GET_INTERVAL_DECIMAL",
            Fmi3Command::GetIntervalFraction { .. } => "FMI3_GET_INTERVAL_FRACTION",
            Fmi3Command::GetShiftDecimal { .. } => "FMI3_GET_SHIFT_DECIMAL",
            Fmi3Command::GetShiftFraction { .. } => "FMI3_GET_SHIFT_FRACTION",
            Fmi3Command::SetIntervalDecimal { .. } => "FMI3_SET_INTERVAL_DECIMAL",
            Fmi3Command::SetIntervalFraction { .. } => "FMI3_SET_INTERVAL_FRACTION",
            Fmi3Command::SetShiftDecimal { .. } => "FMI3_SET_SHIFT_DECIMAL",
            Fmi3Command::SetShiftFraction { .. } => "FMI3_SET_SHIFT_FRACTION",
            Fmi3Command::SerializeFmuState => "FMI3_SERIALIZE_FMU_STATE",
            Fmi3Command::DeserializeFmuState { .. } => "FMI3_DESERIALIZE_FMU_STATE",
            Fmi3Command::Terminate => "FMI3_TERMINATE",
            Fmi3Command::Reset => "FMI3_RESET",
            Fmi3Command::FreeInstance => "FMI3_FREE_INSTANCE",
            Fmi3Command::CallbackContinue => "FMI3_CALLBACK_CONTINUE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fmi3Return {
    Empty,
    Status(Fmi3Status),
    DoStep(DoStepResult),
    UpdateDiscreteStates(UpdateDiscreteStatesResult),
    GetValues {
        status: Fmi3Status,
        values: Fmi3ValueBatch,
    },
    IntervalDecimal {
        status: Fmi3Status,
        intervals: Vec<f64>,
        qualifiers: Vec<u8>,
    },
    IntervalFraction {
        status: Fmi3Status,
        counters: Vec<u64>,
        resolutions: Vec<u64>,
        qualifiers: Vec<u8>,
    },
    ShiftDecimal {
        status: Fmi3Status,
        shifts: Vec<f64>,
    },
    ShiftFraction {
        status: Fmi3Status,
        counters: Vec<u64>,
        resolutions: Vec<u64>,
    },
    Serialize {
        status: Fmi3Status,
        state: Vec<u8>,
    },
    FreeInstance,
    Log(LogRecord),
}

impl Fmi3Return {
    pub fn tag(&self) -> &'static str {
        match self {
            Fmi3Return::Empty => "FMI3_EMPTY_RETURN",
            Fmi3Return::Status(_) => "FMI3_STATUS_RETURN",
            Fmi3Return::DoStep(_) => "FMI3_DO_STEP_RETURN",
            Fmi3Return::UpdateDiscreteStates(_) => "FMI3_UPDATE_DISCRETE_STATES_RETURN",
            Fmi3Return::GetValues { values, .. } => get_return_tag(values.kind()),
            Fmi3Return::IntervalDecimal { .. } => "FMI3_INTERVAL_DECIMAL_RETURN",
            Fmi3Return::IntervalFraction { .. } => "FMI3_INTERVAL_FRACTION_RETURN",
            Fmi3Return::ShiftDecimal { .. } => "FMI3_SHIFT_DECIMAL_RETURN",
            Fmi3Return::ShiftFraction { .. } => "FMI3_SHIFT_FRACTION_RETURN",
            Fmi3Return::Serialize { .. } => "FMI3_SERIALIZE_RETURN",
            Fmi3Return::FreeInstance => "FMI3_FREE_INSTANCE_RETURN",
            Fmi3Return::Log(_) => "FMI3_LOG_RETURN",
        }
    }
}

fn get_tag(kind: Fmi3ValueKind) -> &'static str {
    match kind {
        Fmi3ValueKind::Float32 => "FMI3_GET_FLOAT32",
        Fmi3ValueKind::Float64 => "FMI3_GET_FLOAT64",
        Fmi3ValueKind::Int8 => "FMI3_GET_INT8",
        Fmi3ValueKind::UInt8 => "FMI3_GET_UINT8",
        Fmi3ValueKind::Int16 => "FMI3_GET_INT16",
        Fmi3ValueKind::UInt16 => "FMI3_GET_UINT16",
        Fmi3ValueKind::Int32 => "FMI3_GET_INT32",
        Fmi3ValueKind::UInt32 => "FMI3_GET_UINT32",
        Fmi3ValueKind::Int64 => "FMI3_GET_INT64",
        Fmi3ValueKind::UInt64 => "FMI3_GET_UINT64",
        Fmi3ValueKind::Boolean => "FMI3_GET_BOOLEAN",
        Fmi3ValueKind::String => "FMI3_GET_STRING",
        Fmi3ValueKind::Binary => "FMI3_GET_BINARY",
        Fmi3ValueKind::Clock => "FMI3_GET_CLOCK",
    }
}

fn set_tag(kind: Fmi3ValueKind) -> &'static str {
    match kind {
        Fmi3ValueKind::Float32 => "FMI3_SET_FLOAT32",
        Fmi3ValueKind::Float64 => "FMI3_SET_FLOAT64",
        Fmi3ValueKind::Int8 => "FMI3_SET_INT8",
        Fmi3ValueKind::UInt8 => "FMI3_SET_UINT8",
        Fmi3ValueKind::Int16 => "FMI3_SET_INT16",
        Fmi3ValueKind::UInt16 => "FMI3_SET_UINT16",
        Fmi3ValueKind::Int32 => "FMI3_SET_INT32",
        Fmi3ValueKind::UInt32 => "FMI3_SET_UINT32",
        Fmi3ValueKind::Int64 => "FMI3_SET_INT64",
        Fmi3ValueKind::UInt64 => "FMI3_SET_UINT64",
        Fmi3ValueKind::Boolean => "FMI3_SET_BOOLEAN",
        Fmi3ValueKind::String => "FMI3_SET_STRING",
        Fmi3ValueKind::Binary => "FMI3_SET_BINARY",
        Fmi3ValueKind::Clock => "FMI3_SET_CLOCK",
    }
}

fn get_return_tag(kind: Fmi3ValueKind) -> &'static str {
    match kind {
        Fmi3ValueKind::Float32 => "FMI3_GET_FLOAT32_RETURN",
        Fmi3ValueKind::Float64 => "FMI3_GET_FLOAT64_RETURN",
        Fmi3ValueKind::Int8 => "FMI3_GET_INT8_RETURN",
        Fmi3ValueKind::UInt8 => "FMI3_GET_UINT8_RETURN",
        Fmi3ValueKind::Int16 => "FMI3_GET_INT16_RETURN",
        Fmi3ValueKind::UInt16 => "FMI3_GET_UINT16_RETURN",
        Fmi3ValueKind::Int32 => "FMI3_GET_INT32_RETURN",
        Fmi3ValueKind::UInt32 => "FMI3_GET_UINT32_RETURN",
        Fmi3ValueKind::Int64 => "FMI3_GET_INT64_RETURN",
        Fmi3ValueKind::UInt64 => "FMI3_GET_UINT64_RETURN",
        Fmi3ValueKind::Boolean => "FMI3_GET_BOOLEAN_RETURN",
        Fmi3ValueKind::String => "FMI3_GET_STRING_RETURN",
        Fmi3ValueKind::Binary => "FMI3_GET_BINARY_RETURN",
        Fmi3ValueKind::Clock => "FMI3_GET_CLOCK_RETURN",
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

fn encode_u32s(enc: &mut Encoder<&mut Vec<u8>>, values: &[u32]) -> Result<(), ProtoError> {
    enc.array(values.len() as u64)?;
    for v in values {
        enc.u32(*v)?;
    }
    Ok(())
}

fn decode_u32s(dec: &mut Decoder) -> Result<Vec<u32>, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(dec.u32()?);
    }
    Ok(out)
}

fn encode_u64s(enc: &mut Encoder<&mut Vec<u8>>, values: &[u64]) -> Result<(), ProtoError> {
    enc.array(values.len() as u64)?;
    for v in values {
        enc.u64(*v)?;
    }
    Ok(())
}

fn decode_u64s(dec: &mut Decoder) -> Result<Vec<u64>, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(dec.u64()?);
    }
    Ok(out)
}

fn encode_u8s(enc: &mut Encoder<&mut Vec<u8>>, values: &[u8]) -> Result<(), ProtoError> {
    enc.array(values.len() as u64)?;
    for v in values {
        enc.u8(*v)?;
    }
    Ok(())
}

fn decode_u8s(dec: &mut Decoder) -> Result<Vec<u8>, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(dec.u8()?);
    }
    Ok(out)
}

fn encode_f64s(enc: &mut Encoder<&mut Vec<u8>>, values: &[f64]) -> Result<(), ProtoError> {
    enc.array(values.len() as u64)?;
    for v in values {
        enc.f64(*v)?;
    }
    Ok(())
}

fn decode_f64s(dec: &mut Decoder) -> Result<Vec<f64>, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(dec.f64()?);
    }
    Ok(out)
}

fn encode_batch(enc: &mut Encoder<&mut Vec<u8>>, batch: &Fmi3ValueBatch) -> Result<(), ProtoError> {
    match batch {
        Fmi3ValueBatch::Float32(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.f32(*v)?;
            }
        }
        Fmi3ValueBatch::Float64(values) => encode_f64s(enc, values)?,
        Fmi3ValueBatch::Int8(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.i8(*v)?;
            }
        }
        Fmi3ValueBatch::UInt8(values) => encode_u8s(enc, values)?,
        Fmi3ValueBatch::Int16(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.i16(*v)?;
            }
        }
        Fmi3ValueBatch::UInt16(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.u16(*v)?;
            }
        }
        Fmi3ValueBatch::Int32(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.i32(*v)?;
            }
        }
        Fmi3ValueBatch::UInt32(values) => encode_u32s(enc, values)?,
        Fmi3ValueBatch::Int64(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.i64(*v)?;
            }
        }
        Fmi3ValueBatch::UInt64(values) => encode_u64s(enc, values)?,
        Fmi3ValueBatch::Boolean(values) | Fmi3ValueBatch::Clock(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.bool(*v)?;
            }
        }
        Fmi3ValueBatch::String(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.str(v)?;
            }
        }
        Fmi3ValueBatch::Binary(values) => {
            enc.array(values.len() as u64)?;
            for v in values {
                enc.bytes(v)?;
            }
        }
    }
    Ok(())
}

fn decode_batch(dec: &mut Decoder, kind: Fmi3ValueKind) -> Result<Fmi3ValueBatch, ProtoError> {
    let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)? as usize;

    macro_rules! collect {
        ($variant:ident, $read:ident) => {{
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.$read()?);
            }
            Fmi3ValueBatch::$variant(out)
        }};
    }

    Ok(match kind {
        Fmi3ValueKind::Float32 => collect!(Float32, f32),
        Fmi3ValueKind::Float64 => collect!(Float64, f64),
        Fmi3ValueKind::Int8 => collect!(Int8, i8),
        Fmi3ValueKind::UInt8 => collect!(UInt8, u8),
        Fmi3ValueKind::Int16 => collect!(Int16, i16),
        Fmi3ValueKind::UInt16 => collect!(UInt16, u16),
        Fmi3ValueKind::Int32 => collect!(Int32, i32),
        Fmi3ValueKind::UInt32 => collect!(UInt32, u32),
        Fmi3ValueKind::Int64 => collect!(Int64, i64),
        Fmi3ValueKind::UInt64 => collect!(UInt64, u64),
        Fmi3ValueKind::Boolean => collect!(Boolean, bool),
        Fmi3ValueKind::Clock => collect!(Clock, bool),
        Fmi3ValueKind::String => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.str()?.to_string());
            }
            Fmi3ValueBatch::String(out)
        }
        Fmi3ValueKind::Binary => {
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(dec.bytes()?.to_vec());
            }
            Fmi3ValueBatch::Binary(out)
        }
    })
}

fn decode_status(dec: &mut Decoder) -> Result<Fmi3Status, ProtoError> {
    let code = dec.u8()?;
    Fmi3Status::from_code(code).ok_or(ProtoError::InvalidField {
        field: "status",
        reason: format!("unknown status code {code}"),
    })
}

fn encode_instantiate_stub(
    enc: &mut Encoder<&mut Vec<u8>>,
    args: &Fmi3InstantiateStub,
) -> Result<(), ProtoError> {
    enc.array(5)?;
    enc.str(&args.instance_name)?;
    enc.str(&args.instantiation_token)?;
    enc.str(&args.resource_path)?;
    enc.bool(args.visible)?;
    enc.bool(args.logging_on)?;
    Ok(())
}

fn decode_instantiate_stub(dec: &mut Decoder) -> Result<Fmi3InstantiateStub, ProtoError> {
    expect_array(dec, 5)?;
    Ok(Fmi3InstantiateStub {
        instance_name: dec.str()?.to_string(),
        instantiation_token: dec.str()?.to_string(),
        resource_path: dec.str()?.to_string(),
        visible: dec.bool()?,
        logging_on: dec.bool()?,
    })
}

// ---------------------------------------------------------------- commands

pub fn encode_command(command: &Fmi3Command) -> Result<Vec<u8>, ProtoError> {
    encode_envelope(command.tag(), |enc| {
        match command {
            Fmi3Command::InstantiateModelExchange(args)
            | Fmi3Command::InstantiateScheduledExecution(args) => {
                encode_instantiate_stub(enc, args)?;
            }
            Fmi3Command::InstantiateCoSimulation(args) => {
                enc.array(8)?;
                enc.str(&args.instance_name)?;
                enc.str(&args.instantiation_token)?;
                enc.str(&args.resource_path)?;
                enc.bool(args.visible)?;
                enc.bool(args.logging_on)?;
                enc.bool(args.event_mode_used)?;
                enc.bool(args.early_return_allowed)?;
                encode_u32s(enc, &args.required_intermediate_variables)?;
            }
            Fmi3Command::EnterInitializationMode {
                tolerance,
                start_time,
                stop_time,
            } => {
                enc.array(3)?;
                encode_opt_f64(enc, *tolerance)?;
                enc.f64(*start_time)?;
                encode_opt_f64(enc, *stop_time)?;
            }
            Fmi3Command::DoStep {
                current_time,
                step_size,
                no_step_prior,
            } => {
                enc.array(3)?;
                enc.f64(*current_time)?;
                enc.f64(*step_size)?;
                enc.bool(*no_step_prior)?;
            }
            Fmi3Command::SetDebugLogging {
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
            Fmi3Command::Get { references, .. }
            | Fmi3Command::GetIntervalDecimal { references }
            | Fmi3Command::GetIntervalFraction { references }
            | Fmi3Command::GetShiftDecimal { references }
            | Fmi3Command::GetShiftFraction { references } => {
                enc.array(1)?;
                encode_u32s(enc, references)?;
            }
            Fmi3Command::Set { references, values } => {
                enc.array(2)?;
                encode_u32s(enc, references)?;
                encode_batch(enc, values)?;
            }
            Fmi3Command::SetIntervalDecimal {
                references,
                intervals,
            } => {
                enc.array(2)?;
                encode_u32s(enc, references)?;
                encode_f64s(enc, intervals)?;
            }
            Fmi3Command::SetShiftDecimal { references, shifts } => {
                enc.array(2)?;
                encode_u32s(enc, references)?;
                encode_f64s(enc, shifts)?;
            }
            Fmi3Command::SetIntervalFraction {
                references,
                counters,
                resolutions,
            }
            | Fmi3Command::SetShiftFraction {
                references,
                counters,
                resolutions,
            } => {
                enc.array(3)?;
                encode_u32s(enc, references)?;
                encode_u64s(enc, counters)?;
                encode_u64s(enc, resolutions)?;
            }
            Fmi3Command::DeserializeFmuState { state } => {
                enc.array(1)?;
                enc.bytes(state)?;
            }
            Fmi3Command::ExitInitializationMode
            | Fmi3Command::EnterEventMode
            | Fmi3Command::EnterStepMode
            | Fmi3Command::EnterConfigurationMode
            | Fmi3Command::ExitConfigurationMode
            | Fmi3Command::UpdateDiscreteStates
            | Fmi3Command::SerializeFmuState
            | Fmi3Command::Terminate
            | Fmi3Command::Reset
            | Fmi3Command::FreeInstance
            | Fmi3Command::CallbackContinue => {
                enc.array(0)?;
            }
        }
        Ok(())
    })
}

pub fn decode_command(bytes: &[u8]) -> Result<Fmi3Command, ProtoError> {
    let (tag, body) = decode_envelope(bytes)?;
    let mut dec = Decoder::new(body);

    let command = match tag.as_str() {
        "FMI3_INSTANTIATE_MODEL_EXCHANGE" => {
            Fmi3Command::InstantiateModelExchange(decode_instantiate_stub(&mut dec)?)
        }
        "FMI3_INSTANTIATE_SCHEDULED_EXECUTION" => {
            Fmi3Command::InstantiateScheduledExecution(decode_instantiate_stub(&mut dec)?)
        }
        "FMI3_INSTANTIATE_CO_SIMULATION" => {
            expect_array(&mut dec, 8)?;
            Fmi3Command::InstantiateCoSimulation(Fmi3Instantiate {
                instance_name: dec.str()?.to_string(),
                instantiation_token: dec.str()?.to_string(),
                resource_path: dec.str()?.to_string(),
                visible: dec.bool()?,
                logging_on: dec.bool()?,
                event_mode_used: dec.bool()?,
                early_return_allowed: dec.bool()?,
                required_intermediate_variables: decode_u32s(&mut dec)?,
            })
        }
        "FMI3_ENTER_INITIALIZATION_MODE" => {
            expect_array(&mut dec, 3)?;
            Fmi3Command::EnterInitializationMode {
                tolerance: decode_opt_f64(&mut dec)?,
                start_time: dec.f64()?,
                stop_time: decode_opt_f64(&mut dec)?,
            }
        }
        "FMI3_EXIT_INITIALIZATION_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::ExitInitializationMode
        }
        "FMI3_ENTER_EVENT_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::EnterEventMode
        }
        "FMI3_ENTER_STEP_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::EnterStepMode
        }
        "FMI3_ENTER_CONFIGURATION_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::EnterConfigurationMode
        }
        "FMI3_EXIT_CONFIGURATION_MODE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::ExitConfigurationMode
        }
        "FMI3_DO_STEP" => {
            expect_array(&mut dec, 3)?;
            Fmi3Command::DoStep {
                current_time: dec.f64()?,
                step_size: dec.f64()?,
                no_step_prior: dec.bool()?,
            }
        }
        "FMI3_UPDATE_DISCRETE_STATES" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::UpdateDiscreteStates
        }
        "FMI3_SET_DEBUG_LOGGING" => {
            expect_array(&mut dec, 2)?;
            let len = dec.array()?.ok_or(ProtoError::IndefiniteLength)?;
            let mut categories = Vec::with_capacity(len as usize);
            for _ in 0..len {
                categories.push(dec.str()?.to_string());
            }
            Fmi3Command::SetDebugLogging {
                categories,
                logging_on: dec.bool()?,
            }
        }
        "FMI3_GET_FLOAT32" => decode_get(&mut dec, Fmi3ValueKind::Float32)?,
        "FMI3_GET_FLOAT64" => decode_get(&mut dec, Fmi3ValueKind::Float64)?,
        "FMI3_GET_INT8" => decode_get(&mut dec, Fmi3ValueKind::Int8)?,
        "FMI3_GET_UINT8" => decode_get(&mut dec, Fmi3ValueKind::UInt8)?,
        "FMI3_GET_INT16" => decode_get(&mut dec, Fmi3ValueKind::Int16)?,
        "FMI3_GET_UINT16" => decode_get(&mut dec, Fmi3ValueKind::UInt16)?,
        "FMI3_GET_INT32" => decode_get(&mut dec, Fmi3ValueKind::Int32)?,
        "FMI3_GET_UINT32" => decode_get(&mut dec, Fmi3ValueKind::UInt32)?,
        "FMI3_GET_INT64" => decode_get(&mut dec, Fmi3ValueKind::Int64)?,
        "FMI3_GET_UINT64" => decode_get(&mut dec, Fmi3ValueKind::UInt64)?,
        "FMI3_GET_BOOLEAN" => decode_get(&mut dec, Fmi3ValueKind::Boolean)?,
        "FMI3_GET_STRING" => decode_get(&mut dec, Fmi3ValueKind::String)?,
        "FMI3_GET_BINARY" => decode_get(&mut dec, Fmi3ValueKind::Binary)?,
        "FMI3_GET_CLOCK" => decode_get(&mut dec, Fmi3ValueKind::Clock)?,
        "FMI3_SET_FLOAT32" => decode_set(&mut dec, Fmi3ValueKind::Float32)?,
        "FMI3_SET_FLOAT64" => decode_set(&mut dec, Fmi3ValueKind::Float64)?,
        "FMI3_SET_INT8" => decode_set(&mut dec, Fmi3ValueKind::Int8)?,
        "FMI3_SET_UINT8" => decode_set(&mut dec, Fmi3ValueKind::UInt8)?,
        "FMI3_SET_INT16" => decode_set(&mut dec, Fmi3ValueKind::Int16)?,
        "FMI3_SET_UINT16" => decode_set(&mut dec, Fmi3ValueKind::UInt16)?,
        "FMI3_SET_INT32" => decode_set(&mut dec, Fmi3ValueKind::Int32)?,
        "FMI3_SET_UINT32" => decode_set(&mut dec, Fmi3ValueKind::UInt32)?,
        "FMI3_SET_INT64" => decode_set(&mut dec, Fmi3ValueKind::Int64)?,
        "FMI3_SET_UINT64" => decode_set(&mut dec, Fmi3ValueKind::UInt64)?,
        "FMI3_SET_BOOLEAN" => decode_set(&mut dec, Fmi3ValueKind::Boolean)?,
        "FMI3_SET_STRING" => decode_set(&mut dec, Fmi3ValueKind::String)?,
        "FMI3_SET_BINARY" => decode_set(&mut dec, Fmi3ValueKind::Binary)?,
        "FMI3_SET_CLOCK" => decode_set(&mut dec, Fmi3ValueKind::Clock)?,
        "FMI3_GET_INTERVAL_DECIMAL" => {
            expect_array(&mut dec, 1)?;
            Fmi3Command::GetIntervalDecimal {
                references: decode_u32s(&mut dec)?,
            }
        }
        "FMI3_GET_INTERVAL_FRACTION" => {
            expect_array(&mut dec, 1)?;
            Fmi3Command::GetIntervalFraction {
                references: decode_u32s(&mut dec)?,
            }
        }
        "FMI3_GET_SHIFT_DECIMAL" => {
            expect_array(&mut dec, 1)?;
            Fmi3Command::GetShiftDecimal {
                references: decode_u32s(&mut dec)?,
            }
        }
        "FMI3_GET_SHIFT_FRACTION" => {
            expect_array(&mut dec, 1)?;
            Fmi3Command::GetShiftFraction {
                references: decode_u32s(&mut dec)?,
            }
        }
        "FMI3_SET_INTERVAL_DECIMAL" => {
            expect_array(&mut dec, 2)?;
            let references = decode_u32s(&mut dec)?;
            let intervals = decode_f64s(&mut dec)?;
            check_arity(references.len(), intervals.len())?;
            Fmi3Command::SetIntervalDecimal {
                references,
                intervals,
            }
        }
        "FMI3_SET_SHIFT_DECIMAL" => {
            expect_array(&mut dec, 2)?;
            let references = decode_u32s(&mut dec)?;
            let shifts = decode_f64s(&mut dec)?;
            check_arity(references.len(), shifts.len())?;
            Fmi3Command::SetShiftDecimal { references, shifts }
        }
        "FMI3_SET_INTERVAL_FRACTION" => {
            let (references, counters, resolutions) = decode_fraction_set(&mut dec)?;
            Fmi3Command::SetIntervalFraction {
                references,
                counters,
                resolutions,
            }
        }
        "FMI3_SET_SHIFT_FRACTION" => {
            let (references, counters, resolutions) = decode_fraction_set(&mut dec)?;
            Fmi3Command::SetShiftFraction {
                references,
                counters,
                resolutions,
            }
        }
        "FMI3_SERIALIZE_FMU_STATE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::SerializeFmuState
        }
        "FMI3_DESERIALIZE_FMU_STATE" => {
            expect_array(&mut dec, 1)?;
            Fmi3Command::DeserializeFmuState {
                state: dec.bytes()?.to_vec(),
            }
        }
        "FMI3_TERMINATE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::Terminate
        }
        "FMI3_RESET" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::Reset
        }
        "FMI3_FREE_INSTANCE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::FreeInstance
        }
        "FMI3_CALLBACK_CONTINUE" => {
            expect_array(&mut dec, 0)?;
            Fmi3Command::CallbackContinue
        }
        _ => return Err(ProtoError::UnknownMessageType(tag)),
    };

    finish(&dec)?;
    Ok(command)
}

fn decode_get(dec: &mut Decoder, kind: Fmi3ValueKind) -> Result<Fmi3Command, ProtoError> {
    expect_array(dec, 1)?;
    Ok(Fmi3Command::Get {
        kind,
        references: decode_u32s(dec)?,
    })
}

fn decode_set(dec: &mut Decoder, kind: Fmi3ValueKind) -> Result<Fmi3Command, ProtoError> {
    expect_array(dec, 2)?;
    let references = decode_u32s(dec)?;
    let values = decode_batch(dec, kind)?;
    check_arity(references.len(), values.len())?;
    Ok(Fmi3Command::Set { references, values })
}

#[allow(clippy::type_complexity)]
fn decode_fraction_set(
    dec: &mut Decoder,
) -> Result<(Vec<ValueRef>, Vec<u64>, Vec<u64>), ProtoError> {
    expect_array(dec, 3)?;
    let references = decode_u32s(dec)?;
    let counters = decode_u64s(dec)?;
    let resolutions = decode_u64s(dec)?;
    check_arity(references.len(), counters.len())?;
    check_arity(references.len(), resolutions.len())?;
    Ok((references, counters, resolutions))
}

fn check_arity(references: usize, values: usize) -> Result<(), ProtoError> {
    if references != values {
        return Err(ProtoError::ArityMismatch { references, values });
    }
    Ok(())
}

// ----------------------------------------------------------------- replies

pub fn encode_return(reply: &Fmi3Return) -> Result<Vec<u8>, ProtoError> {
    encode_envelope(reply.tag(), |enc| {
        match reply {
            Fmi3Return::Empty | Fmi3Return::FreeInstance => {
                enc.array(0)?;
            }
            Fmi3Return::Status(status) => {
                enc.array(1)?;
                enc.u8(status.code())?;
            }
            Fmi3Return::DoStep(result) => {
                enc.array(5)?;
                enc.u8(result.status.code())?;
                enc.bool(result.event_handling_needed)?;
                enc.bool(result.terminate_simulation)?;
                enc.bool(result.early_return)?;
                enc.f64(result.last_successful_time)?;
            }
            Fmi3Return::UpdateDiscreteStates(result) => {
                enc.array(7)?;
                enc.u8(result.status.code())?;
                enc.bool(result.discrete_states_need_update)?;
                enc.bool(result.terminate_simulation)?;
                enc.bool(result.nominals_changed)?;
                enc.bool(result.values_changed)?;
                enc.bool(result.next_event_time_defined)?;
                enc.f64(result.next_event_time)?;
            }
            Fmi3Return::GetValues { status, values } => {
                enc.array(2)?;
                enc.u8(status.code())?;
                encode_batch(enc, values)?;
            }
            Fmi3Return::IntervalDecimal {
                status,
                intervals,
                qualifiers,
            } => {
                enc.array(3)?;
                enc.u8(status.code())?;
                encode_f64s(enc, intervals)?;
                encode_u8s(enc, qualifiers)?;
            }
            Fmi3Return::IntervalFraction {
                status,
                counters,
                resolutions,
                qualifiers,
            } => {
                enc.array(4)?;
                enc.u8(status.code())?;
                encode_u64s(enc, counters)?;
                encode_u64s(enc, resolutions)?;
                encode_u8s(enc, qualifiers)?;
            }
            Fmi3Return::ShiftDecimal { status, shifts } => {
                enc.array(2)?;
                enc.u8(status.code())?;
                encode_f64s(enc, shifts)?;
            }
            Fmi3Return::ShiftFraction {
                status,
                counters,
                resolutions,
            } => {
                enc.array(3)?;
                enc.u8(status.code())?;
                encode_u64s(enc, counters)?;
                encode_u64s(enc, resolutions)?;
            }
            Fmi3Return::Serialize { status, state } => {
                enc.array(2)?;
                enc.u8(status.code())?;
                enc.bytes(state)?;
            }
            Fmi3Return::Log(record) => {
                enc.array(3)?;
                enc.u8(record.status.code())?;
                enc.str(&record.category)?;
                enc.str(&record.message)?;
            }
        }
        Ok(())
    })
}

pub fn decode_return(bytes: &[u8]) -> Result<Fmi3Return, ProtoError> {
    let (tag, body) = decode_envelope(bytes)?;
    let mut dec = Decoder::new(body);

    let reply = match tag.as_str() {
        "FMI3_EMPTY_RETURN" => {
            expect_array(&mut dec, 0)?;
            Fmi3Return::Empty
        }
        "FMI3_FREE_INSTANCE_RETURN" => {
            expect_array(&mut dec, 0)?;
            Fmi3Return::FreeInstance
        }
        "FMI3_STATUS_RETURN" => {
            expect_array(&mut dec, 1)?;
            Fmi3Return::Status(decode_status(&mut dec)?)
        }
        "FMI3_DO_STEP_RETURN" => {
            expect_array(&mut dec, 5)?;
            Fmi3Return::DoStep(DoStepResult {
                status: decode_status(&mut dec)?,
                event_handling_needed: dec.bool()?,
                terminate_simulation: dec.bool()?,
                early_return: dec.bool()?,
                last_successful_time: dec.f64()?,
            })
        }
        "FMI3_UPDATE_DISCRETE_STATES_RETURN" => {
            expect_array(&mut dec, 7)?;
            Fmi3Return::UpdateDiscreteStates(UpdateDiscreteStatesResult {
                status: decode_status(&mut dec)?,
                discrete_states_need_update: dec.bool()?,
                terminate_simulation: dec.bool()?,
                nominals_changed: dec.bool()?,
                values_changed: dec.bool()?,
                next_event_time_defined: dec.bool()?,
                next_event_time: dec.f64()?,
            })
        }
        "FMI3_GET_FLOAT32_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Float32)?,
        "FMI3_GET_FLOAT64_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Float64)?,
        "FMI3_GET_INT8_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Int8)?,
        "FMI3_GET_UINT8_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::UInt8)?,
        "FMI3_GET_INT16_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Int16)?,
        "FMI3_GET_UINT16_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::UInt16)?,
        "FMI3_GET_INT32_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Int32)?,
        "FMI3_GET_UINT32_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::UInt32)?,
        "FMI3_GET_INT64_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Int64)?,
        "FMI3_GET_UINT64_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::UInt64)?,
        "FMI3_GET_BOOLEAN_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Boolean)?,
        "FMI3_GET_STRING_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::String)?,
        "FMI3_GET_BINARY_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Binary)?,
        "FMI3_GET_CLOCK_RETURN" => decode_get_return(&mut dec, Fmi3ValueKind::Clock)?,
        "FMI3_INTERVAL_DECIMAL_RETURN" => {
            expect_array(&mut dec, 3)?;
            Fmi3Return::IntervalDecimal {
                status: decode_status(&mut dec)?,
                intervals: decode_f64s(&mut dec)?,
                qualifiers: decode_u8s(&mut dec)?,
            }
        }
        "FMI3_INTERVAL_FRACTION_RETURN" => {
            expect_array(&mut dec, 4)?;
            Fmi3Return::IntervalFraction {
                status: decode_status(&mut dec)?,
                counters: decode_u64s(&mut dec)?,
                resolutions: decode_u64s(&mut dec)?,
                qualifiers: decode_u8s(&mut dec)?,
            }
        }
        "FMI3_SHIFT_DECIMAL_RETURN" => {
            expect_array(&mut dec, 2)?;
            Fmi3Return::ShiftDecimal {
                status: decode_status(&mut dec)?,
                shifts: decode_f64s(&mut dec)?,
            }
        }
        "FMI3_SHIFT_FRACTION_RETURN" => {
            expect_array(&mut dec, 3)?;
            Fmi3Return::ShiftFraction {
                status: decode_status(&mut dec)?,
                counters: decode_u64s(&mut dec)?,
                resolutions: decode_u64s(&mut dec)?,
            }
        }
        "FMI3_SERIALIZE_RETURN" => {
            expect_array(&mut dec, 2)?;
            Fmi3Return::Serialize {
                status: decode_status(&mut dec)?,
                state: dec.bytes()?.to_vec(),
            }
        }
        "FMI3_LOG_RETURN" => {
            expect_array(&mut dec, 3)?;
            Fmi3Return::Log(LogRecord {
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

fn decode_get_return(dec: &mut Decoder, kind: Fmi3ValueKind) -> Result<Fmi3Return, ProtoError> {
    expect_array(dec, 2)?;
    Ok(Fmi3Return::GetValues {
        status: decode_status(dec)?,
        values: decode_batch(dec, kind)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn co_simulation_args() -> Fmi3Instantiate {
        Fmi3Instantiate {
            instance_name: "adder".into(),
            instantiation_token: "{8c4e810f-3df3-4a00-8276-176fa3c9f000}".into(),
            resource_path: "/tmp/adder/resources".into(),
            visible: false,
            logging_on: true,
            event_mode_used: true,
            early_return_allowed: false,
            required_intermediate_variables: vec![3, 4],
        }
    }

    #[test]
    fn command_roundtrip() {
        let commands = vec![
            Fmi3Command::InstantiateCoSimulation(co_simulation_args()),
            Fmi3Command::InstantiateModelExchange(Fmi3InstantiateStub {
                instance_name: "me".into(),
                instantiation_token: "token".into(),
                resource_path: "/tmp".into(),
                visible: false,
                logging_on: false,
            }),
            Fmi3Command::EnterInitializationMode {
                tolerance: None,
                start_time: 0.0,
                stop_time: Some(10.0),
            },
            Fmi3Command::DoStep {
                current_time: 1.0,
                step_size: 0.25,
                no_step_prior: true,
            },
            Fmi3Command::Get {
                kind: Fmi3ValueKind::Binary,
                references: vec![36, 37],
            },
            Fmi3Command::Set {
                references: vec![36],
                values: Fmi3ValueBatch::Binary(vec![vec![10, 20, 30, 40]]),
            },
            Fmi3Command::Set {
                references: vec![1001, 1002],
                values: Fmi3ValueBatch::Clock(vec![true, false]),
            },
            Fmi3Command::SetIntervalDecimal {
                references: vec![1001],
                intervals: vec![1.5],
            },
            Fmi3Command::SetIntervalFraction {
                references: vec![1001],
                counters: vec![3],
                resolutions: vec![2],
            },
            Fmi3Command::GetShiftFraction {
                references: vec![1001],
            },
            Fmi3Command::UpdateDiscreteStates,
            Fmi3Command::FreeInstance,
        ];
        for command in commands {
            let bytes = encode_command(&command).unwrap();
            assert_eq!(decode_command(&bytes).unwrap(), command);
        }
    }

    #[test]
    fn return_roundtrip() {
        let replies = vec![
            Fmi3Return::Empty,
            Fmi3Return::Status(Fmi3Status::Discard),
            Fmi3Return::DoStep(DoStepResult {
                status: Fmi3Status::Ok,
                event_handling_needed: false,
                terminate_simulation: false,
                early_return: false,
                last_successful_time: 1.25,
            }),
            Fmi3Return::UpdateDiscreteStates(UpdateDiscreteStatesResult {
                status: Fmi3Status::Ok,
                discrete_states_need_update: false,
                terminate_simulation: false,
                nominals_changed: false,
                values_changed: true,
                next_event_time_defined: true,
                next_event_time: 1.0,
            }),
            Fmi3Return::GetValues {
                status: Fmi3Status::Ok,
                values: Fmi3ValueBatch::UInt64(vec![5]),
            },
            Fmi3Return::IntervalFraction {
                status: Fmi3Status::Ok,
                counters: vec![3],
                resolutions: vec![2],
                qualifiers: vec![2],
            },
            Fmi3Return::ShiftDecimal {
                status: Fmi3Status::Ok,
                shifts: vec![1.0],
            },
            Fmi3Return::Serialize {
                status: Fmi3Status::Ok,
                state: vec![1, 2, 3],
            },
            Fmi3Return::Log(LogRecord {
                status: Fmi3Status::Warning,
                category: "logStatusWarning".into(),
                message: "clock shift clamped".into(),
            }),
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
        enc.str("FMI3_GET_COMPLEX128").unwrap();
        enc.str("body").unwrap();
        enc.array(0).unwrap();

        assert!(matches!(
            decode_command(&buf),
            Err(ProtoError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn timing_setter_arity_is_checked() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.str("type").unwrap();
        enc.str("FMI3_SET_INTERVAL_FRACTION").unwrap();
        enc.str("body").unwrap();
        enc.array(3).unwrap();
        enc.array(1).unwrap();
        enc.u32(1001).unwrap();
        enc.array(1).unwrap();
        enc.u64(3).unwrap();
        enc.array(2).unwrap();
        enc.u64(2).unwrap();
        enc.u64(4).unwrap();

        assert!(matches!(
            decode_command(&buf),
            Err(ProtoError::ArityMismatch {
                references: 1,
                values: 2
            })
        ));
    }
}

//! FMI 3.0 co-simulation backend: wire protocol, clock arithmetic, model
//! contract, reference adder model, and the dispatch loop.

pub mod adder;
pub mod backend;
pub mod clock;
pub mod model;
pub mod proto;

pub use adder::Fmi3Adder;
pub use backend::{Fmi3Backend, Fmi3BackendError, ServeOutcome};
pub use clock::{ClockError, Fraction, INTERVAL_QUALIFIER_CHANGED};
pub use model::{
    AccessError, DoStepResult, Fmi3Instantiate, Fmi3Lifecycle, Fmi3Model, Fmi3State, LogRecord,
    UpdateDiscreteStatesResult, VariableCategory,
};
pub use proto::{Fmi3Command, Fmi3Return, ProtoError};

/// Opaque handle identifying one model variable. Bound at construction,
/// never reused across instances.
pub type ValueRef = u32;

/// FMI 3.0 status vocabulary. Unlike FMI2 there is no `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi3Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
}

impl Fmi3Status {
    pub fn code(self) -> u8 {
        match self {
            Fmi3Status::Ok => 0,
            Fmi3Status::Warning => 1,
            Fmi3Status::Discard => 2,
            Fmi3Status::Error => 3,
            Fmi3Status::Fatal => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Fmi3Status::Ok),
            1 => Some(Fmi3Status::Warning),
            2 => Some(Fmi3Status::Discard),
            3 => Some(Fmi3Status::Error),
            4 => Some(Fmi3Status::Fatal),
            _ => None,
        }
    }
}

/// The fourteen FMI3 value kinds (thirteen data kinds plus clocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi3ValueKind {
    Float32,
    Float64,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Boolean,
    String,
    Binary,
    Clock,
}

/// A homogeneous batch of values, one per requested reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Fmi3ValueBatch {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Boolean(Vec<bool>),
    String(Vec<String>),
    Binary(Vec<Vec<u8>>),
    Clock(Vec<bool>),
}

impl Fmi3ValueBatch {
    pub fn empty(kind: Fmi3ValueKind) -> Self {
        match kind {
            Fmi3ValueKind::Float32 => Fmi3ValueBatch::Float32(Vec::new()),
            Fmi3ValueKind::Float64 => Fmi3ValueBatch::Float64(Vec::new()),
            Fmi3ValueKind::Int8 => Fmi3ValueBatch::Int8(Vec::new()),
            Fmi3ValueKind::UInt8 => Fmi3ValueBatch::UInt8(Vec::new()),
            Fmi3ValueKind::Int16 => Fmi3ValueBatch::Int16(Vec::new()),
            Fmi3ValueKind::UInt16 => Fmi3ValueBatch::UInt16(Vec::new()),
            Fmi3ValueKind::Int32 => Fmi3ValueBatch::Int32(Vec::new()),
            Fmi3ValueKind::UInt32 => Fmi3ValueBatch::UInt32(Vec::new()),
            Fmi3ValueKind::Int64 => Fmi3ValueBatch::Int64(Vec::new()),
            Fmi3ValueKind::UInt64 => Fmi3ValueBatch::UInt64(Vec::new()),
            Fmi3ValueKind::Boolean => Fmi3ValueBatch::Boolean(Vec::new()),
            Fmi3ValueKind::String => Fmi3ValueBatch::String(Vec::new()),
            Fmi3ValueKind::Binary => Fmi3ValueBatch::Binary(Vec::new()),
            Fmi3ValueKind::Clock => Fmi3ValueBatch::Clock(Vec::new()),
        }
    }

    pub fn kind(&self) -> Fmi3ValueKind {
        match self {
            Fmi3ValueBatch::Float32(_) => Fmi3ValueKind::Float32,
            Fmi3ValueBatch::Float64(_) => Fmi3ValueKind::Float64,
            Fmi3ValueBatch::Int8(_) => Fmi3ValueKind::Int8,
            Fmi3ValueBatch::UInt8(_) => Fmi3ValueKind::UInt8,
            Fmi3ValueBatch::Int16(_) => Fmi3ValueKind::Int16,
            Fmi3ValueBatch::UInt16(_) => Fmi3ValueKind::UInt16,
            Fmi3ValueBatch::Int32(_) => Fmi3ValueKind::Int32,
            Fmi3ValueBatch::UInt32(_) => Fmi3ValueKind::UInt32,
            Fmi3ValueBatch::Int64(_) => Fmi3ValueKind::Int64,
            Fmi3ValueBatch::UInt64(_) => Fmi3ValueKind::UInt64,
            Fmi3ValueBatch::Boolean(_) => Fmi3ValueKind::Boolean,
            Fmi3ValueBatch::String(_) => Fmi3ValueKind::String,
            Fmi3ValueBatch::Binary(_) => Fmi3ValueKind::Binary,
            Fmi3ValueBatch::Clock(_) => Fmi3ValueKind::Clock,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fmi3ValueBatch::Float32(v) => v.len(),
            Fmi3ValueBatch::Float64(v) => v.len(),
            Fmi3ValueBatch::Int8(v) => v.len(),
            Fmi3ValueBatch::UInt8(v) => v.len(),
            Fmi3ValueBatch::Int16(v) => v.len(),
            Fmi3ValueBatch::UInt16(v) => v.len(),
            Fmi3ValueBatch::Int32(v) => v.len(),
            Fmi3ValueBatch::UInt32(v) => v.len(),
            Fmi3ValueBatch::Int64(v) => v.len(),
            Fmi3ValueBatch::UInt64(v) => v.len(),
            Fmi3ValueBatch::Boolean(v) => v.len(),
            Fmi3ValueBatch::String(v) => v.len(),
            Fmi3ValueBatch::Binary(v) => v.len(),
            Fmi3ValueBatch::Clock(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

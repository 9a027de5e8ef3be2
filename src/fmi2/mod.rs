//! FMI 2.0 co-simulation backend: wire protocol, model contract,
//! reference adder model, and the dispatch loop.

pub mod adder;
pub mod backend;
pub mod model;
pub mod proto;

pub use adder::Fmi2Adder;
pub use backend::{Fmi2Backend, Fmi2BackendError, ServeOutcome};
pub use model::{AccessError, Fmi2Instantiate, Fmi2Lifecycle, Fmi2Model, Fmi2State, LogRecord};
pub use proto::{Fmi2Command, Fmi2Return, ProtoError};

/// Opaque handle identifying one model variable. Bound at construction,
/// never reused across instances.
pub type ValueRef = u32;

/// FMI 2.0 status vocabulary (FMI spec section 2.1.3).
///
/// `Pending` exists in FMI2 only, for asynchronous doStep; the reference
/// model never produces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi2Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl Fmi2Status {
    pub fn code(self) -> u8 {
        match self {
            Fmi2Status::Ok => 0,
            Fmi2Status::Warning => 1,
            Fmi2Status::Discard => 2,
            Fmi2Status::Error => 3,
            Fmi2Status::Fatal => 4,
            Fmi2Status::Pending => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Fmi2Status::Ok),
            1 => Some(Fmi2Status::Warning),
            2 => Some(Fmi2Status::Discard),
            3 => Some(Fmi2Status::Error),
            4 => Some(Fmi2Status::Fatal),
            5 => Some(Fmi2Status::Pending),
            _ => None,
        }
    }
}

/// The four FMI2 value kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi2ValueKind {
    Real,
    Integer,
    Boolean,
    String,
}

/// A homogeneous batch of values, one per requested reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Fmi2ValueBatch {
    Real(Vec<f64>),
    Integer(Vec<i32>),
    Boolean(Vec<bool>),
    String(Vec<String>),
}

impl Fmi2ValueBatch {
    pub fn empty(kind: Fmi2ValueKind) -> Self {
        match kind {
            Fmi2ValueKind::Real => Fmi2ValueBatch::Real(Vec::new()),
            Fmi2ValueKind::Integer => Fmi2ValueBatch::Integer(Vec::new()),
            Fmi2ValueKind::Boolean => Fmi2ValueBatch::Boolean(Vec::new()),
            Fmi2ValueKind::String => Fmi2ValueBatch::String(Vec::new()),
        }
    }

    pub fn kind(&self) -> Fmi2ValueKind {
        match self {
            Fmi2ValueBatch::Real(_) => Fmi2ValueKind::Real,
            Fmi2ValueBatch::Integer(_) => Fmi2ValueKind::Integer,
            Fmi2ValueBatch::Boolean(_) => Fmi2ValueKind::Boolean,
            Fmi2ValueBatch::String(_) => Fmi2ValueKind::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fmi2ValueBatch::Real(v) => v.len(),
            Fmi2ValueBatch::Integer(v) => v.len(),
            Fmi2ValueBatch::Boolean(v) => v.len(),
            Fmi2ValueBatch::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

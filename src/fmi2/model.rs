//! The FMI2 model contract and lifecycle automaton.

use thiserror::Error;

use crate::snapshot::SnapshotError;

use super::{Fmi2Status, Fmi2ValueBatch, Fmi2ValueKind, ValueRef};

/// Arguments of `fmi2Instantiate`, fixed for the lifetime of the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fmi2Instantiate {
    pub instance_name: String,
    pub fmu_guid: String,
    pub resource_location: String,
    pub visible: bool,
    pub logging_on: bool,
}

/// FMI2 lifecycle states. The FMI3 automaton restricted to its core
/// progression: Instantiated -> InitializationMode -> StepMode ->
/// Terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi2State {
    Instantiated,
    InitializationMode,
    StepMode,
    Terminated,
}

impl Fmi2State {
    pub fn code(self) -> u8 {
        match self {
            Fmi2State::Instantiated => 0,
            Fmi2State::InitializationMode => 1,
            Fmi2State::StepMode => 2,
            Fmi2State::Terminated => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Fmi2State::Instantiated),
            1 => Some(Fmi2State::InitializationMode),
            2 => Some(Fmi2State::StepMode),
            3 => Some(Fmi2State::Terminated),
            _ => None,
        }
    }
}

/// Illegal state access or transition. Surfaces as status `Error` on the
/// command's reply; the automaton is left untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("unknown value reference {reference}")]
    UnknownReference { reference: ValueRef },
    #[error("value reference {reference} is not of the requested kind")]
    KindMismatch { reference: ValueRef },
    #[error("value reference {reference} is not writable in state {state:?}")]
    NotWritable { reference: ValueRef, state: Fmi2State },
    #[error("operation {operation} is illegal in state {state:?}")]
    IllegalTransition {
        operation: &'static str,
        state: Fmi2State,
    },
}

/// A log notification queued by model code during a command, delivered to
/// the master through the nested log exchange before the command's reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub status: Fmi2Status,
    pub category: String,
    pub message: String,
}

/// Lifecycle automaton for FMI2. Transitions either move the state or
/// return an error and leave it in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fmi2Lifecycle {
    state: Fmi2State,
}

impl Fmi2Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Fmi2State::Instantiated,
        }
    }

    pub fn state(&self) -> Fmi2State {
        self.state
    }

    /// Used by snapshot restore only; bypasses transition legality.
    pub fn restore(&mut self, state: Fmi2State) {
        self.state = state;
    }

    pub fn setup_experiment(&self) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::Instantiated => Ok(()),
            state => Err(AccessError::IllegalTransition {
                operation: "SetupExperiment",
                state,
            }),
        }
    }

    pub fn enter_initialization_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::Instantiated => {
                self.state = Fmi2State::InitializationMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "EnterInitializationMode",
                state,
            }),
        }
    }

    pub fn exit_initialization_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::InitializationMode => {
                self.state = Fmi2State::StepMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "ExitInitializationMode",
                state,
            }),
        }
    }

    pub fn do_step(&self) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::StepMode => Ok(()),
            state => Err(AccessError::IllegalTransition {
                operation: "DoStep",
                state,
            }),
        }
    }

    pub fn terminate(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::Terminated => Err(AccessError::IllegalTransition {
                operation: "Terminate",
                state: Fmi2State::Terminated,
            }),
            _ => {
                self.state = Fmi2State::Terminated;
                Ok(())
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = Fmi2State::Instantiated;
    }

    /// FMI2 variables are plain I/O: writable in any non-terminal state.
    pub fn check_write(&self, reference: ValueRef) -> Result<(), AccessError> {
        match self.state {
            Fmi2State::Terminated => Err(AccessError::NotWritable {
                reference,
                state: Fmi2State::Terminated,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Fmi2Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation surface dispatched by the FMI2 command loop. Concrete models
/// (the reference adder, a wrapped native execution, a proxy) are
/// interchangeable implementations of this trait.
pub trait Fmi2Model {
    fn instantiate(args: &Fmi2Instantiate) -> Self
    where
        Self: Sized;

    fn setup_experiment(
        &mut self,
        start_time: f64,
        stop_time: Option<f64>,
        tolerance: Option<f64>,
    ) -> Fmi2Status;

    fn enter_initialization_mode(&mut self) -> Fmi2Status;
    fn exit_initialization_mode(&mut self) -> Fmi2Status;

    fn do_step(&mut self, current_time: f64, step_size: f64, no_step_prior: bool) -> Fmi2Status;
    fn cancel_step(&mut self) -> Fmi2Status;

    fn set_debug_logging(&mut self, categories: &[String], logging_on: bool) -> Fmi2Status;

    fn get(
        &mut self,
        kind: Fmi2ValueKind,
        references: &[ValueRef],
    ) -> Result<Fmi2ValueBatch, AccessError>;

    fn set(&mut self, references: &[ValueRef], values: &Fmi2ValueBatch)
        -> Result<(), AccessError>;

    fn terminate(&mut self) -> Fmi2Status;
    fn reset(&mut self) -> Fmi2Status;

    /// Static capability flag: models that cannot checkpoint return false
    /// and both snapshot operations reply `Error` with an empty payload.
    fn can_serialize(&self) -> bool {
        true
    }

    fn serialize_state(&self) -> Result<Vec<u8>, SnapshotError>;
    fn deserialize_state(&mut self, state: &[u8]) -> Result<(), SnapshotError>;

    /// Drain log notifications queued since the last command.
    fn take_log_records(&mut self) -> Vec<LogRecord> {
        Vec::new()
    }

    /// Best-effort release of externally-owned resources; called before
    /// process exit on both the graceful and the fatal path.
    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut lc = Fmi2Lifecycle::new();
        lc.setup_experiment().unwrap();
        lc.enter_initialization_mode().unwrap();
        lc.exit_initialization_mode().unwrap();
        lc.do_step().unwrap();
        lc.terminate().unwrap();
        assert_eq!(lc.state(), Fmi2State::Terminated);
    }

    #[test]
    fn illegal_transition_leaves_state_untouched() {
        let mut lc = Fmi2Lifecycle::new();
        assert!(lc.do_step().is_err());
        assert!(lc.exit_initialization_mode().is_err());
        assert_eq!(lc.state(), Fmi2State::Instantiated);
    }

    #[test]
    fn reset_returns_to_instantiated_from_anywhere() {
        let mut lc = Fmi2Lifecycle::new();
        lc.terminate().unwrap();
        lc.reset();
        assert_eq!(lc.state(), Fmi2State::Instantiated);
        lc.reset();
        assert_eq!(lc.state(), Fmi2State::Instantiated);
    }

    #[test]
    fn writes_rejected_after_terminate() {
        let mut lc = Fmi2Lifecycle::new();
        lc.check_write(0).unwrap();
        lc.terminate().unwrap();
        assert!(matches!(
            lc.check_write(0),
            Err(AccessError::NotWritable { reference: 0, .. })
        ));
    }
}

//! FMI3 model contract: lifecycle automaton, variable categories, and the
//! trait a model implements to be served by [`super::backend::Fmi3Backend`].

use thiserror::Error;

use crate::snapshot::SnapshotError;

use super::clock::ClockError;
use super::{Fmi3Status, Fmi3ValueBatch, Fmi3ValueKind, ValueRef};

/// Arguments of `fmi3InstantiateCoSimulation`.
#[derive(Clone, Debug, PartialEq)]
pub struct Fmi3Instantiate {
    pub instance_name: String,
    pub instantiation_token: String,
    pub resource_path: String,
    pub visible: bool,
    pub logging_on: bool,
    pub event_mode_used: bool,
    pub early_return_allowed: bool,
    pub required_intermediate_variables: Vec<ValueRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fmi3State {
    Instantiated,
    ConfigurationMode,
    ReconfigurationMode,
    InitializationMode,
    EventMode,
    StepMode,
    Terminated,
}

impl Fmi3State {
    pub fn code(self) -> u8 {
        match self {
            Fmi3State::Instantiated => 0,
            Fmi3State::ConfigurationMode => 1,
            Fmi3State::ReconfigurationMode => 2,
            Fmi3State::InitializationMode => 3,
            Fmi3State::EventMode => 4,
            Fmi3State::StepMode => 5,
            Fmi3State::Terminated => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Fmi3State::Instantiated),
            1 => Some(Fmi3State::ConfigurationMode),
            2 => Some(Fmi3State::ReconfigurationMode),
            3 => Some(Fmi3State::InitializationMode),
            4 => Some(Fmi3State::EventMode),
            5 => Some(Fmi3State::StepMode),
            6 => Some(Fmi3State::Terminated),
            _ => None,
        }
    }
}

/// How a variable may be read and written across the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableCategory {
    /// Plain I/O: writable in any non-terminal state, always readable.
    Plain,
    /// Fixed parameter: writable only during initialization.
    Parameter,
    /// Tunable parameter: writable in event mode and initialization.
    Tunable,
    /// Tunable structural parameter: writable in (re)configuration mode and
    /// initialization.
    TunableStructural,
    /// Clocked variable: read and write only in event mode and
    /// initialization.
    Clocked,
    /// Clock activation flag: same window as clocked variables.
    Clock,
}

#[derive(Debug, Error, PartialEq)]
pub enum AccessError {
    #[error("unknown value reference {reference}")]
    UnknownReference { reference: ValueRef },
    #[error("value reference {reference} has a different kind than the accessor")]
    KindMismatch { reference: ValueRef },
    #[error("value reference {reference} is not writable in state {state:?}")]
    NotWritable {
        reference: ValueRef,
        state: Fmi3State,
    },
    #[error("value reference {reference} is not readable in state {state:?}")]
    NotReadable {
        reference: ValueRef,
        state: Fmi3State,
    },
    #[error("{operation} is illegal in state {state:?}")]
    IllegalTransition {
        operation: &'static str,
        state: Fmi3State,
    },
    #[error("value reference {reference} is not a periodic clock")]
    NotPeriodic { reference: ValueRef },
    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// A queued log line, delivered to the wrapper through the nested log
/// exchange before the triggering command's reply.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub status: Fmi3Status,
    pub category: String,
    pub message: String,
}

/// Outputs of `fmi3DoStep`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoStepResult {
    pub status: Fmi3Status,
    pub event_handling_needed: bool,
    pub terminate_simulation: bool,
    pub early_return: bool,
    pub last_successful_time: f64,
}

impl DoStepResult {
    pub fn failed(status: Fmi3Status) -> Self {
        Self {
            status,
            event_handling_needed: false,
            terminate_simulation: false,
            early_return: false,
            last_successful_time: 0.0,
        }
    }
}

/// Outputs of `fmi3UpdateDiscreteStates`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateDiscreteStatesResult {
    pub status: Fmi3Status,
    pub discrete_states_need_update: bool,
    pub terminate_simulation: bool,
    pub nominals_changed: bool,
    pub values_changed: bool,
    pub next_event_time_defined: bool,
    pub next_event_time: f64,
}

impl UpdateDiscreteStatesResult {
    pub fn failed(status: Fmi3Status) -> Self {
        Self {
            status,
            discrete_states_need_update: false,
            terminate_simulation: false,
            nominals_changed: false,
            values_changed: false,
            next_event_time_defined: false,
            next_event_time: 0.0,
        }
    }
}

/// The FMI3 lifecycle automaton. Pure bookkeeping: models embed one and
/// consult it before mutating values.
#[derive(Clone, Debug)]
pub struct Fmi3Lifecycle {
    state: Fmi3State,
    event_mode_used: bool,
    has_structural_parameters: bool,
    /// Where `ExitConfigurationMode` returns to when the instance entered
    /// reconfiguration from a running mode.
    reconfigure_from: Fmi3State,
}

impl Fmi3Lifecycle {
    pub fn new(event_mode_used: bool, has_structural_parameters: bool) -> Self {
        Self {
            state: Fmi3State::Instantiated,
            event_mode_used,
            has_structural_parameters,
            reconfigure_from: Fmi3State::StepMode,
        }
    }

    pub fn state(&self) -> Fmi3State {
        self.state
    }

    pub fn event_mode_used(&self) -> bool {
        self.event_mode_used
    }

    /// Where `ExitConfigurationMode` will return to from reconfiguration.
    pub fn reconfigure_return(&self) -> Fmi3State {
        self.reconfigure_from
    }

    /// Used by snapshot restore only; bypasses transition legality. The
    /// return target matters when the snapshot was taken inside
    /// reconfiguration mode.
    pub fn restore(&mut self, state: Fmi3State, reconfigure_from: Fmi3State) {
        self.state = state;
        self.reconfigure_from = reconfigure_from;
    }

    pub fn enter_configuration_mode(&mut self) -> Result<(), AccessError> {
        if !self.has_structural_parameters {
            return Err(AccessError::IllegalTransition {
                operation: "enterConfigurationMode",
                state: self.state,
            });
        }
        match self.state {
            Fmi3State::Instantiated => {
                self.state = Fmi3State::ConfigurationMode;
                Ok(())
            }
            Fmi3State::EventMode | Fmi3State::StepMode => {
                self.reconfigure_from = self.state;
                self.state = Fmi3State::ReconfigurationMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "enterConfigurationMode",
                state,
            }),
        }
    }

    pub fn exit_configuration_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::ConfigurationMode => {
                self.state = Fmi3State::Instantiated;
                Ok(())
            }
            Fmi3State::ReconfigurationMode => {
                self.state = self.reconfigure_from;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "exitConfigurationMode",
                state,
            }),
        }
    }

    pub fn enter_initialization_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::Instantiated => {
                self.state = Fmi3State::InitializationMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "enterInitializationMode",
                state,
            }),
        }
    }

    /// Lands in event mode when the instance was constructed with
    /// `event_mode_used`, step mode otherwise.
    pub fn exit_initialization_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::InitializationMode => {
                self.state = if self.event_mode_used {
                    Fmi3State::EventMode
                } else {
                    Fmi3State::StepMode
                };
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "exitInitializationMode",
                state,
            }),
        }
    }

    pub fn enter_event_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::StepMode => {
                self.state = Fmi3State::EventMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "enterEventMode",
                state,
            }),
        }
    }

    pub fn enter_step_mode(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::EventMode => {
                self.state = Fmi3State::StepMode;
                Ok(())
            }
            state => Err(AccessError::IllegalTransition {
                operation: "enterStepMode",
                state,
            }),
        }
    }

    pub fn do_step(&self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::StepMode => Ok(()),
            state => Err(AccessError::IllegalTransition {
                operation: "doStep",
                state,
            }),
        }
    }

    pub fn update_discrete_states(&self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::EventMode => Ok(()),
            state => Err(AccessError::IllegalTransition {
                operation: "updateDiscreteStates",
                state,
            }),
        }
    }

    pub fn terminate(&mut self) -> Result<(), AccessError> {
        match self.state {
            Fmi3State::Terminated => Err(AccessError::IllegalTransition {
                operation: "terminate",
                state: Fmi3State::Terminated,
            }),
            _ => {
                self.state = Fmi3State::Terminated;
                Ok(())
            }
        }
    }

    /// Legal in any state.
    pub fn reset(&mut self) {
        self.state = Fmi3State::Instantiated;
    }

    pub fn check_write(
        &self,
        reference: ValueRef,
        category: VariableCategory,
    ) -> Result<(), AccessError> {
        let allowed = match category {
            VariableCategory::Plain => self.state != Fmi3State::Terminated,
            VariableCategory::Parameter => self.state == Fmi3State::InitializationMode,
            VariableCategory::Tunable => matches!(
                self.state,
                Fmi3State::EventMode | Fmi3State::InitializationMode
            ),
            VariableCategory::TunableStructural => matches!(
                self.state,
                Fmi3State::ConfigurationMode
                    | Fmi3State::ReconfigurationMode
                    | Fmi3State::InitializationMode
            ),
            VariableCategory::Clocked | VariableCategory::Clock => matches!(
                self.state,
                Fmi3State::EventMode | Fmi3State::InitializationMode
            ),
        };
        if allowed {
            Ok(())
        } else {
            Err(AccessError::NotWritable {
                reference,
                state: self.state,
            })
        }
    }

    pub fn check_read(
        &self,
        reference: ValueRef,
        category: VariableCategory,
    ) -> Result<(), AccessError> {
        match category {
            VariableCategory::Clocked | VariableCategory::Clock => {
                if matches!(
                    self.state,
                    Fmi3State::EventMode | Fmi3State::InitializationMode
                ) {
                    Ok(())
                } else {
                    Err(AccessError::NotReadable {
                        reference,
                        state: self.state,
                    })
                }
            }
            _ => Ok(()),
        }
    }
}

/// What a model must provide to be served over the command channel.
///
/// Status-returning operations map failures to `Error` themselves; the
/// typed accessors surface `AccessError` and let the dispatcher shape the
/// reply.
pub trait Fmi3Model {
    fn instantiate(args: &Fmi3Instantiate) -> Self;

    fn enter_initialization_mode(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Fmi3Status;
    fn exit_initialization_mode(&mut self) -> Fmi3Status;
    fn enter_event_mode(&mut self) -> Fmi3Status;
    fn enter_step_mode(&mut self) -> Fmi3Status;
    fn enter_configuration_mode(&mut self) -> Fmi3Status;
    fn exit_configuration_mode(&mut self) -> Fmi3Status;

    fn do_step(&mut self, current_time: f64, step_size: f64, no_step_prior: bool) -> DoStepResult;
    fn update_discrete_states(&mut self) -> UpdateDiscreteStatesResult;

    fn set_debug_logging(&mut self, categories: &[String], logging_on: bool) -> Fmi3Status;

    fn get(
        &mut self,
        kind: Fmi3ValueKind,
        references: &[ValueRef],
    ) -> Result<Fmi3ValueBatch, AccessError>;
    fn set(&mut self, references: &[ValueRef], values: &Fmi3ValueBatch)
        -> Result<(), AccessError>;

    fn get_interval_decimal(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<f64>, Vec<u8>), AccessError>;
    #[allow(clippy::type_complexity)]
    fn get_interval_fraction(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<u64>, Vec<u64>, Vec<u8>), AccessError>;
    fn get_shift_decimal(&mut self, references: &[ValueRef]) -> Result<Vec<f64>, AccessError>;
    fn get_shift_fraction(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<u64>, Vec<u64>), AccessError>;
    fn set_interval_decimal(
        &mut self,
        references: &[ValueRef],
        intervals: &[f64],
    ) -> Result<(), AccessError>;
    fn set_interval_fraction(
        &mut self,
        references: &[ValueRef],
        counters: &[u64],
        resolutions: &[u64],
    ) -> Result<(), AccessError>;
    fn set_shift_decimal(
        &mut self,
        references: &[ValueRef],
        shifts: &[f64],
    ) -> Result<(), AccessError>;
    fn set_shift_fraction(
        &mut self,
        references: &[ValueRef],
        counters: &[u64],
        resolutions: &[u64],
    ) -> Result<(), AccessError>;

    fn terminate(&mut self) -> Fmi3Status;
    fn reset(&mut self) -> Fmi3Status;

    fn can_serialize(&self) -> bool {
        true
    }
    fn serialize_state(&self) -> Result<Vec<u8>, SnapshotError>;
    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<(), SnapshotError>;

    fn take_log_records(&mut self) -> Vec<LogRecord> {
        Vec::new()
    }
    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_event_mode_path() {
        let mut lc = Fmi3Lifecycle::new(true, true);
        lc.enter_initialization_mode().unwrap();
        lc.exit_initialization_mode().unwrap();
        assert_eq!(lc.state(), Fmi3State::EventMode);
        lc.update_discrete_states().unwrap();
        lc.enter_step_mode().unwrap();
        lc.do_step().unwrap();
        lc.enter_event_mode().unwrap();
        lc.terminate().unwrap();
        assert_eq!(lc.state(), Fmi3State::Terminated);
    }

    #[test]
    fn step_mode_path_without_events() {
        let mut lc = Fmi3Lifecycle::new(false, false);
        lc.enter_initialization_mode().unwrap();
        lc.exit_initialization_mode().unwrap();
        assert_eq!(lc.state(), Fmi3State::StepMode);
        assert!(lc.update_discrete_states().is_err());
    }

    #[test]
    fn configuration_requires_structural_parameters() {
        let mut lc = Fmi3Lifecycle::new(false, false);
        assert!(matches!(
            lc.enter_configuration_mode(),
            Err(AccessError::IllegalTransition { .. })
        ));
        assert_eq!(lc.state(), Fmi3State::Instantiated);
    }

    #[test]
    fn reconfiguration_returns_to_prior_mode() {
        let mut lc = Fmi3Lifecycle::new(true, true);
        lc.enter_initialization_mode().unwrap();
        lc.exit_initialization_mode().unwrap();
        lc.enter_step_mode().unwrap();
        lc.enter_configuration_mode().unwrap();
        assert_eq!(lc.state(), Fmi3State::ReconfigurationMode);
        lc.exit_configuration_mode().unwrap();
        assert_eq!(lc.state(), Fmi3State::StepMode);
    }

    #[test]
    fn illegal_transitions_leave_state_unchanged() {
        let mut lc = Fmi3Lifecycle::new(false, true);
        assert!(lc.do_step().is_err());
        assert!(lc.enter_step_mode().is_err());
        assert_eq!(lc.state(), Fmi3State::Instantiated);
        lc.terminate().unwrap();
        assert!(lc.enter_initialization_mode().is_err());
        lc.reset();
        assert_eq!(lc.state(), Fmi3State::Instantiated);
    }

    #[test]
    fn write_gates_per_category() {
        let mut lc = Fmi3Lifecycle::new(true, true);
        // Instantiated: only plain is writable.
        assert!(lc.check_write(0, VariableCategory::Plain).is_ok());
        assert!(lc.check_write(100, VariableCategory::Tunable).is_err());
        assert!(lc
            .check_write(113, VariableCategory::TunableStructural)
            .is_err());

        lc.enter_configuration_mode().unwrap();
        assert!(lc
            .check_write(113, VariableCategory::TunableStructural)
            .is_ok());
        assert!(lc.check_write(100, VariableCategory::Tunable).is_err());
        lc.exit_configuration_mode().unwrap();

        lc.enter_initialization_mode().unwrap();
        assert!(lc.check_write(100, VariableCategory::Tunable).is_ok());
        assert!(lc.check_write(1001, VariableCategory::Clock).is_ok());
        lc.exit_initialization_mode().unwrap();

        // EventMode: tunable and clocked writable, structural not.
        assert!(lc.check_write(100, VariableCategory::Tunable).is_ok());
        assert!(lc.check_write(1100, VariableCategory::Clocked).is_ok());
        assert!(lc
            .check_write(113, VariableCategory::TunableStructural)
            .is_err());
    }

    #[test]
    fn clock_reads_are_gated() {
        let mut lc = Fmi3Lifecycle::new(false, false);
        assert!(lc.check_read(1001, VariableCategory::Clock).is_err());
        assert!(lc.check_read(0, VariableCategory::Plain).is_ok());
        lc.enter_initialization_mode().unwrap();
        assert!(lc.check_read(1001, VariableCategory::Clock).is_ok());
        lc.exit_initialization_mode().unwrap();
        // StepMode: clocked variables are not visible.
        assert!(lc.check_read(1100, VariableCategory::Clocked).is_err());
    }
}

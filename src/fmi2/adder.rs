//! Reference FMI2 model: a three-lane adder.
//!
//! Twelve variables in four kinds, references 0..=11. For each kind the
//! lanes `a` and `b` are inputs and `c` is the derived output: reals and
//! integers add, booleans OR, strings concatenate. Outputs are refreshed
//! when initialization ends and after every accepted step.

use crate::snapshot::{SnapshotError, SnapshotReader, SnapshotWriter};

use super::model::{AccessError, Fmi2Instantiate, Fmi2Lifecycle, Fmi2Model, Fmi2State, LogRecord};
use super::{Fmi2Status, Fmi2ValueBatch, Fmi2ValueKind, ValueRef};

pub const REAL_A: ValueRef = 0;
pub const REAL_B: ValueRef = 1;
pub const REAL_C: ValueRef = 2;
pub const INTEGER_A: ValueRef = 3;
pub const INTEGER_B: ValueRef = 4;
pub const INTEGER_C: ValueRef = 5;
pub const BOOLEAN_A: ValueRef = 6;
pub const BOOLEAN_B: ValueRef = 7;
pub const BOOLEAN_C: ValueRef = 8;
pub const STRING_A: ValueRef = 9;
pub const STRING_B: ValueRef = 10;
pub const STRING_C: ValueRef = 11;

const SNAPSHOT_VERSION: u16 = 1;

#[derive(Debug)]
pub struct Fmi2Adder {
    lifecycle: Fmi2Lifecycle,
    real_a: f64,
    real_b: f64,
    real_c: f64,
    integer_a: i32,
    integer_b: i32,
    integer_c: i32,
    boolean_a: bool,
    boolean_b: bool,
    boolean_c: bool,
    string_a: String,
    string_b: String,
    string_c: String,
    logging_on: bool,
    log_queue: Vec<LogRecord>,
}

impl Fmi2Adder {
    fn kind_of(reference: ValueRef) -> Result<Fmi2ValueKind, AccessError> {
        match reference {
            REAL_A..=REAL_C => Ok(Fmi2ValueKind::Real),
            INTEGER_A..=INTEGER_C => Ok(Fmi2ValueKind::Integer),
            BOOLEAN_A..=BOOLEAN_C => Ok(Fmi2ValueKind::Boolean),
            STRING_A..=STRING_C => Ok(Fmi2ValueKind::String),
            _ => Err(AccessError::UnknownReference { reference }),
        }
    }

    fn is_output(reference: ValueRef) -> bool {
        matches!(reference, REAL_C | INTEGER_C | BOOLEAN_C | STRING_C)
    }

    fn update_outputs(&mut self) {
        self.real_c = self.real_a + self.real_b;
        self.integer_c = self.integer_a.wrapping_add(self.integer_b);
        self.boolean_c = self.boolean_a || self.boolean_b;
        self.string_c = format!("{}{}", self.string_a, self.string_b);
    }

    fn reset_values(&mut self) {
        self.real_a = 0.0;
        self.real_b = 0.0;
        self.real_c = 0.0;
        self.integer_a = 0;
        self.integer_b = 0;
        self.integer_c = 0;
        self.boolean_a = false;
        self.boolean_b = false;
        self.boolean_c = false;
        self.string_a.clear();
        self.string_b.clear();
        self.string_c.clear();
    }

    /// Validate every write in a batch before mutating anything, so a
    /// failed setter leaves the model untouched.
    fn check_batch(
        &self,
        references: &[ValueRef],
        values: &Fmi2ValueBatch,
    ) -> Result<(), AccessError> {
        for &reference in references {
            let kind = Self::kind_of(reference)?;
            if kind != values.kind() {
                return Err(AccessError::KindMismatch { reference });
            }
            if Self::is_output(reference) {
                return Err(AccessError::NotWritable {
                    reference,
                    state: self.lifecycle.state(),
                });
            }
            self.lifecycle.check_write(reference)?;
        }
        Ok(())
    }
}

impl Fmi2Model for Fmi2Adder {
    fn instantiate(args: &Fmi2Instantiate) -> Self {
        let mut model = Fmi2Adder {
            lifecycle: Fmi2Lifecycle::new(),
            real_a: 0.0,
            real_b: 0.0,
            real_c: 0.0,
            integer_a: 0,
            integer_b: 0,
            integer_c: 0,
            boolean_a: false,
            boolean_b: false,
            boolean_c: false,
            string_a: String::new(),
            string_b: String::new(),
            string_c: String::new(),
            logging_on: args.logging_on,
            log_queue: Vec::new(),
        };
        if model.logging_on {
            model.log_queue.push(LogRecord {
                status: Fmi2Status::Ok,
                category: "logAll".to_string(),
                message: format!("instance {} created", args.instance_name),
            });
        }
        model
    }

    fn setup_experiment(
        &mut self,
        _start_time: f64,
        _stop_time: Option<f64>,
        _tolerance: Option<f64>,
    ) -> Fmi2Status {
        match self.lifecycle.setup_experiment() {
            Ok(()) => Fmi2Status::Ok,
            Err(_) => Fmi2Status::Error,
        }
    }

    fn enter_initialization_mode(&mut self) -> Fmi2Status {
        match self.lifecycle.enter_initialization_mode() {
            Ok(()) => Fmi2Status::Ok,
            Err(_) => Fmi2Status::Error,
        }
    }

    fn exit_initialization_mode(&mut self) -> Fmi2Status {
        match self.lifecycle.exit_initialization_mode() {
            Ok(()) => {
                self.update_outputs();
                Fmi2Status::Ok
            }
            Err(_) => Fmi2Status::Error,
        }
    }

    fn do_step(&mut self, _current_time: f64, step_size: f64, _no_step_prior: bool) -> Fmi2Status {
        if self.lifecycle.do_step().is_err() {
            return Fmi2Status::Error;
        }
        if !step_size.is_finite() || step_size <= 0.0 {
            return Fmi2Status::Discard;
        }
        self.update_outputs();
        Fmi2Status::Ok
    }

    fn cancel_step(&mut self) -> Fmi2Status {
        // Synchronous model, there is never an in-flight step to cancel.
        Fmi2Status::Error
    }

    fn set_debug_logging(&mut self, categories: &[String], logging_on: bool) -> Fmi2Status {
        self.logging_on = logging_on;
        if logging_on {
            self.log_queue.push(LogRecord {
                status: Fmi2Status::Ok,
                category: "logAll".to_string(),
                message: format!("debug logging enabled for {categories:?}"),
            });
        }
        Fmi2Status::Ok
    }

    fn get(
        &mut self,
        kind: Fmi2ValueKind,
        references: &[ValueRef],
    ) -> Result<Fmi2ValueBatch, AccessError> {
        for &reference in references {
            if Self::kind_of(reference)? != kind {
                return Err(AccessError::KindMismatch { reference });
            }
        }
        Ok(match kind {
            Fmi2ValueKind::Real => Fmi2ValueBatch::Real(
                references
                    .iter()
                    .map(|&r| match r {
                        REAL_A => self.real_a,
                        REAL_B => self.real_b,
                        _ => self.real_c,
                    })
                    .collect(),
            ),
            Fmi2ValueKind::Integer => Fmi2ValueBatch::Integer(
                references
                    .iter()
                    .map(|&r| match r {
                        INTEGER_A => self.integer_a,
                        INTEGER_B => self.integer_b,
                        _ => self.integer_c,
                    })
                    .collect(),
            ),
            Fmi2ValueKind::Boolean => Fmi2ValueBatch::Boolean(
                references
                    .iter()
                    .map(|&r| match r {
                        BOOLEAN_A => self.boolean_a,
                        BOOLEAN_B => self.boolean_b,
                        _ => self.boolean_c,
                    })
                    .collect(),
            ),
            Fmi2ValueKind::String => Fmi2ValueBatch::String(
                references
                    .iter()
                    .map(|&r| match r {
                        STRING_A => self.string_a.clone(),
                        STRING_B => self.string_b.clone(),
                        _ => self.string_c.clone(),
                    })
                    .collect(),
            ),
        })
    }

    fn set(&mut self, references: &[ValueRef], values: &Fmi2ValueBatch) -> Result<(), AccessError> {
        self.check_batch(references, values)?;
        match values {
            Fmi2ValueBatch::Real(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        REAL_A => self.real_a = v,
                        _ => self.real_b = v,
                    }
                }
            }
            Fmi2ValueBatch::Integer(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        INTEGER_A => self.integer_a = v,
                        _ => self.integer_b = v,
                    }
                }
            }
            Fmi2ValueBatch::Boolean(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        BOOLEAN_A => self.boolean_a = v,
                        _ => self.boolean_b = v,
                    }
                }
            }
            Fmi2ValueBatch::String(vs) => {
                for (&r, v) in references.iter().zip(vs) {
                    match r {
                        STRING_A => self.string_a = v.clone(),
                        _ => self.string_b = v.clone(),
                    }
                }
            }
        }
        Ok(())
    }

    fn terminate(&mut self) -> Fmi2Status {
        match self.lifecycle.terminate() {
            Ok(()) => Fmi2Status::Ok,
            Err(_) => Fmi2Status::Error,
        }
    }

    fn reset(&mut self) -> Fmi2Status {
        self.lifecycle.reset();
        self.reset_values();
        Fmi2Status::Ok
    }

    fn serialize_state(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut writer = SnapshotWriter::new(SNAPSHOT_VERSION);
        writer.put_u8(self.lifecycle.state().code());
        writer.put_f64(self.real_a);
        writer.put_f64(self.real_b);
        writer.put_f64(self.real_c);
        writer.put_i32(self.integer_a);
        writer.put_i32(self.integer_b);
        writer.put_i32(self.integer_c);
        writer.put_bool(self.boolean_a);
        writer.put_bool(self.boolean_b);
        writer.put_bool(self.boolean_c);
        writer.put_str(&self.string_a);
        writer.put_str(&self.string_b);
        writer.put_str(&self.string_c);
        writer.put_bool(self.logging_on);
        Ok(writer.finish())
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let mut reader = SnapshotReader::new(bytes, SNAPSHOT_VERSION)?;
        let state_code = reader.get_u8()?;
        let state = Fmi2State::from_code(state_code).ok_or_else(|| {
            SnapshotError::FieldInvalid {
                reason: format!("unknown lifecycle state code {state_code}"),
            }
        })?;
        let real_a = reader.get_f64()?;
        let real_b = reader.get_f64()?;
        let real_c = reader.get_f64()?;
        let integer_a = reader.get_i32()?;
        let integer_b = reader.get_i32()?;
        let integer_c = reader.get_i32()?;
        let boolean_a = reader.get_bool()?;
        let boolean_b = reader.get_bool()?;
        let boolean_c = reader.get_bool()?;
        let string_a = reader.get_str()?;
        let string_b = reader.get_str()?;
        let string_c = reader.get_str()?;
        let logging_on = reader.get_bool()?;
        reader.finish()?;

        self.lifecycle.restore(state);
        self.real_a = real_a;
        self.real_b = real_b;
        self.real_c = real_c;
        self.integer_a = integer_a;
        self.integer_b = integer_b;
        self.integer_c = integer_c;
        self.boolean_a = boolean_a;
        self.boolean_b = boolean_b;
        self.boolean_c = boolean_c;
        self.string_a = string_a;
        self.string_b = string_b;
        self.string_c = string_c;
        self.logging_on = logging_on;
        Ok(())
    }

    fn take_log_records(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.log_queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_model() -> Fmi2Adder {
        let mut model = Fmi2Adder::instantiate(&Fmi2Instantiate {
            instance_name: "adder".into(),
            fmu_guid: "test".into(),
            resource_location: "file:///tmp".into(),
            visible: false,
            logging_on: false,
        });
        assert_eq!(model.setup_experiment(0.0, None, None), Fmi2Status::Ok);
        assert_eq!(model.enter_initialization_mode(), Fmi2Status::Ok);
        assert_eq!(model.exit_initialization_mode(), Fmi2Status::Ok);
        model
    }

    #[test]
    fn outputs_follow_inputs_after_step() {
        let mut model = ready_model();
        model
            .set(&[REAL_A, REAL_B], &Fmi2ValueBatch::Real(vec![1.5, 2.25]))
            .unwrap();
        model
            .set(
                &[STRING_A, STRING_B],
                &Fmi2ValueBatch::String(vec!["Hello ".into(), "World!".into()]),
            )
            .unwrap();
        assert_eq!(model.do_step(0.0, 1.0, false), Fmi2Status::Ok);

        assert_eq!(
            model.get(Fmi2ValueKind::Real, &[REAL_C]).unwrap(),
            Fmi2ValueBatch::Real(vec![3.75])
        );
        assert_eq!(
            model.get(Fmi2ValueKind::String, &[STRING_C]).unwrap(),
            Fmi2ValueBatch::String(vec!["Hello World!".into()])
        );
    }

    #[test]
    fn outputs_are_not_writable() {
        let mut model = ready_model();
        let err = model
            .set(&[REAL_C], &Fmi2ValueBatch::Real(vec![9.0]))
            .unwrap_err();
        assert!(matches!(err, AccessError::NotWritable { reference: 2, .. }));
    }

    #[test]
    fn failed_batch_leaves_values_untouched() {
        let mut model = ready_model();
        model
            .set(&[INTEGER_A], &Fmi2ValueBatch::Integer(vec![7]))
            .unwrap();
        // Second reference is an output, so the whole batch must be refused.
        let err = model
            .set(
                &[INTEGER_A, INTEGER_C],
                &Fmi2ValueBatch::Integer(vec![1, 2]),
            )
            .unwrap_err();
        assert!(matches!(err, AccessError::NotWritable { .. }));
        assert_eq!(
            model.get(Fmi2ValueKind::Integer, &[INTEGER_A]).unwrap(),
            Fmi2ValueBatch::Integer(vec![7])
        );
    }

    #[test]
    fn kind_mismatch_is_refused() {
        let mut model = ready_model();
        let err = model.get(Fmi2ValueKind::Real, &[BOOLEAN_A]).unwrap_err();
        assert!(matches!(err, AccessError::KindMismatch { reference: 6 }));
    }

    #[test]
    fn snapshot_roundtrip_restores_everything() {
        let mut model = ready_model();
        model
            .set(&[REAL_A, REAL_B], &Fmi2ValueBatch::Real(vec![4.0, 0.5]))
            .unwrap();
        model
            .set(&[BOOLEAN_A], &Fmi2ValueBatch::Boolean(vec![true]))
            .unwrap();
        model.do_step(0.0, 1.0, false);
        let snapshot = model.serialize_state().unwrap();

        let mut other = ready_model();
        other.deserialize_state(&snapshot).unwrap();
        assert_eq!(
            other.get(Fmi2ValueKind::Real, &[REAL_C]).unwrap(),
            Fmi2ValueBatch::Real(vec![4.5])
        );
        assert_eq!(
            other.get(Fmi2ValueKind::Boolean, &[BOOLEAN_C]).unwrap(),
            Fmi2ValueBatch::Boolean(vec![true])
        );
    }

    #[test]
    fn nonpositive_step_is_discarded() {
        let mut model = ready_model();
        assert_eq!(model.do_step(0.0, 0.0, false), Fmi2Status::Discard);
        assert_eq!(model.do_step(0.0, -1.0, false), Fmi2Status::Discard);
    }

    #[test]
    fn reset_returns_to_instantiated_defaults() {
        let mut model = ready_model();
        model
            .set(&[REAL_A], &Fmi2ValueBatch::Real(vec![3.0]))
            .unwrap();
        assert_eq!(model.reset(), Fmi2Status::Ok);
        assert_eq!(model.lifecycle.state(), Fmi2State::Instantiated);
        assert_eq!(
            model.get(Fmi2ValueKind::Real, &[REAL_A]).unwrap(),
            Fmi2ValueBatch::Real(vec![0.0])
        );
    }
}

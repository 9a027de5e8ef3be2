//! Reference FMI3 model: an adder across all fourteen value kinds.
//!
//! References 0..=38 are plain variables, three lanes per data kind with
//! `c = a ⊕ b` (numeric add, wrapping for the fixed-width integers, boolean
//! OR, string concatenation, binary byte-wise XOR truncated to the shorter
//! input). 100..=112 are tunable parameters, one per data kind. 113 and 114
//! are tunable structural parameters. 1001..=1003 are clocks with
//! `clock_c = clock_a && clock_b`; 1001 is periodic. 1100..=1102 are Int32
//! clocked variables accumulated by `updateDiscreteStates`.

use crate::snapshot::{SnapshotError, SnapshotReader, SnapshotWriter};

use super::clock::{Fraction, INTERVAL_QUALIFIER_CHANGED};
use super::model::{
    AccessError, DoStepResult, Fmi3Instantiate, Fmi3Lifecycle, Fmi3Model, Fmi3State, LogRecord,
    UpdateDiscreteStatesResult, VariableCategory,
};
use super::{Fmi3Status, Fmi3ValueBatch, Fmi3ValueKind, ValueRef};

pub const PARAM_BASE: ValueRef = 100;
pub const STRUCTURAL_UINT64: ValueRef = 113;
pub const STRUCTURAL_FLOAT32: ValueRef = 114;
pub const CLOCK_A: ValueRef = 1001;
pub const CLOCK_B: ValueRef = 1002;
pub const CLOCK_C: ValueRef = 1003;
pub const CLOCKED_A: ValueRef = 1100;
pub const CLOCKED_B: ValueRef = 1101;
pub const CLOCKED_C: ValueRef = 1102;

const SNAPSHOT_VERSION: u16 = 2;

const DEFAULT_STRUCTURAL_UINT64: u64 = 5;
const DEFAULT_STRUCTURAL_FLOAT32: f32 = 0.1;

/// The thirteen data kinds in declaration order; plain lanes and tunable
/// parameters both follow it.
const DATA_KINDS: [Fmi3ValueKind; 13] = [
    Fmi3ValueKind::Float32,
    Fmi3ValueKind::Float64,
    Fmi3ValueKind::Int8,
    Fmi3ValueKind::UInt8,
    Fmi3ValueKind::Int16,
    Fmi3ValueKind::UInt16,
    Fmi3ValueKind::Int32,
    Fmi3ValueKind::UInt32,
    Fmi3ValueKind::Int64,
    Fmi3ValueKind::UInt64,
    Fmi3ValueKind::Boolean,
    Fmi3ValueKind::String,
    Fmi3ValueKind::Binary,
];

#[derive(Debug)]
pub struct Fmi3Adder {
    lifecycle: Fmi3Lifecycle,
    // plain lanes, index 0 = a, 1 = b, 2 = c
    float32: [f32; 3],
    float64: [f64; 3],
    int8: [i8; 3],
    uint8: [u8; 3],
    int16: [i16; 3],
    uint16: [u16; 3],
    int32: [i32; 3],
    uint32: [u32; 3],
    int64: [i64; 3],
    uint64: [u64; 3],
    boolean: [bool; 3],
    string: [String; 3],
    binary: [Vec<u8>; 3],
    // tunable parameters, refs 100..=112
    param_float32: f32,
    param_float64: f64,
    param_int8: i8,
    param_uint8: u8,
    param_int16: i16,
    param_uint16: u16,
    param_int32: i32,
    param_uint32: u32,
    param_int64: i64,
    param_uint64: u64,
    param_boolean: bool,
    param_string: String,
    param_binary: Vec<u8>,
    // tunable structural parameters, refs 113 and 114
    structural_uint64: u64,
    structural_float32: f32,
    // clocks 1001..=1003 and Int32 clocked variables 1100..=1102
    clocks: [bool; 3],
    clocked: [i32; 3],
    // timing of the periodic clock 1001
    interval: Fraction,
    shift: Fraction,
    logging_on: bool,
    log_queue: Vec<LogRecord>,
}

impl Fmi3Adder {
    fn describe(
        reference: ValueRef,
    ) -> Result<(Fmi3ValueKind, VariableCategory, usize), AccessError> {
        match reference {
            0..=38 => {
                let kind = DATA_KINDS[(reference / 3) as usize];
                Ok((kind, VariableCategory::Plain, (reference % 3) as usize))
            }
            100..=112 => {
                let kind = DATA_KINDS[(reference - PARAM_BASE) as usize];
                Ok((kind, VariableCategory::Tunable, 0))
            }
            STRUCTURAL_UINT64 => Ok((
                Fmi3ValueKind::UInt64,
                VariableCategory::TunableStructural,
                0,
            )),
            STRUCTURAL_FLOAT32 => Ok((
                Fmi3ValueKind::Float32,
                VariableCategory::TunableStructural,
                0,
            )),
            CLOCK_A..=CLOCK_C => Ok((
                Fmi3ValueKind::Clock,
                VariableCategory::Clock,
                (reference - CLOCK_A) as usize,
            )),
            CLOCKED_A..=CLOCKED_C => Ok((
                Fmi3ValueKind::Int32,
                VariableCategory::Clocked,
                (reference - CLOCKED_A) as usize,
            )),
            _ => Err(AccessError::UnknownReference { reference }),
        }
    }

    /// Output lanes are computed, never written by the master.
    fn is_output(reference: ValueRef) -> bool {
        matches!(reference, 0..=38 if reference % 3 == 2)
            || reference == CLOCK_C
            || reference == CLOCKED_C
    }

    fn update_outputs(&mut self) {
        self.float32[2] = self.float32[0] + self.float32[1];
        self.float64[2] = self.float64[0] + self.float64[1];
        self.int8[2] = self.int8[0].wrapping_add(self.int8[1]);
        self.uint8[2] = self.uint8[0].wrapping_add(self.uint8[1]);
        self.int16[2] = self.int16[0].wrapping_add(self.int16[1]);
        self.uint16[2] = self.uint16[0].wrapping_add(self.uint16[1]);
        self.int32[2] = self.int32[0].wrapping_add(self.int32[1]);
        self.uint32[2] = self.uint32[0].wrapping_add(self.uint32[1]);
        self.int64[2] = self.int64[0].wrapping_add(self.int64[1]);
        self.uint64[2] = self.uint64[0].wrapping_add(self.uint64[1]);
        self.boolean[2] = self.boolean[0] || self.boolean[1];
        self.string[2] = format!("{}{}", self.string[0], self.string[1]);
        self.binary[2] = self.binary[0]
            .iter()
            .zip(&self.binary[1])
            .map(|(x, y)| x ^ y)
            .collect();
    }

    fn update_output_clock(&mut self) {
        self.clocks[2] = self.clocks[0] && self.clocks[1];
    }

    fn reset_values(&mut self) {
        self.float32 = [0.0; 3];
        self.float64 = [0.0; 3];
        self.int8 = [0; 3];
        self.uint8 = [0; 3];
        self.int16 = [0; 3];
        self.uint16 = [0; 3];
        self.int32 = [0; 3];
        self.uint32 = [0; 3];
        self.int64 = [0; 3];
        self.uint64 = [0; 3];
        self.boolean = [false; 3];
        self.string = Default::default();
        self.binary = Default::default();
        self.param_float32 = 0.0;
        self.param_float64 = 0.0;
        self.param_int8 = 0;
        self.param_uint8 = 0;
        self.param_int16 = 0;
        self.param_uint16 = 0;
        self.param_int32 = 0;
        self.param_uint32 = 0;
        self.param_int64 = 0;
        self.param_uint64 = 0;
        self.param_boolean = false;
        self.param_string = String::new();
        self.param_binary = Vec::new();
        self.structural_uint64 = DEFAULT_STRUCTURAL_UINT64;
        self.structural_float32 = DEFAULT_STRUCTURAL_FLOAT32;
        self.clocks = [false; 3];
        self.clocked = [0; 3];
        self.interval = Fraction::ONE;
        self.shift = Fraction::ONE;
        self.update_outputs();
        self.update_output_clock();
    }

    fn check_get(
        &self,
        kind: Fmi3ValueKind,
        references: &[ValueRef],
    ) -> Result<(), AccessError> {
        for &reference in references {
            let (declared, category, _) = Self::describe(reference)?;
            if declared != kind {
                return Err(AccessError::KindMismatch { reference });
            }
            self.lifecycle.check_read(reference, category)?;
        }
        Ok(())
    }

    fn check_set(
        &self,
        references: &[ValueRef],
        values: &Fmi3ValueBatch,
    ) -> Result<(), AccessError> {
        for &reference in references {
            let (declared, category, _) = Self::describe(reference)?;
            if declared != values.kind() {
                return Err(AccessError::KindMismatch { reference });
            }
            if Self::is_output(reference) {
                return Err(AccessError::NotWritable {
                    reference,
                    state: self.lifecycle.state(),
                });
            }
            self.lifecycle.check_write(reference, category)?;
        }
        Ok(())
    }

    /// All references must name the periodic clock; anything else cannot
    /// report timing.
    fn check_periodic(&self, references: &[ValueRef]) -> Result<(), AccessError> {
        for &reference in references {
            let (_, category, _) = Self::describe(reference)?;
            if category != VariableCategory::Clock {
                return Err(AccessError::KindMismatch { reference });
            }
            if reference != CLOCK_A {
                return Err(AccessError::NotPeriodic { reference });
            }
        }
        Ok(())
    }

    fn check_timing_write(&self, references: &[ValueRef]) -> Result<(), AccessError> {
        self.check_periodic(references)?;
        for &reference in references {
            self.lifecycle.check_write(reference, VariableCategory::Clock)?;
        }
        Ok(())
    }
}

impl Fmi3Model for Fmi3Adder {
    fn instantiate(args: &Fmi3Instantiate) -> Self {
        let mut model = Fmi3Adder {
            lifecycle: Fmi3Lifecycle::new(args.event_mode_used, true),
            float32: [0.0; 3],
            float64: [0.0; 3],
            int8: [0; 3],
            uint8: [0; 3],
            int16: [0; 3],
            uint16: [0; 3],
            int32: [0; 3],
            uint32: [0; 3],
            int64: [0; 3],
            uint64: [0; 3],
            boolean: [false; 3],
            string: Default::default(),
            binary: Default::default(),
            param_float32: 0.0,
            param_float64: 0.0,
            param_int8: 0,
            param_uint8: 0,
            param_int16: 0,
            param_uint16: 0,
            param_int32: 0,
            param_uint32: 0,
            param_int64: 0,
            param_uint64: 0,
            param_boolean: false,
            param_string: String::new(),
            param_binary: Vec::new(),
            structural_uint64: DEFAULT_STRUCTURAL_UINT64,
            structural_float32: DEFAULT_STRUCTURAL_FLOAT32,
            clocks: [false; 3],
            clocked: [0; 3],
            interval: Fraction::ONE,
            shift: Fraction::ONE,
            logging_on: args.logging_on,
            log_queue: Vec::new(),
        };
        if model.logging_on {
            model.log_queue.push(LogRecord {
                status: Fmi3Status::Ok,
                category: "logAll".to_string(),
                message: format!("instance {} created", args.instance_name),
            });
        }
        model
    }

    fn enter_initialization_mode(
        &mut self,
        _tolerance: Option<f64>,
        _start_time: f64,
        _stop_time: Option<f64>,
    ) -> Fmi3Status {
        match self.lifecycle.enter_initialization_mode() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn exit_initialization_mode(&mut self) -> Fmi3Status {
        match self.lifecycle.exit_initialization_mode() {
            Ok(()) => {
                self.update_outputs();
                self.update_output_clock();
                Fmi3Status::Ok
            }
            Err(_) => Fmi3Status::Error,
        }
    }

    fn enter_event_mode(&mut self) -> Fmi3Status {
        match self.lifecycle.enter_event_mode() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn enter_step_mode(&mut self) -> Fmi3Status {
        match self.lifecycle.enter_step_mode() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn enter_configuration_mode(&mut self) -> Fmi3Status {
        match self.lifecycle.enter_configuration_mode() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn exit_configuration_mode(&mut self) -> Fmi3Status {
        match self.lifecycle.exit_configuration_mode() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn do_step(&mut self, current_time: f64, step_size: f64, _no_step_prior: bool) -> DoStepResult {
        if self.lifecycle.do_step().is_err() {
            return DoStepResult::failed(Fmi3Status::Error);
        }
        if !step_size.is_finite() || step_size <= 0.0 {
            return DoStepResult::failed(Fmi3Status::Discard);
        }
        self.update_outputs();
        DoStepResult {
            status: Fmi3Status::Ok,
            event_handling_needed: false,
            terminate_simulation: false,
            early_return: false,
            last_successful_time: current_time + step_size,
        }
    }

    fn update_discrete_states(&mut self) -> UpdateDiscreteStatesResult {
        if self.lifecycle.update_discrete_states().is_err() {
            return UpdateDiscreteStatesResult::failed(Fmi3Status::Error);
        }
        self.clocked[2] = self.clocked[2]
            .wrapping_add(self.clocked[0])
            .wrapping_add(self.clocked[1]);
        self.update_output_clock();
        UpdateDiscreteStatesResult {
            status: Fmi3Status::Ok,
            discrete_states_need_update: false,
            terminate_simulation: false,
            nominals_changed: false,
            values_changed: false,
            next_event_time_defined: true,
            next_event_time: 1.0,
        }
    }

    fn set_debug_logging(&mut self, categories: &[String], logging_on: bool) -> Fmi3Status {
        self.logging_on = logging_on;
        if logging_on {
            self.log_queue.push(LogRecord {
                status: Fmi3Status::Ok,
                category: "logAll".to_string(),
                message: format!("debug logging enabled for {categories:?}"),
            });
        }
        Fmi3Status::Ok
    }

    fn get(
        &mut self,
        kind: Fmi3ValueKind,
        references: &[ValueRef],
    ) -> Result<Fmi3ValueBatch, AccessError> {
        self.check_get(kind, references)?;
        Ok(match kind {
            Fmi3ValueKind::Float32 => Fmi3ValueBatch::Float32(
                references
                    .iter()
                    .map(|&r| match r {
                        0..=2 => self.float32[r as usize],
                        PARAM_BASE => self.param_float32,
                        _ => self.structural_float32,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Float64 => Fmi3ValueBatch::Float64(
                references
                    .iter()
                    .map(|&r| match r {
                        3..=5 => self.float64[(r - 3) as usize],
                        _ => self.param_float64,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Int8 => Fmi3ValueBatch::Int8(
                references
                    .iter()
                    .map(|&r| match r {
                        6..=8 => self.int8[(r - 6) as usize],
                        _ => self.param_int8,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::UInt8 => Fmi3ValueBatch::UInt8(
                references
                    .iter()
                    .map(|&r| match r {
                        9..=11 => self.uint8[(r - 9) as usize],
                        _ => self.param_uint8,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Int16 => Fmi3ValueBatch::Int16(
                references
                    .iter()
                    .map(|&r| match r {
                        12..=14 => self.int16[(r - 12) as usize],
                        _ => self.param_int16,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::UInt16 => Fmi3ValueBatch::UInt16(
                references
                    .iter()
                    .map(|&r| match r {
                        15..=17 => self.uint16[(r - 15) as usize],
                        _ => self.param_uint16,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Int32 => Fmi3ValueBatch::Int32(
                references
                    .iter()
                    .map(|&r| match r {
                        18..=20 => self.int32[(r - 18) as usize],
                        CLOCKED_A..=CLOCKED_C => self.clocked[(r - CLOCKED_A) as usize],
                        _ => self.param_int32,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::UInt32 => Fmi3ValueBatch::UInt32(
                references
                    .iter()
                    .map(|&r| match r {
                        21..=23 => self.uint32[(r - 21) as usize],
                        _ => self.param_uint32,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Int64 => Fmi3ValueBatch::Int64(
                references
                    .iter()
                    .map(|&r| match r {
                        24..=26 => self.int64[(r - 24) as usize],
                        _ => self.param_int64,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::UInt64 => Fmi3ValueBatch::UInt64(
                references
                    .iter()
                    .map(|&r| match r {
                        27..=29 => self.uint64[(r - 27) as usize],
                        PARAM_BASE..=112 => self.param_uint64,
                        _ => self.structural_uint64,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Boolean => Fmi3ValueBatch::Boolean(
                references
                    .iter()
                    .map(|&r| match r {
                        30..=32 => self.boolean[(r - 30) as usize],
                        _ => self.param_boolean,
                    })
                    .collect(),
            ),
            Fmi3ValueKind::String => Fmi3ValueBatch::String(
                references
                    .iter()
                    .map(|&r| match r {
                        33..=35 => self.string[(r - 33) as usize].clone(),
                        _ => self.param_string.clone(),
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Binary => Fmi3ValueBatch::Binary(
                references
                    .iter()
                    .map(|&r| match r {
                        36..=38 => self.binary[(r - 36) as usize].clone(),
                        _ => self.param_binary.clone(),
                    })
                    .collect(),
            ),
            Fmi3ValueKind::Clock => Fmi3ValueBatch::Clock(
                references
                    .iter()
                    .map(|&r| self.clocks[(r - CLOCK_A) as usize])
                    .collect(),
            ),
        })
    }

    fn set(
        &mut self,
        references: &[ValueRef],
        values: &Fmi3ValueBatch,
    ) -> Result<(), AccessError> {
        self.check_set(references, values)?;
        match values {
            Fmi3ValueBatch::Float32(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        0..=1 => self.float32[r as usize] = v,
                        PARAM_BASE => self.param_float32 = v,
                        _ => self.structural_float32 = v,
                    }
                }
            }
            Fmi3ValueBatch::Float64(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        3..=4 => self.float64[(r - 3) as usize] = v,
                        _ => self.param_float64 = v,
                    }
                }
            }
            Fmi3ValueBatch::Int8(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        6..=7 => self.int8[(r - 6) as usize] = v,
                        _ => self.param_int8 = v,
                    }
                }
            }
            Fmi3ValueBatch::UInt8(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        9..=10 => self.uint8[(r - 9) as usize] = v,
                        _ => self.param_uint8 = v,
                    }
                }
            }
            Fmi3ValueBatch::Int16(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        12..=13 => self.int16[(r - 12) as usize] = v,
                        _ => self.param_int16 = v,
                    }
                }
            }
            Fmi3ValueBatch::UInt16(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        15..=16 => self.uint16[(r - 15) as usize] = v,
                        _ => self.param_uint16 = v,
                    }
                }
            }
            Fmi3ValueBatch::Int32(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        18..=19 => self.int32[(r - 18) as usize] = v,
                        CLOCKED_A..=CLOCKED_B => self.clocked[(r - CLOCKED_A) as usize] = v,
                        _ => self.param_int32 = v,
                    }
                }
            }
            Fmi3ValueBatch::UInt32(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        21..=22 => self.uint32[(r - 21) as usize] = v,
                        _ => self.param_uint32 = v,
                    }
                }
            }
            Fmi3ValueBatch::Int64(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        24..=25 => self.int64[(r - 24) as usize] = v,
                        _ => self.param_int64 = v,
                    }
                }
            }
            Fmi3ValueBatch::UInt64(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        27..=28 => self.uint64[(r - 27) as usize] = v,
                        109 => self.param_uint64 = v,
                        _ => self.structural_uint64 = v,
                    }
                }
            }
            Fmi3ValueBatch::Boolean(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    match r {
                        30..=31 => self.boolean[(r - 30) as usize] = v,
                        _ => self.param_boolean = v,
                    }
                }
            }
            Fmi3ValueBatch::String(vs) => {
                for (&r, v) in references.iter().zip(vs) {
                    match r {
                        33..=34 => self.string[(r - 33) as usize] = v.clone(),
                        _ => self.param_string = v.clone(),
                    }
                }
            }
            Fmi3ValueBatch::Binary(vs) => {
                for (&r, v) in references.iter().zip(vs) {
                    match r {
                        36..=37 => self.binary[(r - 36) as usize] = v.clone(),
                        _ => self.param_binary = v.clone(),
                    }
                }
            }
            Fmi3ValueBatch::Clock(vs) => {
                for (&r, &v) in references.iter().zip(vs) {
                    self.clocks[(r - CLOCK_A) as usize] = v;
                }
                // activating an input clock ticks the output clock at once
                self.update_output_clock();
            }
        }
        Ok(())
    }

    fn get_interval_decimal(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<f64>, Vec<u8>), AccessError> {
        self.check_periodic(references)?;
        let intervals = vec![self.interval.as_decimal(); references.len()];
        let qualifiers = vec![INTERVAL_QUALIFIER_CHANGED; references.len()];
        Ok((intervals, qualifiers))
    }

    fn get_interval_fraction(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<u64>, Vec<u64>, Vec<u8>), AccessError> {
        self.check_periodic(references)?;
        let counters = vec![self.interval.numerator(); references.len()];
        let resolutions = vec![self.interval.denominator(); references.len()];
        let qualifiers = vec![INTERVAL_QUALIFIER_CHANGED; references.len()];
        Ok((counters, resolutions, qualifiers))
    }

    fn get_shift_decimal(&mut self, references: &[ValueRef]) -> Result<Vec<f64>, AccessError> {
        self.check_periodic(references)?;
        Ok(vec![self.shift.as_decimal(); references.len()])
    }

    fn get_shift_fraction(
        &mut self,
        references: &[ValueRef],
    ) -> Result<(Vec<u64>, Vec<u64>), AccessError> {
        self.check_periodic(references)?;
        Ok((
            vec![self.shift.numerator(); references.len()],
            vec![self.shift.denominator(); references.len()],
        ))
    }

    fn set_interval_decimal(
        &mut self,
        references: &[ValueRef],
        intervals: &[f64],
    ) -> Result<(), AccessError> {
        self.check_timing_write(references)?;
        let mut parsed = Vec::with_capacity(intervals.len());
        for &interval in intervals {
            parsed.push(Fraction::from_decimal(interval)?);
        }
        if let Some(&fraction) = parsed.last() {
            self.interval = fraction;
        }
        Ok(())
    }

    fn set_interval_fraction(
        &mut self,
        references: &[ValueRef],
        counters: &[u64],
        resolutions: &[u64],
    ) -> Result<(), AccessError> {
        self.check_timing_write(references)?;
        let mut parsed = Vec::with_capacity(counters.len());
        for (&counter, &resolution) in counters.iter().zip(resolutions) {
            parsed.push(Fraction::new(counter, resolution)?);
        }
        if let Some(&fraction) = parsed.last() {
            self.interval = fraction;
        }
        Ok(())
    }

    fn set_shift_decimal(
        &mut self,
        references: &[ValueRef],
        shifts: &[f64],
    ) -> Result<(), AccessError> {
        self.check_timing_write(references)?;
        let mut parsed = Vec::with_capacity(shifts.len());
        for &shift in shifts {
            parsed.push(Fraction::from_decimal(shift)?);
        }
        if let Some(&fraction) = parsed.last() {
            self.shift = fraction;
        }
        Ok(())
    }

    fn set_shift_fraction(
        &mut self,
        references: &[ValueRef],
        counters: &[u64],
        resolutions: &[u64],
    ) -> Result<(), AccessError> {
        self.check_timing_write(references)?;
        let mut parsed = Vec::with_capacity(counters.len());
        for (&counter, &resolution) in counters.iter().zip(resolutions) {
            parsed.push(Fraction::new(counter, resolution)?);
        }
        if let Some(&fraction) = parsed.last() {
            self.shift = fraction;
        }
        Ok(())
    }

    fn terminate(&mut self) -> Fmi3Status {
        match self.lifecycle.terminate() {
            Ok(()) => Fmi3Status::Ok,
            Err(_) => Fmi3Status::Error,
        }
    }

    fn reset(&mut self) -> Fmi3Status {
        self.lifecycle.reset();
        self.reset_values();
        Fmi3Status::Ok
    }

    fn serialize_state(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut w = SnapshotWriter::new(SNAPSHOT_VERSION);
        w.put_u8(self.lifecycle.state().code());
        w.put_u8(self.lifecycle.reconfigure_return().code());
        for lane in 0..3 {
            w.put_f32(self.float32[lane]);
            w.put_f64(self.float64[lane]);
            w.put_i8(self.int8[lane]);
            w.put_u8(self.uint8[lane]);
            w.put_i16(self.int16[lane]);
            w.put_u16(self.uint16[lane]);
            w.put_i32(self.int32[lane]);
            w.put_u32(self.uint32[lane]);
            w.put_i64(self.int64[lane]);
            w.put_u64(self.uint64[lane]);
            w.put_bool(self.boolean[lane]);
            w.put_str(&self.string[lane]);
            w.put_bytes(&self.binary[lane]);
        }
        w.put_f32(self.param_float32);
        w.put_f64(self.param_float64);
        w.put_i8(self.param_int8);
        w.put_u8(self.param_uint8);
        w.put_i16(self.param_int16);
        w.put_u16(self.param_uint16);
        w.put_i32(self.param_int32);
        w.put_u32(self.param_uint32);
        w.put_i64(self.param_int64);
        w.put_u64(self.param_uint64);
        w.put_bool(self.param_boolean);
        w.put_str(&self.param_string);
        w.put_bytes(&self.param_binary);
        w.put_u64(self.structural_uint64);
        w.put_f32(self.structural_float32);
        for lane in 0..3 {
            w.put_bool(self.clocks[lane]);
        }
        for lane in 0..3 {
            w.put_i32(self.clocked[lane]);
        }
        w.put_u64(self.interval.numerator());
        w.put_u64(self.interval.denominator());
        w.put_u64(self.shift.numerator());
        w.put_u64(self.shift.denominator());
        w.put_bool(self.logging_on);
        Ok(w.finish())
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let mut r = SnapshotReader::new(bytes, SNAPSHOT_VERSION)?;
        let state_code = r.get_u8()?;
        let state = Fmi3State::from_code(state_code).ok_or_else(|| {
            SnapshotError::FieldInvalid {
                reason: format!("unknown lifecycle state code {state_code}"),
            }
        })?;
        let return_code = r.get_u8()?;
        let reconfigure_from = match Fmi3State::from_code(return_code) {
            Some(s @ (Fmi3State::EventMode | Fmi3State::StepMode)) => s,
            _ => {
                return Err(SnapshotError::FieldInvalid {
                    reason: format!("invalid reconfiguration return code {return_code}"),
                })
            }
        };

        // Everything into temporaries first; a truncated blob must not
        // leave the instance half-restored.
        let mut restored = Fmi3Adder::instantiate(&Fmi3Instantiate {
            instance_name: String::new(),
            instantiation_token: String::new(),
            resource_path: String::new(),
            visible: false,
            logging_on: false,
            event_mode_used: self.lifecycle.event_mode_used(),
            early_return_allowed: false,
            required_intermediate_variables: Vec::new(),
        });
        for lane in 0..3 {
            restored.float32[lane] = r.get_f32()?;
            restored.float64[lane] = r.get_f64()?;
            restored.int8[lane] = r.get_i8()?;
            restored.uint8[lane] = r.get_u8()?;
            restored.int16[lane] = r.get_i16()?;
            restored.uint16[lane] = r.get_u16()?;
            restored.int32[lane] = r.get_i32()?;
            restored.uint32[lane] = r.get_u32()?;
            restored.int64[lane] = r.get_i64()?;
            restored.uint64[lane] = r.get_u64()?;
            restored.boolean[lane] = r.get_bool()?;
            restored.string[lane] = r.get_str()?;
            restored.binary[lane] = r.get_bytes()?;
        }
        restored.param_float32 = r.get_f32()?;
        restored.param_float64 = r.get_f64()?;
        restored.param_int8 = r.get_i8()?;
        restored.param_uint8 = r.get_u8()?;
        restored.param_int16 = r.get_i16()?;
        restored.param_uint16 = r.get_u16()?;
        restored.param_int32 = r.get_i32()?;
        restored.param_uint32 = r.get_u32()?;
        restored.param_int64 = r.get_i64()?;
        restored.param_uint64 = r.get_u64()?;
        restored.param_boolean = r.get_bool()?;
        restored.param_string = r.get_str()?;
        restored.param_binary = r.get_bytes()?;
        restored.structural_uint64 = r.get_u64()?;
        restored.structural_float32 = r.get_f32()?;
        for lane in 0..3 {
            restored.clocks[lane] = r.get_bool()?;
        }
        for lane in 0..3 {
            restored.clocked[lane] = r.get_i32()?;
        }
        let interval =
            Fraction::new(r.get_u64()?, r.get_u64()?).map_err(|e| SnapshotError::FieldInvalid {
                reason: format!("interval: {e}"),
            })?;
        let shift =
            Fraction::new(r.get_u64()?, r.get_u64()?).map_err(|e| SnapshotError::FieldInvalid {
                reason: format!("shift: {e}"),
            })?;
        let logging_on = r.get_bool()?;
        r.finish()?;

        restored.interval = interval;
        restored.shift = shift;
        restored.logging_on = logging_on;
        restored.lifecycle.restore(state, reconfigure_from);
        restored.log_queue = std::mem::take(&mut self.log_queue);
        *self = restored;
        Ok(())
    }

    fn take_log_records(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.log_queue)
    }
}

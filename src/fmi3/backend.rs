//! FMI3 command dispatch loop.
//!
//! Same discipline as the FMI2 loop: strictly alternating command/reply,
//! queued log records drained through nested exchanges before the true
//! reply, fatal violations unwind without replying. Model-exchange and
//! scheduled-execution instantiation are acknowledged but served by the
//! same co-simulation model.

use std::io::{Read, Write};

use thiserror::Error;

use crate::channel::{CommandChannel, FrameError};

use super::model::Fmi3Model;
use super::proto::{decode_command, encode_return, Fmi3Command, Fmi3Return, ProtoError};
use super::{Fmi3Status, Fmi3ValueBatch};

/// Why `serve` stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    Freed,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum Fmi3BackendError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("command {tag} received before instantiation")]
    NotInstantiated { tag: String },
    #[error("repeated instantiation on a live instance")]
    AlreadyInstantiated,
    #[error("FMI3_CALLBACK_CONTINUE outside a log exchange")]
    UnexpectedCallbackContinue,
    #[error("log record answered with {tag}, expected FMI3_CALLBACK_CONTINUE")]
    LogNotAcknowledged { tag: String },
}

impl Fmi3BackendError {
    /// Every dispatcher failure poisons the strict command/reply pairing,
    /// so all of them require a non-zero exit without a reply.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

enum Control {
    Reply(Fmi3Return),
    Shutdown(Fmi3Return),
}

pub struct Fmi3Backend<M, R, W> {
    channel: CommandChannel<R, W>,
    model: Option<M>,
}

impl<M, R, W> Fmi3Backend<M, R, W>
where
    M: Fmi3Model,
    R: Read,
    W: Write,
{
    pub fn new(channel: CommandChannel<R, W>) -> Self {
        Self {
            channel,
            model: None,
        }
    }

    pub fn serve(&mut self) -> Result<ServeOutcome, Fmi3BackendError> {
        loop {
            let frame = match self.channel.recv_frame() {
                Ok(frame) => frame,
                Err(FrameError::Closed) => {
                    tracing::info!("wrapper disconnected");
                    return Ok(ServeOutcome::Disconnected);
                }
                Err(err) => return Err(err.into()),
            };
            let command = decode_command(&frame)?;
            tracing::debug!(tag = command.tag(), "command");

            let control = self.handle(command)?;
            self.flush_log_records()?;
            match control {
                Control::Reply(reply) => self.send(&reply)?,
                Control::Shutdown(reply) => {
                    self.send(&reply)?;
                    return Ok(ServeOutcome::Freed);
                }
            }
        }
    }

    fn handle(&mut self, command: Fmi3Command) -> Result<Control, Fmi3BackendError> {
        match &command {
            Fmi3Command::InstantiateCoSimulation(args) => {
                if self.model.is_some() {
                    return Err(Fmi3BackendError::AlreadyInstantiated);
                }
                tracing::info!(instance = %args.instance_name, "instantiate co-simulation");
                self.model = Some(M::instantiate(args));
                return Ok(Control::Reply(Fmi3Return::Empty));
            }
            // Acknowledged so the wrapper can probe the backend, but no
            // model-exchange or scheduled-execution semantics behind them.
            Fmi3Command::InstantiateModelExchange(args)
            | Fmi3Command::InstantiateScheduledExecution(args) => {
                tracing::warn!(
                    instance = %args.instance_name,
                    "unsupported interface requested, acknowledging only"
                );
                return Ok(Control::Reply(Fmi3Return::Empty));
            }
            _ => {}
        }

        let Some(model) = self.model.as_mut() else {
            return Err(Fmi3BackendError::NotInstantiated {
                tag: command.tag().to_string(),
            });
        };

        let reply = match command {
            Fmi3Command::InstantiateCoSimulation(_)
            | Fmi3Command::InstantiateModelExchange(_)
            | Fmi3Command::InstantiateScheduledExecution(_) => unreachable!("handled above"),
            Fmi3Command::EnterInitializationMode {
                tolerance,
                start_time,
                stop_time,
            } => Fmi3Return::Status(model.enter_initialization_mode(
                tolerance,
                start_time,
                stop_time,
            )),
            Fmi3Command::ExitInitializationMode => {
                Fmi3Return::Status(model.exit_initialization_mode())
            }
            Fmi3Command::EnterEventMode => Fmi3Return::Status(model.enter_event_mode()),
            Fmi3Command::EnterStepMode => Fmi3Return::Status(model.enter_step_mode()),
            Fmi3Command::EnterConfigurationMode => {
                Fmi3Return::Status(model.enter_configuration_mode())
            }
            Fmi3Command::ExitConfigurationMode => {
                Fmi3Return::Status(model.exit_configuration_mode())
            }
            Fmi3Command::DoStep {
                current_time,
                step_size,
                no_step_prior,
            } => Fmi3Return::DoStep(model.do_step(current_time, step_size, no_step_prior)),
            Fmi3Command::UpdateDiscreteStates => {
                Fmi3Return::UpdateDiscreteStates(model.update_discrete_states())
            }
            Fmi3Command::SetDebugLogging {
                categories,
                logging_on,
            } => Fmi3Return::Status(model.set_debug_logging(&categories, logging_on)),
            Fmi3Command::Get { kind, references } => match model.get(kind, &references) {
                Ok(values) => Fmi3Return::GetValues {
                    status: Fmi3Status::Ok,
                    values,
                },
                Err(err) => {
                    tracing::warn!(%err, "get refused");
                    Fmi3Return::GetValues {
                        status: Fmi3Status::Error,
                        values: Fmi3ValueBatch::empty(kind),
                    }
                }
            },
            Fmi3Command::Set { references, values } => {
                status_reply(model.set(&references, &values), "set")
            }
            Fmi3Command::GetIntervalDecimal { references } => {
                match model.get_interval_decimal(&references) {
                    Ok((intervals, qualifiers)) => Fmi3Return::IntervalDecimal {
                        status: Fmi3Status::Ok,
                        intervals,
                        qualifiers,
                    },
                    Err(err) => {
                        tracing::warn!(%err, "interval query refused");
                        Fmi3Return::IntervalDecimal {
                            status: Fmi3Status::Error,
                            intervals: Vec::new(),
                            qualifiers: Vec::new(),
                        }
                    }
                }
            }
            Fmi3Command::GetIntervalFraction { references } => {
                match model.get_interval_fraction(&references) {
                    Ok((counters, resolutions, qualifiers)) => Fmi3Return::IntervalFraction {
                        status: Fmi3Status::Ok,
                        counters,
                        resolutions,
                        qualifiers,
                    },
                    Err(err) => {
                        tracing::warn!(%err, "interval query refused");
                        Fmi3Return::IntervalFraction {
                            status: Fmi3Status::Error,
                            counters: Vec::new(),
                            resolutions: Vec::new(),
                            qualifiers: Vec::new(),
                        }
                    }
                }
            }
            Fmi3Command::GetShiftDecimal { references } => {
                match model.get_shift_decimal(&references) {
                    Ok(shifts) => Fmi3Return::ShiftDecimal {
                        status: Fmi3Status::Ok,
                        shifts,
                    },
                    Err(err) => {
                        tracing::warn!(%err, "shift query refused");
                        Fmi3Return::ShiftDecimal {
                            status: Fmi3Status::Error,
                            shifts: Vec::new(),
                        }
                    }
                }
            }
            Fmi3Command::GetShiftFraction { references } => {
                match model.get_shift_fraction(&references) {
                    Ok((counters, resolutions)) => Fmi3Return::ShiftFraction {
                        status: Fmi3Status::Ok,
                        counters,
                        resolutions,
                    },
                    Err(err) => {
                        tracing::warn!(%err, "shift query refused");
                        Fmi3Return::ShiftFraction {
                            status: Fmi3Status::Error,
                            counters: Vec::new(),
                            resolutions: Vec::new(),
                        }
                    }
                }
            }
            Fmi3Command::SetIntervalDecimal {
                references,
                intervals,
            } => status_reply(
                model.set_interval_decimal(&references, &intervals),
                "set interval",
            ),
            Fmi3Command::SetIntervalFraction {
                references,
                counters,
                resolutions,
            } => status_reply(
                model.set_interval_fraction(&references, &counters, &resolutions),
                "set interval",
            ),
            Fmi3Command::SetShiftDecimal { references, shifts } => {
                status_reply(model.set_shift_decimal(&references, &shifts), "set shift")
            }
            Fmi3Command::SetShiftFraction {
                references,
                counters,
                resolutions,
            } => status_reply(
                model.set_shift_fraction(&references, &counters, &resolutions),
                "set shift",
            ),
            Fmi3Command::SerializeFmuState => {
                if !model.can_serialize() {
                    Fmi3Return::Serialize {
                        status: Fmi3Status::Error,
                        state: Vec::new(),
                    }
                } else {
                    match model.serialize_state() {
                        Ok(state) => Fmi3Return::Serialize {
                            status: Fmi3Status::Ok,
                            state,
                        },
                        Err(err) => {
                            tracing::warn!(%err, "serialize failed");
                            Fmi3Return::Serialize {
                                status: Fmi3Status::Error,
                                state: Vec::new(),
                            }
                        }
                    }
                }
            }
            Fmi3Command::DeserializeFmuState { state } => {
                match model.deserialize_state(&state) {
                    Ok(()) => Fmi3Return::Status(Fmi3Status::Ok),
                    Err(err) => {
                        tracing::warn!(%err, "deserialize refused");
                        Fmi3Return::Status(Fmi3Status::Error)
                    }
                }
            }
            Fmi3Command::Terminate => Fmi3Return::Status(model.terminate()),
            Fmi3Command::Reset => Fmi3Return::Status(model.reset()),
            Fmi3Command::FreeInstance => {
                model.release();
                self.model = None;
                tracing::info!("instance freed");
                return Ok(Control::Shutdown(Fmi3Return::FreeInstance));
            }
            Fmi3Command::CallbackContinue => {
                return Err(Fmi3BackendError::UnexpectedCallbackContinue)
            }
        };
        Ok(Control::Reply(reply))
    }

    fn flush_log_records(&mut self) -> Result<(), Fmi3BackendError> {
        let records = match self.model.as_mut() {
            Some(model) => model.take_log_records(),
            None => return Ok(()),
        };
        for record in records {
            self.send(&Fmi3Return::Log(record))?;
            let frame = self.channel.recv_frame()?;
            match decode_command(&frame)? {
                Fmi3Command::CallbackContinue => {}
                other => {
                    return Err(Fmi3BackendError::LogNotAcknowledged {
                        tag: other.tag().to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, reply: &Fmi3Return) -> Result<(), Fmi3BackendError> {
        let body = encode_return(reply)?;
        self.channel.send_frame(&body)?;
        Ok(())
    }
}

fn status_reply<E: std::fmt::Display>(result: Result<(), E>, what: &str) -> Fmi3Return {
    match result {
        Ok(()) => Fmi3Return::Status(Fmi3Status::Ok),
        Err(err) => {
            tracing::warn!(%err, "{what} refused");
            Fmi3Return::Status(Fmi3Status::Error)
        }
    }
}

//! FMI2 command dispatch loop.
//!
//! One command frame in, one reply frame out, forever. Log records queued
//! by the model are drained before the operation's own reply; each record
//! opens a nested exchange that must be answered with
//! `FMI2_CALLBACK_CONTINUE`. Anything that breaks the strict pairing is
//! fatal: no reply is sent and the loop unwinds with an error.

use std::io::{Read, Write};

use thiserror::Error;

use crate::channel::{CommandChannel, FrameError};

use super::model::Fmi2Model;
use super::proto::{decode_command, encode_return, Fmi2Command, Fmi2Return, ProtoError};
use super::{Fmi2Status, Fmi2ValueBatch};

/// Why `serve` stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The wrapper sent `FMI2_FREE_INSTANCE`; the reply went out and the
    /// instance was released.
    Freed,
    /// The wrapper closed the channel between commands.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum Fmi2BackendError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("command {tag} received before FMI2_INSTANTIATE")]
    NotInstantiated { tag: String },
    #[error("repeated FMI2_INSTANTIATE on a live instance")]
    AlreadyInstantiated,
    #[error("FMI2_CALLBACK_CONTINUE outside a log exchange")]
    UnexpectedCallbackContinue,
    #[error("log record answered with {tag}, expected FMI2_CALLBACK_CONTINUE")]
    LogNotAcknowledged { tag: String },
}

impl Fmi2BackendError {
    /// Every dispatcher failure poisons the strict command/reply pairing,
    /// so all of them require a non-zero exit without a reply.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

enum Control {
    Reply(Fmi2Return),
    Shutdown(Fmi2Return),
}

pub struct Fmi2Backend<M, R, W> {
    channel: CommandChannel<R, W>,
    model: Option<M>,
}

impl<M, R, W> Fmi2Backend<M, R, W>
where
    M: Fmi2Model,
    R: Read,
    W: Write,
{
    pub fn new(channel: CommandChannel<R, W>) -> Self {
        Self {
            channel,
            model: None,
        }
    }

    /// Run the dispatch loop until the instance is freed, the wrapper
    /// disconnects, or a fatal protocol violation occurs.
    pub fn serve(&mut self) -> Result<ServeOutcome, Fmi2BackendError> {
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

    fn handle(&mut self, command: Fmi2Command) -> Result<Control, Fmi2BackendError> {
        if let Fmi2Command::Instantiate(args) = &command {
            if self.model.is_some() {
                return Err(Fmi2BackendError::AlreadyInstantiated);
            }
            tracing::info!(instance = %args.instance_name, "instantiate");
            self.model = Some(M::instantiate(args));
            return Ok(Control::Reply(Fmi2Return::Empty));
        }

        let Some(model) = self.model.as_mut() else {
            return Err(Fmi2BackendError::NotInstantiated {
                tag: command.tag().to_string(),
            });
        };

        let reply = match command {
            Fmi2Command::Instantiate(_) => unreachable!("handled above"),
            Fmi2Command::SetupExperiment {
                start_time,
                stop_time,
                tolerance,
            } => Fmi2Return::Status(model.setup_experiment(start_time, stop_time, tolerance)),
            Fmi2Command::EnterInitializationMode => {
                Fmi2Return::Status(model.enter_initialization_mode())
            }
            Fmi2Command::ExitInitializationMode => {
                Fmi2Return::Status(model.exit_initialization_mode())
            }
            Fmi2Command::DoStep {
                current_time,
                step_size,
                no_step_prior,
            } => Fmi2Return::Status(model.do_step(current_time, step_size, no_step_prior)),
            Fmi2Command::CancelStep => Fmi2Return::Status(model.cancel_step()),
            Fmi2Command::SetDebugLogging {
                categories,
                logging_on,
            } => Fmi2Return::Status(model.set_debug_logging(&categories, logging_on)),
            Fmi2Command::Get { kind, references } => match model.get(kind, &references) {
                Ok(values) => Fmi2Return::GetValues {
                    status: Fmi2Status::Ok,
                    values,
                },
                Err(err) => {
                    tracing::warn!(%err, "get refused");
                    Fmi2Return::GetValues {
                        status: Fmi2Status::Error,
                        values: Fmi2ValueBatch::empty(kind),
                    }
                }
            },
            Fmi2Command::Set { references, values } => match model.set(&references, &values) {
                Ok(()) => Fmi2Return::Status(Fmi2Status::Ok),
                Err(err) => {
                    tracing::warn!(%err, "set refused");
                    Fmi2Return::Status(Fmi2Status::Error)
                }
            },
            Fmi2Command::SerializeFmuState => {
                if !model.can_serialize() {
                    Fmi2Return::Serialize {
                        status: Fmi2Status::Error,
                        state: Vec::new(),
                    }
                } else {
                    match model.serialize_state() {
                        Ok(state) => Fmi2Return::Serialize {
                            status: Fmi2Status::Ok,
                            state,
                        },
                        Err(err) => {
                            tracing::warn!(%err, "serialize failed");
                            Fmi2Return::Serialize {
                                status: Fmi2Status::Error,
                                state: Vec::new(),
                            }
                        }
                    }
                }
            }
            Fmi2Command::DeserializeFmuState { state } => {
                match model.deserialize_state(&state) {
                    Ok(()) => Fmi2Return::Status(Fmi2Status::Ok),
                    Err(err) => {
                        tracing::warn!(%err, "deserialize refused");
                        Fmi2Return::Status(Fmi2Status::Error)
                    }
                }
            }
            Fmi2Command::Terminate => Fmi2Return::Status(model.terminate()),
            Fmi2Command::Reset => Fmi2Return::Status(model.reset()),
            Fmi2Command::FreeInstance => {
                model.release();
                self.model = None;
                tracing::info!("instance freed");
                return Ok(Control::Shutdown(Fmi2Return::FreeInstance));
            }
            Fmi2Command::CallbackContinue => {
                return Err(Fmi2BackendError::UnexpectedCallbackContinue)
            }
        };
        Ok(Control::Reply(reply))
    }

    /// Drain the model's queued log records, one nested exchange each.
    fn flush_log_records(&mut self) -> Result<(), Fmi2BackendError> {
        let records = match self.model.as_mut() {
            Some(model) => model.take_log_records(),
            None => return Ok(()),
        };
        for record in records {
            self.send(&Fmi2Return::Log(record))?;
            let frame = self.channel.recv_frame()?;
            match decode_command(&frame)? {
                Fmi2Command::CallbackContinue => {}
                other => {
                    return Err(Fmi2BackendError::LogNotAcknowledged {
                        tag: other.tag().to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, reply: &Fmi2Return) -> Result<(), Fmi2BackendError> {
        let body = encode_return(reply)?;
        self.channel.send_frame(&body)?;
        Ok(())
    }
}

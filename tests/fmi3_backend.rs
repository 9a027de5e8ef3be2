//! Drives the FMI3 dispatch loop end to end over in-memory transports.

use std::io::Cursor;

use fmubridge::channel::{encode_frame, CommandChannel, FrameError, FrameReader};
use fmubridge::fmi3::proto::{decode_return, encode_command, Fmi3InstantiateStub};
use fmubridge::fmi3::{
    Fmi3Adder, Fmi3Backend, Fmi3BackendError, Fmi3Command, Fmi3Instantiate, Fmi3Return,
    Fmi3Status, Fmi3ValueBatch, Fmi3ValueKind, ServeOutcome,
};

const MAX_FRAME: usize = 1 << 20;

fn instantiate(event_mode_used: bool) -> Fmi3Command {
    Fmi3Command::InstantiateCoSimulation(Fmi3Instantiate {
        instance_name: "adder".into(),
        instantiation_token: "{8c4e810f-3df3-4a00-8276-176fa3c9f000}".into(),
        resource_path: "/tmp/adder/resources".into(),
        visible: false,
        logging_on: false,
        event_mode_used,
        early_return_allowed: false,
        required_intermediate_variables: Vec::new(),
    })
}

fn script(commands: &[Fmi3Command]) -> Vec<u8> {
    let mut input = Vec::new();
    for command in commands {
        let body = encode_command(command).unwrap();
        input.extend_from_slice(&encode_frame(&body, MAX_FRAME).unwrap());
    }
    input
}

fn serve(input: Vec<u8>) -> (Result<ServeOutcome, Fmi3BackendError>, Vec<Fmi3Return>) {
    let mut output = Vec::new();
    let result = {
        let channel = CommandChannel::from_parts(Cursor::new(input), &mut output, MAX_FRAME);
        Fmi3Backend::<Fmi3Adder, _, _>::new(channel).serve()
    };
    let mut replies = Vec::new();
    let mut reader = FrameReader::new(Cursor::new(output), MAX_FRAME);
    loop {
        match reader.read_frame() {
            Ok(frame) => replies.push(decode_return(&frame).unwrap()),
            Err(FrameError::Closed) => break,
            Err(err) => panic!("reply stream corrupt: {err}"),
        }
    }
    (result, replies)
}

#[test]
fn event_mode_lifecycle_with_clocks() {
    let (result, replies) = serve(script(&[
        instantiate(true),
        Fmi3Command::EnterInitializationMode {
            tolerance: None,
            start_time: 0.0,
            stop_time: Some(10.0),
        },
        Fmi3Command::SetIntervalDecimal {
            references: vec![1001],
            intervals: vec![1.5],
        },
        Fmi3Command::ExitInitializationMode,
        // EventMode: activate both input clocks, read the output clock
        Fmi3Command::Set {
            references: vec![1001, 1002],
            values: Fmi3ValueBatch::Clock(vec![true, true]),
        },
        Fmi3Command::Get {
            kind: Fmi3ValueKind::Clock,
            references: vec![1003],
        },
        Fmi3Command::Set {
            references: vec![1100, 1101],
            values: Fmi3ValueBatch::Int32(vec![2, 3]),
        },
        Fmi3Command::UpdateDiscreteStates,
        Fmi3Command::GetIntervalFraction {
            references: vec![1001],
        },
        Fmi3Command::EnterStepMode,
        Fmi3Command::Set {
            references: vec![3, 4],
            values: Fmi3ValueBatch::Float64(vec![1.0, 2.0]),
        },
        Fmi3Command::DoStep {
            current_time: 0.0,
            step_size: 0.25,
            no_step_prior: false,
        },
        Fmi3Command::Get {
            kind: Fmi3ValueKind::Float64,
            references: vec![5],
        },
        Fmi3Command::Terminate,
        Fmi3Command::FreeInstance,
    ]));

    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert_eq!(replies.len(), 15);
    assert_eq!(replies[0], Fmi3Return::Empty);
    assert_eq!(
        replies[5],
        Fmi3Return::GetValues {
            status: Fmi3Status::Ok,
            values: Fmi3ValueBatch::Clock(vec![true]),
        }
    );
    match &replies[7] {
        Fmi3Return::UpdateDiscreteStates(outcome) => {
            assert_eq!(outcome.status, Fmi3Status::Ok);
            assert!(outcome.next_event_time_defined);
            assert_eq!(outcome.next_event_time, 1.0);
        }
        other => panic!("unexpected updateDiscreteStates reply: {other:?}"),
    }
    assert_eq!(
        replies[8],
        Fmi3Return::IntervalFraction {
            status: Fmi3Status::Ok,
            counters: vec![3],
            resolutions: vec![2],
            qualifiers: vec![2],
        }
    );
    match &replies[11] {
        Fmi3Return::DoStep(outcome) => {
            assert_eq!(outcome.status, Fmi3Status::Ok);
            assert_eq!(outcome.last_successful_time, 0.25);
            assert!(!outcome.event_handling_needed);
        }
        other => panic!("unexpected doStep reply: {other:?}"),
    }
    assert_eq!(
        replies[12],
        Fmi3Return::GetValues {
            status: Fmi3Status::Ok,
            values: Fmi3ValueBatch::Float64(vec![3.0]),
        }
    );
    assert_eq!(replies[14], Fmi3Return::FreeInstance);
}

#[test]
fn structural_parameters_need_configuration_mode() {
    let (result, replies) = serve(script(&[
        instantiate(false),
        // refused in Instantiated
        Fmi3Command::Set {
            references: vec![113],
            values: Fmi3ValueBatch::UInt64(vec![9]),
        },
        Fmi3Command::EnterConfigurationMode,
        Fmi3Command::Set {
            references: vec![113],
            values: Fmi3ValueBatch::UInt64(vec![9]),
        },
        Fmi3Command::ExitConfigurationMode,
        Fmi3Command::Get {
            kind: Fmi3ValueKind::UInt64,
            references: vec![113],
        },
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Disconnected)));
    assert_eq!(replies[1], Fmi3Return::Status(Fmi3Status::Error));
    assert_eq!(replies[2], Fmi3Return::Status(Fmi3Status::Ok));
    assert_eq!(replies[3], Fmi3Return::Status(Fmi3Status::Ok));
    assert_eq!(
        replies[5],
        Fmi3Return::GetValues {
            status: Fmi3Status::Ok,
            values: Fmi3ValueBatch::UInt64(vec![9]),
        }
    );
}

#[test]
fn snapshot_survives_a_new_instance() {
    let (result, replies) = serve(script(&[
        instantiate(true),
        Fmi3Command::EnterInitializationMode {
            tolerance: None,
            start_time: 0.0,
            stop_time: None,
        },
        Fmi3Command::SetIntervalDecimal {
            references: vec![1001],
            intervals: vec![0.1],
        },
        Fmi3Command::ExitInitializationMode,
        Fmi3Command::SerializeFmuState,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Disconnected)));
    let state = match &replies[4] {
        Fmi3Return::Serialize {
            status: Fmi3Status::Ok,
            state,
        } => state.clone(),
        other => panic!("unexpected serialize reply: {other:?}"),
    };

    let (result, replies) = serve(script(&[
        instantiate(true),
        Fmi3Command::DeserializeFmuState { state },
        Fmi3Command::GetIntervalDecimal {
            references: vec![1001],
        },
        Fmi3Command::FreeInstance,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert_eq!(replies[1], Fmi3Return::Status(Fmi3Status::Ok));
    assert_eq!(
        replies[2],
        Fmi3Return::IntervalDecimal {
            status: Fmi3Status::Ok,
            intervals: vec![0.1],
            qualifiers: vec![2],
        }
    );
}

#[test]
fn corrupt_snapshot_is_refused_and_loop_continues() {
    let (result, replies) = serve(script(&[
        instantiate(false),
        Fmi3Command::DeserializeFmuState {
            state: vec![0xde, 0xad, 0xbe],
        },
        Fmi3Command::Get {
            kind: Fmi3ValueKind::Float64,
            references: vec![3],
        },
        Fmi3Command::FreeInstance,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert_eq!(replies[1], Fmi3Return::Status(Fmi3Status::Error));
    assert_eq!(
        replies[2],
        Fmi3Return::GetValues {
            status: Fmi3Status::Ok,
            values: Fmi3ValueBatch::Float64(vec![0.0]),
        }
    );
}

#[test]
fn model_exchange_is_acknowledged_but_not_served() {
    let (result, replies) = serve(script(&[
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
            stop_time: None,
        },
    ]));
    assert!(matches!(
        result,
        Err(Fmi3BackendError::NotInstantiated { .. })
    ));
    assert_eq!(replies, vec![Fmi3Return::Empty]);
}

fn instantiate_with_logging() -> Fmi3Command {
    match instantiate(true) {
        Fmi3Command::InstantiateCoSimulation(mut args) => {
            args.logging_on = true;
            Fmi3Command::InstantiateCoSimulation(args)
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn log_records_need_exactly_one_continue() {
    // logging_on queues a record during instantiate; the wrapper must
    // answer the notification before the instantiate reply arrives
    let (result, replies) = serve(script(&[
        instantiate_with_logging(),
        Fmi3Command::CallbackContinue,
        Fmi3Command::FreeInstance,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert!(matches!(replies[0], Fmi3Return::Log(_)));
    assert_eq!(replies[1], Fmi3Return::Empty);
    assert_eq!(replies[2], Fmi3Return::FreeInstance);
}

#[test]
fn log_record_answered_with_anything_else_is_fatal() {
    let (result, replies) = serve(script(&[instantiate_with_logging(), Fmi3Command::Reset]));
    assert!(matches!(
        result,
        Err(Fmi3BackendError::LogNotAcknowledged { .. })
    ));
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], Fmi3Return::Log(_)));
}

#[test]
fn unknown_command_is_fatal_without_reply() {
    let mut input = script(&[instantiate(false)]);
    let mut body = Vec::new();
    let mut enc = minicbor::Encoder::new(&mut body);
    enc.map(2).unwrap();
    enc.str("type").unwrap();
    enc.str("FMI3_GET_QUATERNION").unwrap();
    enc.str("body").unwrap();
    enc.array(0).unwrap();
    input.extend_from_slice(&encode_frame(&body, MAX_FRAME).unwrap());

    let (result, replies) = serve(input);
    assert!(matches!(result, Err(Fmi3BackendError::Proto(_))));
    assert_eq!(replies, vec![Fmi3Return::Empty]);
}

#[test]
fn oversized_frame_is_fatal() {
    let mut input = script(&[instantiate(false)]);
    // header claims a body larger than the channel allows
    let length = (MAX_FRAME as u32 + 1).to_le_bytes();
    input.extend_from_slice(&length);
    input.extend_from_slice(&[0u8; 4]);

    let (result, _) = serve(input);
    assert!(matches!(
        result,
        Err(Fmi3BackendError::Frame(FrameError::TooLarge { .. }))
    ));
}

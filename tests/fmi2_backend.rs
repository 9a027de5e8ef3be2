//! Drives the FMI2 dispatch loop end to end over in-memory transports.

use std::io::Cursor;

use fmubridge::channel::{encode_frame, CommandChannel, FrameError, FrameReader};
use fmubridge::fmi2::proto::{decode_return, encode_command};
use fmubridge::fmi2::{
    Fmi2Adder, Fmi2Backend, Fmi2BackendError, Fmi2Command, Fmi2Instantiate, Fmi2Return,
    Fmi2Status, Fmi2ValueBatch, Fmi2ValueKind, ServeOutcome,
};

const MAX_FRAME: usize = 1 << 20;

fn instantiate(logging_on: bool) -> Fmi2Command {
    Fmi2Command::Instantiate(Fmi2Instantiate {
        instance_name: "adder".into(),
        fmu_guid: "77236337-210e-4e9c-8f2c-c1a0677db21b".into(),
        resource_location: "file:///tmp/adder/resources".into(),
        visible: false,
        logging_on,
    })
}

fn script(commands: &[Fmi2Command]) -> Vec<u8> {
    let mut input = Vec::new();
    for command in commands {
        let body = encode_command(command).unwrap();
        input.extend_from_slice(&encode_frame(&body, MAX_FRAME).unwrap());
    }
    input
}

fn serve(input: Vec<u8>) -> (Result<ServeOutcome, Fmi2BackendError>, Vec<Fmi2Return>) {
    let mut output = Vec::new();
    let result = {
        let channel = CommandChannel::from_parts(Cursor::new(input), &mut output, MAX_FRAME);
        Fmi2Backend::<Fmi2Adder, _, _>::new(channel).serve()
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
fn full_lifecycle_to_free_instance() {
    let (result, replies) = serve(script(&[
        instantiate(false),
        Fmi2Command::SetupExperiment {
            start_time: 0.0,
            stop_time: Some(10.0),
            tolerance: None,
        },
        Fmi2Command::EnterInitializationMode,
        Fmi2Command::ExitInitializationMode,
        Fmi2Command::Set {
            references: vec![0, 1],
            values: Fmi2ValueBatch::Real(vec![1.0, 2.0]),
        },
        Fmi2Command::DoStep {
            current_time: 0.0,
            step_size: 0.5,
            no_step_prior: false,
        },
        Fmi2Command::Get {
            kind: Fmi2ValueKind::Real,
            references: vec![2],
        },
        Fmi2Command::Terminate,
        Fmi2Command::FreeInstance,
    ]));

    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert_eq!(replies.len(), 9);
    assert_eq!(replies[0], Fmi2Return::Empty);
    assert_eq!(replies[1], Fmi2Return::Status(Fmi2Status::Ok));
    assert_eq!(
        replies[6],
        Fmi2Return::GetValues {
            status: Fmi2Status::Ok,
            values: Fmi2ValueBatch::Real(vec![3.0]),
        }
    );
    assert_eq!(replies[8], Fmi2Return::FreeInstance);
}

#[test]
fn snapshot_round_trip_through_the_wire() {
    let prologue = [
        instantiate(false),
        Fmi2Command::SetupExperiment {
            start_time: 0.0,
            stop_time: None,
            tolerance: None,
        },
        Fmi2Command::EnterInitializationMode,
        Fmi2Command::ExitInitializationMode,
        Fmi2Command::Set {
            references: vec![3, 4],
            values: Fmi2ValueBatch::Integer(vec![20, 22]),
        },
        Fmi2Command::DoStep {
            current_time: 0.0,
            step_size: 1.0,
            no_step_prior: false,
        },
        Fmi2Command::SerializeFmuState,
    ];
    let (result, replies) = serve(script(&prologue));
    assert!(matches!(result, Ok(ServeOutcome::Disconnected)));
    let state = match &replies[6] {
        Fmi2Return::Serialize {
            status: Fmi2Status::Ok,
            state,
        } => state.clone(),
        other => panic!("unexpected serialize reply: {other:?}"),
    };

    // fresh instance, restore, read the restored output
    let (result, replies) = serve(script(&[
        instantiate(false),
        Fmi2Command::DeserializeFmuState { state },
        Fmi2Command::Get {
            kind: Fmi2ValueKind::Integer,
            references: vec![5],
        },
        Fmi2Command::FreeInstance,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert_eq!(replies[1], Fmi2Return::Status(Fmi2Status::Ok));
    assert_eq!(
        replies[2],
        Fmi2Return::GetValues {
            status: Fmi2Status::Ok,
            values: Fmi2ValueBatch::Integer(vec![42]),
        }
    );
}

#[test]
fn failed_set_batch_applies_nothing() {
    let (result, replies) = serve(script(&[
        instantiate(false),
        Fmi2Command::Set {
            references: vec![0],
            values: Fmi2ValueBatch::Real(vec![5.0]),
        },
        // second reference is a computed output; whole batch must bounce
        Fmi2Command::Set {
            references: vec![0, 2],
            values: Fmi2ValueBatch::Real(vec![9.0, 9.0]),
        },
        Fmi2Command::Get {
            kind: Fmi2ValueKind::Real,
            references: vec![0],
        },
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Disconnected)));
    assert_eq!(replies[1], Fmi2Return::Status(Fmi2Status::Ok));
    assert_eq!(replies[2], Fmi2Return::Status(Fmi2Status::Error));
    assert_eq!(
        replies[3],
        Fmi2Return::GetValues {
            status: Fmi2Status::Ok,
            values: Fmi2ValueBatch::Real(vec![5.0]),
        }
    );
}

#[test]
fn unknown_command_is_fatal_without_reply() {
    let mut input = script(&[instantiate(false)]);
    // hand-built frame with a tag outside the command set
    let mut body = Vec::new();
    let mut enc = minicbor::Encoder::new(&mut body);
    enc.map(2).unwrap();
    enc.str("type").unwrap();
    enc.str("FMI2_SELF_DESTRUCT").unwrap();
    enc.str("body").unwrap();
    enc.array(0).unwrap();
    input.extend_from_slice(&encode_frame(&body, MAX_FRAME).unwrap());

    let (result, replies) = serve(input);
    assert!(matches!(result, Err(Fmi2BackendError::Proto(_))));
    assert!(result.unwrap_err().is_fatal());
    // only the instantiate reply made it out
    assert_eq!(replies, vec![Fmi2Return::Empty]);
}

#[test]
fn command_before_instantiate_is_fatal() {
    let (result, replies) = serve(script(&[Fmi2Command::EnterInitializationMode]));
    assert!(matches!(
        result,
        Err(Fmi2BackendError::NotInstantiated { .. })
    ));
    assert!(replies.is_empty());
}

#[test]
fn log_records_need_exactly_one_continue() {
    // logging_on queues a record during instantiate; the wrapper must
    // answer the notification before the instantiate reply arrives
    let (result, replies) = serve(script(&[
        instantiate(true),
        Fmi2Command::CallbackContinue,
        Fmi2Command::FreeInstance,
    ]));
    assert!(matches!(result, Ok(ServeOutcome::Freed)));
    assert!(matches!(replies[0], Fmi2Return::Log(_)));
    assert_eq!(replies[1], Fmi2Return::Empty);
    assert_eq!(replies[2], Fmi2Return::FreeInstance);
}

#[test]
fn log_record_answered_with_anything_else_is_fatal() {
    let (result, replies) = serve(script(&[instantiate(true), Fmi2Command::Reset]));
    assert!(matches!(
        result,
        Err(Fmi2BackendError::LogNotAcknowledged { .. })
    ));
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], Fmi2Return::Log(_)));
}

#[test]
fn corrupt_frame_is_fatal() {
    let mut input = script(&[instantiate(false), Fmi2Command::Reset]);
    let last = input.len() - 1;
    input[last] ^= 0xff;

    let (result, replies) = serve(input);
    assert!(matches!(
        result,
        Err(Fmi2BackendError::Frame(FrameError::CrcMismatch { .. }))
    ));
    assert_eq!(replies, vec![Fmi2Return::Empty]);
}

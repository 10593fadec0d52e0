// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Hostio sessions over a real TCP connection to a fake debugger
//! TESTS: program output and exit code, keyboard echo, cancellation, verify
//!   mismatch, mid-session hang-up, unreachable debugger, command framing

use hostio_e2e::{image, unused_port, FakeOpenOcd};
use rvlab_hostio::fake::{FakeTarget, ScriptedConsole};
use rvlab_hostio::{connect, Config, Error, SessionOutcome, SessionState};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn program_output_and_exit_code_reach_the_host() {
    init_logging();
    let mut target = FakeTarget::new();
    target.set_read_hook(|device, _| {
        if device.is_running() {
            device.print(b"hello\n");
            device.exit_with(7);
        }
    });
    let server = FakeOpenOcd::start(target).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    let mut console = ScriptedConsole::new();
    let report = session.run(elf.path(), &mut console).expect("run");
    assert_eq!(report.outcome, SessionOutcome::Finished(7));
    assert_eq!(report.transcript, b"hello\r\n");
    assert_eq!(console.output(), b"hello\r\n");
    assert_eq!(console.restores(), 1);
    drop(session);

    let log = server.finish().expect("server log");
    let commands = log.target.commands();
    assert_eq!(commands.first().map(String::as_str), Some("halt"));
    assert!(commands.iter().any(|c| c == "reg pc 0x80"));
    assert!(commands.iter().any(|c| c == "resume"));
    assert_eq!(commands.last().map(String::as_str), Some("shutdown"));
}

#[test]
fn keystrokes_are_echoed_by_the_program() {
    init_logging();
    let mut target = FakeTarget::new();
    target.set_read_hook(|device, _| {
        let input = device.take_input();
        if input.is_empty() {
            return;
        }
        device.print(&input);
        if input.contains(&b'\r') {
            device.exit_with(0);
        }
    });
    let server = FakeOpenOcd::start(target).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    let mut console = ScriptedConsole::new().idle(1).keys(b"hi\r");
    let report = session.run(elf.path(), &mut console).expect("run");
    assert_eq!(report.outcome, SessionOutcome::Finished(0));
    assert_eq!(console.output(), b"hi\r");
    drop(session);
    server.finish().expect("server log");
}

#[test]
fn ctrl_d_cancels_a_running_program() {
    init_logging();
    let server = FakeOpenOcd::start(FakeTarget::new()).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    let mut console = ScriptedConsole::new().idle(3).key(0x04);
    let report = session.run(elf.path(), &mut console).expect("run");
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(!console.is_raw());
    drop(session);

    let log = server.finish().expect("server log");
    // The cancel key is never forwarded to the target.
    assert_eq!(log.target.input_queued(), 0);
}

#[test]
fn verify_mismatch_aborts_before_resume() {
    init_logging();
    let mut target = FakeTarget::new();
    target.set_reply("verify_image", "diff 0 address 0x00000010. Was 0x00 instead of 0x13");
    let server = FakeOpenOcd::start(target).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    let err = session.load(elf.path()).expect_err("verify must fail");
    assert!(matches!(err, Error::Image { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Idle);
    drop(session);

    let log = server.finish().expect("server log");
    assert!(!log.target.commands().iter().any(|c| c == "resume"));
    assert!(!log.target.is_running());
}

#[test]
fn debugger_hanging_up_is_fatal() {
    init_logging();
    let server = FakeOpenOcd::hang_up_after(FakeTarget::new(), 2).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    let err = session.load(elf.path()).expect_err("hang-up");
    assert!(matches!(err, Error::Protocol(_) | Error::Connection(_)), "{err}");
    drop(session);

    let log = server.finish().expect("server log");
    assert_eq!(log.served, 2);
}

#[test]
fn unreachable_debugger_is_a_connect_error() {
    init_logging();
    let mut config = Config::default();
    config.debugger.port = unused_port().expect("port");
    let err = connect(&config).err().expect("nothing listening");
    assert!(matches!(err, Error::Connect { .. }), "{err}");
    assert!(err.is_connection());
}

#[test]
fn commands_are_sentinel_framed_on_the_wire() {
    init_logging();
    let server = FakeOpenOcd::start(FakeTarget::new()).expect("start server");
    let elf = image().expect("image");

    let mut session = connect(&server.config()).expect("connect");
    session.load(elf.path()).expect("load");
    drop(session);

    let log = server.finish().expect("server log");
    assert!(log.wire.starts_with(b"halt\x1atcl_trace off\x1a"));
    assert!(log.wire.ends_with(b"shutdown\x1a"));
    let frames = log.wire.iter().filter(|&&b| b == 0x1a).count();
    assert_eq!(frames, log.served);
}

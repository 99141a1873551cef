//! Connection-level scenarios: the capture layer attached to the loopback host.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::configuration::{Config, ServerRole};
use crate::data_capture::format::CaptureLog;
use crate::data_capture::trigger::CapturePhase;
use crate::data_capture::types::Direction;
use crate::data_capture::CaptureLayer;
use crate::network::capture_transport::CaptureTransport;
use crate::network::loopback::{LoopbackSession, LoopbackTransport};
use crate::network::transport::{ConnectionId, HostSession, Transport};

fn config(dir: &TempDir, role: ServerRole) -> Config {
    Config {
        role,
        packet_version: 20190530,
        packet_type: String::from("main"),
        log_dir: dir.path().join("log"),
        sync_records: false,
    }
}

fn setup(role: ServerRole) -> (TempDir, CaptureTransport<LoopbackTransport>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let transport = CaptureTransport::new(LoopbackTransport::new(), config(&dir, role));
    (dir, transport)
}

fn read(transport: &mut CaptureTransport<LoopbackTransport>, id: ConnectionId, bytes: &[u8]) -> isize {
    transport.inner_mut().push_inbound(id, bytes);
    transport.receive(id)
}

fn send(transport: &mut CaptureTransport<LoopbackTransport>, id: ConnectionId, bytes: &[u8]) {
    transport.session_mut(id).unwrap().stage(bytes);
    transport.validate_write(id, bytes.len());
}

fn capture_files(dir: &TempDir) -> Vec<PathBuf> {
    match fs::read_dir(dir.path().join("log")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn only_log(dir: &TempDir) -> (String, CaptureLog) {
    let files = capture_files(dir);
    assert_eq!(files.len(), 1, "expected exactly one capture file: {:?}", files);
    let text = fs::read_to_string(&files[0]).unwrap();
    let log = CaptureLog::parse(&text).unwrap();
    (text, log)
}

#[test]
fn test_end_to_end_receive_send_close() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();
    assert!(capture_files(&dir).is_empty());

    assert_eq!(read(&mut transport, id, &[0x01, 0x02, 0x03, 0x04]), 4);
    send(&mut transport, id, &[0xAB, 0xCD]);

    let state = transport.layer().state(id).unwrap();
    assert_eq!(state.phase(), CapturePhase::EnabledTriggered);
    assert!(state.file_open());

    let (text, log) = only_log(&dir);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "#format 2");
    assert_eq!(lines[1], "#packetversion 20190530 main");
    assert!(lines[2].starts_with("#time ") && !lines[2].contains('.'));
    assert!(lines[3].starts_with("#time ") && lines[3].contains('.'));
    assert_eq!(&lines[4..6], &["5353", "01020304"]);
    assert!(lines[6].starts_with("#time "));
    assert_eq!(&lines[7..9], &["5252", "abcd"]);
    assert_eq!(lines.len(), 9);
    assert_eq!(log.records().count(), 2);

    // the host still saw its own bytes untouched
    let session = transport.session(id).unwrap();
    assert_eq!(session.received(), &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(session.sent(), &[0xAB, 0xCD]);

    transport.close(id);
    let stats = transport.layer().stats();
    assert_eq!(stats.files_opened, 1);
    assert_eq!(stats.files_closed, 1);
    assert!(transport.layer().state(id).is_none());
    assert_eq!(transport.layer().attached(), 0);
    assert_eq!(transport.inner().closed(), &[id]);
}

#[test]
fn test_login_opt_out_code_disables_capture_for_good() {
    let (dir, mut transport) = setup(ServerRole::Login);
    let id = transport.connect_client(0).unwrap();

    assert_eq!(read(&mut transport, id, &[0x10, 0x27, 0x00, 0x00]), 4);
    assert_eq!(
        transport.layer().state(id).unwrap().phase(),
        CapturePhase::Disabled
    );

    assert_eq!(read(&mut transport, id, &[0x64, 0x00]), 2);
    send(&mut transport, id, &[0x69, 0x00]);
    transport.close(id);

    assert!(capture_files(&dir).is_empty());
    let stats = transport.layer().stats();
    assert_eq!(stats.opted_out, 1);
    assert_eq!(stats.files_opened, 0);
    assert_eq!(stats.records_written, 0);
}

#[test]
fn test_char_opt_out_code() {
    let (dir, mut transport) = setup(ServerRole::Char);
    let id = transport.connect_client(0).unwrap();
    read(&mut transport, id, &[0xf8, 0x2a, 0x01]);
    read(&mut transport, id, &[0x65, 0x00]);
    assert!(capture_files(&dir).is_empty());
}

#[test]
fn test_opt_out_code_of_another_role_is_captured() {
    let (dir, mut transport) = setup(ServerRole::Char);
    let id = transport.connect_client(0).unwrap();
    // the login server's code means nothing to a char server
    read(&mut transport, id, &[0x10, 0x27]);
    let (_, log) = only_log(&dir);
    assert_eq!(log.records().count(), 1);
}

#[test]
fn test_opt_out_code_after_trigger_is_captured() {
    let (dir, mut transport) = setup(ServerRole::Login);
    let id = transport.connect_client(0).unwrap();
    read(&mut transport, id, &[0x64, 0x00, 0x01]);
    read(&mut transport, id, &[0x10, 0x27]);

    let (_, log) = only_log(&dir);
    let payloads: Vec<_> = log.records().map(|r| r.payload.clone()).collect();
    assert_eq!(payloads, vec![vec![0x64, 0x00, 0x01], vec![0x10, 0x27]]);
}

#[test]
fn test_records_follow_call_order() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();

    read(&mut transport, id, &[1]);
    send(&mut transport, id, &[2]);
    send(&mut transport, id, &[3, 3]);
    read(&mut transport, id, &[4]);
    send(&mut transport, id, &[5]);

    let (_, log) = only_log(&dir);
    let seen: Vec<_> = log
        .records()
        .map(|r| (r.direction, r.payload.clone()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (Direction::Receive, vec![1]),
            (Direction::Send, vec![2]),
            (Direction::Send, vec![3, 3]),
            (Direction::Receive, vec![4]),
            (Direction::Send, vec![5]),
        ]
    );

    let times: Vec<_> = log.records().map(|r| (r.seconds, r.micros)).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_only_the_fresh_bytes_are_recorded() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();
    read(&mut transport, id, b"abc");
    // host left "abc" unconsumed in its buffer
    read(&mut transport, id, b"de");

    let (_, log) = only_log(&dir);
    let payloads: Vec<_> = log.records().map(|r| r.payload.clone()).collect();
    assert_eq!(payloads, vec![b"abc".to_vec(), b"de".to_vec()]);
}

#[test]
fn test_failed_and_empty_reads_pass_through() {
    let (dir, mut transport) = setup(ServerRole::Login);
    let id = transport.connect_client(0).unwrap();

    transport.inner_mut().push_error(id);
    assert_eq!(transport.receive(id), -1);
    assert_eq!(transport.receive(id), 0);
    assert!(capture_files(&dir).is_empty());

    // neither counted as the conditioning read
    let state = transport.layer().state(id).unwrap();
    assert_eq!(state.phase(), CapturePhase::EnabledUntriggered);
    read(&mut transport, id, &[0x10, 0x27]);
    assert_eq!(
        transport.layer().state(id).unwrap().phase(),
        CapturePhase::Disabled
    );
}

#[test]
fn test_unvalidated_connection_is_not_captured() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();
    transport.session_mut(id).unwrap().set_validated(false);

    assert_eq!(read(&mut transport, id, &[1, 2]), 2);
    send(&mut transport, id, &[3]);
    assert!(capture_files(&dir).is_empty());
    assert!(!transport.layer().state(id).unwrap().triggered());
    assert_eq!(transport.session(id).unwrap().sent(), &[3]);

    transport.session_mut(id).unwrap().set_validated(true);
    read(&mut transport, id, &[4]);
    let (_, log) = only_log(&dir);
    assert_eq!(log.records().count(), 1);
}

#[test]
fn test_outbound_before_first_inbound_is_recorded() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();
    send(&mut transport, id, &[0x7f, 0x00]);

    let (_, log) = only_log(&dir);
    let record = log.records().next().unwrap();
    assert_eq!(record.direction, Direction::Send);
    assert!(!transport.layer().state(id).unwrap().triggered());
}

#[test]
fn test_zero_length_and_oversized_writes_are_not_recorded() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();

    transport.validate_write(id, 0);
    transport.session_mut(id).unwrap().stage(&[1, 2]);
    transport.validate_write(id, 10);

    assert!(capture_files(&dir).is_empty());
    // the host's own clamping still applied
    assert_eq!(transport.session(id).unwrap().sent(), &[1, 2]);
}

#[test]
fn test_connection_without_state_is_untouched() {
    let (dir, mut transport) = setup(ServerRole::Map);
    // accepted behind the layer's back
    let id = transport.inner_mut().connect_client(0).unwrap();

    assert_eq!(read(&mut transport, id, &[1, 2, 3]), 3);
    send(&mut transport, id, &[4]);
    transport.close(id);

    assert!(capture_files(&dir).is_empty());
    assert_eq!(transport.inner().closed(), &[id]);
    assert_eq!(transport.layer().stats().attached, 0);
}

#[test]
fn test_close_hook_twice_closes_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let mut host = LoopbackTransport::new();
    let mut layer: CaptureLayer<LoopbackSession> = CaptureLayer::new(config(&dir, ServerRole::Map));

    let id = host.connect_client(0).unwrap();
    layer.after_connect(id, host.session_mut(id).unwrap());
    host.push_inbound(id, &[9, 9]);
    assert_eq!(host.session_mut(id).unwrap().receive(), 2);

    assert!(layer.before_close(id));
    assert!(!layer.before_close(id));
    assert_eq!(layer.stats().files_closed, 1);

    // a late read through the still-installed wrapper never reopens the file
    host.push_inbound(id, &[8]);
    assert_eq!(host.session_mut(id).unwrap().receive(), 1);
    let (_, log) = only_log(&dir);
    assert_eq!(log.records().count(), 1);
    assert_eq!(layer.stats().files_opened, 1);
}

#[test]
fn test_double_attach_keeps_the_first_wrapper() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let mut host = LoopbackTransport::new();
    let mut layer: CaptureLayer<LoopbackSession> = CaptureLayer::new(config(&dir, ServerRole::Map));

    let id = host.connect_client(0).unwrap();
    layer.after_connect(id, host.session_mut(id).unwrap());
    layer.after_connect(id, host.session_mut(id).unwrap());

    let stats = layer.stats();
    assert_eq!(stats.attached, 1);
    assert_eq!(stats.conflicts, 1);
    assert_eq!(layer.attached(), 1);

    // wrapped twice would record this read twice
    host.push_inbound(id, &[1, 2, 3]);
    assert_eq!(host.session_mut(id).unwrap().receive(), 3);
    let (_, log) = only_log(&dir);
    assert_eq!(log.records().count(), 1);
}

#[test]
fn test_account_tag_needs_an_open_file() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let id = transport.connect_client(0).unwrap();

    assert!(transport.on_auth_ok(id, 2000000, true));
    assert!(capture_files(&dir).is_empty());

    read(&mut transport, id, &[0x36, 0x04]);
    assert!(transport.on_auth_ok(id, 2000000, true));
    assert!(!transport.on_auth_ok(id, 2000001, false));

    let (text, log) = only_log(&dir);
    assert_eq!(log.accounts().collect::<Vec<_>>(), vec![2000000]);
    assert!(text.ends_with("#account 2000000\n"));
}

#[test]
fn test_account_tag_only_on_map_role() {
    let (dir, mut transport) = setup(ServerRole::Char);
    let id = transport.connect_client(0).unwrap();
    read(&mut transport, id, &[0x65, 0x00]);
    assert!(transport.on_auth_ok(id, 2000000, true));

    let (_, log) = only_log(&dir);
    assert_eq!(log.accounts().count(), 0);
}

#[test]
fn test_account_tag_on_unknown_connection_passes_through() {
    let (_dir, mut transport) = setup(ServerRole::Map);
    assert!(transport.on_auth_ok(42, 2000000, true));
}

#[test]
fn test_teardown_restores_the_host() {
    let (dir, mut transport) = setup(ServerRole::Map);
    let a = transport.connect_client(0).unwrap();
    let b = transport.connect_client(0).unwrap();
    read(&mut transport, a, &[1]);
    read(&mut transport, b, &[2]);
    assert_eq!(capture_files(&dir).len(), 2);

    let mut host = transport.into_inner();

    // original read functions are back: reads work and nothing is recorded
    host.push_inbound(a, &[3, 3]);
    assert_eq!(host.session_mut(a).unwrap().receive(), 2);
    host.close(b);

    for path in capture_files(&dir) {
        let log = CaptureLog::parse(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(log.records().count(), 1);
    }
}

#[test]
fn test_unwritable_log_dir_never_breaks_the_connection() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("log"), b"in the way").unwrap();
    let mut transport = CaptureTransport::new(LoopbackTransport::new(), config(&dir, ServerRole::Map));
    let id = transport.connect_client(0).unwrap();

    assert_eq!(read(&mut transport, id, &[1, 2, 3]), 3);
    send(&mut transport, id, &[4]);
    assert_eq!(read(&mut transport, id, &[5]), 1);

    let state = transport.layer().state(id).unwrap();
    assert_eq!(state.phase(), CapturePhase::Disabled);
    assert!(state.triggered());
    assert_eq!(transport.layer().stats().io_failures, 1);
    assert_eq!(transport.session(id).unwrap().sent(), &[4]);
    transport.close(id);
}

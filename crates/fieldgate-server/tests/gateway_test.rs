//! End-to-end gateway tests
//!
//! Real sockets, real `poll(2)`: a device on the Unix node, a TCP backend on
//! loopback, the relay processor in between.

use std::{
    fs,
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    os::unix::net::UnixStream,
    path::Path,
    thread,
    time::Duration,
};

use fieldgate_core::{GatewayError, SessionState};
use fieldgate_server::{Gateway, GatewayManager, GatewaySettings, ServerError};

const UUID: &str = "0123456789abcdef0123456789abcdef";
const TOKEN: &str = "fedcba9876543210";

fn write_config(dir: &Path, backend_port: u16, transports: &str) -> std::path::PathBuf {
    let path = dir.join("gateway.conf");
    let text = format!(
        "[Credential]\nUUID = {UUID}\nTOKEN = {TOKEN}\n\n\
         [Cloud]\nHost = 127.0.0.1\nPort = {backend_port}\n\n\
         [Gateway]\nTransports = {transports}\n"
    );
    fs::write(&path, text).unwrap();
    path
}

fn settings(dir: &Path, config_path: std::path::PathBuf) -> GatewaySettings {
    GatewaySettings {
        config_path,
        unix_socket: dir.join("gw.sock"),
        tcp_bind: "127.0.0.1:0".to_string(),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Step the event loop until `done` holds, bounded.
fn step_until(manager: &mut GatewayManager, done: impl Fn(&GatewayManager) -> bool) {
    for _ in 0..100 {
        if done(manager) {
            return;
        }
        manager.poll_once(Some(Duration::from_millis(20))).unwrap();
    }
    assert!(done(manager), "condition not reached");
}

#[test]
fn relays_frames_and_tears_down_on_device_hangup() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = backend.local_addr().unwrap().port();

    let backend_thread = thread::spawn(move || {
        let (mut conn, _) = backend.accept().unwrap();
        let mut frame = [0u8; 10];
        conn.read_exact(&mut frame).unwrap();
        conn.write_all(b"ack!").unwrap();

        // Gateway closes the backend connection on teardown
        let mut rest = Vec::new();
        conn.read_to_end(&mut rest).unwrap();
        frame
    });

    let config = write_config(dir.path(), port, "Unix");
    let mut gateway = Gateway::start(settings(dir.path(), config)).unwrap();
    assert_eq!(gateway.manager().active_nodes(), vec!["Unix"]);
    assert_eq!(gateway.manager().protocol_name(), "ws");

    let mut device = UnixStream::connect(dir.path().join("gw.sock")).unwrap();
    step_until(gateway.manager_mut(), |m| m.session_count() == 1);

    let id = gateway.manager().session_ids()[0];
    assert_eq!(gateway.manager().session_state(id), SessionState::Active);

    device.write_all(b"0123456789").unwrap();
    step_until(gateway.manager_mut(), |m| m.stats().frames_relayed == 1);

    let mut reply = [0u8; 4];
    device.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"ack!");

    drop(device);
    step_until(gateway.manager_mut(), |m| m.session_count() == 0);

    let stats = gateway.manager().stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.device_teardowns, 1);
    assert_eq!(stats.backend_teardowns, 1);
    assert_eq!(gateway.manager().session_state(id), SessionState::Closed);

    assert_eq!(&backend_thread.join().unwrap(), b"0123456789");

    gateway.stop();
    gateway.run().unwrap();
    assert!(!dir.path().join("gw.sock").exists());
}

#[test]
fn tcp_device_close_tears_down_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = backend.local_addr().unwrap().port();
    let device_addr = {
        let free = TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap()
    };

    let backend_thread = thread::spawn(move || {
        let (mut conn, _) = backend.accept().unwrap();
        let mut rest = Vec::new();
        conn.read_to_end(&mut rest).unwrap();
        rest
    });

    let config = write_config(dir.path(), port, "TCP");
    let settings = GatewaySettings { tcp_bind: device_addr.to_string(), ..settings(dir.path(), config) };
    let mut gateway = Gateway::start(settings).unwrap();
    assert_eq!(gateway.manager().active_nodes(), vec!["TCP"]);

    let device = TcpStream::connect(device_addr).unwrap();
    step_until(gateway.manager_mut(), |m| m.session_count() == 1);

    // A closed TCP peer is readable with a zero-byte read, not a hangup
    drop(device);
    step_until(gateway.manager_mut(), |m| m.session_count() == 0);

    let stats = gateway.manager().stats();
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.device_teardowns, 1);
    assert_eq!(stats.recv_errors, 0);

    assert!(backend_thread.join().unwrap().is_empty());
}

#[test]
fn backend_refusal_rejects_device() {
    let dir = tempfile::tempdir().unwrap();
    let port = {
        let closed = TcpListener::bind("127.0.0.1:0").unwrap();
        closed.local_addr().unwrap().port()
    };

    let config = write_config(dir.path(), port, "Unix");
    let mut gateway = Gateway::start(settings(dir.path(), config)).unwrap();

    let mut device = UnixStream::connect(dir.path().join("gw.sock")).unwrap();
    step_until(gateway.manager_mut(), |m| m.stats().sessions_rejected == 1);

    assert_eq!(gateway.manager().session_count(), 0);
    let mut buf = [0u8; 1];
    assert_eq!(device.read(&mut buf).unwrap(), 0);

    // The listener survives a rejected device
    assert_eq!(gateway.manager().listener_watches().len(), 1);
}

#[test]
fn transports_allow_list_limits_listeners() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = backend.local_addr().unwrap().port();

    let config = write_config(dir.path(), port, "tcp");
    let gateway = Gateway::start(settings(dir.path(), config)).unwrap();

    assert_eq!(gateway.manager().active_nodes(), vec!["TCP"]);
    assert!(!dir.path().join("gw.sock").exists());
}

#[test]
fn unknown_protocol_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), 80, "Unix");
    let settings = GatewaySettings { protocol: "coap".to_string(), ..settings(dir.path(), config) };

    let err = Gateway::start(settings).unwrap_err();
    assert!(matches!(err, ServerError::Gateway(GatewayError::NoSuchProtocol(_))));
    assert!(!dir.path().join("gw.sock").exists());
}

#[test]
fn missing_config_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let err = Gateway::start(settings(dir.path(), dir.path().join("absent.conf"))).unwrap_err();
    assert!(matches!(err, ServerError::Config(_)));
}

#[test]
fn short_token_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.conf");
    fs::write(&path, format!("[Credential]\nUUID = {UUID}\nTOKEN = short\n")).unwrap();

    let err = Gateway::start(settings(dir.path(), path)).unwrap_err();
    assert!(matches!(err, ServerError::Config(_)));
}

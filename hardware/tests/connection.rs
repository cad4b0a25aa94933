//! Framing behaviour of the raw connection against scripted peers.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use gauge_hardware::inficon::{Connection, VgcError, ENQ};

const TIMEOUT: Duration = Duration::from_millis(200);

/// Run `script` against the first accepted connection and return a client.
fn scripted<F>(script: F) -> Connection
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream);
    });
    Connection::connect("127.0.0.1", port, TIMEOUT).unwrap()
}

#[test]
fn test_read_response_stops_at_terminator() {
    let mut link = scripted(|mut peer| {
        peer.write_all(b"first\r\nsecond\r\n").unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    assert_eq!(link.timeout(), TIMEOUT);
    assert_eq!(link.read_response().unwrap(), b"first\r\n");
    assert_eq!(link.read_response().unwrap(), b"second\r\n");
}

#[test]
fn test_read_response_times_out_without_terminator() {
    let mut link = scripted(|mut peer| {
        peer.write_all(b"partial").unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let start = Instant::now();
    assert!(matches!(link.read_response(), Err(VgcError::Timeout)));
    assert!(start.elapsed() < Duration::from_millis(450));
}

#[test]
fn test_read_response_deadline_covers_trickling_peer() {
    let mut link = scripted(|mut peer| {
        for _ in 0..20 {
            if peer.write_all(b"x").is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
    });

    let start = Instant::now();
    assert!(matches!(link.read_response(), Err(VgcError::Timeout)));
    assert!(start.elapsed() < Duration::from_millis(450));
}

#[test]
fn test_read_response_peer_closed() {
    let mut link = scripted(|mut peer| {
        peer.write_all(b"half").unwrap();
    });

    assert!(matches!(
        link.read_response(),
        Err(VgcError::Communication(_))
    ));
}

#[test]
fn test_clear_buffer_discards_pending_bytes() {
    let (tx, rx) = mpsc::channel();
    let mut link = scripted(move |mut peer| {
        peer.write_all(b"stale\r\n").unwrap();
        tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));

    assert_eq!(link.clear_buffer().unwrap(), 7);
    assert_eq!(link.clear_buffer().unwrap(), 0);
    assert!(matches!(link.read_response(), Err(VgcError::Timeout)));
}

#[test]
fn test_send_command_frame() {
    let (tx, rx) = mpsc::channel();
    let mut link = scripted(move |mut peer| {
        let mut buf = [0u8; 8];
        peer.read_exact(&mut buf).unwrap();
        tx.send(buf.to_vec()).unwrap();
    });

    let sent = link.send_command("UNI", &["1"]).unwrap();
    assert_eq!(sent, b"UNI,1\r\n");
    link.send_enquiry().unwrap();

    let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received, b"UNI,1\r\n\x05");
}

#[test]
fn test_query_handshake() {
    let mut link = scripted(|mut peer| {
        let mut command = [0u8; 5];
        peer.read_exact(&mut command).unwrap();
        assert_eq!(&command, b"PR1\r\n");
        peer.write_all(b"\x06\r\n").unwrap();

        let mut enq = [0u8; 1];
        peer.read_exact(&mut enq).unwrap();
        assert_eq!(enq[0], ENQ);
        peer.write_all(b"0,+1.0000E-03\r\n").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    assert_eq!(link.query("PR1", &[]).unwrap(), "0,+1.0000E-03");
}

#[test]
fn test_query_nak() {
    let mut link = scripted(|mut peer| {
        let mut command = [0u8; 5];
        peer.read_exact(&mut command).unwrap();
        peer.write_all(b"\x15\r\n").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    match link.query("PR9", &[]) {
        Err(VgcError::Nak(command)) => assert_eq!(command, "PR9"),
        other => panic!("expected NAK, got {other:?}"),
    }
}

#[test]
fn test_query_drains_stale_reply_first() {
    let mut link = scripted(|mut peer| {
        // Late reply to a previous exchange, already waiting when the next command goes out.
        peer.write_all(b"0,+9.9900E+02\r\n").unwrap();

        let mut command = [0u8; 5];
        peer.read_exact(&mut command).unwrap();
        peer.write_all(b"\x06\r\n").unwrap();
        let mut enq = [0u8; 1];
        peer.read_exact(&mut enq).unwrap();
        peer.write_all(b"0,+2.0000E-05\r\n").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    thread::sleep(Duration::from_millis(100));
    assert_eq!(link.query("PR2", &[]).unwrap(), "0,+2.0000E-05");
}

#[test]
fn test_connect_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    assert!(matches!(
        Connection::connect("127.0.0.1", port, TIMEOUT),
        Err(VgcError::Connection(_))
    ));
}

#[test]
fn test_connect_unresolvable_host() {
    assert!(matches!(
        Connection::connect("no-such-host.invalid", 8000, TIMEOUT),
        Err(VgcError::Connection(_))
    ));
}

//! Simulated VGC50x controller on a loopback TCP socket.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gauge_hardware::inficon::{ControllerConfig, ACK, ENQ, NAK};

/// Client timeout used by all simulator tests.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

/// How the simulator answers one command line.
#[derive(Debug, Clone)]
pub enum Reply {
    /// ACK, then this payload on ENQ
    Payload(String),
    /// NAK
    Nak,
    /// Exactly these bytes, no payload on ENQ
    Raw(Vec<u8>),
    /// Nothing at all
    Silent,
    /// Nothing until `delay` has passed, then these bytes
    Late { delay: Duration, bytes: Vec<u8> },
    /// Drop the connection
    Close,
}

/// Device state answering the standard command set.
#[derive(Debug, Clone)]
pub struct SimState {
    pub identity: String,
    pub unit: u8,
    /// `(status, value)` per gauge
    pub readings: Vec<(u8, f64)>,
    pub sensors: String,
    pub error_status: String,
    /// When false, `UNI,<d>` is acknowledged but the unit stays put
    pub accept_unit_changes: bool,
    /// One-shot replies consumed before the standard handling
    pub overrides: HashMap<String, VecDeque<Reply>>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            identity: "VGC502,398-482,44998,010100,010000".to_string(),
            unit: 0,
            readings: vec![(0, 1.0e-3), (0, 2.5e-6)],
            sensors: "PCG,PCG".to_string(),
            error_status: "0000".to_string(),
            accept_unit_changes: true,
            overrides: HashMap::new(),
        }
    }
}

fn format_reading((status, value): (u8, f64)) -> String {
    format!("{status},{value:+.4E}")
}

impl SimState {
    fn reply_for(&mut self, command: &str) -> Reply {
        if let Some(reply) = self
            .overrides
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        let (code, arg) = match command.split_once(',') {
            Some((code, arg)) => (code, Some(arg)),
            None => (command, None),
        };

        match (code, arg) {
            ("AYT", None) => Reply::Payload(self.identity.clone()),
            ("TID", None) => Reply::Payload(self.sensors.clone()),
            ("ERR", None) => Reply::Payload(self.error_status.clone()),
            ("UNI", None) => Reply::Payload(self.unit.to_string()),
            ("UNI", Some(arg)) => match arg.parse::<u8>() {
                Ok(code) if code <= 5 => {
                    if self.accept_unit_changes {
                        self.unit = code;
                    }
                    Reply::Payload(self.unit.to_string())
                }
                _ => Reply::Nak,
            },
            ("PRX", None) => Reply::Payload(
                self.readings
                    .iter()
                    .map(|&r| format_reading(r))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            (code, None) if code.starts_with("PR") => {
                match code[2..].parse::<usize>() {
                    Ok(n) if n >= 1 && n <= self.readings.len() => {
                        Reply::Payload(format_reading(self.readings[n - 1]))
                    }
                    _ => Reply::Nak,
                }
            }
            _ => Reply::Nak,
        }
    }
}

/// Handle to a running simulator.
pub struct SimDevice {
    pub addr: SocketAddr,
    state: Arc<Mutex<SimState>>,
    commands: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl SimDevice {
    /// Start a simulator with default state.
    pub fn start() -> Self {
        Self::with_state(SimState::default())
    }

    /// Start a simulator with the given state.
    pub fn with_state(state: SimState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind simulator");
        let addr = listener.local_addr().expect("simulator address");

        let state = Arc::new(Mutex::new(state));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (thread_state, thread_commands, thread_connections) =
            (state.clone(), commands.clone(), connections.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                thread_connections.fetch_add(1, Ordering::SeqCst);
                serve(stream, &thread_state, &thread_commands);
            }
        });

        Self {
            addr,
            state,
            commands,
            connections,
        }
    }

    /// Controller config pointing at this simulator.
    pub fn config(&self) -> ControllerConfig {
        ControllerConfig::new(self.addr.ip().to_string())
            .with_port(self.addr.port())
            .with_timeout(TEST_TIMEOUT)
    }

    /// Queue a one-shot reply for an exact command line (without CR LF).
    pub fn push_reply(&self, command: &str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Modify the device state.
    pub fn update<F: FnOnce(&mut SimState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    /// Current unit code on the simulated device.
    pub fn unit(&self) -> u8 {
        self.state.lock().unwrap().unit
    }

    /// Command lines received so far, across all connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Number of accepted connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<SimState>, commands: &Mutex<Vec<String>>) {
    let mut line = Vec::new();
    let mut pending: Option<Vec<u8>> = None;
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        if byte[0] == ENQ && line.is_empty() {
            if let Some(payload) = pending.take() {
                if stream.write_all(&payload).is_err() {
                    return;
                }
            }
            continue;
        }

        line.push(byte[0]);
        if !line.ends_with(b"\r\n") {
            continue;
        }

        let command = String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
        line.clear();
        commands.lock().unwrap().push(command.clone());

        let reply = state.lock().unwrap().reply_for(&command);
        pending = None;
        let written = match reply {
            Reply::Payload(payload) => {
                pending = Some(format!("{payload}\r\n").into_bytes());
                stream.write_all(&[ACK, b'\r', b'\n'])
            }
            Reply::Nak => stream.write_all(&[NAK, b'\r', b'\n']),
            Reply::Raw(bytes) => stream.write_all(&bytes),
            Reply::Silent => Ok(()),
            Reply::Late { delay, bytes } => {
                thread::sleep(delay);
                stream.write_all(&bytes)
            }
            Reply::Close => return,
        };
        if written.is_err() {
            return;
        }
    }
}

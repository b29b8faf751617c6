//! cec-client transport
//!
//! Drives libcec's `cec-client` as a child process. Commands are written to
//! its stdin as `tx` lines; with traffic logging enabled it reports every
//! frame on stdout as
//!
//! ```text
//! TRAFFIC: [          359]	>> 0f:36
//! TRAFFIC: [          412]	<< 20:04
//! ```
//!
//! where `>>` marks frames received from the bus and `<<` frames we sent.
//! A dedicated thread reads stdout and passes each frame to the receive
//! callback given at construction. Once a `tx` command has been handed to
//! `cec-client`, the same callback gets the frame as `TransmitComplete`.

use super::{proto, Bus, Direction, LogicalAddress, RawMessage, RecvError, SendError};
use crate::config::BusConfig;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

type RxCallback = dyn Fn(Result<RawMessage, RecvError>) -> io::Result<()> + Send + Sync;

pub struct CecClient {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    rx: Arc<RxCallback>,
    /// Our logical address, used as initiator of every frame we send.
    address: LogicalAddress,
}

impl CecClient {
    /// Spawns `cec-client` as configured and starts relaying the traffic it
    /// reports to `rx`. If `rx` returns an error, relaying stops.
    pub fn new<RXT>(config: &BusConfig, rx: RXT) -> io::Result<CecClient>
    where
        RXT: Fn(Result<RawMessage, RecvError>) -> io::Result<()> + Send + Sync + 'static,
    {
        let rx: Arc<RxCallback> = Arc::new(rx);
        let mut child = Command::new(&config.client)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "cec-client stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "cec-client stdout"))?;
        let relay_rx = rx.clone();
        thread::Builder::new()
            .name("cec-client".to_string())
            .spawn(move || relay_traffic(BufReader::new(stdout), |res| relay_rx(res)))?;
        Ok(CecClient {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            rx,
            address: config.address,
        })
    }
}

impl Bus for CecClient {
    fn send_message(&self, target: LogicalAddress, payload: &[u8]) -> Result<(), SendError> {
        let raw = proto::frame(self.address, target, payload);
        {
            let mut stdin = self.stdin.lock().map_err(|_| SendError::Disconnected)?;
            writeln!(stdin, "tx {}", format_frame(&raw))?;
            stdin.flush()?;
        }
        let done = RawMessage {
            bytes: raw,
            direction: Direction::TransmitComplete,
        };
        if (self.rx)(Ok(done)).is_err() {
            debug!("cec-client: nobody listening for transmit completion");
        }
        Ok(())
    }
}

impl Drop for CecClient {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Formats a frame the way `cec-client` reads and prints them: `0f:36`.
pub fn format_frame(raw: &[u8]) -> String {
    raw.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses a `0f:36` style frame.
pub fn parse_frame(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.split(':')
        .map(|byte| u8::from_str_radix(byte, 16).ok())
        .collect()
}

/// Extracts the frame from a `TRAFFIC:` log line, if the line is one.
pub fn parse_traffic_line(line: &str) -> Option<RawMessage> {
    let rest = &line[line.find("TRAFFIC:")? + "TRAFFIC:".len()..];
    let (direction, frame) = if let Some(pos) = rest.find(">>") {
        (Direction::Received, &rest[pos + 2..])
    } else if let Some(pos) = rest.find("<<") {
        (Direction::Sent, &rest[pos + 2..])
    } else {
        return None;
    };
    Some(RawMessage {
        bytes: parse_frame(frame)?,
        direction,
    })
}

/// Reads `cec-client` output until it ends or `rx` asks to stop.
fn relay_traffic<R: BufRead, RXT: Fn(Result<RawMessage, RecvError>) -> io::Result<()>>(
    reader: R,
    rx: RXT,
) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                if rx(Err(RecvError::IO(err))).is_err() {
                    return;
                }
                continue;
            }
        };
        match parse_traffic_line(&line) {
            Some(raw) => {
                if rx(Ok(raw)).is_err() {
                    return;
                }
            }
            None => {
                if line.contains("TRAFFIC:") {
                    warn!("cec-client: unparsable traffic: {}", line);
                }
            }
        }
    }
    debug!("cec-client: output closed");
    let _ = rx(Err(RecvError::Disconnected));
}

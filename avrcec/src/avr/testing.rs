//! In-memory receiver connections for tests.

use super::Connector;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// A stream that returns one scripted result per `read` call and records
/// everything written to it. Once the script runs out it reports the end of
/// the stream.
pub struct ScriptedStream {
    reads: VecDeque<io::Result<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedStream {
    pub fn new(reads: Vec<io::Result<Vec<u8>>>) -> ScriptedStream {
        ScriptedStream {
            reads: reads.into(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl io::Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(mut data)) => {
                let size = data.len().min(buf.len());
                buf[..size].copy_from_slice(&data[..size]);
                if size < data.len() {
                    self.reads.push_front(Ok(data.split_off(size)));
                }
                Ok(size)
            }
        }
    }
}

impl io::Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out scripted connection results in order, failing once they run out.
pub struct ScriptedConnector {
    connections: Mutex<VecDeque<io::Result<ScriptedStream>>>,
    attempts: Arc<Mutex<usize>>,
}

impl ScriptedConnector {
    pub fn new(connections: Vec<io::Result<ScriptedStream>>) -> ScriptedConnector {
        ScriptedConnector {
            connections: Mutex::new(connections.into()),
            attempts: Arc::new(Mutex::new(0)),
        }
    }

    pub fn attempts(&self) -> Arc<Mutex<usize>> {
        self.attempts.clone()
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&self) -> io::Result<ScriptedStream> {
        *self.attempts.lock().unwrap() += 1;
        self.connections
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

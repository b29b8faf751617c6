//! Receiver link
//!
//! Owns the connection to the receiver. Right after connecting it sends the
//! status query, so that the current source is reported without waiting for
//! the user to change it. Whenever a read times out or fails, the connection
//! is torn down and established again with the same parameters, query
//! included, and line delivery resumes. The first connection must succeed,
//! and so must every reconnection attempt: a failure there is final.

use super::iobuf::LineReader;
use super::{LinkError, ReadError};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default TCP port of the receiver's remote-control protocol.
pub static AVR_DEFAULT_PORT: u16 = 23;

/// Query making the receiver report its current source.
pub static STATUS_QUERY: &str = "SI?";

/// Resolve a receiver address, appending `default_port` if it is missing.
pub fn find_addr(addr: &str, default_port: u16) -> Result<SocketAddr, io::Error> {
    // It would be possible to determine whether the port is there, but it's
    // simpler to try to parse as-is, and if it fails try again with the port.
    let mut iter = match addr.to_socket_addrs() {
        Ok(iter) => iter,
        Err(err) => match format!("{}:{}", addr, default_port).to_socket_addrs() {
            Ok(iter) => iter,
            // Numeric IPv6 addresses need brackets around them.
            Err(_) => match format!("[{}]:{}", addr, default_port).to_socket_addrs() {
                Ok(iter) => iter,
                Err(_) => return Err(err),
            },
        },
    };
    iter.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "address resolution failed")
    })
}

/// Opens connections to the receiver. Every call must produce a connection
/// with identical parameters.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self) -> io::Result<Self::Stream>;

    /// Human readable description of the peer, for logging.
    fn describe(&self) -> String;
}

/// Plain TCP connection with a receive timeout.
pub struct TcpConnector {
    addr: SocketAddr,
    read_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, read_timeout: Duration) -> TcpConnector {
        TcpConnector { addr, read_timeout }
    }

    /// Resolves `host` (with an optional port, `default_port` otherwise).
    pub fn resolve(
        host: &str,
        default_port: u16,
        read_timeout: Duration,
    ) -> Result<TcpConnector, LinkError> {
        match find_addr(host, default_port) {
            Ok(addr) => Ok(TcpConnector::new(addr, read_timeout)),
            Err(err) => Err(LinkError::Resolve(host.to_string(), err)),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(self.addr)?;
        // A zero timeout is refused by the socket; it means none.
        stream.set_read_timeout(Some(self.read_timeout).filter(|t| !t.is_zero()))?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.addr.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What `Link::poll_line` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A line from the receiver, without its terminator.
    Line(String),
    /// The connection was replaced and the status query sent again.
    /// Anything derived from the previous connection is stale.
    Reconnected,
}

pub struct Link<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    reader: LineReader,
    /// Status query as sent on the wire, terminator included.
    query: Vec<u8>,
    state: LinkState,
}

impl<C: Connector> Link<C> {
    /// Connects and sends `query`. Lines longer than `max_line - 1` bytes
    /// are split.
    pub fn open(connector: C, query: &str, max_line: usize) -> Result<Link<C>, LinkError> {
        let mut query = query.as_bytes().to_vec();
        query.push(b'\r');
        let mut link = Link {
            connector,
            stream: None,
            reader: LineReader::new(max_line),
            query,
            state: LinkState::Disconnected,
        };
        link.establish().map_err(|err| match err {
            LinkError::Reconnect(err) => LinkError::Connect(err),
            err => err,
        })?;
        Ok(link)
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    fn establish(&mut self) -> Result<(), LinkError> {
        self.state = match self.state {
            LinkState::Disconnected => LinkState::Connecting,
            _ => LinkState::Reconnecting,
        };
        let mut stream = self.connector.connect().map_err(LinkError::Reconnect)?;
        info!("avr: connected to {}", self.connector.describe());
        stream.write_all(&self.query).map_err(LinkError::Query)?;
        stream.flush().map_err(LinkError::Query)?;
        debug!("avr: status query sent");
        self.stream = Some(stream);
        self.state = LinkState::Connected;
        Ok(())
    }

    fn reestablish(&mut self, cause: ReadError) -> Result<LinkEvent, LinkError> {
        warn!("avr: link lost ({}), reconnecting", cause);
        self.stream = None;
        self.reader.reset();
        self.establish()?;
        Ok(LinkEvent::Reconnected)
    }

    /// Blocks until the next line arrives, reconnecting as needed. Errors
    /// are only returned when the link cannot be established again.
    pub fn poll_line(&mut self) -> Result<LinkEvent, LinkError> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return self.reestablish(ReadError::Closed),
        };
        match self.reader.next_line(stream) {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                // Tolerate CRLF terminated lines.
                let line = line.trim_start_matches('\n').to_string();
                debug!("avr: {}", line);
                Ok(LinkEvent::Line(line))
            }
            Ok(None) => self.reestablish(ReadError::Closed),
            Err(err) => self.reestablish(err),
        }
    }
}

//! Byte transport to the report server
//!
//! The protocols only need a handful of blocking primitives, each bounded
//! by a timeout. `Transport` is that seam; `TcpTransport` is the real thing
//! and the integration tests script their own.

use crate::{ConnectorError, ConnectorResult};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Longest length or checksum line we accept
pub const MAX_LINE_LEN: usize = 128;

/// Longest telemetry reply we accept
pub const MAX_REPLY_LEN: usize = 512;

/// Open connection to the server
pub trait Transport {
    /// Write all of `data`
    fn send(&mut self, data: &[u8]) -> ConnectorResult<()>;

    /// Read one reply up to a NUL byte or end of stream, NUL excluded
    fn read_reply(&mut self, timeout: Duration) -> ConnectorResult<String>;

    /// Read one line, without its `\n` or `\r\n`
    fn read_line(&mut self, timeout: Duration) -> ConnectorResult<String>;

    /// Fill `buf` completely
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> ConnectorResult<()>;

    /// Close the connection; further calls fail
    fn close(&mut self);
}

/// Opens transports
pub trait Connector {
    /// Transport produced on success
    type Transport: Transport;

    /// Connect to `host:port`, giving up after `timeout`
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> ConnectorResult<Self::Transport>;
}

fn map_read_error(err: io::Error) -> ConnectorError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ConnectorError::Timeout,
        io::ErrorKind::UnexpectedEof => ConnectorError::Closed,
        _ => ConnectorError::Io(err),
    }
}

/// `Connector` over `std::net`
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Connector with Nagle enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: disable Nagle's algorithm
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> ConnectorResult<TcpTransport> {
        let failed = |reason: String| ConnectorError::ConnectFailed {
            host: host.to_string(),
            port,
            reason,
        };

        let addrs = (host, port).to_socket_addrs().map_err(|e| failed(e.to_string()))?;
        let mut last_error = String::from("no addresses");
        for addr in addrs {
            log::debug!("connecting to {addr}");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    log::info!("connected to {host}:{port} ({addr})");
                    return Ok(TcpTransport::new(stream));
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(failed(last_error))
    }
}

/// `Transport` over a TCP stream
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    closed: bool,
}

impl TcpTransport {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
            closed: false,
        }
    }

    fn stream(&mut self, timeout: Duration) -> ConnectorResult<&mut BufReader<TcpStream>> {
        if self.closed {
            return Err(ConnectorError::Closed);
        }
        // A zero read timeout means "block forever" to the OS
        let timeout = timeout.max(Duration::from_millis(1));
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        Ok(&mut self.reader)
    }

    fn read_until(&mut self, delim: u8, limit: usize, timeout: Duration) -> ConnectorResult<Vec<u8>> {
        let reader = self.stream(timeout)?;
        let mut buf = Vec::new();
        let read = reader
            .by_ref()
            .take(limit as u64)
            .read_until(delim, &mut buf)
            .map_err(map_read_error)?;
        if read == 0 {
            return Err(ConnectorError::Closed);
        }
        if buf.last() == Some(&delim) {
            buf.pop();
        } else if buf.len() >= limit {
            return Err(ConnectorError::Protocol(format!("line longer than {limit} bytes")));
        }
        Ok(buf)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> ConnectorResult<()> {
        if self.closed {
            return Err(ConnectorError::Closed);
        }
        let stream = self.reader.get_mut();
        let mut written = 0;
        while written < data.len() {
            match stream.write(&data[written..]) {
                Ok(0) => {
                    return Err(ConnectorError::ShortWrite {
                        written,
                        expected: data.len(),
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        stream.flush()?;
        Ok(())
    }

    fn read_reply(&mut self, timeout: Duration) -> ConnectorResult<String> {
        let bytes = self.read_until(0, MAX_REPLY_LEN, timeout)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_line(&mut self, timeout: Duration) -> ConnectorResult<String> {
        let mut bytes = self.read_until(b'\n', MAX_LINE_LEN, timeout)?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> ConnectorResult<()> {
        let reader = self.stream(timeout)?;
        reader.read_exact(buf).map_err(map_read_error)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.reader.get_ref().shutdown(Shutdown::Both);
            log::debug!("connection closed");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

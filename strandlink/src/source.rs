//! Where a transfer's payload comes from.

use std::fmt;
use std::io::{self, BufRead};

use bytes::Bytes;

use crate::error::Result;

/// Payload input for [`crate::protocol::TransportProtocol::transmit`].
pub enum PayloadSource {
    /// A payload already in memory.
    Bytes(Bytes),
    /// One line read from standard input.
    Stdin,
    /// One line read from an arbitrary reader.
    Reader(Box<dyn BufRead + Send>),
}

impl PayloadSource {
    /// Produce the payload bytes, reading a line if necessary.
    ///
    /// The trailing line terminator (`\n` or `\r\n`) is not part of the
    /// payload. End of input yields an empty payload.
    pub fn resolve(self) -> Result<Bytes> {
        match self {
            PayloadSource::Bytes(bytes) => Ok(bytes),
            PayloadSource::Stdin => read_line(&mut io::stdin().lock()),
            PayloadSource::Reader(mut reader) => read_line(&mut reader),
        }
    }
}

fn read_line(reader: &mut dyn BufRead) -> Result<Bytes> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    Ok(Bytes::from(line))
}

impl fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            PayloadSource::Stdin => write!(f, "Stdin"),
            PayloadSource::Reader(_) => write!(f, "Reader"),
        }
    }
}

impl From<Bytes> for PayloadSource {
    fn from(bytes: Bytes) -> Self {
        PayloadSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for PayloadSource {
    fn from(bytes: Vec<u8>) -> Self {
        PayloadSource::Bytes(bytes.into())
    }
}

impl From<&'static str> for PayloadSource {
    fn from(s: &'static str) -> Self {
        PayloadSource::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for PayloadSource {
    fn from(s: String) -> Self {
        PayloadSource::Bytes(s.into())
    }
}

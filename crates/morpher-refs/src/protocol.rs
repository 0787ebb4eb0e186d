//! Git pkt-line framing
//!
//! Smart HTTP bodies are sequences of pkt-lines: a 4 hex digit length
//! prefix (which counts itself) followed by payload. The literal "0000"
//! is a flush packet and carries no payload.

use std::ops::Range;

use crate::{Error, Result};

/// Flush packet (end of section / end of stream)
pub const FLUSH_PKT: &[u8] = b"0000";

/// Maximum pkt-line size including the length prefix
pub const MAX_PKT_LINE: usize = 65520;

/// Frame a payload as a single pkt-line
pub fn pkt_line(data: &[u8]) -> Vec<u8> {
    let mut pkt = format!("{:04x}", data.len() + 4).into_bytes();
    pkt.extend_from_slice(data);
    pkt
}

/// One entry of a pkt-line stream, addressed by byte offsets into the
/// source buffer so callers can re-emit the original framing verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktEntry {
    /// A "0000" flush packet
    Flush,
    /// A payload-carrying line; `line` spans the whole framed line,
    /// `payload` the bytes after the length prefix
    Data {
        line: Range<usize>,
        payload: Range<usize>,
    },
}

/// Sequential pkt-line reader over an in-memory buffer
pub struct PktLineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the next pkt entry, or None at end of input
    pub fn read(&mut self) -> Result<Option<PktEntry>> {
        if self.pos + 4 > self.data.len() {
            return Ok(None);
        }

        let header = std::str::from_utf8(&self.data[self.pos..self.pos + 4])
            .map_err(|_| Error::Protocol("invalid pkt-line length".into()))?;

        if header == "0000" {
            self.pos += 4;
            return Ok(Some(PktEntry::Flush));
        }

        let len = usize::from_str_radix(header, 16)
            .map_err(|_| Error::Protocol("invalid pkt-line length".into()))?;

        if len < 4 {
            return Err(Error::Protocol("pkt-line length too small".into()));
        }

        if len > MAX_PKT_LINE {
            return Err(Error::Protocol("pkt-line too large".into()));
        }

        if self.pos + len > self.data.len() {
            return Err(Error::Protocol("pkt-line truncated".into()));
        }

        let entry = PktEntry::Data {
            line: self.pos..self.pos + len,
            payload: self.pos + 4..self.pos + len,
        };

        self.pos += len;

        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkt_line() {
        assert_eq!(pkt_line(b"hello"), b"0009hello");
        assert_eq!(pkt_line(b"hello\n"), b"000ahello\n");
    }

    #[test]
    fn test_reader() {
        let data = b"0009hello0006ab0000";
        let mut reader = PktLineReader::new(data);

        assert_eq!(
            reader.read().unwrap(),
            Some(PktEntry::Data {
                line: 0..9,
                payload: 4..9
            })
        );
        assert_eq!(
            reader.read().unwrap(),
            Some(PktEntry::Data {
                line: 9..15,
                payload: 13..15
            })
        );
        assert_eq!(reader.read().unwrap(), Some(PktEntry::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_reader_rejects_bad_lengths() {
        assert!(PktLineReader::new(b"zzzzhello").read().is_err());
        assert!(PktLineReader::new(b"0003").read().is_err());
        assert!(PktLineReader::new(b"00ffshort").read().is_err());
    }

    #[test]
    fn test_reader_ignores_trailing_garbage_shorter_than_header() {
        let mut reader = PktLineReader::new(b"ab");
        assert_eq!(reader.read().unwrap(), None);
    }
}

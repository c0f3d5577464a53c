//! Result stream wire format.
//!
//! Results travel to the controlling client as a flat sequence of
//! netlink-style attributes. Each attribute is laid out as:
//!
//! ```text
//! len:  u16   header + payload, padding excluded
//! kind: u16   AttrKind
//! payload     u32 in native byte order, or a NUL-terminated string
//! padding     zero bytes up to the next 4-byte boundary
//! ```
//!
//! An aggregate success record is a lone `STAT`. A failure record is
//! `STAT`, `FILE`, `NUM`, `STR` in that order.

use alloc::string::String;
use alloc::vec::Vec;

use crate::case::{CaseInfo, HandleId, TestInfo};
use crate::config::{DEFAULT_BUFFER_CAPACITY, NLA_ALIGNTO};
use crate::error::{BufferError, DecodeError};

/// Attribute header size.
pub const NLA_HDRLEN: usize = 4;

/// Attribute type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AttrKind {
    /// Unused.
    Unspec = 0,
    /// Message type.
    Type = 1,
    /// Protocol version.
    Version = 2,
    /// Test set (group) name.
    Snam = 3,
    /// Test name.
    Tnam = 4,
    /// Generic number; the source line in failure records.
    Num = 5,
    /// Formatted failure message.
    Str = 6,
    /// Source file of a failure.
    File = 7,
    /// Success count or failure outcome code.
    Stat = 8,
    /// Listing marker.
    List = 9,
    /// Test marker.
    Test = 10,
    /// Owning handle id.
    Hid = 11,
}

impl AttrKind {
    /// Map a raw wire value back to a kind.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Unspec,
            1 => Self::Type,
            2 => Self::Version,
            3 => Self::Snam,
            4 => Self::Tnam,
            5 => Self::Num,
            6 => Self::Str,
            7 => Self::File,
            8 => Self::Stat,
            9 => Self::List,
            10 => Self::Test,
            11 => Self::Hid,
            _ => return None,
        })
    }
}

#[inline]
const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Space an attribute with a `payload_len` byte payload takes, padding included.
pub const fn attr_size(payload_len: usize) -> usize {
    nla_align(NLA_HDRLEN + payload_len)
}

/// Outgoing, size-bounded attribute buffer.
///
/// One buffer is handed to each test invocation by the execution driver.
/// Writes never grow the buffer past its capacity.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    /// Create a buffer with [`DEFAULT_BUFFER_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer that holds at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    /// Encoded bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum size of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Discard everything written.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Drop everything written after the first `len` bytes.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Append a `u32` attribute.
    pub fn put_u32(&mut self, kind: AttrKind, value: u32) -> Result<(), BufferError> {
        self.put(kind, &value.to_ne_bytes(), false)
    }

    /// Append a NUL-terminated string attribute.
    pub fn put_string(&mut self, kind: AttrKind, value: &str) -> Result<(), BufferError> {
        self.put(kind, value.as_bytes(), true)
    }

    fn put(&mut self, kind: AttrKind, payload: &[u8], nul: bool) -> Result<(), BufferError> {
        let len = NLA_HDRLEN + payload.len() + usize::from(nul);
        let len16 = u16::try_from(len).map_err(|_| BufferError::AttributeTooLarge)?;
        let needed = nla_align(len);
        let available = self.remaining();
        if needed > available {
            return Err(BufferError::Full { needed, available });
        }
        self.data
            .try_reserve(needed)
            .map_err(|_| BufferError::OutOfMemory)?;

        self.data.extend_from_slice(&len16.to_ne_bytes());
        self.data.extend_from_slice(&(kind as u16).to_ne_bytes());
        self.data.extend_from_slice(payload);
        if nul {
            self.data.push(0);
        }
        self.data.resize(self.data.len() + (needed - len), 0);
        Ok(())
    }

    /// Iterate over the attributes written so far.
    pub fn attrs(&self) -> Attrs<'_> {
        Attrs::new(&self.data)
    }
}

/// One decoded attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    /// Raw kind value.
    pub raw_kind: u16,
    /// Payload without header or padding.
    pub payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Kind, if known.
    pub fn kind(&self) -> Option<AttrKind> {
        AttrKind::from_raw(self.raw_kind)
    }

    /// Payload as a `u32`.
    pub fn as_u32(&self) -> Result<u32, DecodeError> {
        let bytes: [u8; 4] = self.payload.try_into().map_err(|_| DecodeError::BadLength)?;
        Ok(u32::from_ne_bytes(bytes))
    }

    /// Payload as a string, up to the first NUL.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        core::str::from_utf8(&self.payload[..end]).map_err(|_| DecodeError::NotUtf8)
    }

    fn expect(self, kind: AttrKind) -> Result<Self, DecodeError> {
        if self.raw_kind == kind as u16 {
            Ok(self)
        } else {
            Err(DecodeError::Unexpected { kind: self.raw_kind })
        }
    }
}

/// Iterator over an encoded attribute stream.
#[derive(Debug, Clone)]
pub struct Attrs<'a> {
    rest: &'a [u8],
}

impl<'a> Attrs<'a> {
    /// Iterate over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    fn next_attr(&mut self) -> Result<Attr<'a>, DecodeError> {
        if self.rest.len() < NLA_HDRLEN {
            return Err(DecodeError::Truncated);
        }
        let len = usize::from(u16::from_ne_bytes([self.rest[0], self.rest[1]]));
        let raw_kind = u16::from_ne_bytes([self.rest[2], self.rest[3]]);
        if len < NLA_HDRLEN {
            return Err(DecodeError::BadLength);
        }
        if len > self.rest.len() {
            return Err(DecodeError::Truncated);
        }
        let payload = &self.rest[NLA_HDRLEN..len];
        let advance = nla_align(len).min(self.rest.len());
        self.rest = &self.rest[advance..];
        Ok(Attr { raw_kind, payload })
    }

    fn expect_next(&mut self, kind: AttrKind) -> Result<Attr<'a>, DecodeError> {
        match self.next() {
            Some(attr) => attr?.expect(kind),
            None => Err(DecodeError::Truncated),
        }
    }

    fn peek_kind(&self) -> Option<u16> {
        (self.rest.len() >= NLA_HDRLEN).then(|| u16::from_ne_bytes([self.rest[2], self.rest[3]]))
    }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Result<Attr<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let item = self.next_attr();
        if item.is_err() {
            self.rest = &[];
        }
        Some(item)
    }
}

/// A decoded result record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `count` consecutive checks passed.
    Passed {
        /// Number of batched successes.
        count: u32,
    },
    /// One check failed.
    Failed {
        /// Raw outcome code of the failed check.
        code: u32,
        /// Source file of the check.
        file: String,
        /// Source line of the check.
        line: u32,
        /// Formatted diagnostic.
        message: String,
    },
}

/// Decode a result stream into records.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Record>, DecodeError> {
    let mut attrs = Attrs::new(bytes);
    let mut records = Vec::new();

    while let Some(attr) = attrs.next() {
        let value = attr?.expect(AttrKind::Stat)?.as_u32()?;
        if attrs.peek_kind() != Some(AttrKind::File as u16) {
            records.push(Record::Passed { count: value });
            continue;
        }
        let file = attrs.expect_next(AttrKind::File)?.as_str()?.into();
        let line = attrs.expect_next(AttrKind::Num)?.as_u32()?;
        let message = attrs.expect_next(AttrKind::Str)?.as_str()?.into();
        records.push(Record::Failed {
            code: value,
            file,
            line,
            message,
        });
    }

    Ok(records)
}

/// Decode a registry listing written by
/// [`Registry::describe`](crate::registry::Registry::describe).
///
/// Returns the protocol version and the listed test sets.
pub fn parse_listing(bytes: &[u8]) -> Result<(u32, Vec<CaseInfo>), DecodeError> {
    let mut attrs = Attrs::new(bytes);
    let version = attrs.expect_next(AttrKind::Version)?.as_u32()?;
    let case_count = attrs.expect_next(AttrKind::Num)?.as_u32()?;

    let mut cases = Vec::new();
    for _ in 0..case_count {
        let name = attrs.expect_next(AttrKind::Snam)?.as_str()?.into();
        let test_count = attrs.expect_next(AttrKind::Num)?.as_u32()?;
        let mut tests = Vec::new();
        for _ in 0..test_count {
            let test = attrs.expect_next(AttrKind::Tnam)?.as_str()?.into();
            let handle = HandleId(attrs.expect_next(AttrKind::Hid)?.as_u32()?);
            tests.push(TestInfo { name: test, handle });
        }
        cases.push(CaseInfo { name, tests });
    }

    match attrs.next() {
        None => Ok((version, cases)),
        Some(attr) => Err(DecodeError::Unexpected { kind: attr?.raw_kind }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_u32_attribute_layout() {
        let mut buf = MessageBuffer::new();
        buf.put_u32(AttrKind::Stat, 5).unwrap();

        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 8);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), AttrKind::Stat as u16);
        assert_eq!(u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 5);
    }

    #[test]
    fn test_string_attribute_padding() {
        let mut buf = MessageBuffer::new();
        buf.put_string(AttrKind::File, "t1.c").unwrap();

        // header 4 + "t1.c" 4 + NUL 1 = 9, padded to 12
        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 9);
        assert_eq!(&bytes[4..9], b"t1.c\0");
        assert_eq!(&bytes[9..], &[0, 0, 0]);

        let attr = buf.attrs().next().unwrap().unwrap();
        assert_eq!(attr.kind(), Some(AttrKind::File));
        assert_eq!(attr.as_str().unwrap(), "t1.c");
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut buf = MessageBuffer::with_capacity(10);
        assert_eq!(buf.capacity(), 10);
        buf.put_u32(AttrKind::Stat, 1).unwrap();
        let err = buf.put_u32(AttrKind::Stat, 2).unwrap_err();
        assert_eq!(err, BufferError::Full { needed: 8, available: 2 });
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_parse_records() {
        let mut buf = MessageBuffer::new();
        buf.put_u32(AttrKind::Stat, 5).unwrap();
        buf.put_u32(AttrKind::Stat, 0).unwrap();
        buf.put_string(AttrKind::File, "t1.c").unwrap();
        buf.put_u32(AttrKind::Num, 42).unwrap();
        buf.put_string(AttrKind::Str, "mismatch at offset 12").unwrap();
        buf.put_u32(AttrKind::Stat, 3).unwrap();

        let records = parse_records(buf.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                Record::Passed { count: 5 },
                Record::Failed {
                    code: 0,
                    file: "t1.c".to_string(),
                    line: 42,
                    message: "mismatch at offset 12".to_string(),
                },
                Record::Passed { count: 3 },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_records(&[1, 0]), Err(DecodeError::Truncated));
        let mut short = vec![];
        short.extend_from_slice(&2u16.to_ne_bytes());
        short.extend_from_slice(&(AttrKind::Stat as u16).to_ne_bytes());
        assert_eq!(parse_records(&short), Err(DecodeError::BadLength));

        let mut buf = MessageBuffer::new();
        buf.put_string(AttrKind::Str, "orphan").unwrap();
        assert_eq!(
            parse_records(buf.as_bytes()),
            Err(DecodeError::Unexpected { kind: AttrKind::Str as u16 })
        );

        let mut buf = MessageBuffer::new();
        buf.put_u32(AttrKind::Stat, 0).unwrap();
        buf.put_string(AttrKind::File, "a.c").unwrap();
        assert_eq!(parse_records(buf.as_bytes()), Err(DecodeError::Truncated));
    }
}

//! Bounded reader over a framed message slice.
//!
//! Every read is checked against the end of the slice, so opcode readers
//! can never run past the message boundary the framer established.

use bson::Document;

use crate::error::{DecodeError, Result};

use super::MAX_DOCUMENT_SIZE;

/// Cursor over a single framed message.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take `n` bytes, failing with a [`DecodeError::Truncated`] that names
    /// the field being read.
    pub fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                context,
                needed: n,
                have: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Discard `n` bytes.
    pub fn skip(&mut self, n: usize, context: &'static str) -> Result<()> {
        self.take(n, context).map(|_| ())
    }

    pub fn read_u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.take(1, context)?[0])
    }

    pub fn read_i32(&mut self, context: &'static str) -> Result<i32> {
        let b = self.take(4, context)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self, context: &'static str) -> Result<i64> {
        let b = self.take(8, context)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::BadCString {
                reason: "missing nul terminator",
            })?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| DecodeError::BadCString {
            reason: "invalid utf-8",
        })?;
        self.pos += nul + 1;
        Ok(s.to_string())
    }

    /// Read one BSON document and return it with its on-wire length.
    ///
    /// The document's leading 4 bytes are its own little-endian length,
    /// which must lie in (0, 16 MiB]. The whole `length`-byte blob
    /// (length prefix included) is decoded preserving key order.
    pub fn read_document(&mut self) -> Result<(Document, usize)> {
        if self.remaining() < 4 {
            return Err(DecodeError::Truncated {
                context: "document size",
                needed: 4,
                have: self.remaining(),
            });
        }
        let b = &self.data[self.pos..self.pos + 4];
        let length = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        if length <= 0 || length > MAX_DOCUMENT_SIZE {
            return Err(DecodeError::BadDocumentLength { length });
        }
        let raw = self.take(length as usize, "document body")?;
        let doc = Document::from_reader(raw)?;
        Ok((doc, length as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    // Test 1: little-endian integer reads across boundary values
    #[test]
    fn test_integer_boundaries() {
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            let bytes = v.to_le_bytes();
            let mut cur = Cursor::new(&bytes);
            assert_eq!(cur.read_i32("x").unwrap(), v);
        }
        for v in [0u32, 1, u32::MAX] {
            let bytes = v.to_le_bytes();
            let mut cur = Cursor::new(&bytes);
            assert_eq!(cur.read_u32("x").unwrap(), v);
        }
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            let bytes = v.to_le_bytes();
            let mut cur = Cursor::new(&bytes);
            assert_eq!(cur.read_i64("x").unwrap(), v);
        }
    }

    // Test 2: reads never run past the slice
    #[test]
    fn test_truncated_read() {
        let mut cur = Cursor::new(&[1, 2, 3]);
        let err = cur.read_i32("flags").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                context: "flags",
                needed: 4,
                have: 3
            }
        ));
    }

    // Test 3: c-string reads up to the nul
    #[test]
    fn test_cstring() {
        let mut cur = Cursor::new(b"db.$cmd\0rest");
        assert_eq!(cur.read_cstring().unwrap(), "db.$cmd");
        assert_eq!(cur.remaining(), 4);
    }

    #[test]
    fn test_cstring_missing_nul() {
        let mut cur = Cursor::new(b"db.$cmd");
        assert!(matches!(
            cur.read_cstring(),
            Err(DecodeError::BadCString { .. })
        ));
    }

    // Test 4: document round trip preserves the wire length prefix
    #[test]
    fn test_document_roundtrip() {
        let doc = doc! { "ismaster": 1i32, "client": "test" };
        let mut raw = Vec::new();
        doc.to_writer(&mut raw).unwrap();

        let mut cur = Cursor::new(&raw);
        let (decoded, length) = cur.read_document().unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(length, raw.len());
        assert_eq!(
            length as i32,
            i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
        );
        assert_eq!(cur.remaining(), 0);
    }

    // Test 5: document key order is preserved
    #[test]
    fn test_document_key_order() {
        let doc = doc! { "aggregate": "c", "pipeline": [], "zfirst": 1i32, "afterwards": 2i32 };
        let mut raw = Vec::new();
        doc.to_writer(&mut raw).unwrap();

        let (decoded, _) = Cursor::new(&raw).read_document().unwrap();
        let keys: Vec<_> = decoded.keys().collect();
        assert_eq!(keys, vec!["aggregate", "pipeline", "zfirst", "afterwards"]);
    }

    // Test 6: document length prefix validation
    #[test]
    fn test_document_bad_length() {
        // Negative length
        let mut raw = (-5i32).to_le_bytes().to_vec();
        raw.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            Cursor::new(&raw).read_document(),
            Err(DecodeError::BadDocumentLength { length: -5 })
        ));

        // Zero length
        let raw = 0i32.to_le_bytes();
        assert!(matches!(
            Cursor::new(&raw).read_document(),
            Err(DecodeError::BadDocumentLength { length: 0 })
        ));

        // Over the 16 MiB limit
        let raw = (MAX_DOCUMENT_SIZE + 1).to_le_bytes();
        assert!(matches!(
            Cursor::new(&raw).read_document(),
            Err(DecodeError::BadDocumentLength { .. })
        ));
    }
}

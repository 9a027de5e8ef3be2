//! Positional, versioned binary encoding for model state snapshots.
//!
//! A snapshot is an opaque blob handed to the master and handed back later.
//! Layout is strictly positional: a `u16` format version, then every field
//! in the model's declaration order, little-endian. There are no field
//! keys; encode order and decode order must match exactly, which is what
//! makes the format independently testable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot truncated: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("snapshot version unsupported: expected {expected} got {got}")]
    VersionMismatch { expected: u16, got: u16 },
    #[error("snapshot field invalid: {reason}")]
    FieldInvalid { reason: String },
    #[error("snapshot has {0} trailing bytes")]
    TrailingBytes(usize),
}

pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new(version: u16) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&version.to_le_bytes());
        Self { buf }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    pub fn put_str(&mut self, v: &str) {
        self.put_bytes(v.as_bytes());
    }
}

pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> SnapshotReader<'a> {
    /// Open a snapshot, checking the format version up front.
    pub fn new(bytes: &'a [u8], expected_version: u16) -> Result<Self, SnapshotError> {
        let mut reader = Self { bytes, offset: 0 };
        let got = reader.get_u16()?;
        if got != expected_version {
            return Err(SnapshotError::VersionMismatch {
                expected: expected_version,
                got,
            });
        }
        Ok(reader)
    }

    /// All fields decoded; anything left over means the blob was produced
    /// by a different table layout.
    pub fn finish(self) -> Result<(), SnapshotError> {
        let remaining = self.bytes.len() - self.offset;
        if remaining != 0 {
            return Err(SnapshotError::TrailingBytes(remaining));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(SnapshotError::Truncated {
                offset: self.offset,
                needed: len,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8, SnapshotError> {
        Ok(self.take(1)?[0] as i8)
    }

    fn take2(&mut self) -> Result<[u8; 2], SnapshotError> {
        let s = self.take(2)?;
        Ok([s[0], s[1]])
    }

    fn take4(&mut self) -> Result<[u8; 4], SnapshotError> {
        let s = self.take(4)?;
        Ok([s[0], s[1], s[2], s[3]])
    }

    fn take8(&mut self) -> Result<[u8; 8], SnapshotError> {
        let s = self.take(8)?;
        Ok([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
    }

    pub fn get_u16(&mut self) -> Result<u16, SnapshotError> {
        Ok(u16::from_le_bytes(self.take2()?))
    }

    pub fn get_i16(&mut self) -> Result<i16, SnapshotError> {
        Ok(i16::from_le_bytes(self.take2()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take4()?))
    }

    pub fn get_i32(&mut self) -> Result<i32, SnapshotError> {
        Ok(i32::from_le_bytes(self.take4()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take8()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, SnapshotError> {
        Ok(i64::from_le_bytes(self.take8()?))
    }

    pub fn get_f32(&mut self) -> Result<f32, SnapshotError> {
        Ok(f32::from_le_bytes(self.take4()?))
    }

    pub fn get_f64(&mut self) -> Result<f64, SnapshotError> {
        Ok(f64::from_le_bytes(self.take8()?))
    }

    pub fn get_bool(&mut self) -> Result<bool, SnapshotError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SnapshotError::FieldInvalid {
                reason: format!("boolean byte {other}"),
            }),
        }
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, SnapshotError> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_str(&mut self) -> Result<String, SnapshotError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes).map_err(|e| SnapshotError::FieldInvalid {
            reason: format!("string not utf-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_roundtrip() {
        let mut writer = SnapshotWriter::new(3);
        writer.put_f64(1.5);
        writer.put_bool(true);
        writer.put_str("Hello World!");
        writer.put_bytes(&[10, 20, 30, 40]);
        writer.put_f32(0.25);
        let blob = writer.finish();

        let mut reader = SnapshotReader::new(&blob, 3).unwrap();
        assert_eq!(reader.get_f64().unwrap(), 1.5);
        assert!(reader.get_bool().unwrap());
        assert_eq!(reader.get_str().unwrap(), "Hello World!");
        assert_eq!(reader.get_bytes().unwrap(), vec![10, 20, 30, 40]);
        assert_eq!(reader.get_f32().unwrap(), 0.25);
        reader.finish().unwrap();
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let blob = SnapshotWriter::new(3).finish();
        assert!(matches!(
            SnapshotReader::new(&blob, 4),
            Err(SnapshotError::VersionMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn truncation_and_trailing_bytes_are_rejected() {
        let mut writer = SnapshotWriter::new(1);
        writer.put_u64(42);
        let blob = writer.finish();

        let mut short = SnapshotReader::new(&blob[..6], 1).unwrap();
        assert!(matches!(
            short.get_u64(),
            Err(SnapshotError::Truncated { .. })
        ));

        let reader = SnapshotReader::new(&blob, 1).unwrap();
        assert!(matches!(
            reader.finish(),
            Err(SnapshotError::TrailingBytes(8))
        ));
    }
}

//! Class and method identity records.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Minimum record size (header without name).
pub const MIN_METADATA_RECORD_SIZE: usize = 4 + 4 + 1 + 4 + 4; // 17 bytes

/// Maximum record size. Readers treat a larger length field as corruption.
pub const MAX_METADATA_RECORD_SIZE: usize = 64 * 1024;

/// Longest name that fits in a record.
pub const MAX_METADATA_NAME_LEN: usize = MAX_METADATA_RECORD_SIZE - MIN_METADATA_RECORD_SIZE;

/// Whether a metadata record describes a class or a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MetadataKind {
    /// A resolved class.
    Class = 1,
    /// A linked method.
    Method = 2,
}

impl TryFrom<u8> for MetadataKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Class),
            2 => Ok(Self::Method),
            _ => Err("Unknown metadata kind"),
        }
    }
}

/// A class or method identity record.
///
/// For classes `data1` is the type index and `data2` the 32-bit identifier
/// of the class object. For methods the pair is the code range
/// (`data1` = code offset, `data2` = code size).
///
/// ```text
/// ┌─────────┬────────┬───────┬─────────┬─────────┬────────┐
/// │ Length  │ CRC32  │ Kind  │ Data1   │ Data2   │ Name   │
/// │ (4 B)   │ (4 B)  │ (1 B) │ (4 B)   │ (4 B)   │ (var)  │
/// └─────────┴────────┴───────┴─────────┴─────────┴────────┘
/// ```
///
/// The CRC covers everything after the CRC field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Class or method.
    pub kind: MetadataKind,
    /// First numeric identifier.
    pub data1: u32,
    /// Second numeric identifier.
    pub data2: u32,
    /// Class descriptor or qualified method name.
    pub name: String,
}

impl MetadataRecord {
    /// Create a class record.
    pub fn class(type_index: u32, class_id: u32, descriptor: impl Into<String>) -> Self {
        Self {
            kind: MetadataKind::Class,
            data1: type_index,
            data2: class_id,
            name: descriptor.into(),
        }
    }

    /// Create a method record.
    pub fn method(code_offset: u32, code_size: u32, name: impl Into<String>) -> Self {
        Self {
            kind: MetadataKind::Method,
            data1: code_offset,
            data2: code_size,
            name: name.into(),
        }
    }

    /// Get the total serialized size of this record.
    pub fn serialized_size(&self) -> usize {
        MIN_METADATA_RECORD_SIZE + self.name.len()
    }

    /// Serialize the record to bytes.
    ///
    /// Fails if the name is longer than [`MAX_METADATA_NAME_LEN`].
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let total_len = self.serialized_size();
        if total_len > MAX_METADATA_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Name too long: {} bytes, limit {}",
                    self.name.len(),
                    MAX_METADATA_NAME_LEN
                ),
            ));
        }
        let total_len_u32 = total_len as u32;

        let mut body = Vec::with_capacity(total_len - 8);
        body.write_u8(self.kind as u8)?;
        body.write_u32::<LittleEndian>(self.data1)?;
        body.write_u32::<LittleEndian>(self.data2)?;
        body.write_all(self.name.as_bytes())?;

        let crc = crc32fast::hash(&body);

        let mut record = Vec::with_capacity(total_len);
        record.write_u32::<LittleEndian>(total_len_u32)?;
        record.write_u32::<LittleEndian>(crc)?;
        record.write_all(&body)?;

        Ok(record)
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < MIN_METADATA_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Record too small",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let total_len = cursor.read_u32::<LittleEndian>()? as usize;
        let stored_crc = cursor.read_u32::<LittleEndian>()?;

        if total_len < MIN_METADATA_RECORD_SIZE || bytes.len() < total_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    total_len,
                    bytes.len()
                ),
            ));
        }

        let body = &bytes[8..total_len];
        let computed_crc = crc32fast::hash(body);
        if computed_crc != stored_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CRC mismatch: expected {}, got {}",
                    stored_crc, computed_crc
                ),
            ));
        }

        let mut body_cursor = io::Cursor::new(body);
        let kind = MetadataKind::try_from(body_cursor.read_u8()?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let data1 = body_cursor.read_u32::<LittleEndian>()?;
        let data2 = body_cursor.read_u32::<LittleEndian>()?;

        let mut name = Vec::with_capacity(body.len() - 9);
        body_cursor.read_to_end(&mut name)?;

        Ok(Self {
            kind,
            data1,
            data2,
            name: String::from_utf8_lossy(&name).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_record_roundtrip() {
        let record = MetadataRecord::class(12, 0x7000_1000, "Ljava/lang/String;");
        let bytes = record.to_bytes().unwrap();

        assert_eq!(bytes.len(), record.serialized_size());

        let restored = MetadataRecord::from_bytes(&bytes).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn method_record_with_empty_name() {
        let record = MetadataRecord::method(0x400, 96, "");
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), MIN_METADATA_RECORD_SIZE);

        let restored = MetadataRecord::from_bytes(&bytes).unwrap();
        assert_eq!(restored.kind, MetadataKind::Method);
        assert_eq!(restored.name, "");
    }

    #[test]
    fn name_length_is_capped() {
        let fits = MetadataRecord::method(0, 0, "m".repeat(MAX_METADATA_NAME_LEN));
        assert_eq!(fits.to_bytes().unwrap().len(), MAX_METADATA_RECORD_SIZE);

        let too_long = MetadataRecord::method(0, 0, "m".repeat(MAX_METADATA_NAME_LEN + 1));
        let err = too_long.to_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn crc_verification() {
        let record = MetadataRecord::class(1, 2, "LFoo;");
        let mut bytes = record.to_bytes().unwrap();

        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(MetadataRecord::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let bytes = MetadataRecord::method(1, 2, "LFoo;.bar").to_bytes().unwrap();
        assert!(MetadataRecord::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }
}

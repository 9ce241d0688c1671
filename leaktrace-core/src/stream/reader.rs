//! Stream readers for offline analysis.

use super::event::{EventKind, MAX_EVENT_SIZE, ObjectEvent};
use super::header::{HEADER_SIZE, StreamHeader, StreamKind};
use super::metadata::{MAX_METADATA_RECORD_SIZE, MIN_METADATA_RECORD_SIZE, MetadataRecord};
use crate::error::{LeakTraceError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Open a stream file and validate its header.
fn open_stream(path: &Path, expected: StreamKind) -> Result<(BufReader<File>, StreamHeader)> {
    let file = File::open(path).map_err(|e| LeakTraceError::StreamRead {
        path: path.to_path_buf(),
        cause: format!("Failed to open: {}", e),
    })?;
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => LeakTraceError::UnsupportedFormat {
            path: path.to_path_buf(),
            cause: "File is shorter than a stream header".to_string(),
        },
        _ => LeakTraceError::StreamRead {
            path: path.to_path_buf(),
            cause: format!("Failed to read header: {}", e),
        },
    })?;

    let header = StreamHeader::from_bytes(&buf).map_err(|e| LeakTraceError::UnsupportedFormat {
        path: path.to_path_buf(),
        cause: e.to_string(),
    })?;
    header
        .validate(expected)
        .map_err(|e| LeakTraceError::UnsupportedFormat {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;

    Ok((reader, header))
}

/// Reader for an object-event stream.
///
/// Unknown tag bytes are skipped one at a time until a valid record is found
/// again, and a record torn off at the end of the file (the writer died
/// mid-append) ends the stream quietly.
pub struct EventReader {
    reader: BufReader<File>,
    path: PathBuf,
    header: StreamHeader,
    /// Byte offset of the next unread byte.
    position: u64,
    /// Garbage bytes skipped while resynchronizing.
    skipped_bytes: u64,
    /// Whether the reader is currently inside a garbage run.
    resyncing: bool,
}

impl EventReader {
    /// Open an event stream.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (reader, header) = open_stream(&path, StreamKind::Events)?;
        Ok(Self {
            reader,
            path,
            header,
            position: HEADER_SIZE as u64,
            skipped_bytes: 0,
            resyncing: false,
        })
    }

    /// Read the next event, or `None` at the end of the stream.
    pub fn next_event(&mut self) -> Result<Option<ObjectEvent>> {
        let mut record = [0u8; MAX_EVENT_SIZE];

        loop {
            let tag = match self.reader.read_u8() {
                Ok(tag) => tag,
                Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(self.read_error(e)),
            };

            let Ok(kind) = EventKind::try_from(tag) else {
                self.skip_garbage(tag);
                continue;
            };

            let payload = &mut record[..kind.payload_len()];
            match self.reader.read_exact(payload) {
                Ok(()) => {}
                Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        path = %self.path.display(),
                        position = self.position,
                        "Torn event record at end of stream"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(self.read_error(e)),
            }

            match ObjectEvent::decode(kind, payload) {
                Ok(event) => {
                    self.position += kind.record_len() as u64;
                    self.resyncing = false;
                    return Ok(Some(event));
                }
                Err(_) => {
                    // Only the tag byte is known bad; rescan from the byte after it.
                    let len = kind.payload_len() as i64;
                    self.reader
                        .seek_relative(-len)
                        .map_err(|e| self.read_error(e))?;
                    self.skip_garbage(tag);
                }
            }
        }
    }

    /// Read all remaining events.
    pub fn read_all(mut self) -> Result<Vec<ObjectEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    fn skip_garbage(&mut self, tag: u8) {
        if !self.resyncing {
            tracing::warn!(
                path = %self.path.display(),
                position = self.position,
                tag,
                "Invalid event record, resynchronizing"
            );
            self.resyncing = true;
        }
        self.position += 1;
        self.skipped_bytes += 1;
    }

    fn read_error(&self, e: std::io::Error) -> LeakTraceError {
        LeakTraceError::StreamRead {
            path: self.path.clone(),
            cause: format!("Failed at byte {}: {}", self.position, e),
        }
    }

    /// Header of the stream.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Bytes skipped while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }
}

impl Iterator for EventReader {
    type Item = Result<ObjectEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Reader for a class/method metadata stream.
///
/// Records failing their CRC are skipped with a warning; an impossible length
/// field is reported as corruption since nothing after it can be trusted.
pub struct MetadataReader {
    reader: BufReader<File>,
    path: PathBuf,
    header: StreamHeader,
    position: u64,
    corrupted_records: u64,
}

impl MetadataReader {
    /// Open a metadata stream.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (reader, header) = open_stream(&path, StreamKind::Metadata)?;
        Ok(Self {
            reader,
            path,
            header,
            position: HEADER_SIZE as u64,
            corrupted_records: 0,
        })
    }

    /// Read the next record, or `None` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<MetadataRecord>> {
        loop {
            let length = match self.reader.read_u32::<LittleEndian>() {
                Ok(len) => len as usize,
                Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => {
                    return Err(LeakTraceError::StreamRead {
                        path: self.path.clone(),
                        cause: format!("Failed to read record length: {}", e),
                    });
                }
            };

            if !(MIN_METADATA_RECORD_SIZE..=MAX_METADATA_RECORD_SIZE).contains(&length) {
                return Err(LeakTraceError::StreamCorruption {
                    position: self.position,
                    cause: format!("Invalid record length: {}", length),
                });
            }

            let mut buf = vec![0u8; length];
            buf[..4].copy_from_slice(&(length as u32).to_le_bytes());
            match self.reader.read_exact(&mut buf[4..]) {
                Ok(()) => {}
                Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        path = %self.path.display(),
                        position = self.position,
                        "Torn metadata record at end of stream"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    return Err(LeakTraceError::StreamRead {
                        path: self.path.clone(),
                        cause: format!("Failed to read record: {}", e),
                    });
                }
            }

            let record_position = self.position;
            self.position += length as u64;

            match MetadataRecord::from_bytes(&buf) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    self.corrupted_records += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        position = record_position,
                        error = %e,
                        "Corrupted metadata record"
                    );
                }
            }
        }
    }

    /// Read all remaining records.
    pub fn read_all(mut self) -> Result<Vec<MetadataRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Header of the stream.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Records skipped because they failed verification.
    pub fn corrupted_records(&self) -> u64 {
        self.corrupted_records
    }
}

impl Iterator for MetadataReader {
    type Item = Result<MetadataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

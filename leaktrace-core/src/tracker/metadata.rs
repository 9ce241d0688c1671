//! Class and method identity recording.

use crate::host::{ManagedClass, ManagedMethod};
use crate::stream::{MAX_METADATA_NAME_LEN, MetadataRecord, StreamSink, StreamWriter};
use crate::types::ObjectAddr;
use std::collections::HashSet;

/// Accumulates identity records until they are dumped to the metadata stream.
///
/// Classes are recorded once per class address. Methods are recorded on every
/// linkage, since re-linking a method is itself worth knowing offline.
#[derive(Debug, Default)]
pub(crate) struct MetadataRecorder {
    /// Every class seen so far.
    classes: HashSet<ObjectAddr>,
    /// Class records not yet written.
    class_records: Vec<MetadataRecord>,
    /// Method records not yet written.
    method_records: Vec<MetadataRecord>,
    /// Method records ever recorded.
    methods_recorded: u64,
}

impl MetadataRecorder {
    /// Record a class. Returns `false` if it was already known.
    pub(crate) fn record_class<C: ManagedClass + ?Sized>(&mut self, class: &C) -> bool {
        let addr = class.address().untagged();
        if !self.classes.insert(addr) {
            return false;
        }
        self.class_records.push(MetadataRecord::class(
            class.type_index(),
            addr.id32(),
            bounded(class.descriptor().into_owned()),
        ));
        true
    }

    /// Record a method linked into `class_name`.
    pub(crate) fn record_method<M: ManagedMethod + ?Sized>(&mut self, class_name: &str, method: &M) {
        let code = method.code_range();
        self.method_records.push(MetadataRecord::method(
            code.offset,
            code.size,
            bounded(format!("{}.{}", class_name, method.name())),
        ));
        self.methods_recorded += 1;
    }

    /// Number of records waiting to be dumped.
    pub(crate) fn pending(&self) -> usize {
        self.class_records.len() + self.method_records.len()
    }

    /// Write all pending records, classes first. Returns how many were
    /// accepted by the writer.
    ///
    /// Pending records are consumed even if the writer rejects them.
    pub(crate) fn dump<S: StreamSink>(&mut self, writer: &mut StreamWriter<S>) -> usize {
        let mut written = 0;
        for record in self.class_records.drain(..).chain(self.method_records.drain(..)) {
            match record.to_bytes() {
                Ok(bytes) => {
                    if writer.append(&bytes) {
                        written += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(name = %record.name, error = %e, "Dropping unencodable metadata record");
                }
            }
        }
        written
    }

    /// Distinct classes seen.
    pub(crate) fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Method records ever recorded.
    pub(crate) fn method_count(&self) -> u64 {
        self.methods_recorded
    }
}

/// Cut `name` down to what a metadata record can hold.
///
/// Readers reject oversized records, so a long name is truncated at a char
/// boundary rather than written whole.
fn bounded(mut name: String) -> String {
    if name.len() > MAX_METADATA_NAME_LEN {
        let mut end = MAX_METADATA_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        tracing::warn!(
            len = name.len(),
            limit = MAX_METADATA_NAME_LEN,
            "Truncating oversized metadata name"
        );
        name.truncate(end);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClassInfo, CodeRange, MethodInfo};
    use crate::stream::{MetadataKind, MetadataReader, StreamKind};
    use tempfile::tempdir;

    #[test]
    fn classes_are_deduplicated_by_address() {
        let mut recorder = MetadataRecorder::default();
        let class = ClassInfo::new(ObjectAddr::new(0x7000), 3, "LFoo;");

        assert!(recorder.record_class(&class));
        assert!(!recorder.record_class(&class));
        // Same class seen through a tagged reference.
        assert!(!recorder.record_class(&ClassInfo::new(ObjectAddr::new(0x7001), 3, "LFoo;")));

        assert_eq!(recorder.class_count(), 1);
        assert_eq!(recorder.pending(), 1);
    }

    #[test]
    fn methods_are_not_deduplicated() {
        let mut recorder = MetadataRecorder::default();
        let method = MethodInfo::new("run", CodeRange::new(0x100, 32));

        recorder.record_method("LFoo;", &method);
        recorder.record_method("LFoo;", &method);

        assert_eq!(recorder.method_count(), 2);
        assert_eq!(recorder.pending(), 2);
    }

    #[test]
    fn dump_writes_classes_before_methods() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.classes");
        let mut writer = StreamWriter::create(&path, StreamKind::Metadata, 256).unwrap();

        let mut recorder = MetadataRecorder::default();
        recorder.record_method("LFoo;", &MethodInfo::new("run", CodeRange::new(0x100, 32)));
        recorder.record_class(&ClassInfo::new(ObjectAddr::new(0x7000), 3, "LFoo;"));

        assert_eq!(recorder.dump(&mut writer), 2);
        assert_eq!(recorder.pending(), 0);
        writer.close(false);

        let records = MetadataReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], MetadataRecord::class(3, 0x7000, "LFoo;"));
        assert_eq!(records[1].kind, MetadataKind::Method);
        assert_eq!(records[1].name, "LFoo;.run");
        assert_eq!((records[1].data1, records[1].data2), (0x100, 32));
    }

    #[test]
    fn oversized_names_are_truncated_on_a_char_boundary() {
        let mut recorder = MetadataRecorder::default();
        // Two-byte chars from offset 0: the odd byte limit falls inside one.
        assert_eq!(MAX_METADATA_NAME_LEN % 2, 1);
        let class_name = format!("{};", "é".repeat(MAX_METADATA_NAME_LEN));
        recorder.record_method(&class_name, &MethodInfo::new("run", CodeRange::new(0, 4)));
        recorder.record_class(&ClassInfo::new(ObjectAddr::new(0x7000), 1, class_name.as_str()));

        for record in recorder.class_records.iter().chain(&recorder.method_records) {
            assert_eq!(record.name.len(), MAX_METADATA_NAME_LEN - 1);
            assert!(record.name.chars().all(|c| c == 'é'));
            assert!(record.to_bytes().is_ok());
        }
    }

    #[test]
    fn short_names_are_kept_whole() {
        assert_eq!(bounded("LFoo;.bar".to_string()), "LFoo;.bar");
        let exact = "x".repeat(MAX_METADATA_NAME_LEN);
        assert_eq!(bounded(exact.clone()), exact);
    }
}

//! Process-wide activation and shutdown.
//!
//! The registry is a single global slot, so every test here takes `SERIAL`
//! first.

use leaktrace_core::config::ENV_DIR;
use leaktrace_core::prelude::*;
use parking_lot::Mutex;
use tempfile::tempdir;

static SERIAL: Mutex<()> = Mutex::new(());

fn config_in(dir: &std::path::Path) -> TracerConfig {
    TracerConfig::default()
        .with_directory(dir)
        .with_sync_on_close(false)
}

#[test]
fn test_create_from_environment() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    // SAFETY: tests in this binary are serialized by `SERIAL` and only read
    // the environment through `registry::create`.
    unsafe { std::env::set_var(ENV_DIR, dir.path()) };
    let result = registry::create("app1");
    unsafe { std::env::remove_var(ENV_DIR) };
    result.unwrap();

    assert!(registry::is_tracking());
    let tracer = registry::instance().unwrap();
    assert_eq!(tracer.process_name(), "app1");
    assert_eq!(tracer.events_path(), dir.path().join("app1.events"));

    tracer.new_object(ObjectAddr::new(0x1000), 64);
    tracer.access_object(ObjectAddr::new(0x1000));
    tracer.gc_started(false);
    tracer.move_object(ObjectAddr::new(0x1000), ObjectAddr::new(0x2000));
    tracer.gc_finished();
    tracer.dead_object(ObjectAddr::new(0x2000));

    let stats = registry::shutdown().unwrap();
    assert_eq!(stats.events_written, 6);
    assert!(!registry::is_tracking());
    assert!(registry::instance().is_none());

    let kinds: Vec<_> = EventReader::open(dir.path().join("app1.events"))
        .unwrap()
        .read_all()
        .unwrap()
        .iter()
        .map(ObjectEvent::kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Allocated,
            EventKind::Accessed,
            EventKind::GcStart,
            EventKind::Moved,
            EventKind::GcEnd,
            EventKind::Died,
        ]
    );
}

#[test]
fn test_unwritable_directory_leaves_slot_empty() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    // A regular file where the output directory should be.
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let err = registry::create_with_config("app1", config_in(&blocker.join("traces"))).unwrap_err();
    assert_eq!(err.code(), "E101");
    assert!(err.is_activation_error());
    assert!(err.errno().is_some_and(|code| code != 0));

    assert!(!registry::is_tracking());
    assert!(registry::instance().is_none());
}

#[test]
fn test_invalid_process_name_is_rejected() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    let err = registry::create_with_config("", config_in(dir.path())).unwrap_err();
    assert_eq!(err.code(), "E001");
    assert_eq!(err.errno(), None);
    assert!(registry::instance().is_none());
}

#[test]
fn test_second_create_is_refused() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    let first = registry::create_with_config("first", config_in(dir.path())).unwrap();
    let err = registry::create_with_config("second", config_in(dir.path())).unwrap_err();

    assert_eq!(err.code(), "E002");
    assert!(err.to_string().contains("first"));
    assert!(!dir.path().join("second.events").exists());

    let active = registry::instance().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &active));
    assert!(active.is_tracking());

    registry::shutdown();
}

#[test]
fn test_shutdown_flushes_metadata_and_disables_handles() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    let tracer = registry::create_with_config("meta", config_in(dir.path())).unwrap();
    tracer.new_class(&ClassInfo::new(ObjectAddr::new(0x7000), 1, "LMain;"));
    tracer.new_method_linked("LMain;", &MethodInfo::new("main", CodeRange::new(0, 16)));

    let stats = registry::shutdown().unwrap();
    assert_eq!(stats.metadata_written, 2);

    // Stale handles stay usable but record nothing.
    tracer.new_object(ObjectAddr::new(0x1000), 8);
    assert!(!tracer.is_tracking());
    assert_eq!(tracer.stats().events_written, 0);
    assert_eq!(tracer.stats().events_dropped, 1);

    let records = MetadataReader::open(dir.path().join("meta.classes"))
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_shutdown_without_tracer() {
    let _serial = SERIAL.lock();
    assert!(registry::shutdown().is_none());
    assert!(!registry::is_tracking());
}

#[test]
fn test_create_after_shutdown() {
    let _serial = SERIAL.lock();
    let dir = tempdir().unwrap();

    registry::create_with_config("cycle", config_in(dir.path())).unwrap();
    registry::shutdown().unwrap();

    registry::create_with_config("cycle", config_in(dir.path())).unwrap();
    assert!(registry::is_tracking());
    registry::shutdown().unwrap();
}

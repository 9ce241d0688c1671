//! Process-wide tracer slot.
//!
//! Hosts that cannot thread a [`LeakTracer`] through their code activate one
//! here and reach it from instrumentation sites through [`instance`]. At most
//! one tracer is active per process. [`is_tracking`] is a single atomic load,
//! so call sites can skip instrumentation cheaply when nothing is active.
//!
//! ```ignore
//! use leaktrace_core::registry;
//!
//! registry::create("com.example.app")?;
//!
//! if registry::is_tracking() {
//!     if let Some(tracer) = registry::instance() {
//!         tracer.new_object(addr, size);
//!     }
//! }
//!
//! let stats = registry::shutdown();
//! ```

use crate::config::TracerConfig;
use crate::error::{LeakTraceError, Result};
use crate::tracker::{LeakTracer, TracerStats};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static TRACKING: AtomicBool = AtomicBool::new(false);
static INSTANCE: RwLock<Option<Arc<LeakTracer>>> = RwLock::new(None);

/// Activate a tracer for `process_name`, configured from the environment.
///
/// On failure nothing is published and tracking stays off.
///
/// The tracer lives in a static that is never dropped, so the host must call
/// [`shutdown`] before it exits. Otherwise buffered metadata and up to
/// `buffer_size` bytes of events per stream are lost.
pub fn create(process_name: &str) -> Result<()> {
    let config = TracerConfig::from_env()?;
    create_with_config(process_name, config).map(|_| ())
}

/// Activate a tracer for `process_name` with an explicit configuration.
///
/// Fails with [`LeakTraceError::AlreadyActive`] if a tracer is already
/// active; the active one is left untouched. As with [`create`], the host
/// must call [`shutdown`] before exiting.
pub fn create_with_config(process_name: &str, config: TracerConfig) -> Result<Arc<LeakTracer>> {
    let mut slot = INSTANCE.write();

    if let Some(active) = slot.as_ref() {
        tracing::warn!(
            requested = %process_name,
            active = %active.process_name(),
            "Leak tracer already active"
        );
        return Err(LeakTraceError::AlreadyActive {
            process_name: active.process_name().to_string(),
        });
    }

    let tracer = match LeakTracer::open(process_name, config) {
        Ok(tracer) => Arc::new(tracer),
        Err(e) => {
            tracing::warn!(
                process = %process_name,
                code = e.code(),
                errno = ?e.errno(),
                error = %e,
                "Leak tracer activation failed"
            );
            return Err(e);
        }
    };

    *slot = Some(Arc::clone(&tracer));
    TRACKING.store(true, Ordering::Release);

    Ok(tracer)
}

/// The active tracer, if any.
pub fn instance() -> Option<Arc<LeakTracer>> {
    INSTANCE.read().clone()
}

/// Whether a tracer is active.
#[inline]
pub fn is_tracking() -> bool {
    TRACKING.load(Ordering::Acquire)
}

/// Deactivate and close the active tracer.
///
/// Returns its final statistics, or `None` if nothing was active. Handles
/// obtained earlier through [`instance`] stay valid but record nothing.
pub fn shutdown() -> Option<TracerStats> {
    let tracer = {
        let mut slot = INSTANCE.write();
        TRACKING.store(false, Ordering::Release);
        slot.take()
    }?;

    Some(tracer.close())
}

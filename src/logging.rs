//! Shared discipline for multi-line diagnostics (spec §5: "the logger sink
//! is process-wide and must serialise its writes... implementers use a
//! mutex around multi-line log messages to keep them contiguous").
//!
//! The original service held a global `async_lock` around any log call
//! that embedded a multi-line transcript (compiler or grader output), so
//! that two jobs logging concurrently couldn't interleave their lines.
//! `log`'s own facade doesn't guarantee that, so pipelines route
//! multi-line messages through [`log_multiline`].

use parking_lot::Mutex;

static MULTILINE_LOCK: Mutex<()> = Mutex::new(());

/// Emits a (possibly multi-line) message at the given level while holding
/// the process-wide multiline lock, so the lines reach the sink as one
/// contiguous block even under concurrent callers.
pub fn log_multiline(level: log::Level, message: &str) {
    let _guard = MULTILINE_LOCK.lock();
    log::log!(level, "{message}");
}

//! Error taxonomy for the judging core (spec §7).
//!
//! The public contract of `compile()` / `execute()` / `execute_single()` is
//! a plain `bool`: `true` once a defined verdict has been written (success
//! *or* a user-visible failure), `false` only when an environmental problem
//! prevented a verdict at all. Internally the pipelines propagate failures
//! with `?` through [`EnvironmentalAbort`] and collapse it to `false` at the
//! public boundary, logging the underlying cause on the way out.

use std::fmt;

/// Wraps a failure attributable to the judging infrastructure rather than
/// the contestant — a failed sandbox operation, an unreadable grader
/// output, a missing config mapping. Never surfaced to the user.
#[derive(Debug)]
pub struct EnvironmentalAbort(pub anyhow::Error);

impl fmt::Display for EnvironmentalAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "environmental failure: {}", self.0)
    }
}

impl std::error::Error for EnvironmentalAbort {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<anyhow::Error> for EnvironmentalAbort {
    fn from(value: anyhow::Error) -> Self {
        EnvironmentalAbort(value)
    }
}

/// Result alias used only inside the pipelines; the wrapped `bool` is the
/// defined verdict (success or user-visible failure) once one has been
/// produced.
pub type PipelineResult<T> = Result<T, EnvironmentalAbort>;

/// Logs `context` plus the wrapped cause at `error` level and collapses a
/// pipeline result to the `bool` contract callers see.
pub fn collapse(context: &str, result: PipelineResult<bool>) -> bool {
    match result {
        Ok(verdict) => verdict,
        Err(abort) => {
            log::error!("{context}: {abort}");
            false
        }
    }
}

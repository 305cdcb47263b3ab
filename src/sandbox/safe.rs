//! Thin wrappers around [`super::Sandbox`] operations that convert an
//! underlying I/O failure into an [`EnvironmentalAbort`], logging as they
//! go (spec §4.2, §7).
//!
//! These used to be the place cleanup happened too — in the source this
//! crate descends from, every one of these calls `safe_delete_sandbox` on
//! failure. Here the sandbox handle is an ordinary local variable owned by
//! the pipeline; `?` propagation through these wrappers drops it on the
//! way out, and `Drop` does the releasing. See SPEC_FULL.md §3.

use std::io::Read;

use crate::error::EnvironmentalAbort;
use crate::model::Digest;
use crate::store::Store;

use super::{Sandbox, SandboxConfig, SandboxFactory};

pub fn create_sandbox(factory: &dyn SandboxFactory, job_id: &str) -> Result<Box<dyn Sandbox>, EnvironmentalAbort> {
    factory.create(job_id).map_err(|e| {
        log::error!("Couldn't create sandbox (job {job_id}): {e}");
        EnvironmentalAbort(e)
    })
}

pub fn configure(sandbox: &mut dyn Sandbox, config: SandboxConfig) -> Result<(), EnvironmentalAbort> {
    sandbox.configure(config).map_err(|e| {
        log::error!("Couldn't configure sandbox: {e}");
        EnvironmentalAbort(e)
    })
}

pub fn execute(sandbox: &mut dyn Sandbox, argv: &[String]) -> Result<(), EnvironmentalAbort> {
    sandbox.execute(argv).map_err(|e| {
        log::error!("Couldn't spawn `{}` (error: {e})", argv.first().map(String::as_str).unwrap_or(""));
        EnvironmentalAbort(e)
    })
}

pub fn create_file_from_store(
    sandbox: &mut dyn Sandbox,
    store: &dyn Store,
    name: &str,
    digest: &Digest,
    executable: bool,
) -> Result<(), EnvironmentalAbort> {
    sandbox
        .create_file_from_store(name, store, digest, executable)
        .map_err(|e| {
            log::error!("Couldn't copy file `{name}` into sandbox: {e}");
            EnvironmentalAbort(e)
        })
}

pub fn store_file(sandbox: &dyn Sandbox, store: &dyn Store, name: &str) -> Result<Digest, EnvironmentalAbort> {
    sandbox.store_file(name, store).map_err(|e| {
        log::error!("Couldn't send file `{name}` to storage: {e}");
        EnvironmentalAbort(e)
    })
}

pub fn read_file_to_string(
    sandbox: &dyn Sandbox,
    name: &str,
    max_len: usize,
) -> Result<String, EnvironmentalAbort> {
    sandbox.read_file_to_string(name, max_len).map_err(|e| {
        log::error!("Couldn't retrieve file `{name}` from sandbox: {e}");
        EnvironmentalAbort(e)
    })
}

pub fn open_file(sandbox: &dyn Sandbox, name: &str) -> Result<Box<dyn Read>, EnvironmentalAbort> {
    sandbox.open_file(name).map_err(|e| {
        log::error!("Couldn't retrieve file `{name}` from sandbox: {e}");
        EnvironmentalAbort(e)
    })
}

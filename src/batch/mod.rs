//! The Batch task-type strategy (spec §4.3, §4.4, §4.6) — the only
//! task-type driver this core implements. "Batch" names the programs it
//! judges: plain programs that read `input.txt` and write `output.txt`,
//! evaluated testcase by testcase, as opposed to e.g. an interactive or
//! output-only strategy.
//!
//! Grounded in the teacher's `sandbox/compile.rs` (compile pipeline) and
//! `sandbox/testing.rs` (per-testcase executor), generalised from methods
//! on a concrete `Sandbox` holding a `JobRecord` into a driver over the
//! `Session`/`Sandbox`/`Store`/`CompilerCatalogue` collaborator traits.

mod compile;
mod evaluate;

use crate::compiler::CompilerCatalogue;
use crate::sandbox::SandboxFactory;
use crate::store::Store;

const COMPILE_CPU_TIMEOUT_SECS: f64 = 8.0;
const COMPILE_WALL_TIMEOUT_SECS: f64 = 10.0;
const COMPILE_ADDRESS_SPACE_KB: u32 = 256 * 1024;
const DIAGNOSTIC_READ_LIMIT: usize = 1024;

pub struct BatchDriver<'a> {
    store: &'a dyn Store,
    sandbox_factory: &'a dyn SandboxFactory,
    compiler: &'a dyn CompilerCatalogue,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        store: &'a dyn Store,
        sandbox_factory: &'a dyn SandboxFactory,
        compiler: &'a dyn CompilerCatalogue,
    ) -> Self {
        BatchDriver {
            store,
            sandbox_factory,
            compiler,
        }
    }
}

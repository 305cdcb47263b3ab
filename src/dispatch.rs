//! Dispatch by task-type tag (spec §4.1).
//!
//! The dispatcher's only job is picking a strategy; it owns none of the
//! collaborators itself, just borrows them for as long as the returned
//! driver lives.

use crate::batch::BatchDriver;
use crate::compiler::CompilerCatalogue;
use crate::sandbox::SandboxFactory;
use crate::session::Session;
use crate::store::Store;

/// A task-type driver bound to one strategy. The only strategy this core
/// implements is [`BatchDriver`]; as more task types arrive they become
/// more variants here, not a trait object hierarchy (see SPEC_FULL.md's
/// note on avoiding deep polymorphism for an open but small strategy set).
pub enum Driver<'a> {
    Batch(BatchDriver<'a>),
}

impl<'a> Driver<'a> {
    pub fn compile(&self, session: &mut dyn Session) -> bool {
        match self {
            Driver::Batch(driver) => driver.compile(session),
        }
    }

    pub fn execute(&self, session: &mut dyn Session) -> bool {
        match self {
            Driver::Batch(driver) => driver.execute(session),
        }
    }
}

/// Resolves `task_type` to a driver. Returns `None` for any tag besides
/// the literal `"batch"` — the surrounding service is expected to treat
/// that as a configuration error, not retry it.
pub fn dispatch<'a>(
    task_type: &str,
    store: &'a dyn Store,
    sandbox_factory: &'a dyn SandboxFactory,
    compiler_catalogue: &'a dyn CompilerCatalogue,
) -> Option<Driver<'a>> {
    match task_type {
        "batch" => Some(Driver::Batch(BatchDriver::new(store, sandbox_factory, compiler_catalogue))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::StaticCatalogue;
    use crate::sandbox::fake::FakeSandboxFactory;
    use crate::store::InMemoryStore;

    #[test]
    fn unknown_task_type_yields_no_driver() {
        let store = InMemoryStore::new();
        let factory = FakeSandboxFactory::new(std::env::temp_dir());
        let catalogue = StaticCatalogue::new();
        assert!(dispatch("output-only", &store, &factory, &catalogue).is_none());
    }

    #[test]
    fn batch_task_type_yields_a_driver() {
        let store = InMemoryStore::new();
        let factory = FakeSandboxFactory::new(std::env::temp_dir());
        let catalogue = StaticCatalogue::new();
        assert!(matches!(dispatch("batch", &store, &factory, &catalogue), Some(Driver::Batch(_))));
    }
}

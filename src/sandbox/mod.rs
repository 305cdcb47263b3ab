//! The sandbox collaborator (spec §6.1) and the safe wrappers (spec §4.2)
//! that centralise "release the sandbox on any failure" so pipelines never
//! have to remember to do it themselves.

mod safe;

pub mod fake;
pub mod isolate;

pub use safe::{
    configure, create_file_from_store, create_sandbox, execute, open_file, read_file_to_string,
    store_file,
};

use std::collections::HashMap;
use std::io::Read;

use crate::model::{Digest, KiloByte, Second};
use crate::store::Store;

/// The outcome a sandbox reports once a command has run to completion (or
/// been stopped by policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    Timeout,
    Signal,
    SandboxError,
    ForbiddenSyscall,
    FileAccess,
}

/// Syscall filtering strictness, `0`/`1`/`2` in the wire interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyscallFilterLevel {
    Off,
    Moderate,
    #[default]
    Strict,
}

/// File-access policy: a strictness level plus an allow-list of path
/// prefixes the sandboxed process may touch.
#[derive(Debug, Clone, Default)]
pub struct FileAccessPolicy {
    pub level: u8,
    pub allow: Vec<String>,
}

impl FileAccessPolicy {
    pub fn whitelist(allow: impl IntoIterator<Item = impl Into<String>>) -> Self {
        FileAccessPolicy {
            level: 1,
            allow: allow.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permissive(allow: impl IntoIterator<Item = impl Into<String>>) -> Self {
        FileAccessPolicy {
            level: 2,
            allow: allow.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything a sandbox needs to know before `execute` is called, mirrored
/// one-to-one from spec §6.1's configuration fields.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    pub working_directory: Option<String>,
    pub preserve_env: bool,
    pub env: HashMap<String, String>,
    pub syscall_filter: SyscallFilterLevel,
    pub allow_fork: bool,
    pub file_access: FileAccessPolicy,
    /// `None` = unlimited.
    pub cpu_timeout: Option<Second>,
    pub wall_timeout: Option<Second>,
    /// `None` = unlimited.
    pub address_space: Option<KiloByte>,
    pub stdout_redirect: Option<String>,
    pub stderr_redirect: Option<String>,
    pub extra_syscalls: Vec<String>,
}

/// A single sandboxed execution, bound to one job by a [`SandboxFactory`].
///
/// Implementations own whatever host resources back the sandbox (a
/// directory, a cgroup, a container) and must release them from `Drop`, so
/// that any early return — including one triggered by `?` inside the safe
/// wrappers in this module — leaves no sandbox allocated. A sandbox
/// outlives at most one `execute` call.
pub trait Sandbox {
    fn configure(&mut self, config: SandboxConfig) -> anyhow::Result<()>;

    /// Runs `argv` to completion under the current configuration. Blocks
    /// until the sandbox reports completion.
    fn execute(&mut self, argv: &[String]) -> anyhow::Result<()>;

    fn exit_status(&self) -> ExitStatus;
    fn exit_code(&self) -> i32;
    /// Only meaningful when `exit_status() == ExitStatus::Signal`.
    fn killing_signal(&self) -> Option<i32>;
    fn stats(&self) -> String;

    fn file_exists(&self, name: &str) -> bool;
    /// Reads at most `max_len` bytes of `name`, decoded as UTF-8.
    fn read_file_to_string(&self, name: &str, max_len: usize) -> anyhow::Result<String>;
    /// Opens `name` for streaming reads (used by the comparator, which
    /// never needs to materialise a whole output file in memory).
    fn open_file(&self, name: &str) -> anyhow::Result<Box<dyn Read>>;

    fn create_file_from_store(
        &mut self,
        name: &str,
        store: &dyn Store,
        digest: &Digest,
        executable: bool,
    ) -> anyhow::Result<()>;
    fn store_file(&self, name: &str, store: &dyn Store) -> anyhow::Result<Digest>;
}

/// Creates a fresh [`Sandbox`] bound to a job.
pub trait SandboxFactory: Send + Sync {
    fn create(&self, job_id: &str) -> anyhow::Result<Box<dyn Sandbox>>;
}

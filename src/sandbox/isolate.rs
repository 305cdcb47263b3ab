//! The production [`Sandbox`] backend: a generalization of the teacher
//! crate's `sandbox/isolate_runner.rs` (and the `sandbox.rs` +
//! `sandbox/compile.rs` + `sandbox/testing.rs` + `sandbox/init.rs` split it
//! superseded) from a job-specific object into one driven entirely by
//! [`SandboxConfig`] and an argv, per spec §6.
//!
//! Shells out to the `isolate` sandboxing tool
//! (<https://github.com/ioi/isolate>), the same tool the teacher wraps.
//! Isolate enforces cgroup-based CPU/wall-clock/memory limits and
//! directory-prefix file access; it has no notion of a per-syscall allow
//! list, so [`ExitStatus::ForbiddenSyscall`] is never produced by this
//! backend (a ptrace-based backend could produce it — the trait leaves
//! room for one without this implementation needing to fake it).

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::Command;

use crate::model::Digest;
use crate::store::Store;

use super::{ExitStatus, Sandbox, SandboxConfig, SandboxFactory};

const DEFAULT_OPEN_FILES: u32 = 64;
const DEFAULT_FILE_SIZE_KB: u32 = 32_768;
const CACHE_DIR_PERMISSIONS: u32 = 0o700;

/// Creates fresh `isolate` sandboxes bound to a single numeric box id.
///
/// One factory corresponds to one worker slot: isolate multiplexes
/// concurrent sandboxes by integer id, so a service running `N` judging
/// workers concurrently constructs `N` factories, one per id.
pub struct IsolateSandboxFactory {
    id: u8,
    cache_root: PathBuf,
    /// When set, a sandbox's `Drop` skips `isolate --cleanup`, leaving the
    /// box directory on disk for post-mortem inspection (spec §3's
    /// "debug-keep flag").
    pub keep_sandboxes: bool,
}

impl IsolateSandboxFactory {
    pub fn new(id: u8, cache_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let cache_root = cache_root.into();
        fs::create_dir_all(&cache_root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&cache_root, fs::Permissions::from_mode(CACHE_DIR_PERMISSIONS))?;
        }
        Ok(IsolateSandboxFactory {
            id,
            cache_root,
            keep_sandboxes: false,
        })
    }
}

impl SandboxFactory for IsolateSandboxFactory {
    fn create(&self, job_id: &str) -> anyhow::Result<Box<dyn Sandbox>> {
        let output = Command::new("isolate")
            .args(["-b", &self.id.to_string(), "--cg", "--init"])
            .output()
            .map_err(|e| anyhow::anyhow!("failed to spawn isolate --init: {e}"))?;

        if !output.status.success() {
            anyhow::bail!(
                "isolate --init exited with non-zero status for job {job_id}: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let root_dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root_dir.is_empty() {
            anyhow::bail!("isolate --init produced empty stdout for job {job_id}");
        }

        let cache_dir = self.cache_root.join(format!("{}-{job_id}", self.id));
        fs::create_dir_all(&cache_dir)?;

        Ok(Box::new(IsolateSandbox {
            id: self.id,
            box_dir: PathBuf::from(root_dir).join("box"),
            cache_dir,
            keep: self.keep_sandboxes,
            config: SandboxConfig::default(),
            exit_status: ExitStatus::Ok,
            exit_code: 0,
            killing_signal: None,
            stats: String::new(),
        }))
    }
}

pub struct IsolateSandbox {
    id: u8,
    box_dir: PathBuf,
    cache_dir: PathBuf,
    keep: bool,
    config: SandboxConfig,
    exit_status: ExitStatus,
    exit_code: i32,
    killing_signal: Option<i32>,
    stats: String,
}

impl Sandbox for IsolateSandbox {
    fn configure(&mut self, config: SandboxConfig) -> anyhow::Result<()> {
        self.config = config;
        Ok(())
    }

    fn execute(&mut self, argv: &[String]) -> anyhow::Result<()> {
        let meta_path = self.cache_dir.join("isolate.meta");
        let mut command = Command::new("isolate");
        command.args(["-b", &self.id.to_string(), "--cg", "--run"]);

        if self.config.preserve_env {
            command.arg("-e");
        }
        for (key, value) in &self.config.env {
            command.arg("-E").arg(format!("{key}={value}"));
        }
        if self.config.allow_fork {
            command.arg("--processes=16");
        } else {
            command.arg("--processes=1");
        }
        command.arg(format!("--open-files={DEFAULT_OPEN_FILES}"));
        command.arg(format!("--fsize={DEFAULT_FILE_SIZE_KB}"));

        if let Some(cpu) = self.config.cpu_timeout {
            command.arg(format!("-t{:.4}", cpu.0));
        }
        if let Some(wall) = self.config.wall_timeout {
            command.arg(format!("-w{:.4}", wall.0));
        }
        if let Some(mem) = self.config.address_space {
            command.arg(format!("--cg-mem={}", mem.0));
            command.arg(format!("--stack={}", mem.0 / 2));
        }
        for dir in directory_allowances(&self.config) {
            command.arg(format!("--dir={dir}"));
        }

        command.arg("-M").arg(&meta_path);
        command.arg("--silent");
        if let Some(stdout) = &self.config.stdout_redirect {
            command.arg("-o").arg(stdout);
        }
        match (&self.config.stdout_redirect, &self.config.stderr_redirect) {
            (Some(out), Some(err)) if out == err => {
                command.arg("--stderr-to-stdout");
            }
            (_, Some(err)) => {
                command.arg("-r").arg(err);
            }
            _ => {}
        }

        command.arg("--");
        command.args(argv);

        let output = command
            .output()
            .map_err(|e| anyhow::anyhow!("failed to spawn isolate --run: {e}"))?;
        if !output.status.success() && !meta_path.exists() {
            anyhow::bail!(
                "isolate --run failed before producing a meta file: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let meta_content = fs::read_to_string(&meta_path).unwrap_or_default();
        self.apply_meta(&meta_content);
        Ok(())
    }

    fn exit_status(&self) -> ExitStatus {
        self.exit_status
    }

    fn exit_code(&self) -> i32 {
        self.exit_code
    }

    fn killing_signal(&self) -> Option<i32> {
        self.killing_signal
    }

    fn stats(&self) -> String {
        self.stats.clone()
    }

    fn file_exists(&self, name: &str) -> bool {
        self.box_dir.join(name).exists()
    }

    fn read_file_to_string(&self, name: &str, max_len: usize) -> anyhow::Result<String> {
        let mut file = fs::File::open(self.box_dir.join(name))?;
        let mut buf = vec![0u8; max_len];
        let read = file.read(&mut buf)?;
        buf.truncate(read);
        Ok(String::from_utf8(buf)?)
    }

    fn open_file(&self, name: &str) -> anyhow::Result<Box<dyn Read>> {
        Ok(Box::new(fs::File::open(self.box_dir.join(name))?))
    }

    fn create_file_from_store(
        &mut self,
        name: &str,
        store: &dyn Store,
        digest: &Digest,
        executable: bool,
    ) -> anyhow::Result<()> {
        let bytes = store.get(digest)?;
        let path = self.box_dir.join(name);
        fs::write(&path, bytes)?;
        if executable {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
            }
        }
        Ok(())
    }

    fn store_file(&self, name: &str, store: &dyn Store) -> anyhow::Result<Digest> {
        let bytes = fs::read(self.box_dir.join(name))?;
        store.put(&bytes)
    }
}

impl IsolateSandbox {
    /// Parses an isolate meta file (`key:value` per line) into this
    /// sandbox's exit/status fields. Mirrors the teacher's
    /// `process_meta_content`, generalized away from a job-specific result
    /// struct.
    fn apply_meta(&mut self, meta_content: &str) {
        let mut status: Option<String> = None;
        let mut exitcode = 0i32;
        let mut exitsig: Option<i32> = None;
        let mut fields: HashMap<&str, &str> = HashMap::new();

        for line in meta_content.lines() {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key, value);
                match key {
                    "status" => status = Some(value.to_string()),
                    "exitcode" => exitcode = value.parse().unwrap_or(0),
                    "exitsig" => exitsig = value.parse().ok(),
                    _ => {}
                }
            }
        }

        self.exit_code = exitcode;
        self.killing_signal = None;
        self.exit_status = match status.as_deref() {
            None => ExitStatus::Ok,
            Some("RE") => ExitStatus::Ok,
            Some("TO") => ExitStatus::Timeout,
            Some("SG") => {
                self.killing_signal = exitsig;
                ExitStatus::Signal
            }
            Some(_) => ExitStatus::SandboxError,
        };

        let time = fields.get("time").copied().unwrap_or("?");
        let mem = fields.get("cg-mem").or_else(|| fields.get("max-rss")).copied().unwrap_or("?");
        self.stats = format!("isolate box {}: time={time}s mem={mem}KB", self.id);
    }
}

impl Drop for IsolateSandbox {
    fn drop(&mut self) {
        if self.keep {
            log::debug!("keeping sandbox {} for debugging", self.id);
            return;
        }
        let result = Command::new("isolate")
            .args(["-b", &self.id.to_string(), "--cg", "--cleanup"])
            .output();
        match result {
            Ok(output) if output.status.success() => {
                log::debug!("sandbox {} cleaned up", self.id);
            }
            _ => log::error!("sandbox {} failed to clean up", self.id),
        }
    }
}

/// Extracts `--dir=` path prefixes from a file-access policy: at level 2
/// ("permissive") the allow-list entries are directory prefixes passed
/// straight through to isolate; at level 1 ("whitelist") individual
/// in-box file names aren't directory prefixes and are enforced simply by
/// not existing anywhere else the program can reach, so none are emitted.
fn directory_allowances(config: &SandboxConfig) -> Vec<String> {
    if config.file_access.level >= 2 {
        config.file_access.allow.clone()
    } else {
        Vec::new()
    }
}

//! An in-process [`Sandbox`]/[`SandboxFactory`] that needs no `isolate`
//! binary — the crate's own test support, and a reasonable starting point
//! for an embedder's CI before a real sandbox backend is wired up.
//!
//! `FakeSandbox` runs the given argv as an ordinary child process (no
//! resource limits enforced beyond a wall-clock timeout on `execute`) and
//! maps its outcome onto the same [`ExitStatus`] vocabulary a real sandbox
//! would report. It is deliberately not secure — see the module docs on
//! why the teacher's `SimpleRunner` carries the same warning.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use crate::model::Digest;
use crate::store::Store;

use super::{ExitStatus, Sandbox, SandboxConfig, SandboxFactory};

pub struct FakeSandboxFactory {
    root: PathBuf,
}

impl FakeSandboxFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FakeSandboxFactory { root: root.into() }
    }
}

impl SandboxFactory for FakeSandboxFactory {
    fn create(&self, job_id: &str) -> anyhow::Result<Box<dyn Sandbox>> {
        let dir = self.root.join(format!("fake-sandbox-{job_id}-{}", unique_suffix()));
        fs::create_dir_all(&dir)?;
        Ok(Box::new(FakeSandbox {
            dir,
            config: SandboxConfig::default(),
            exit_status: ExitStatus::Ok,
            exit_code: 0,
            killing_signal: None,
            elapsed: Duration::ZERO,
        }))
    }
}

fn unique_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub struct FakeSandbox {
    dir: PathBuf,
    config: SandboxConfig,
    exit_status: ExitStatus,
    exit_code: i32,
    killing_signal: Option<i32>,
    elapsed: Duration,
}

impl Sandbox for FakeSandbox {
    fn configure(&mut self, config: SandboxConfig) -> anyhow::Result<()> {
        self.config = config;
        Ok(())
    }

    fn execute(&mut self, argv: &[String]) -> anyhow::Result<()> {
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("empty argv");
        };

        let mut command = Command::new(program);
        command.args(args).current_dir(&self.dir);
        if !self.config.preserve_env {
            command.env_clear();
        }
        for (key, value) in &self.config.env {
            command.env(key, value);
        }
        let stdout_file = self
            .config
            .stdout_redirect
            .as_ref()
            .map(|name| fs::File::create(self.dir.join(name)))
            .transpose()?;
        match (&stdout_file, &self.config.stdout_redirect, &self.config.stderr_redirect) {
            // Same target file for both streams: share one handle so writes
            // interleave by arrival order instead of each stream truncating
            // the other's offset back to zero.
            (Some(stdout_file), Some(out), Some(err)) if out == err => {
                command.stdout(stdout_file.try_clone()?);
                command.stderr(stdout_file.try_clone()?);
            }
            _ => {
                if let Some(stdout_file) = stdout_file {
                    command.stdout(stdout_file);
                }
                if let Some(stderr) = &self.config.stderr_redirect {
                    command.stderr(fs::File::create(self.dir.join(stderr))?);
                }
            }
        }

        let wall_timeout = self.config.wall_timeout.map(|s| Duration::from_secs_f64(s.0));

        let start = Instant::now();
        let mut child = command.spawn()?;

        let status = match wall_timeout {
            None => Some(child.wait()?),
            Some(limit) => wait_with_timeout(&mut child, limit)?,
        };
        self.elapsed = start.elapsed();

        match status {
            None => {
                let _ = child.kill();
                let _ = child.wait();
                self.exit_status = ExitStatus::Timeout;
                self.exit_code = -1;
                self.killing_signal = None;
            }
            Some(status) => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    if let Some(signal) = status.signal() {
                        self.exit_status = ExitStatus::Signal;
                        self.exit_code = -1;
                        self.killing_signal = Some(signal);
                        return Ok(());
                    }
                }
                self.exit_status = ExitStatus::Ok;
                self.exit_code = status.code().unwrap_or(-1);
                self.killing_signal = None;
            }
        }

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
        format!("fake-sandbox: wall-time {:.3}s", self.elapsed.as_secs_f64())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.dir.join(name).exists()
    }

    fn read_file_to_string(&self, name: &str, max_len: usize) -> anyhow::Result<String> {
        let mut file = fs::File::open(self.dir.join(name))?;
        let mut buf = vec![0u8; max_len];
        let read = file.read(&mut buf)?;
        buf.truncate(read);
        Ok(String::from_utf8(buf)?)
    }

    fn open_file(&self, name: &str) -> anyhow::Result<Box<dyn Read>> {
        Ok(Box::new(fs::File::open(self.dir.join(name))?))
    }

    fn create_file_from_store(
        &mut self,
        name: &str,
        store: &dyn Store,
        digest: &Digest,
        executable: bool,
    ) -> anyhow::Result<()> {
        let bytes = store.get(digest)?;
        let path = self.dir.join(name);
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
        let bytes = fs::read(self.dir.join(name))?;
        store.put(&bytes)
    }
}

impl Drop for FakeSandbox {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("failed to clean up fake sandbox at {}: {e}", self.dir.display());
        }
    }
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> anyhow::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}


use std::collections::HashMap;

use crate::error::{collapse, EnvironmentalAbort, PipelineResult};
use crate::logging::log_multiline;
use crate::model::{CompilationOutcome, Executable, KiloByte, Second};
use crate::sandbox::{self, ExitStatus, FileAccessPolicy, SandboxConfig, SyscallFilterLevel};
use crate::session::Session;

use super::{BatchDriver, COMPILE_ADDRESS_SPACE_KB, COMPILE_CPU_TIMEOUT_SECS, COMPILE_WALL_TIMEOUT_SECS, DIAGNOSTIC_READ_LIMIT};

const EXECUTABLE_NAME: &str = "main";
const COMPILE_STDOUT_NAME: &str = "compile_stdout.txt";
const COMPILE_STDERR_NAME: &str = "compile_stderr.txt";

/// Substitutes the literal `(empty)\n` for a captured stream that is blank
/// once trimmed, matching the original's independent
/// `stdout.strip() == ""` / `stderr.strip() == ""` checks.
fn substitute_if_empty(text: String) -> String {
    if text.trim().is_empty() {
        "(empty)\n".to_string()
    } else {
        text
    }
}

impl<'a> BatchDriver<'a> {
    /// See spec §4.3. Returns `true` once the submission's compilation
    /// record reflects a defined verdict (success or user-visible
    /// failure); `false` only on an environmental problem.
    pub fn compile(&self, session: &mut dyn Session) -> bool {
        collapse("compile", self.try_compile(session))
    }

    fn try_compile(&self, session: &mut dyn Session) -> PipelineResult<bool> {
        let file_count = session.submission_files().len();
        if file_count != 1 {
            session.set_compilation_outcome(
                CompilationOutcome::Fail,
                format!("Submission must contain exactly one source file (found {file_count})"),
            );
            return Ok(true);
        }
        let (source_name, source_digest) = session
            .submission_files()
            .iter()
            .next()
            .map(|(n, d)| (n.clone(), d.clone()))
            .unwrap();

        let language = session
            .submission_language()
            .map(str::to_string)
            .or_else(|| self.compiler.infer_language(&source_name));
        let Some(language) = language else {
            session.set_compilation_outcome(
                CompilationOutcome::Fail,
                format!("Couldn't determine a language for `{source_name}`"),
            );
            return Ok(true);
        };

        let argv = self
            .compiler
            .get_compilation_command(&language, &source_name, EXECUTABLE_NAME)
            .map_err(|e| {
                log::error!("Couldn't build a compile command for language `{language}`: {e}");
                EnvironmentalAbort(e)
            })?;

        let job_id = format!("compile-{}", session.submission_id());
        let mut sandbox = sandbox::create_sandbox(self.sandbox_factory, &job_id)?;
        sandbox::create_file_from_store(sandbox.as_mut(), self.store, &source_name, &source_digest, false)?;

        // The sandbox root doubles as the compiler's scratch space — "."
        // is this codebase's stand-in for "the sandbox root" (also used
        // by `working_directory` and the permissive file-access allow-list
        // below), matching the original's `set_env['TMPDIR'] = sandbox.path`.
        let config = SandboxConfig {
            working_directory: Some(".".to_string()),
            preserve_env: true,
            env: HashMap::from([("TMPDIR".to_string(), ".".to_string())]),
            syscall_filter: SyscallFilterLevel::Off,
            allow_fork: true,
            file_access: FileAccessPolicy::permissive(["/etc", "/lib", "/usr", "."]),
            cpu_timeout: Some(Second(COMPILE_CPU_TIMEOUT_SECS)),
            wall_timeout: Some(Second(COMPILE_WALL_TIMEOUT_SECS)),
            address_space: Some(KiloByte(COMPILE_ADDRESS_SPACE_KB)),
            stdout_redirect: Some(COMPILE_STDOUT_NAME.to_string()),
            stderr_redirect: Some(COMPILE_STDERR_NAME.to_string()),
            ..Default::default()
        };
        sandbox::configure(sandbox.as_mut(), config)?;
        sandbox::execute(sandbox.as_mut(), &argv)?;

        let stats = sandbox.stats();
        let stdout = substitute_if_empty(sandbox::read_file_to_string(
            sandbox.as_ref(),
            COMPILE_STDOUT_NAME,
            DIAGNOSTIC_READ_LIMIT,
        )?);
        let stderr = substitute_if_empty(sandbox::read_file_to_string(
            sandbox.as_ref(),
            COMPILE_STDERR_NAME,
            DIAGNOSTIC_READ_LIMIT,
        )?);
        let diagnostics = format!("Compiler standard output:\n{stdout}Compiler standard error:\n{stderr}");

        match (sandbox.exit_status(), sandbox.exit_code()) {
            (ExitStatus::Ok, 0) => {
                let digest = sandbox::store_file(sandbox.as_ref(), self.store, EXECUTABLE_NAME)?;
                session.stage_executable(Executable {
                    digest,
                    filename: EXECUTABLE_NAME.to_string(),
                });
                let text = format!("{stats}\n{diagnostics}");
                log_multiline(
                    log::Level::Info,
                    &format!("Compilation successfully finished for submission {}:\n{text}", session.submission_id()),
                );
                session.set_compilation_outcome(CompilationOutcome::Ok, text);
                Ok(true)
            }
            (ExitStatus::Ok, code) => {
                let text = format!("Failed to compile (exit code {code}).\n{stats}\n{diagnostics}");
                log_multiline(
                    log::Level::Info,
                    &format!("Compilation failed for submission {}:\n{text}", session.submission_id()),
                );
                session.set_compilation_outcome(CompilationOutcome::Fail, text);
                Ok(true)
            }
            (ExitStatus::Timeout, _) => {
                let text = format!("Failed to compile: timed out.\n{stats}\n{diagnostics}");
                log_multiline(
                    log::Level::Info,
                    &format!("Compilation failed for submission {}:\n{text}", session.submission_id()),
                );
                session.set_compilation_outcome(CompilationOutcome::Fail, text);
                Ok(true)
            }
            (ExitStatus::Signal, _) => {
                let signal = sandbox.killing_signal().unwrap_or(-1);
                let text = format!(
                    "Failed to compile: killed by signal {signal} (possibly a memory limit violation).\n{stats}\n{diagnostics}"
                );
                log_multiline(
                    log::Level::Info,
                    &format!("Compilation failed for submission {}:\n{text}", session.submission_id()),
                );
                session.set_compilation_outcome(CompilationOutcome::Fail, text);
                Ok(true)
            }
            (ExitStatus::SandboxError, _) => {
                log::error!("sandbox error compiling submission {}", session.submission_id());
                Ok(false)
            }
            (ExitStatus::ForbiddenSyscall, _) => {
                log::error!(
                    "forbidden syscall compiling submission {} (policy too strict)",
                    session.submission_id()
                );
                Ok(false)
            }
            (ExitStatus::FileAccess, _) => {
                log::error!(
                    "forbidden file access compiling submission {} (policy too strict)",
                    session.submission_id()
                );
                Ok(false)
            }
        }
    }
}

use std::io::BufReader;

use crate::ansi::filter_ansi_escape;
use crate::comparator::white_diff;
use crate::error::{collapse, EnvironmentalAbort, PipelineResult};
use crate::model::{Digest, Evaluation, Second, Testcase};
use crate::sandbox::{self, ExitStatus, FileAccessPolicy, Sandbox, SandboxConfig, SyscallFilterLevel};
use crate::session::Session;

use super::{BatchDriver, DIAGNOSTIC_READ_LIMIT};

const INPUT_NAME: &str = "input.txt";
const OUTPUT_NAME: &str = "output.txt";
const EXPECTED_NAME: &str = "res.txt";
const GRADER_NAME: &str = "grader";

impl<'a> BatchDriver<'a> {
    /// See spec §4.6. Requires a compiled executable; otherwise there is
    /// nothing to evaluate and no evaluation records are written.
    pub fn execute(&self, session: &mut dyn Session) -> bool {
        collapse("evaluate", self.try_execute(session))
    }

    fn try_execute(&self, session: &mut dyn Session) -> PipelineResult<bool> {
        if session.executable().is_none() {
            log::error!(
                "execute() called without a compiled executable for submission {}",
                session.submission_id()
            );
            return Ok(false);
        }

        let testcases = session.task().testcases.clone();
        session.ensure_evaluation_slots(testcases.len());

        for testcase in &testcases {
            if !self.execute_single(session, testcase.index) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// See spec §4.4. Updates `evaluations[index]`. Returns `true` iff a
    /// defined verdict was produced for this testcase.
    pub fn execute_single(&self, session: &mut dyn Session, index: usize) -> bool {
        collapse("evaluate testcase", self.try_execute_single(session, index))
    }

    fn try_execute_single(&self, session: &mut dyn Session, index: usize) -> PipelineResult<bool> {
        let testcase = session
            .task()
            .testcases
            .iter()
            .find(|t| t.index == index)
            .cloned()
            .ok_or_else(|| EnvironmentalAbort(anyhow::anyhow!("no such testcase index {index}")))?;
        let time_limit = session.task().time_limit;
        let memory_limit = session.task().memory_limit;
        let graders = session.task().graders.clone();
        let executable = session
            .executable()
            .cloned()
            .ok_or_else(|| EnvironmentalAbort(anyhow::anyhow!("no executable staged")))?;

        session.ensure_evaluation_slots(index + 1);

        let job_id = format!("test-{}-{index}", session.submission_id());
        let mut sandbox = sandbox::create_sandbox(self.sandbox_factory, &job_id)?;
        sandbox::create_file_from_store(
            sandbox.as_mut(),
            self.store,
            &executable.filename,
            &executable.digest,
            true,
        )?;
        sandbox::create_file_from_store(sandbox.as_mut(), self.store, INPUT_NAME, &testcase.input, false)?;

        let config = SandboxConfig {
            working_directory: Some(".".to_string()),
            syscall_filter: SyscallFilterLevel::Strict,
            cpu_timeout: Some(time_limit),
            // A wall-clock backstop a little past the CPU limit, the same
            // slack the teacher's isolate invocation used, so a sandbox
            // that can't charge CPU time precisely (or a program that
            // sleeps instead of spinning) still gets cut off.
            wall_timeout: Some(Second(time_limit.0 + 0.5)),
            address_space: Some(memory_limit),
            file_access: FileAccessPolicy::whitelist([INPUT_NAME, OUTPUT_NAME, "/proc/self/exe", "/proc/meminfo"]),
            extra_syscalls: vec!["getrlimit".to_string(), "rt_sigaction".to_string()],
            // The candidate reads/writes input.txt/output.txt as ordinary
            // files (see SPEC_FULL.md's fixed-filenames contract) — these
            // redirects only capture its actual stdout/stderr streams for
            // diagnostics, they are not how output.txt gets produced.
            stdout_redirect: Some("stdout.txt".to_string()),
            stderr_redirect: Some("stderr.txt".to_string()),
            ..Default::default()
        };
        sandbox::configure(sandbox.as_mut(), config)?;
        sandbox::execute(sandbox.as_mut(), &[format!("./{}", executable.filename)])?;

        let verdict = match sandbox.exit_status() {
            ExitStatus::Timeout => Some((0.0, "Execution timed out".to_string())),
            ExitStatus::Signal => {
                let signal = sandbox.killing_signal().unwrap_or(-1);
                Some((0.0, format!("Execution killed with signal {signal}")))
            }
            ExitStatus::ForbiddenSyscall => Some((0.0, "forbidden syscall".to_string())),
            ExitStatus::FileAccess => Some((0.0, "forbidden file access".to_string())),
            ExitStatus::SandboxError => {
                log::error!(
                    "sandbox error evaluating testcase {index} of submission {}",
                    session.submission_id()
                );
                return Ok(false);
            }
            ExitStatus::Ok if !sandbox.file_exists(OUTPUT_NAME) => {
                Some((0.0, "Execution didn't produce file output.txt".to_string()))
            }
            ExitStatus::Ok => None,
        };

        if let Some((outcome, text)) = verdict {
            session.stage_evaluation(Evaluation {
                index,
                outcome: Some(outcome),
                text,
            });
            return Ok(true);
        }

        let (outcome, text) = if graders.is_empty() {
            self.score_with_white_diff(sandbox.as_mut(), &testcase)?
        } else if graders.len() == 1 {
            let grader_digest = graders.values().next().unwrap();
            self.score_with_grader(sandbox.as_mut(), grader_digest, &testcase)?
        } else {
            log::error!(
                "task {} has {} graders attached; multi-grader tasks are unsupported",
                session.task().id,
                graders.len()
            );
            return Ok(false);
        };

        session.stage_evaluation(Evaluation {
            index,
            outcome: Some(outcome),
            text,
        });
        Ok(true)
    }

    fn score_with_white_diff(&self, sandbox: &mut dyn Sandbox, testcase: &Testcase) -> PipelineResult<(f64, String)> {
        sandbox::create_file_from_store(sandbox, self.store, EXPECTED_NAME, &testcase.output, false)?;
        let output = sandbox::open_file(sandbox, OUTPUT_NAME)?;
        let expected = sandbox::open_file(sandbox, EXPECTED_NAME)?;

        let equal = white_diff(BufReader::new(output), BufReader::new(expected))
            .map_err(EnvironmentalAbort)?;

        if equal {
            Ok((1.0, "Output file is correct".to_string()))
        } else {
            Ok((0.0, "Output file isn't correct".to_string()))
        }
    }

    fn score_with_grader(
        &self,
        sandbox: &mut dyn Sandbox,
        grader_digest: &Digest,
        testcase: &Testcase,
    ) -> PipelineResult<(f64, String)> {
        sandbox::create_file_from_store(sandbox, self.store, EXPECTED_NAME, &testcase.output, false)?;
        sandbox::create_file_from_store(sandbox, self.store, GRADER_NAME, grader_digest, true)?;

        let config = SandboxConfig {
            working_directory: Some(".".to_string()),
            syscall_filter: SyscallFilterLevel::Strict,
            file_access: FileAccessPolicy::whitelist([INPUT_NAME, EXPECTED_NAME, OUTPUT_NAME]),
            stdout_redirect: Some("grader_stdout.txt".to_string()),
            stderr_redirect: Some("grader_stderr.txt".to_string()),
            ..Default::default()
        };
        sandbox::configure(sandbox, config)?;
        sandbox::execute(
            sandbox,
            &[
                format!("./{GRADER_NAME}"),
                INPUT_NAME.to_string(),
                EXPECTED_NAME.to_string(),
                OUTPUT_NAME.to_string(),
            ],
        )?;

        let stdout = sandbox::read_file_to_string(sandbox, "grader_stdout.txt", DIAGNOSTIC_READ_LIMIT)?;
        let stderr = sandbox::read_file_to_string(sandbox, "grader_stderr.txt", DIAGNOSTIC_READ_LIMIT)?;

        let outcome: f64 = stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| EnvironmentalAbort(anyhow::anyhow!("grader stdout didn't start with a numeric outcome")))?;
        if !(0.0..=1.0).contains(&outcome) {
            return Err(EnvironmentalAbort(anyhow::anyhow!(
                "grader outcome {outcome} outside [0,1]"
            )));
        }

        let text = stderr.lines().next().map(filter_ansi_escape).unwrap_or_default();
        Ok((outcome, text))
    }
}

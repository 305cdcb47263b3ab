//! End-to-end scenarios for the Batch strategy (spec §8), driven entirely
//! through the public collaborator traits against the in-process test
//! doubles: `FakeSandboxFactory`, `InMemoryStore`, `StaticCatalogue`.

use std::collections::HashMap;

use oj_core::compiler::{CompilerCatalogue, LanguageSpec, StaticCatalogue};
use oj_core::dispatch::{dispatch, Driver};
use oj_core::model::{CompilationOutcome, KiloByte, Second, Submission, Task, Testcase};
use oj_core::sandbox::fake::FakeSandboxFactory;
use oj_core::session::SubmissionSession;
use oj_core::store::{InMemoryStore, Store};

/// A fake "sh" language whose compile command is just `cp` — lets these
/// tests exercise the full sandbox lifecycle without a real compiler.
fn catalogue() -> StaticCatalogue {
    StaticCatalogue::new().with_language(
        "sh",
        LanguageSpec {
            source_suffix: ".sh".to_string(),
            command: vec!["cp".to_string(), "%INPUT%".to_string(), "%OUTPUT%".to_string()],
        },
    )
}

fn failing_catalogue() -> StaticCatalogue {
    StaticCatalogue::new().with_language(
        "sh",
        LanguageSpec {
            source_suffix: ".sh".to_string(),
            command: vec!["false".to_string()],
        },
    )
}

struct Fixture {
    store: InMemoryStore,
    factory: FakeSandboxFactory,
    sandbox_root: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let sandbox_root = tempfile::tempdir().unwrap().into_path();
        Fixture {
            store: InMemoryStore::new(),
            factory: FakeSandboxFactory::new(sandbox_root.clone()),
            sandbox_root,
        }
    }

    fn factory_root(&self) -> &std::path::Path {
        &self.sandbox_root
    }
}

fn one_testcase_task(time_limit_secs: f64, input: &str, expected: &str, fixture: &Fixture) -> Task {
    let input_digest = fixture.store.put(input.as_bytes()).unwrap();
    let output_digest = fixture.store.put(expected.as_bytes()).unwrap();
    Task {
        id: "sum".to_string(),
        task_type: "batch".to_string(),
        testcases: vec![Testcase {
            index: 0,
            input: input_digest,
            output: output_digest,
        }],
        graders: HashMap::new(),
        time_limit: Second(time_limit_secs),
        memory_limit: KiloByte(262_144),
    }
}

fn submission_with_program(fixture: &Fixture, program: &str) -> Submission {
    let digest = fixture.store.put(program.as_bytes()).unwrap();
    let mut files = HashMap::new();
    files.insert("main.sh".to_string(), digest);
    Submission {
        id: "sub-1".to_string(),
        task_id: "sum".to_string(),
        files,
        language: Some("sh".to_string()),
        ..Submission::default()
    }
}

fn driver<'a>(task: &Task, fixture: &'a Fixture, catalogue: &'a dyn CompilerCatalogue) -> Driver<'a> {
    dispatch(&task.task_type, &fixture.store, &fixture.factory, catalogue).expect("batch dispatches")
}

const SUM_PROGRAM: &str = "#!/bin/sh\nset -- $(cat input.txt)\necho \"$(( $1 + $2 ))\" > output.txt\n";

#[test]
fn happy_path_no_grader() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert_eq!(session.submission().compilation_outcome, Some(CompilationOutcome::Ok));
    assert!(session.submission().executable.is_some());

    assert!(driver.execute(&mut session));
    assert_eq!(session.submission().evaluations.len(), 1);
    assert_eq!(session.submission().evaluations[0].outcome, Some(1.0));
    assert_eq!(session.submission().evaluations[0].text, "Output file is correct");
}

#[test]
fn whitespace_tolerance() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let program = "#!/bin/sh\nset -- $(cat input.txt)\nprintf '  %s\\n\\n' \"$(( $1 + $2 ))\" > output.txt\n";
    let mut submission = submission_with_program(&fixture, program);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(driver.execute(&mut session));
    assert_eq!(session.submission().evaluations[0].outcome, Some(1.0));
}

#[test]
fn wrong_answer() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let program = "#!/bin/sh\nset -- $(cat input.txt)\necho \"$(( $1 + $2 + 1 ))\" > output.txt\n";
    let mut submission = submission_with_program(&fixture, program);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(driver.execute(&mut session));
    assert_eq!(session.submission().evaluations[0].outcome, Some(0.0));
    assert_eq!(session.submission().evaluations[0].text, "Output file isn't correct");
}

#[test]
fn timeout() {
    let fixture = Fixture::new();
    let task = one_testcase_task(1.0, "3 4\n", "7\n", &fixture);
    let program = "#!/bin/sh\nsleep 5\necho 7 > output.txt\n";
    let mut submission = submission_with_program(&fixture, program);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(driver.execute(&mut session));
    assert_eq!(session.submission().evaluations[0].outcome, Some(0.0));
    assert_eq!(session.submission().evaluations[0].text, "Execution timed out");
}

#[test]
fn compile_error() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = failing_catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert_eq!(session.submission().compilation_outcome, Some(CompilationOutcome::Fail));
    assert!(session.submission().compilation_text.starts_with("Failed"));
    assert!(session.submission().executable.is_none());
}

#[test]
fn grader_path() {
    let fixture = Fixture::new();
    let mut task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let grader_script = "#!/bin/sh\necho 0.5\necho \"partial credit\" 1>&2\n";
    let grader_digest = fixture.store.put(grader_script.as_bytes()).unwrap();
    task.graders.insert("grader".to_string(), grader_digest);

    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(driver.execute(&mut session));
    assert_eq!(session.submission().evaluations[0].outcome, Some(0.5));
    assert_eq!(session.submission().evaluations[0].text, "partial credit");
}

#[test]
fn multiple_graders_are_rejected_as_environmental() {
    let fixture = Fixture::new();
    let mut task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let grader_script = "#!/bin/sh\necho 0.5\necho \"partial credit\" 1>&2\n";
    task.graders.insert("grader-a".to_string(), fixture.store.put(grader_script.as_bytes()).unwrap());
    task.graders.insert("grader-b".to_string(), fixture.store.put(grader_script.as_bytes()).unwrap());

    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(!driver.execute(&mut session));
}

#[test]
fn sandbox_is_released_after_compile_and_execute() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(driver.compile(&mut session));
    assert!(driver.execute(&mut session));

    let leftover = std::fs::read_dir(fixture.factory_root())
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    assert!(!leftover, "every fake sandbox directory should be cleaned up on drop");
}

#[test]
fn execute_without_compiled_executable_is_environmental() {
    let fixture = Fixture::new();
    let task = one_testcase_task(2.0, "3 4\n", "7\n", &fixture);
    let mut submission = submission_with_program(&fixture, SUM_PROGRAM);
    let catalogue = catalogue();
    let driver = driver(&task, &fixture, &catalogue);

    let mut session = SubmissionSession::new(&task, &mut submission);
    assert!(!driver.execute(&mut session));
    assert_eq!(session.submission().evaluations.len(), 0);
}

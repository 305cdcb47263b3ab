use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque content-addressed handle into the Store.
///
/// Two submissions whose source files hash to the same digest share
/// storage; the core never interprets the digest's bytes itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub String);

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Digest(value)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Digest(value.to_string())
    }
}

/// A duration expressed in whole microseconds, as reported by a sandbox's
/// wall-clock accounting.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct MicroSecond(pub u32);

/// A duration expressed as a real number of seconds, the unit task and
/// testcase time limits are authored in.
#[derive(Deserialize, Serialize, Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Second(pub f64);

impl From<MicroSecond> for Second {
    fn from(value: MicroSecond) -> Self {
        Second(value.0 as f64 / 1_000_000.0)
    }
}

impl From<Second> for MicroSecond {
    fn from(value: Second) -> Self {
        MicroSecond((value.0 * 1_000_000.0) as u32)
    }
}

/// A quantity of memory expressed in kilobytes, the unit task and testcase
/// memory limits are authored in.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct KiloByte(pub u32);

/// A contest task. Read-only for the core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Task {
    pub id: String,
    /// Only the literal tag `"batch"` is recognized by the dispatcher
    /// (see [`crate::dispatch::dispatch`]); any other value yields no
    /// driver.
    pub task_type: String,
    pub testcases: Vec<Testcase>,
    /// name -> digest. The Batch strategy supports at most one grader;
    /// more than one is treated as an environmental condition rather than
    /// an arbitrary pick (see DESIGN.md).
    pub graders: HashMap<String, Digest>,
    pub time_limit: Second,
    pub memory_limit: KiloByte,
}

/// A single (input, expected-output) pair with an ordinal index.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Testcase {
    pub index: usize,
    pub input: Digest,
    pub output: Digest,
}

/// A contestant's source submission for one task.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub id: String,
    pub task_id: String,
    /// filename -> digest. Exactly one entry is valid for the Batch
    /// strategy; anything else fails compilation as a user error.
    pub files: HashMap<String, Digest>,
    /// Declared language, if the caller already knows it; otherwise the
    /// compile pipeline infers it from the lone source file's name via
    /// [`crate::compiler::CompilerCatalogue::infer_language`].
    pub language: Option<String>,
    pub compilation_outcome: Option<CompilationOutcome>,
    pub compilation_text: String,
    pub executable: Option<Executable>,
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationOutcome {
    Ok,
    Fail,
}

impl CompilationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CompilationOutcome::Ok => "ok",
            CompilationOutcome::Fail => "fail",
        }
    }
}

/// The artifact produced by a successful compile, linked to its owning
/// submission.
#[derive(Debug, Clone)]
pub struct Executable {
    pub digest: Digest,
    pub filename: String,
}

/// One testcase's outcome. Created empty (`outcome: None`) before
/// execution and filled in by the evaluate pipeline.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub index: usize,
    pub outcome: Option<f64>,
    pub text: String,
}

impl Evaluation {
    pub fn empty(index: usize) -> Self {
        Evaluation {
            index,
            outcome: None,
            text: String::new(),
        }
    }
}

//! The compiler catalogue collaborator (spec §6.2) — a deterministic, pure
//! mapping from a source-language tag to a concrete compile command.
//!
//! Grounded in the teacher crate's `OneLanguageConfig` (`config.rs`) and
//! `apply_template_and_join` (`sandbox/compile.rs`): a language is a name,
//! an expected source file name, and a command template in which
//! `%INPUT%`/`%OUTPUT%` are substituted for the actual source/executable
//! names before the whole thing is run through `/bin/sh -c`.

use std::collections::HashMap;

/// Maps a language tag to the argv that compiles `source_name` into
/// `executable_name` inside a sandbox. Deterministic and pure: the same
/// three arguments always produce the same argv.
pub trait CompilerCatalogue: Send + Sync {
    fn get_compilation_command(
        &self,
        language: &str,
        source_name: &str,
        executable_name: &str,
    ) -> anyhow::Result<Vec<String>>;

    /// Infers a language tag from a submitted file's name (by expected
    /// suffix), for submissions that don't declare their language
    /// up front. Returns `None` when no configured language recognizes
    /// the name.
    fn infer_language(&self, filename: &str) -> Option<String>;
}

/// One language's compile recipe, keyed by tag in [`StaticCatalogue`].
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    /// Expected source file suffix, e.g. `.cpp` — used both to recognize
    /// a submission's language and to pick the executable name (the
    /// source name with this suffix stripped).
    pub source_suffix: String,
    /// Command template; `%INPUT%` and `%OUTPUT%` are replaced with the
    /// staged source/executable names.
    pub command: Vec<String>,
}

/// A fixed, in-process compiler catalogue — the production collaborator
/// for deployments that configure a static set of languages rather than
/// loading one from a registry.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogue {
    languages: HashMap<String, LanguageSpec>,
}

impl StaticCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, tag: impl Into<String>, spec: LanguageSpec) -> Self {
        self.languages.insert(tag.into(), spec);
        self
    }
}

impl CompilerCatalogue for StaticCatalogue {
    fn get_compilation_command(
        &self,
        language: &str,
        source_name: &str,
        executable_name: &str,
    ) -> anyhow::Result<Vec<String>> {
        let spec = self
            .languages
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("no compiler configured for language `{language}`"))?;

        let command = apply_template_and_join(&spec.command, source_name, executable_name);
        Ok(vec!["/bin/sh".to_string(), "-c".to_string(), command])
    }

    fn infer_language(&self, filename: &str) -> Option<String> {
        self.languages
            .iter()
            .find(|(_, spec)| filename.ends_with(&spec.source_suffix))
            .map(|(tag, _)| tag.clone())
    }
}

/// Applies `%INPUT%`/`%OUTPUT%` substitutions to a command template and
/// joins it into a single shell command string.
fn apply_template_and_join(template: &[String], source_name: &str, executable_name: &str) -> String {
    template
        .iter()
        .map(|part| part.replace("%INPUT%", source_name).replace("%OUTPUT%", executable_name))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> StaticCatalogue {
        StaticCatalogue::new().with_language(
            "cpp",
            LanguageSpec {
                source_suffix: ".cpp".to_string(),
                command: vec![
                    "g++".to_string(),
                    "-O2".to_string(),
                    "-o".to_string(),
                    "%OUTPUT%".to_string(),
                    "%INPUT%".to_string(),
                ],
            },
        )
    }

    #[test]
    fn substitutes_input_and_output() {
        let argv = catalogue()
            .get_compilation_command("cpp", "main.cpp", "main")
            .unwrap();
        assert_eq!(argv[0], "/bin/sh");
        assert_eq!(argv[2], "g++ -O2 -o main main.cpp");
    }

    #[test]
    fn unknown_language_is_an_error() {
        assert!(
            catalogue()
                .get_compilation_command("brainfuck", "main.bf", "main")
                .is_err()
        );
    }

    #[test]
    fn infers_language_from_suffix() {
        assert_eq!(catalogue().infer_language("main.cpp"), Some("cpp".to_string()));
        assert_eq!(catalogue().infer_language("main.py"), None);
    }
}

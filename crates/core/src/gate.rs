//! Confirmation gate for destructive directory operations.
//!
//! A directory that should be empty at the start of a run (the staging or the
//! archive subdirectory) may still hold files from an earlier run. The gate
//! stops and asks the operator what to do, and keeps asking until one of the
//! offered answers is given.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::{info, warn};

use crate::errors::SyncError;
use crate::remote::CancelFlag;

/// Source of operator answers.
///
/// The CLI reads from the console; tests supply a scripted responder.
pub trait Prompter {
    /// Show `question` and return the raw answer.
    fn ask(&self, question: &str) -> io::Result<String>;
}

/// An answer the gate can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChoice {
    /// Delete everything in the directory and continue.
    Clear,
    /// Continue with the directory as it is.
    Keep,
    /// Stop the run.
    Abort,
}

impl GateChoice {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Keep => "keep",
            Self::Abort => "abort",
        }
    }

    fn matches(self, answer: &str) -> bool {
        let keyword = self.keyword();
        answer == keyword || answer == &keyword[..1]
    }
}

/// Choices offered for the staging directory at the sync entry point.
pub const STAGING_CHOICES: &[GateChoice] = &[GateChoice::Clear, GateChoice::Keep, GateChoice::Abort];

/// Choices offered for the archive directory before retention.
pub const ARCHIVE_CHOICES: &[GateChoice] = &[GateChoice::Clear, GateChoice::Abort];

/// Guard that asks before a run reuses a non-empty directory.
pub struct ConfirmationGate<'a> {
    prompter: &'a dyn Prompter,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(prompter: &'a dyn Prompter) -> Self {
        Self {
            prompter,
            cancel: None,
        }
    }

    /// Fail with [`SyncError::Cancelled`] when `cancel` is raised while the
    /// operator is being asked.
    pub fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Check `dir` and resolve a non-empty directory with the operator.
    ///
    /// Returns `None` when the directory was already empty, otherwise the
    /// operator's choice after it has been carried out. [`GateChoice::Abort`]
    /// is returned to the caller, which decides how to fail.
    pub fn check(&self, dir: &Path, choices: &[GateChoice]) -> Result<Option<GateChoice>, SyncError> {
        if is_empty_dir(dir)? {
            return Ok(None);
        }

        warn!(dir = %dir.display(), "directory is not empty");
        let choice = self.choose(&question_for(dir, choices), choices)?;
        info!(dir = %dir.display(), choice = choice.keyword(), "operator decision");

        if choice == GateChoice::Clear {
            clear_dir(dir)?;
            info!(dir = %dir.display(), "directory cleared");
        }
        Ok(Some(choice))
    }

    /// Ask until the answer is one of `choices`.
    pub fn choose(&self, question: &str, choices: &[GateChoice]) -> Result<GateChoice, SyncError> {
        loop {
            let answer = self.prompter.ask(question);
            if self.is_cancelled() {
                info!("interrupted at the prompt");
                return Err(SyncError::Cancelled);
            }
            let answer = answer.map_err(SyncError::Prompt)?.trim().to_lowercase();
            if let Some(choice) = choices.iter().copied().find(|c| c.matches(&answer)) {
                return Ok(choice);
            }
            warn!(answer = %answer, "unrecognized answer, asking again");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn question_for(dir: &Path, choices: &[GateChoice]) -> String {
    let options = choices
        .iter()
        .map(|c| format!("{} ({})", c.keyword(), &c.keyword()[..1]))
        .collect::<Vec<_>>()
        .join(" / ");
    format!("{} is not empty. {}?", dir.display(), options)
}

fn is_empty_dir(dir: &Path) -> Result<bool, SyncError> {
    let mut entries = fs::read_dir(dir).map_err(|source| SyncError::DirectoryInaccessible {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(entries.next().is_none())
}

/// Recursively delete everything inside `dir`, keeping `dir` itself.
pub fn clear_dir(dir: &Path) -> Result<(), SyncError> {
    let to_error = |source: io::Error| SyncError::ClearDirectory {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(to_error)? {
        let path = entry.map_err(to_error)?.path();
        let file_type = fs::symlink_metadata(&path).map_err(to_error)?.file_type();
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(to_error)?;
        } else {
            fs::remove_file(&path).map_err(to_error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;

    use super::Prompter;

    /// Replays canned answers and records the questions asked.
    pub struct ScriptedPrompter {
        answers: RefCell<VecDeque<String>>,
        pub questions: RefCell<Vec<String>>,
    }

    impl ScriptedPrompter {
        pub fn new(answers: &[&str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
                questions: RefCell::new(Vec::new()),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&self, question: &str) -> io::Result<String> {
            self.questions.borrow_mut().push(question.to_string());
            self.answers
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedPrompter;
    use super::*;

    #[test]
    fn test_empty_directory_is_not_prompted() {
        let dir = tempfile::tempdir().unwrap();
        let prompter = ScriptedPrompter::new(&[]);
        let gate = ConfirmationGate::new(&prompter);

        let result = gate.check(dir.path(), STAGING_CHOICES).unwrap();
        assert_eq!(result, None);
        assert!(prompter.questions.borrow().is_empty());
    }

    #[test]
    fn test_reprompts_until_recognized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A_1.acd"), "x").unwrap();
        let prompter = ScriptedPrompter::new(&["yes", "", "maybe", "  KEEP "]);
        let gate = ConfirmationGate::new(&prompter);

        let result = gate.check(dir.path(), STAGING_CHOICES).unwrap();
        assert_eq!(result, Some(GateChoice::Keep));
        assert_eq!(prompter.questions.borrow().len(), 4);
        assert!(dir.path().join("A_1.acd").exists());
    }

    #[test]
    fn test_choice_not_offered_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A_1.acd"), "x").unwrap();
        // "keep" is not an archive choice, so the gate asks again.
        let prompter = ScriptedPrompter::new(&["k", "a"]);
        let gate = ConfirmationGate::new(&prompter);

        let result = gate.check(dir.path(), ARCHIVE_CHOICES).unwrap();
        assert_eq!(result, Some(GateChoice::Abort));
        assert_eq!(prompter.questions.borrow().len(), 2);
    }

    #[test]
    fn test_clear_removes_nested_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A_1.acd"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("sub/deeper/B_2.acd"), "y").unwrap();

        let prompter = ScriptedPrompter::new(&["c"]);
        let gate = ConfirmationGate::new(&prompter);

        let result = gate.check(dir.path(), STAGING_CHOICES).unwrap();
        assert_eq!(result, Some(GateChoice::Clear));
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_prompter_failure_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A_1.acd"), "x").unwrap();
        let prompter = ScriptedPrompter::new(&["what"]);
        let gate = ConfirmationGate::new(&prompter);

        let err = gate.check(dir.path(), STAGING_CHOICES).unwrap_err();
        assert!(matches!(err, SyncError::Prompt(_)));
    }

    /// Answers "keep" but raises the cancel flag first, like a Ctrl+C typed
    /// while the question is on screen.
    struct InterruptedPrompter(CancelFlag);

    impl Prompter for InterruptedPrompter {
        fn ask(&self, _question: &str) -> io::Result<String> {
            self.0.store(true, Ordering::SeqCst);
            Ok("keep".into())
        }
    }

    #[test]
    fn test_cancel_during_prompt_stops_gate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A_1.acd"), "x").unwrap();
        let cancel = crate::remote::cancel_flag();
        let prompter = InterruptedPrompter(cancel.clone());

        let err = ConfirmationGate::new(&prompter)
            .with_cancel(&cancel)
            .check(dir.path(), STAGING_CHOICES)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(dir.path().join("A_1.acd").exists());

        // Without a flag attached the answer is taken as given.
        let result = ConfirmationGate::new(&prompter)
            .check(dir.path(), STAGING_CHOICES)
            .unwrap();
        assert_eq!(result, Some(GateChoice::Keep));
    }

    #[test]
    fn test_missing_directory_is_inaccessible() {
        let dir = tempfile::tempdir().unwrap();
        let prompter = ScriptedPrompter::new(&[]);
        let gate = ConfirmationGate::new(&prompter);

        let err = gate.check(&dir.path().join("absent"), STAGING_CHOICES).unwrap_err();
        assert!(matches!(err, SyncError::DirectoryInaccessible { .. }));
    }
}

//! Console prompter for the confirmation gate.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use dialoguer::Input;

use compsync_core::Prompter;

/// Set while a question is waiting for the operator.
static PROMPT_OPEN: AtomicBool = AtomicBool::new(false);

/// `true` while [`ConsolePrompter`] is blocked on terminal input.
pub fn is_open() -> bool {
    PROMPT_OPEN.load(Ordering::SeqCst)
}

struct OpenPrompt;

impl OpenPrompt {
    fn enter() -> Self {
        PROMPT_OPEN.store(true, Ordering::SeqCst);
        OpenPrompt
    }
}

impl Drop for OpenPrompt {
    fn drop(&mut self) {
        PROMPT_OPEN.store(false, Ordering::SeqCst);
    }
}

/// Reads operator answers from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn ask(&self, question: &str) -> io::Result<String> {
        let _open = OpenPrompt::enter();
        Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_prompt_marker() {
        assert!(!is_open());
        {
            let _open = OpenPrompt::enter();
            assert!(is_open());
        }
        assert!(!is_open());
    }
}

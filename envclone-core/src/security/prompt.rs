//! Operator prompt capability.
//!
//! Confirmation prompts block on operator input with no timeout. They are
//! modeled as an async capability so the policy code can be driven by a
//! scripted prompt in tests and by the terminal in the binary.

use crate::error::EnvCloneError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Source of operator answers.
///
/// `Ok(None)` means the input stream ended (treated as cancellation).
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Asks a free-form question and returns the raw answer line.
    async fn ask(&self, question: &str) -> crate::Result<Option<String>>;

    /// Asks for a value without echoing it.
    async fn ask_secret(&self, question: &str) -> crate::Result<Option<String>>;

    /// Shows informational text to the operator.
    fn show(&self, text: &str);
}

/// Interactive prompt on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

fn print_question(question: &str) -> crate::Result<()> {
    print!("{}", question);
    io::stdout()
        .flush()
        .map_err(|e| EnvCloneError::prompt(format!("Failed to flush stdout: {}", e)))
}

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn ask(&self, question: &str) -> crate::Result<Option<String>> {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            print_question(&question)?;
            let mut line = String::new();
            let read = io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| EnvCloneError::prompt(format!("Failed to read answer: {}", e)))?;
            Ok((read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string()))
        })
        .await
        .map_err(|e| EnvCloneError::prompt(format!("Prompt task failed: {}", e)))?
    }

    async fn ask_secret(&self, question: &str) -> crate::Result<Option<String>> {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            print_question(&question)?;
            match rpassword::read_password() {
                Ok(answer) => Ok(Some(answer)),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
                Err(e) => Err(EnvCloneError::prompt(format!("Failed to read keyword: {}", e))),
            }
        })
        .await
        .map_err(|e| EnvCloneError::prompt(format!("Prompt task failed: {}", e)))?
    }

    fn show(&self, text: &str) {
        println!("{}", text);
    }
}

/// Prompt that replays canned answers and records everything shown.
///
/// Once the answers run out every further question sees end of input.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// Creates a prompt answering with `answers` in order.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked and text shown so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn log(&self, line: &str) {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }

    fn next_answer(&self) -> Option<String> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&self, question: &str) -> crate::Result<Option<String>> {
        self.log(question);
        Ok(self.next_answer())
    }

    async fn ask_secret(&self, question: &str) -> crate::Result<Option<String>> {
        self.log(question);
        Ok(self.next_answer())
    }

    fn show(&self, text: &str) {
        self.log(text);
    }
}

//! Operator confirmation before destructive work

use dialoguer::Input;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Asks the operator to approve an action
pub trait Confirm: Send + Sync {
    /// Returns true only if the operator explicitly agreed
    fn confirm(&self, prompt: &str) -> bool;
}

/// Only an exact `Y` counts as agreement; the line terminator is ignored
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim_end_matches(['\n', '\r']) == "Y"
}

/// The question as shown to the operator
pub fn prompt_text(prompt: &str) -> String {
    format!("{} [Y/n]", prompt)
}

/// Prompts on the terminal and reads a line of answer
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let answer = Input::<String>::new()
            .with_prompt(prompt_text(prompt))
            .allow_empty(true)
            .interact_text();

        match answer {
            Ok(answer) => is_affirmative(&answer),
            Err(e) => {
                log::warn!("failed to read confirmation: {}", e);
                false
            }
        }
    }
}

/// Agrees to everything without asking (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        log::info!("{} Y (assumed)", prompt_text(prompt));
        true
    }
}

/// Answers from a fixed script and records every prompt; runs out as "no"
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(false)
    }
}

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::debug;

use cfbs_core::input::Answerer;
use cfbs_core::CfbsError;

pub const YES_NO_CHOICES: &[&str] = &["yes", "y", "no", "n"];

/// Asks the user questions on the terminal, or answers them with defaults.
#[derive(Debug)]
pub struct Prompter {
    non_interactive: bool,
    scripted: Option<VecDeque<String>>,
}

impl Prompter {
    pub fn new(non_interactive: bool) -> Self {
        Self {
            non_interactive,
            scripted: None,
        }
    }

    /// A prompter answering from a fixed list, then with defaults.
    #[cfg(test)]
    pub fn scripted(answers: &[&str]) -> Self {
        Self {
            non_interactive: false,
            scripted: Some(answers.iter().map(|a| a.to_string()).collect()),
        }
    }

    pub fn non_interactive(&self) -> bool {
        self.non_interactive
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        if let Some(answers) = &mut self.scripted {
            return Ok(answers.pop_front());
        }
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Asks `question`, retrying until the answer is one of `choices`.
    ///
    /// An empty answer selects `default`. In non-interactive mode the default
    /// is returned without asking.
    pub fn prompt(
        &mut self,
        question: &str,
        choices: Option<&[&str]>,
        default: Option<&str>,
    ) -> Result<String> {
        if self.non_interactive {
            return default.map(str::to_string).ok_or_else(|| {
                CfbsError::user(format!(
                    "Cannot answer '{question}' in non-interactive mode"
                ))
                .into()
            });
        }

        let mut prompt = question.to_string();
        if let Some(choices) = choices {
            prompt.push_str(&format!(" [{}]", choices.join("/")));
        }
        if let Some(default) = default.filter(|d| !d.is_empty()) {
            prompt.push_str(&format!(" [{default}]"));
        }
        prompt.push_str(if question.ends_with('?') { " " } else { ": " });

        loop {
            let answer = match self.read_line(&prompt)? {
                None => {
                    return default.map(str::to_string).ok_or_else(|| {
                        CfbsError::user(format!("No answer given for '{question}'")).into()
                    })
                }
                Some(answer) if answer.is_empty() => match default {
                    Some(default) => return Ok(default.to_string()),
                    None => continue,
                },
                Some(answer) => answer,
            };
            match choices {
                Some(choices) if !choices.contains(&answer.to_lowercase().as_str()) => {
                    println!("Invalid value entered, must be one of: {}", choices.join(", "));
                }
                _ => {
                    debug!("answer to '{question}': {answer}");
                    return Ok(answer);
                }
            }
        }
    }

    pub fn yes_no(&mut self, question: &str, default: bool) -> Result<bool> {
        let default = if default { "yes" } else { "no" };
        let answer = self.prompt(question, Some(YES_NO_CHOICES), Some(default))?;
        Ok(matches!(answer.to_lowercase().as_str(), "yes" | "y"))
    }
}

impl Answerer for Prompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        self.prompt(question, None, default)
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        self.yes_no(question, default)
    }
}

//! Interactive prompts for the pairing and connection flows.
//!
//! All prompts loop until the operator produces a valid answer; invalid input
//! is never an error. The reader is generic so tests can script answers
//! through an in-memory buffer instead of stdin.

use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use std::io::{self, Write};

use crate::error::{Error, Result};

const PIN_PATTERN: &str = "^[0-9]{4}$";

/// Control words the PIN prompt passes through unvalidated
const PIN_CONTROL_WORDS: [&str; 2] = ["retry", "cancel"];

/// Operator question/answer channel
pub struct Prompt<R = BufReader<Stdin>> {
    reader: R,
}

impl Prompt<BufReader<Stdin>> {
    /// Prompt reading answers from stdin
    pub fn new() -> Self {
        Prompt {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for Prompt<BufReader<Stdin>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncBufRead + Unpin> Prompt<R> {
    /// Prompt reading answers from the given buffered reader
    pub fn from_reader(reader: R) -> Self {
        Prompt { reader }
    }

    async fn read_answer(&mut self) -> Result<String> {
        let mut answer = String::new();
        let read = self.reader.read_line(&mut answer).await?;
        if read == 0 {
            return Err(Error::Input("Operator input closed".to_string()));
        }
        Ok(answer.trim().to_string())
    }

    /// Ask until the operator answers yes
    ///
    /// `reminder` is shown after any answer other than y/yes.
    pub async fn confirm_yes(&mut self, question: &str, reminder: &str) -> Result<()> {
        loop {
            ask(&format!("{} (y): ", question));
            let answer = self.read_answer().await?.to_ascii_lowercase();
            if answer == "y" || answer == "yes" {
                return Ok(());
            }
            println!("{}", reminder);
        }
    }

    /// Single choice from a numbered list, with a pre-selected default
    ///
    /// An empty answer takes the default; anything else must be a valid
    /// 1-based item number.
    pub async fn select(
        &mut self,
        question: &str,
        items: &[String],
        default: usize,
    ) -> Result<usize> {
        println!("{}", question);
        for (i, item) in items.iter().enumerate() {
            println!("  {}) {}", i + 1, item);
        }
        loop {
            ask(&format!("Choice [{}]: ", default + 1));
            let answer = self.read_answer().await?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
                _ => println!("Enter a number between 1 and {}", items.len()),
            }
        }
    }

    /// Multiple choices from a numbered list; at least one is required
    ///
    /// Answers are comma-separated 1-based item numbers. The returned indices
    /// are sorted and de-duplicated.
    pub async fn multi_select(
        &mut self,
        question: &str,
        items: &[String],
        requirement: &str,
    ) -> Result<Vec<usize>> {
        println!("{}", question);
        for (i, item) in items.iter().enumerate() {
            println!("  {}) {}", i + 1, item);
        }
        loop {
            ask("Choices (comma-separated numbers): ");
            let answer = self.read_answer().await?;
            let mut indices = Vec::new();
            let mut valid = true;
            for token in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                match token.parse::<usize>() {
                    Ok(n) if (1..=items.len()).contains(&n) => indices.push(n - 1),
                    _ => {
                        println!("'{}' is not a number between 1 and {}", token, items.len());
                        valid = false;
                        break;
                    }
                }
            }
            if !valid {
                continue;
            }
            if indices.is_empty() {
                println!("{}", requirement);
                continue;
            }
            indices.sort_unstable();
            indices.dedup();
            return Ok(indices);
        }
    }

    /// Four-digit PIN entry
    ///
    /// The control words `retry` and `cancel` are returned as-is; their
    /// meaning is up to the pairing handshake.
    pub async fn pin(&mut self, question: &str) -> Result<String> {
        let pattern = Regex::new(PIN_PATTERN).unwrap();
        loop {
            ask(&format!("{}: ", question));
            let answer = self.read_answer().await?;
            if PIN_CONTROL_WORDS.contains(&answer.as_str()) || pattern.is_match(&answer) {
                return Ok(answer);
            }
            println!("The PIN must be 4 digits");
        }
    }
}

fn ask(prompt: &str) {
    print!("{}", prompt);
    let _ = io::stdout().flush();
}

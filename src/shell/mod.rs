// Interactive question loop
// Reads questions line by line, delegates to an Answerer and prints the result


use std::future::Future;
use std::io::{self, Write};

use async_trait::async_trait;
use console::style;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Inputs that end the session, compared case-insensitively
pub const EXIT_COMMANDS: [&str; 4] = ["sair", "quit", "exit", "q"];

pub const PROMPT: &str = "Ask a question:\n\nQUESTION: ";
pub const PROCESSING: &str = "Processing...";
pub const EMPTY_QUESTION_HINT: &str = "Please enter a valid question.";
pub const FAILURE_MESSAGE: &str = "ANSWER: Could not process your question. Please try again.";
pub const FAREWELL: &str = "Closing chat...";
const SEPARATOR_WIDTH: usize = 50;

/// Anything that can turn a question into an answer
#[async_trait]
pub trait Answerer: Send + Sync {
    /// `None` means no answer could be produced for this question
    async fn answer(&self, question: &str) -> Option<String>;
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    ExitCommand,
    EndOfInput,
    Interrupted,
}

#[inline]
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS
        .iter()
        .any(|command| command.eq_ignore_ascii_case(input))
}

pub struct Shell<A> {
    answerer: A,
}

impl<A: Answerer> Shell<A> {
    #[inline]
    pub fn new(answerer: A) -> Self {
        Self { answerer }
    }

    /// Run until an exit command, end of input or `interrupt` completes.
    ///
    /// Failures to answer a question are reported and the loop continues; only I/O
    /// errors on `output` or `input` end it early.
    pub async fn run<R, W, I>(&self, input: R, output: &mut W, interrupt: I) -> io::Result<ShellExit>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        I: Future<Output = ()>,
    {
        let mut lines = input.lines();
        tokio::pin!(interrupt);

        writeln!(output, "{}", style("=== Semantic Search System ===").bold())?;
        writeln!(
            output,
            "Type '{}' or '{}' to end the chat.",
            EXIT_COMMANDS[0], EXIT_COMMANDS[1]
        )?;
        writeln!(output)?;

        loop {
            write!(output, "{}", PROMPT)?;
            output.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = &mut interrupt => {
                    writeln!(output, "\n\n{}", FAREWELL)?;
                    return Ok(ShellExit::Interrupted);
                }
            };

            let Some(line) = line else {
                writeln!(output, "\n{}", FAREWELL)?;
                return Ok(ShellExit::EndOfInput);
            };

            let question = line.trim();

            if is_exit_command(question) {
                writeln!(output, "{}", FAREWELL)?;
                return Ok(ShellExit::ExitCommand);
            }

            if question.is_empty() {
                writeln!(output, "{}", EMPTY_QUESTION_HINT)?;
                continue;
            }

            writeln!(output, "{}", PROCESSING)?;
            output.flush()?;
            debug!("Answering question ({} characters)", question.len());

            let answer = tokio::select! {
                answer = self.answerer.answer(question) => answer,
                () = &mut interrupt => {
                    writeln!(output, "\n\n{}", FAREWELL)?;
                    return Ok(ShellExit::Interrupted);
                }
            };

            match answer {
                Some(answer) => writeln!(output, "ANSWER: {}", answer)?,
                None => writeln!(output, "{}", FAILURE_MESSAGE)?,
            }

            writeln!(output, "\n{}\n", "=".repeat(SEPARATOR_WIDTH))?;
        }
    }
}

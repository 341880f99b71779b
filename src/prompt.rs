//! Interactive questions.
//!
//! Directory processing never reads from the terminal itself; it asks an
//! `Interaction` and acts on the answer. `ConsolePrompt` is the terminal
//! implementation used by the binary.

use crate::interrupt::Interrupt;
use std::io::{BufRead, Write};
use std::path::Path;

/// Answer to "a checksum file already exists" in create mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteAnswer {
    Overwrite,
    /// Overwrite this and every following directory without asking again.
    OverwriteAll,
    Skip,
    /// Skip this and every following directory that has a checksum file.
    SkipAll,
    /// Stop the whole run.
    Abort,
}

impl OverwriteAnswer {
    fn from_input(input: &str) -> Option<Self> {
        match input.trim() {
            "o" | "O" => Some(OverwriteAnswer::Overwrite),
            "v" | "V" => Some(OverwriteAnswer::OverwriteAll),
            "s" | "S" => Some(OverwriteAnswer::Skip),
            "l" | "L" => Some(OverwriteAnswer::SkipAll),
            "a" | "A" => Some(OverwriteAnswer::Abort),
            _ => None,
        }
    }
}

pub trait Interaction {
    /// Create mode found an existing checksum file in `dir`.
    fn overwrite_decision(&mut self, dir: &Path) -> OverwriteAnswer;

    /// Hashing `dir` in create mode was interrupted; returns true if the
    /// incomplete checksum file should be deleted.
    fn confirm_delete_incomplete(&mut self, dir: &Path) -> bool;
}

/// Asks on stderr and reads answers line by line from stdin.
///
/// Invalid answers repeat the question. End of input aborts the run or keeps
/// the incomplete file, whichever applies.
///
/// Reading a line blocks until Enter even when Ctrl-C arrives. An interrupt
/// raised while a question is pending discards the answer, so the operator
/// is not asked again.
pub struct ConsolePrompt<R> {
    input: R,
    interrupt: Interrupt,
}

impl ConsolePrompt<std::io::StdinLock<'static>> {
    pub fn stdin(interrupt: Interrupt) -> Self {
        ConsolePrompt {
            input: std::io::stdin().lock(),
            interrupt,
        }
    }
}

impl<R: BufRead> ConsolePrompt<R> {
    pub fn new(input: R, interrupt: Interrupt) -> Self {
        ConsolePrompt { input, interrupt }
    }

    fn ask<T>(&mut self, question: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let interrupted_before = self.interrupt.is_triggered();
        loop {
            eprint!("{question}");
            let _ = std::io::stderr().flush();

            let mut line = String::new();
            let read = self.input.read_line(&mut line);
            if !interrupted_before && self.interrupt.is_triggered() {
                eprintln!();
                return None;
            }
            match read {
                Ok(0) | Err(_) => {
                    eprintln!();
                    return None;
                }
                Ok(_) => {
                    if let Some(answer) = parse(&line) {
                        return Some(answer);
                    }
                }
            }
        }
    }
}

impl<R: BufRead> Interaction for ConsolePrompt<R> {
    fn overwrite_decision(&mut self, dir: &Path) -> OverwriteAnswer {
        let question = format!(
            ">>> Checksum file exists in '{}': (o)verwrite, o(v)erwrite all, (s)kip, skip al(l), (a)bort? ",
            dir.display()
        );
        self.ask(&question, OverwriteAnswer::from_input)
            .unwrap_or(OverwriteAnswer::Abort)
    }

    fn confirm_delete_incomplete(&mut self, dir: &Path) -> bool {
        let question = format!(
            ">>> Delete incomplete checksum file in '{}': (y)es, (n)o? ",
            dir.display()
        );
        self.ask(&question, |input| match input.trim() {
            "y" | "Y" => Some(true),
            "n" | "N" => Some(false),
            _ => None,
        })
        .unwrap_or(false)
    }
}

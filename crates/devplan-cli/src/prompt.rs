use devplan_core::git::Progress;
use devplan_core::workspace::Confirm;
use std::io::{BufRead, IsTerminal, Write};

/// Asks on the terminal. Without a terminal on stdin every answer is "no".
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            return false;
        }
        eprint!("{prompt} [y/N] ");
        // An unflushed prompt still gets an answer read.
        std::io::stderr().flush().ok();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Git progress lines, echoed to stderr.
pub struct StderrProgress;

impl Progress for StderrProgress {
    fn line(&self, line: &str) {
        eprintln!("  {line}");
    }
}

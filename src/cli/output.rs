//! Output formatting for the bastion-ops CLI
//!
//! Provides colored terminal output and a JSON mode for scripting.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use bastion_ops::history::RunHistory;

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        if !use_color {
            colored::control::set_override(false);
        }

        Self {
            use_color,
            json_mode,
            verbosity,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.json_mode {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        println!("{}", text);
        Ok(())
    }

    /// Print a one-line JSON event to stderr
    fn event(&self, kind: &str, message: &str) {
        let event = serde_json::json!({
            "type": kind,
            "message": message
        });
        eprintln!("{}", event);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            self.event("error", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            self.event("warning", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a hint message
    pub fn hint(&self, message: &str) {
        if self.json_mode {
            self.event("hint", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "HINT:".cyan().bold(), message);
        } else {
            eprintln!("HINT: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a line that always shows in text mode
    pub fn plain(&self, message: &str) {
        if !self.json_mode {
            println!("{}", message);
        }
    }

    /// Print a status word followed by a message
    pub fn status(&self, ok: bool, label: &str, message: &str) {
        if self.json_mode {
            return;
        }
        let label = if !self.use_color {
            label.normal()
        } else if ok {
            label.green()
        } else {
            label.red().bold()
        };
        println!("{}: {}", label, message);
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");
        if self.use_color {
            println!("{}", header_line.bright_white().bold());
        } else {
            println!("{}", header_line);
        }

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            println!("{}", sep.join("-+-").bright_black());
        } else {
            println!("{}", sep.join("-+-"));
        }

        for row in rows {
            let row_line = row
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join(" | ");
            println!("{}", row_line);
        }
    }

    /// Print the outcome of a run
    pub fn run_summary(&self, task: &str, history: &RunHistory) {
        self.section(&format!("RUN [{}]", task));
        for host in history.success_hosts() {
            self.status(true, "ok", host);
        }
        for (host, message) in &history.summary.dark {
            self.status(false, "unreachable", &format!("{} => {}", host, message));
        }
        for (host, actions) in &history.summary.contacted {
            for action in actions.iter().filter(|a| a.failed) {
                self.status(
                    false,
                    "failed",
                    &format!("{} => {} (rc={}) {}", host, action.action, action.rc, action.message()),
                );
            }
        }
        self.plain(&format!(
            "\nhistory {} finished in {:.2}s: {}",
            history.id,
            history.timedelta,
            if history.is_success { "success" } else { "failed" }
        ));
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatter_modes() {
        let formatter = OutputFormatter::new(false, true, 0);
        assert!(formatter.is_json());
        // JSON mode suppresses decorative output
        formatter.banner("x");
        formatter.section("y");
        formatter.plain("z");
    }
}

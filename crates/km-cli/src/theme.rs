//! CLI theme and styling.

use colored::Colorize;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "─".repeat(50).dimmed().to_string()
    }

    /// Format a key-value pair with a source annotation, for `config show`.
    pub(crate) fn kv_sourced(key: &str, value: &str, source: &str) -> String {
        format!("  {:<16} {:<30} {}", key.bold(), value, format!("[{source}]").dimmed())
    }

    /// Format a plugin state for `plugins list`.
    pub(crate) fn plugin_state(state: &str) -> String {
        match state {
            "ready" => state.green().to_string(),
            "degraded" => state.yellow().to_string(),
            "terminated" => state.red().to_string(),
            _ => state.dimmed().to_string(),
        }
    }
}

/// Print a banner for the CLI.
pub(crate) fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!("{}", format!("kilometers  v{version}").cyan().bold());
    println!("{}", "MCP observability proxy".dimmed());
    println!();
}

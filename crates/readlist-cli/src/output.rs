//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::{Context, Result};
use serde::Serialize;

use readlist_core::ModelEvent;

use crate::commands::replay::ReplayReport;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
        println!("{}", json);
        Ok(())
    }

    /// Print the final state of a replayed script
    pub fn print_report(&self, report: &ReplayReport) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if report.entries.is_empty() {
                    println!("No entries.");
                } else {
                    for entry in &report.entries {
                        println!(
                            "{:<7} | {:<35} | {:<45} | {}",
                            format!("{:?}", entry.state).to_lowercase(),
                            truncate(&entry.title, 35),
                            truncate(entry.url.as_str(), 45),
                            storage_label(&entry.storage_state)
                        );
                    }
                }
                println!();
                println!(
                    "{} entr{} ({} unread, {} unseen)",
                    report.size,
                    if report.size == 1 { "y" } else { "ies" },
                    report.unread_size,
                    report.unseen_size
                );

                if !report.events.is_empty() {
                    println!();
                    println!("── Events ({}) ──", report.events.len());
                    for event in &report.events {
                        println!("{}", describe_event(event));
                    }
                }
            }
            OutputFormat::Json => self.print_json(report)?,
            OutputFormat::Quiet => {
                for entry in &report.entries {
                    println!("{}", entry.url);
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn storage_label(state: &Option<readlist_core::StorageState>) -> &'static str {
    use readlist_core::StorageState;

    match state {
        None => "single",
        Some(StorageState::NotFound) => "missing",
        Some(StorageState::ExistsInLocalOrSyncableModelOnly) => "local",
        Some(StorageState::ExistsInAccountModelOnly) => "account",
        Some(StorageState::ExistsInBothModels) => "both",
    }
}

/// One-line rendering of an observer notification
fn describe_event(event: &ModelEvent) -> String {
    match event {
        ModelEvent::Loaded => "loaded".to_string(),
        ModelEvent::BeganBatchUpdates => "batch began".to_string(),
        ModelEvent::CompletedBatchUpdates => "batch completed".to_string(),
        ModelEvent::BeingShutdown => "shutting down".to_string(),
        ModelEvent::BeingDeleted => "deleted".to_string(),
        ModelEvent::WillAdd { url } => format!("  will add     {}", url),
        ModelEvent::DidAdd { url, source } => format!("  did add      {} ({:?})", url, source),
        ModelEvent::WillRemove { url } => format!("  will remove  {}", url),
        ModelEvent::DidRemove { url } => format!("  did remove   {}", url),
        ModelEvent::WillUpdate { url } => format!("  will update  {}", url),
        ModelEvent::DidUpdate { url } => format!("  did update   {}", url),
        ModelEvent::WillMove { url } => format!("  will move    {}", url),
        ModelEvent::DidMove { url } => format!("  did move     {}", url),
        ModelEvent::DidApplyChanges => "  applied".to_string(),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

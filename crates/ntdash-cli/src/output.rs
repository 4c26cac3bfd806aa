//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::collections::BTreeMap;

use serde::Serialize;

use ntdash_core::{DashboardSnapshot, Value};

/// Longest value shown in a table listing
const MAX_VALUE_WIDTH: usize = 60;

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
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct Entry<'a> {
    path: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
}

impl<'a> Entry<'a> {
    fn new(path: &'a str, value: &'a Value) -> Self {
        Self {
            path,
            kind: value.kind().as_str(),
            value: value.is_assigned().then_some(value),
        }
    }
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single entry
    pub fn print_value(&self, path: &str, value: &Value) {
        match self.format {
            OutputFormat::Human => {
                println!("Path:  {}", path);
                println!("Kind:  {}", value.kind());
                println!("Value: {}", value);
            }
            OutputFormat::Json => print_json(&Entry::new(path, value)),
            OutputFormat::Quiet => println!("{}", value),
        }
    }

    /// Print one change notification
    pub fn print_change(&self, path: &str, value: &Value) {
        match self.format {
            OutputFormat::Human => println!("{} = {}", path, value),
            OutputFormat::Json => print_json(&Entry::new(path, value)),
            OutputFormat::Quiet => println!("{}\t{}", path, value),
        }
    }

    /// Print the contents of a table
    pub fn print_table(&self, table: &str, values: &BTreeMap<String, Value>, sub_tables: &[String]) {
        match self.format {
            OutputFormat::Human => {
                if values.is_empty() && sub_tables.is_empty() {
                    println!("Table '{}' is empty.", table);
                    return;
                }
                for name in sub_tables {
                    println!("{}/", name);
                }
                for (key, value) in values {
                    println!(
                        "{} | {} | {}",
                        key,
                        value.kind(),
                        truncate(&value.to_string(), MAX_VALUE_WIDTH)
                    );
                }
                println!(
                    "\n{} entr{}, {} sub-table(s)",
                    values.len(),
                    if values.len() == 1 { "y" } else { "ies" },
                    sub_tables.len()
                );
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "table": table,
                    "entries": values,
                    "sub_tables": sub_tables,
                }));
            }
            OutputFormat::Quiet => {
                for name in sub_tables {
                    println!("{}/", name);
                }
                for key in values.keys() {
                    println!("{}", key);
                }
            }
        }
    }

    /// Print a connection change
    pub fn print_connection(&self, connected: bool, address: &str) {
        match self.format {
            OutputFormat::Human => {
                if connected {
                    println!("Connected to {}", address);
                } else {
                    println!("Disconnected from {}", address);
                }
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({"connected": connected, "address": address}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print the dashboard panels
    pub fn print_snapshot(&self, snapshot: &DashboardSnapshot) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "[{}] {} | lift {:.0}% | {:.2} rpm | {}",
                    snapshot.status,
                    snapshot.match_time,
                    snapshot.lift_fraction * 100.0,
                    snapshot.velocity,
                    snapshot.caution
                );
            }
            OutputFormat::Json => print_json(snapshot),
            OutputFormat::Quiet => println!("{}", snapshot.status),
        }
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

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Could not encode output: {}", e),
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_entry_json() {
        let value = Value::Double(3.5);
        let json = serde_json::to_value(Entry::new("SmartDashboard/Lift Distance", &value)).unwrap();
        assert_eq!(json["kind"], "double");
        assert_eq!(json["value"]["value"], 3.5);

        let json = serde_json::to_value(Entry::new("a/b", &Value::Unassigned)).unwrap();
        assert_eq!(json["kind"], "unassigned");
        assert!(json.get("value").is_none());
    }
}

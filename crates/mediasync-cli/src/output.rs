use clap::ValueEnum;
use comfy_table::{modifiers, presets, Attribute, Cell, Color, Table};
use media_sync_core::{PhaseReport, SyncReport};
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.message("success", "✓".green().to_string(), msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => println!("{}", msg.as_ref()),
            _ => self.print_json(&json!({ "type": "info", "message": msg.as_ref() })),
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.message("warning", "⚠".yellow().to_string(), msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        // Errors are shown even in quiet mode
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", "✗".red(), msg.as_ref()),
            _ => self.print_json(&json!({ "type": "error", "message": msg.as_ref() })),
        }
    }

    pub fn json(&self, data: &serde_json::Value) {
        if self.quiet && self.format != OutputFormat::Human {
            return;
        }
        self.print_json(data);
    }

    pub fn table(&self, table: &Table) {
        if self.quiet {
            return;
        }
        println!("{}", table);
        println!();
    }

    /// Render the outcome of one sync run.
    pub fn sync_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => {
                if self.quiet {
                    return;
                }
                self.table(&report_table(report));
                if report.lists_created > 0 {
                    self.info(format!("Created {} missing Trakt list(s)", report.lists_created));
                }
                self.success(format!(
                    "Sync completed in {:.1}s ({} mode)",
                    report.duration.as_secs_f64(),
                    report.mode
                ));
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.json(&json!({
                    "success": true,
                    "mode": report.mode.as_str(),
                    "lists": phase_json(&report.lists),
                    "ratings": phase_json(&report.ratings),
                    "history": phase_json(&report.history),
                    "lists_created": report.lists_created,
                    "duration_seconds": report.duration.as_secs_f64(),
                }));
            }
        }
    }

    fn message(&self, kind: &str, marker: String, msg: &str) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => println!("{} {}", marker, msg),
            _ => self.print_json(&json!({ "type": kind, "message": msg })),
        }
    }

    fn print_json(&self, data: &serde_json::Value) {
        match self.format {
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
            _ => println!("{}", serde_json::to_string(data).unwrap_or_default()),
        }
    }
}

/// A table with the shared look: bold cyan header, rounded UTF-8 borders.
pub fn styled_table(title: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec![Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold)]);
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table
}

pub fn check_mark(enabled: bool) -> String {
    if enabled {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

fn report_table(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Phase").add_attribute(Attribute::Bold),
        Cell::new("Added").add_attribute(Attribute::Bold),
        Cell::new("Removed").add_attribute(Attribute::Bold),
        Cell::new("Skipped removals").add_attribute(Attribute::Bold),
    ]);
    for (name, phase) in [
        ("Lists", &report.lists),
        ("Ratings", &report.ratings),
        ("History", &report.history),
    ] {
        if !phase.ran {
            table.add_row(vec![Cell::new(name), Cell::new("skipped"), Cell::new("-"), Cell::new("-")]);
            continue;
        }
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{} / {}", phase.applied_add, phase.planned_add)),
            Cell::new(format!("{} / {}", phase.applied_remove, phase.planned_remove)),
            Cell::new(phase.skipped_removals()),
        ]);
    }
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table
}

fn phase_json(phase: &PhaseReport) -> serde_json::Value {
    json!({
        "ran": phase.ran,
        "planned_add": phase.planned_add,
        "planned_remove": phase.planned_remove,
        "added": phase.applied_add,
        "removed": phase.applied_remove,
        "skipped_removals": phase.skipped_removals(),
    })
}

//! Output formatting for netcfg
//!
//! Colored human output, colored diffs, and JSON for scripting.

use colored::{Color, Colorize};
use netcfg::config::ColorsConfig;
use netcfg::fleet::{DeviceOutcome, DeviceReport, FleetReport};
use netcfg::transaction::{ConfigDiff, DiffFidelity};
use serde::Serialize;
use std::time::Instant;

/// Colors used for diffs and failures
#[derive(Debug, Clone, Copy)]
struct Palette {
    added: Color,
    removed: Color,
    error: Color,
}

impl Palette {
    fn from_config(colors: &ColorsConfig) -> Self {
        Self {
            added: colors.added.parse().unwrap_or(Color::Green),
            removed: colors.removed.parse().unwrap_or(Color::Red),
            error: colors.error.parse().unwrap_or(Color::BrightRed),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_config(&ColorsConfig::default())
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    use_color: bool,
    json_mode: bool,
    verbosity: u8,
    palette: Palette,
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
            palette: Palette::default(),
            start_time: Instant::now(),
        }
    }

    /// Take diff and error colors from configuration
    pub fn with_colors(mut self, colors: &ColorsConfig) -> Self {
        self.use_color = self.use_color && colors.enabled;
        self.palette = Palette::from_config(colors);
        self
    }

    /// Whether output is JSON
    pub fn is_json(&self) -> bool {
        self.json_mode
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

    /// Print an informational line
    pub fn info(&self, message: &str) {
        if !self.json_mode {
            println!("{}", message);
        }
    }

    /// Print a warning to stderr
    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "[WARNING]".yellow().bold(), message);
        } else {
            eprintln!("[WARNING] {}", message);
        }
    }

    /// Print an error to stderr
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!(
                "{} {}",
                "[ERROR]".color(self.palette.error).bold(),
                message.color(self.palette.error)
            );
        } else {
            eprintln!("[ERROR] {}", message);
        }
    }

    /// Print a debug line (needs -v)
    pub fn debug(&self, message: &str) {
        if self.verbosity >= 1 && !self.json_mode {
            if self.use_color {
                println!("{}", message.bright_black());
            } else {
                println!("{}", message);
            }
        }
    }

    /// Render a diff with added and removed lines colored
    pub fn render_diff(&self, diff: &ConfigDiff) -> String {
        let mut lines: Vec<String> = Vec::new();
        if diff.fidelity() == DiffFidelity::Estimated {
            lines.push("# estimated locally; the device may apply this differently".to_string());
        }
        for line in diff.text().lines() {
            let rendered = if !self.use_color {
                line.to_string()
            } else if line.starts_with('+') {
                line.color(self.palette.added).to_string()
            } else if line.starts_with('-') {
                line.color(self.palette.removed).to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else {
                line.to_string()
            };
            lines.push(rendered);
        }
        lines.join("\n")
    }

    fn outcome_string(&self, outcome: DeviceOutcome) -> String {
        let text = outcome.to_string();
        if !self.use_color {
            return text;
        }
        match outcome {
            DeviceOutcome::Unchanged => text.green().to_string(),
            DeviceOutcome::Changed | DeviceOutcome::RolledBack => text.yellow().to_string(),
            DeviceOutcome::Pending => text.cyan().to_string(),
            DeviceOutcome::Unreachable | DeviceOutcome::Failed => {
                text.color(self.palette.error).bold().to_string()
            }
            DeviceOutcome::Diverged => text.on_red().white().bold().to_string(),
        }
    }

    /// Print one device's result, with its diff when there is one
    pub fn device_result(&self, report: &DeviceReport) {
        if self.json_mode {
            return;
        }

        let host = if self.use_color {
            report.device.bright_white().bold().to_string()
        } else {
            report.device.clone()
        };
        print!("{}: [{}]", self.outcome_string(report.outcome), host);
        if let Some(error) = &report.error {
            print!(" => {}", error);
        }
        println!();

        if let Some(diff) = &report.diff {
            if !diff.is_empty() {
                println!("{}", self.render_diff(diff));
            }
        }
    }

    /// Print a recap summary
    pub fn recap(&self, report: &FleetReport) {
        if self.json_mode {
            self.json(report);
            return;
        }

        let header = "RECAP";
        let stars = "*".repeat(80 - header.len());
        if self.use_color {
            println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", header, stars);
        }

        for device in &report.devices {
            let summary = match &device.diff {
                Some(diff) => format!("+{} -{}", diff.additions(), diff.deletions()),
                None => String::new(),
            };
            println!(
                "{:<30} : {:<12} {:<12} {}ms",
                device.device,
                self.outcome_string(device.outcome),
                summary,
                device.elapsed.as_millis()
            );
        }

        if report.has_divergence() {
            self.error(
                "One or more devices are running a configuration that was not saved; \
                 save or roll back before the next reload",
            );
        }

        if self.verbosity >= 1 {
            println!("\nElapsed: {:.2}s", self.start_time.elapsed().as_secs_f64());
        }
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => self.error(&format!("Could not serialize output: {}", e)),
        }
    }
}

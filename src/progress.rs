//! Sync and index progress reporting.
//!
//! Reports observable progress during `fvault sync` and `fvault index` so
//! users see which phase is running and how much is left. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Checking stored locations: n records out of total.
    Confirming { n: u64, total: u64 },
    /// Walking a scan root. Total unknown.
    Discovering { root: String },
    /// Hashing discovered files: n out of total.
    Hashing { n: u64, total: u64 },
    /// Extracting and admitting candidates: n out of total.
    Admitting { n: u64, total: u64 },
    /// Embedding admitted documents: n out of total.
    Embedding { n: u64, total: u64 },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "sync  hashing  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { root } => format!("sync  discovering {}...\n", root),
            ProgressEvent::Confirming { n, total } => counted("sync  confirming", *n, *total, "records"),
            ProgressEvent::Hashing { n, total } => counted("sync  hashing", *n, *total, "files"),
            ProgressEvent::Admitting { n, total } => counted("index  admitting", *n, *total, "files"),
            ProgressEvent::Embedding { n, total } => {
                counted("index  embedding", *n, *total, "documents")
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn counted(prefix: &str, n: u64, total: u64, unit: &str) -> String {
    format!(
        "{}  {} / {} {}\n",
        prefix,
        format_number(n),
        format_number(total),
        unit
    )
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            ProgressEvent::Confirming { n, total } => phase_json("confirming", *n, *total),
            ProgressEvent::Hashing { n, total } => phase_json("hashing", *n, *total),
            ProgressEvent::Admitting { n, total } => phase_json("admitting", *n, *total),
            ProgressEvent::Embedding { n, total } => phase_json("embedding", *n, *total),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn phase_json(phase: &str, n: u64, total: u64) -> serde_json::Value {
    serde_json::json!({
        "event": "progress",
        "phase": phase,
        "n": n,
        "total": total
    })
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

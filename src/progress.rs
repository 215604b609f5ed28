//! Migration progress reporting.
//!
//! Reports observable progress during `passport migrate` so users see which
//! stage is running and how much of it is left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts; structured logs go
//! through `tracing` separately.

use std::io::Write;

use crate::migrate::Stage;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum MigrationEvent {
    /// A stage began.
    StageStarted { stage: Stage },
    /// `n` of `total` records of an upload stage have been sent.
    Uploading { stage: Stage, n: u64, total: u64 },
    /// `n` of `total` lookups of one enrichment pass are done.
    Looking {
        pass: &'static str,
        n: u64,
        total: u64,
    },
    /// A stage ended having produced `count` objects.
    StageFinished { stage: Stage, count: u64 },
}

/// Reports migration progress.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: MigrationEvent);
}

/// Human-friendly progress on stderr: "migrate items  1,234 / 5,000".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: MigrationEvent) {
        let line = match &event {
            MigrationEvent::StageStarted { stage } => format!("migrate {}  ...\n", stage),
            MigrationEvent::Uploading { stage, n, total } => format!(
                "migrate {}  {} / {}\n",
                stage,
                format_number(*n),
                format_number(*total)
            ),
            MigrationEvent::Looking { pass, n, total } => format!(
                "enrich {}  {} / {} lookups\n",
                pass,
                format_number(*n),
                format_number(*total)
            ),
            MigrationEvent::StageFinished { stage, count } => {
                format!("migrate {}  done ({})\n", stage, format_number(*count))
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &MigrationEvent) -> serde_json::Value {
        match event {
            MigrationEvent::StageStarted { stage } => serde_json::json!({
                "event": "stage_started",
                "stage": stage.to_string(),
            }),
            MigrationEvent::Uploading { stage, n, total } => serde_json::json!({
                "event": "progress",
                "stage": stage.to_string(),
                "n": n,
                "total": total,
            }),
            MigrationEvent::Looking { pass, n, total } => serde_json::json!({
                "event": "progress",
                "stage": Stage::Enrich.to_string(),
                "pass": pass,
                "n": n,
                "total": total,
            }),
            MigrationEvent::StageFinished { stage, count } => serde_json::json!({
                "event": "stage_finished",
                "stage": stage.to_string(),
                "count": count,
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: MigrationEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: MigrationEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress if stderr is a terminal, otherwise none.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Resolve `Auto` against the terminal: human progress when stderr is a
    /// TTY, otherwise off.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto if atty::is(atty::Stream::Stderr) => ProgressMode::Human,
            ProgressMode::Auto => ProgressMode::Off,
            other => other,
        }
    }

    pub fn reporter(self) -> Box<dyn ProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            ProgressMode::Off | ProgressMode::Auto => Box::new(NoProgress),
        }
    }
}

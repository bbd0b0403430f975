use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::design::PipelinePhase;

/// One entry of the run log. Serialized with a `type` tag in snake_case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        vibe: String,
        logo_width: u32,
        logo_height: u32,
    },
    PhaseChanged {
        phase: PipelinePhase,
        label: String,
    },
    ReferencesFound {
        urls: Vec<String>,
    },
    Warning {
        stage: PipelinePhase,
        message: String,
    },
    BackgroundGenerated {
        provider: String,
        model: String,
        width: u32,
        height: u32,
    },
    LogoComposited {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
    RunFinished {
        phase: PipelinePhase,
        warnings: usize,
    },
}

pub fn new_run_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("run-{}", &id[..12])
}

/// Append-only writer for the `events.jsonl` run log.
///
/// - every line carries `type`, `run_id` and `ts`
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Same file, different run. Session mode writes many runs into one log.
    pub fn for_run(&self, run_id: impl Into<String>) -> Self {
        Self::new(self.inner.path.clone(), run_id)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event: &RunEvent) -> anyhow::Result<Value> {
        let mut line_object = Map::new();
        line_object.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        line_object.insert("ts".to_string(), Value::String(now_utc_iso()));
        if let Value::Object(fields) = serde_json::to_value(event)? {
            for (key, value) in fields {
                line_object.insert(key, value);
            }
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&line_object)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line_object))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "run-123");

        let emitted = writer.emit(&RunEvent::RunStarted {
            vibe: "Minimalist Wine Bar".to_string(),
            logo_width: 200,
            logo_height: 100,
        })?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("run_started".to_string()));
        assert_eq!(parsed["run_id"], Value::String("run-123".to_string()));
        assert_eq!(parsed["vibe"], Value::String("Minimalist Wine Bar".to_string()));
        assert_eq!(parsed["logo_width"], serde_json::json!(200));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn phase_events_carry_snake_case_phase_and_label() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "run-1");
        let emitted = writer.emit(&RunEvent::PhaseChanged {
            phase: PipelinePhase::Generating,
            label: PipelinePhase::Generating.label().to_string(),
        })?;
        assert_eq!(emitted["type"], "phase_changed");
        assert_eq!(emitted["phase"], "generating");
        assert_eq!(emitted["label"], "Generating 4K Mockup…");
        Ok(())
    }

    #[test]
    fn emit_appends_lines_and_for_run_shares_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let first_run = EventWriter::new(&path, "run-a");
        let second_run = first_run.for_run("run-b");

        first_run.emit(&RunEvent::ReferencesFound { urls: Vec::new() })?;
        second_run.emit(&RunEvent::RunFinished {
            phase: PipelinePhase::Done,
            warnings: 0,
        })?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], "references_found");
        assert_eq!(first["run_id"], "run-a");
        assert_eq!(second["type"], "run_finished");
        assert_eq!(second["run_id"], "run-b");
        Ok(())
    }

    #[test]
    fn run_ids_are_unique_and_prefixed() {
        let a = new_run_id();
        let b = new_run_id();
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), "run-".len() + 12);
        assert_ne!(a, b);
    }
}

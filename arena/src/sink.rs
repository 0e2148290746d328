//! Record sinks: where battle records and generated sources end up.
//!
//! Records are append-only and keyed by battle id; writing the same battle twice
//! is an error rather than an overwrite.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::tournament::BattleRecord;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("battle {0} has already been recorded")]
    AlreadyRecorded(String),

    #[error("failed to serialize battle record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence for tournament output.
pub trait RecordSink: Send + Sync {
    /// Keep one generated source file for audit.
    fn save_source(&self, battle_id: &str, round: u8, agent: &str, code: &str)
        -> Result<(), SinkError>;

    /// Persist a finished (or aborted) battle. Called once per battle.
    fn save_record(&self, record: &BattleRecord) -> Result<(), SinkError>;
}

/// Writes under an output root:
/// - `generated_code/<battle_id>_R<round>_<agent>.py`
/// - `battle_logs/<battle_id>_data.json`
/// - `battle_logs/<battle_id>_report.txt`
#[derive(Debug, Clone)]
pub struct JsonFileRecordSink {
    code_dir: PathBuf,
    log_dir: PathBuf,
}

impl JsonFileRecordSink {
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        let root = output_root.as_ref();
        Self {
            code_dir: root.join("generated_code"),
            log_dir: root.join("battle_logs"),
        }
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn data_path(&self, battle_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}_data.json", file_safe(battle_id)))
    }

    pub fn report_path(&self, battle_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}_report.txt", file_safe(battle_id)))
    }

    pub fn source_path(&self, battle_id: &str, round: u8, agent: &str) -> PathBuf {
        self.code_dir.join(format!(
            "{}_R{}_{}.py",
            file_safe(battle_id),
            round,
            file_safe(agent)
        ))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_dir(dir: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(dir).map_err(io_err(dir))
}

impl RecordSink for JsonFileRecordSink {
    fn save_source(
        &self,
        battle_id: &str,
        round: u8,
        agent: &str,
        code: &str,
    ) -> Result<(), SinkError> {
        ensure_dir(&self.code_dir)?;
        let path = self.source_path(battle_id, round, agent);
        std::fs::write(&path, code).map_err(io_err(&path))
    }

    fn save_record(&self, record: &BattleRecord) -> Result<(), SinkError> {
        ensure_dir(&self.log_dir)?;
        let data_path = self.data_path(&record.battle_id);
        let json = serde_json::to_vec_pretty(record)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&data_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SinkError::AlreadyRecorded(record.battle_id.clone()))
            }
            Err(e) => return Err(io_err(&data_path)(e)),
        };
        file.write_all(&json).map_err(io_err(&data_path))?;

        let report_path = self.report_path(&record.battle_id);
        std::fs::write(&report_path, record.report()).map_err(io_err(&report_path))?;

        info!(
            battle_id = %record.battle_id,
            path = %data_path.display(),
            "battle record saved"
        );
        Ok(())
    }
}

/// Replace anything outside `[A-Za-z0-9_.-]` so names are safe as file names.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// A generated source kept by [`MemoryRecordSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSource {
    pub battle_id: String,
    pub round: u8,
    pub agent: String,
    pub code: String,
}

/// Keeps everything in memory. Useful for hosts that persist elsewhere, and tests.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<BattleRecord>>,
    sources: Mutex<Vec<SavedSource>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<BattleRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn record(&self, battle_id: &str) -> Option<BattleRecord> {
        self.records()
            .into_iter()
            .find(|r| r.battle_id == battle_id)
    }

    pub fn sources(&self) -> Vec<SavedSource> {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl RecordSink for MemoryRecordSink {
    fn save_source(
        &self,
        battle_id: &str,
        round: u8,
        agent: &str,
        code: &str,
    ) -> Result<(), SinkError> {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(SavedSource {
                battle_id: battle_id.to_string(),
                round,
                agent: agent.to_string(),
                code: code.to_string(),
            });
        Ok(())
    }

    fn save_record(&self, record: &BattleRecord) -> Result<(), SinkError> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        if records.iter().any(|r| r.battle_id == record.battle_id) {
            return Err(SinkError::AlreadyRecorded(record.battle_id.clone()));
        }
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::TournamentPhase;
    use chrono::Utc;
    use serde_json::json;

    fn record(id: &str) -> BattleRecord {
        BattleRecord {
            battle_id: id.into(),
            timestamp: Utc::now(),
            problem: "double".into(),
            test_input: json!(5),
            expected_output: Some(json!(10)),
            champion: None,
            log_lines: vec![format!("BATTLE ID: {}", id)],
            results: vec![],
            judge_verdict: None,
            phase: TournamentPhase::AbortedNoSurvivors,
            transitions: vec![],
        }
    }

    #[test]
    fn test_file_sink_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileRecordSink::new(dir.path());

        sink.save_source("20250101_120000_000", 1, "Turbo_Tim", "def solution(n): return n")
            .unwrap();
        sink.save_record(&record("20250101_120000_000")).unwrap();

        let source = dir
            .path()
            .join("generated_code/20250101_120000_000_R1_Turbo_Tim.py");
        assert_eq!(
            std::fs::read_to_string(source).unwrap(),
            "def solution(n): return n"
        );

        let data = std::fs::read_to_string(
            dir.path().join("battle_logs/20250101_120000_000_data.json"),
        )
        .unwrap();
        let parsed: BattleRecord = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed.battle_id, "20250101_120000_000");
        assert!(dir
            .path()
            .join("battle_logs/20250101_120000_000_report.txt")
            .exists());
    }

    #[test]
    fn test_file_sink_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileRecordSink::new(dir.path());
        sink.save_record(&record("b1")).unwrap();
        assert!(matches!(
            sink.save_record(&record("b1")),
            Err(SinkError::AlreadyRecorded(id)) if id == "b1"
        ));
    }

    #[test]
    fn test_agent_names_are_made_file_safe() {
        let sink = JsonFileRecordSink::new("/out");
        let path = sink.source_path("b1", 2, "../evil agent");
        assert_eq!(path, PathBuf::from("/out/generated_code/b1_R2__evil_agent.py"));
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryRecordSink::new();
        sink.save_source("b1", 1, "A", "code").unwrap();
        sink.save_record(&record("b1")).unwrap();
        assert!(sink.save_record(&record("b1")).is_err());
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.sources()[0].agent, "A");
        assert!(sink.record("b1").is_some());
    }
}

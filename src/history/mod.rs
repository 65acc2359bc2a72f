//! Append-only JSONL log of every analysis request and response.
//!
//! Each line is one self-contained JSON object carrying a `timestamp` assigned
//! by the store plus the caller's keys. All reads and writes are serialized by
//! a single mutex per store; the I/O is blocking, so async callers should run
//! these methods on `spawn_blocking`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug)]
pub enum HistoryError {
    StorageInit(String),
    StorageWrite(String),
    StorageRead(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::StorageInit(msg) => write!(f, "History storage init error: {}", msg),
            HistoryError::StorageWrite(msg) => write!(f, "History storage write error: {}", msg),
            HistoryError::StorageRead(msg) => write!(f, "History storage read error: {}", msg),
        }
    }
}

impl Error for HistoryError {}

/// How reads treat a line that is not a valid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Fail the whole read.
    #[default]
    Strict,
    /// Log a warning and skip the line.
    Lenient,
}

/// One persisted record as read back from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl HistoryEntry {
    /// The operation tag, e.g. `analysis` or `validate_query`.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMetrics {
    pub total_entries: usize,
    pub first_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl HistoryMetrics {
    fn empty() -> Self {
        Self {
            total_entries: 0,
            first_run_at: None,
            last_run_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct WriterState {
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct HistoryStore {
    path: PathBuf,
    policy: ReadPolicy,
    sync_writes: bool,
    state: Mutex<WriterState>,
}

impl HistoryStore {
    /// Prepares the backing file, creating it and its parent directories if
    /// needed. Existing content is left untouched; the newest readable entry
    /// seeds the timestamp floor for later appends.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HistoryError::StorageInit(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // create + append never truncates, and proves the path is writable
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                HistoryError::StorageInit(format!("failed to open {}: {}", path.display(), e))
            })?;

        let last_timestamp = newest_timestamp(&path)?;
        debug!(
            "History store ready at {} (last entry at {:?})",
            path.display(),
            last_timestamp
        );

        Ok(Self {
            path,
            policy: ReadPolicy::default(),
            sync_writes: false,
            state: Mutex::new(WriterState { last_timestamp }),
        })
    }

    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamps `payload` with the current UTC time and appends it as one line.
    ///
    /// `payload` must serialize to a JSON object. A `timestamp` key in the
    /// payload is replaced by the store's own.
    pub fn append<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), HistoryError> {
        let fields = match serde_json::to_value(payload) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(HistoryError::StorageWrite(format!(
                    "history payload must be a JSON object, got {}",
                    json_type_name(&other)
                )));
            }
            Err(e) => {
                return Err(HistoryError::StorageWrite(format!(
                    "failed to serialize history payload: {}",
                    e
                )));
            }
        };

        let mut state = self.lock(HistoryError::StorageWrite)?;

        // Wall clocks can step backwards; entries must not.
        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let mut record = Map::with_capacity(fields.len() + 1);
        record.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        for (key, value) in fields {
            if key != "timestamp" {
                record.insert(key, value);
            }
        }

        let entry = serde_json::to_string(&Value::Object(record)).map_err(|e| {
            HistoryError::StorageWrite(format!("failed to serialize history entry: {}", e))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error("open", e))?;

        // A writer that died mid-line leaves a fragment with no newline.
        // Terminate it so this entry starts on a line of its own.
        let mut line = String::with_capacity(entry.len() + 2);
        if has_unterminated_tail(&mut file).map_err(|e| self.write_error("inspect", e))? {
            warn!(
                "History log {} ends in a partial line; starting a new one",
                self.path.display()
            );
            line.push('\n');
        }
        line.push_str(&entry);
        line.push('\n');

        // One buffer, one write: the line lands whole or the call fails.
        file.write_all(line.as_bytes())
            .map_err(|e| self.write_error("append to", e))?;
        file.flush().map_err(|e| self.write_error("flush", e))?;
        if self.sync_writes {
            file.sync_data().map_err(|e| self.write_error("sync", e))?;
        }

        state.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Returns up to `limit` of the newest entries, oldest first.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let lines = {
            let _guard = self.lock(HistoryError::StorageRead)?;
            self.read_lines()?
        };

        let mut recent = Vec::with_capacity(limit.min(lines.len()));
        for (index, line) in lines.iter().enumerate().rev() {
            if recent.len() == limit {
                break;
            }
            if let Some(entry) = self.parse_line(index + 1, line)? {
                recent.push(entry);
            }
        }
        recent.reverse();

        Ok(recent)
    }

    /// Counts entries and reports the first and last timestamps by scanning
    /// the whole log.
    ///
    /// Under [`ReadPolicy::Strict`] only the first and last lines are parsed:
    /// every other non-blank line is counted as an entry without being
    /// validated, so a malformed line in the middle does not fail the call.
    /// Use [`HistoryStore::get_recent`] with a large limit to validate a log.
    pub fn metrics(&self) -> Result<HistoryMetrics, HistoryError> {
        let lines = {
            let _guard = self.lock(HistoryError::StorageRead)?;
            self.read_lines()?
        };

        if lines.is_empty() {
            return Ok(HistoryMetrics::empty());
        }

        match self.policy {
            ReadPolicy::Strict => {
                let first = self.parse_line(1, &lines[0])?;
                let last = self.parse_line(lines.len(), &lines[lines.len() - 1])?;
                Ok(HistoryMetrics {
                    total_entries: lines.len(),
                    first_run_at: first.map(|e| e.timestamp),
                    last_run_at: last.map(|e| e.timestamp),
                })
            }
            ReadPolicy::Lenient => {
                let mut metrics = HistoryMetrics::empty();
                for (index, line) in lines.iter().enumerate() {
                    if let Some(entry) = self.parse_line(index + 1, line)? {
                        metrics.total_entries += 1;
                        metrics.first_run_at.get_or_insert(entry.timestamp);
                        metrics.last_run_at = Some(entry.timestamp);
                    }
                }
                Ok(metrics)
            }
        }
    }

    /// `poisoned` picks the error variant, so readers report `StorageRead`.
    fn lock(
        &self,
        poisoned: fn(String) -> HistoryError,
    ) -> Result<MutexGuard<'_, WriterState>, HistoryError> {
        self.state
            .lock()
            .map_err(|e| poisoned(format!("history lock poisoned: {}", e)))
    }

    /// Non-blank lines in file order. A missing file reads as empty.
    fn read_lines(&self) -> Result<Vec<String>, HistoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::StorageRead(format!(
                    "failed to open {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| {
                HistoryError::StorageRead(format!("failed to read {}: {}", self.path.display(), e))
            })?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Ok(lines)
    }

    /// `Ok(None)` means the line was skipped under the lenient policy.
    fn parse_line(&self, line_no: usize, line: &str) -> Result<Option<HistoryEntry>, HistoryError> {
        match serde_json::from_str::<HistoryEntry>(line) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => match self.policy {
                ReadPolicy::Strict => Err(HistoryError::StorageRead(format!(
                    "malformed entry at line {} of {}: {}",
                    line_no,
                    self.path.display(),
                    e
                ))),
                ReadPolicy::Lenient => {
                    warn!(
                        "Skipping malformed history entry at line {} of {}: {}",
                        line_no,
                        self.path.display(),
                        e
                    );
                    Ok(None)
                }
            },
        }
    }

    fn write_error(&self, action: &str, e: std::io::Error) -> HistoryError {
        HistoryError::StorageWrite(format!("failed to {} {}: {}", action, self.path.display(), e))
    }
}

/// True when the file is non-empty and its last byte is not `\n`.
fn has_unterminated_tail(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Timestamp of the newest parseable entry. Unparseable lines are ignored
/// here whatever the read policy; reads report them.
fn newest_timestamp(path: &Path) -> Result<Option<DateTime<Utc>>, HistoryError> {
    let content = std::fs::read(path).map_err(|e| {
        HistoryError::StorageInit(format!("failed to read {}: {}", path.display(), e))
    })?;

    Ok(content
        .split(|byte| *byte == b'\n')
        .rev()
        .find_map(|line| serde_json::from_slice::<HistoryEntry>(line).ok())
        .map(|entry| entry.timestamp))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

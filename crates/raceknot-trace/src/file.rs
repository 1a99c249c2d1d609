//! Recorded trace files.
//!
//! A [`TraceLog`] holds the per-thread serial traces captured from one
//! execution of a raced call pair.  Logs are stored as JSON for tooling
//! and can also be read from the plain-text dump format produced by the
//! execution layer:
//!
//! ```text
//! serial 0
//! 0x81c6f5fa 0xb5cf020 8 1 63084
//! 0x81c6f69d 0x7b92930 4 0 63089
//! serial 1
//! 0x821fa4f2 0x7b92930 4 0 66942
//! ```
//!
//! Each access line is `inst addr size kind timestamp`; numbers accept a
//! `0x` prefix.  The thread id is taken from the enclosing `serial` header.

use crate::access::{Access, AccessKind};
use crate::serial::SerialTrace;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from loading or saving trace files.
#[derive(Debug, Error)]
pub enum TraceLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Serial traces from one execution, indexed by logical thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLog {
    /// Free-form label (program name, call pair, ...).
    #[serde(default)]
    pub label: String,
    pub serials: Vec<SerialTrace>,
}

impl TraceLog {
    pub fn new(label: impl Into<String>, serials: Vec<SerialTrace>) -> Self {
        Self {
            label: label.into(),
            serials,
        }
    }

    /// Save the log as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), TraceLogError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a JSON log.
    pub fn load(path: &Path) -> Result<Self, TraceLogError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load either format, picking JSON when the file starts with `{`.
    pub fn load_any(path: &Path) -> Result<Self, TraceLogError> {
        let raw = std::fs::read_to_string(path)?;
        if raw.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&raw)?)
        } else {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut log = Self::parse_text(&raw)?;
            log.label = label;
            Ok(log)
        }
    }

    /// Parse the plain-text dump format.
    pub fn parse_text(raw: &str) -> Result<Self, TraceLogError> {
        let mut serials: Vec<Vec<Access>> = Vec::new();
        let mut current: Option<usize> = None;

        for (lineno, line) in raw.lines().enumerate() {
            let lineno = lineno + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let toks: Vec<&str> = line.split_whitespace().collect();
            if toks[0] == "serial" {
                let tid = toks
                    .get(1)
                    .ok_or_else(|| parse_err(lineno, "serial header without thread id"))
                    .and_then(|t| parse_num(t, lineno))? as usize;
                // serial ids are dense: a header may reopen a serial or start the next one
                if tid > serials.len() {
                    return Err(parse_err(
                        lineno,
                        &format!("serial {} skips past serial {}", tid, serials.len()),
                    ));
                }
                if tid == serials.len() {
                    serials.push(Vec::new());
                }
                current = Some(tid);
                continue;
            }
            let tid = current.ok_or_else(|| parse_err(lineno, "access before any serial header"))?;
            if toks.len() < 5 {
                return Err(parse_err(
                    lineno,
                    &format!("expected 5 fields, found {}", toks.len()),
                ));
            }
            let kind = AccessKind::try_from(parse_num(toks[3], lineno)?)
                .map_err(|e| parse_err(lineno, &e.to_string()))?;
            serials[tid].push(Access::new(
                parse_num(toks[0], lineno)?,
                parse_num(toks[1], lineno)?,
                parse_num(toks[2], lineno)?,
                kind,
                parse_num(toks[4], lineno)?,
                tid as u64,
            ));
        }

        log::debug!("parsed {} serial traces", serials.len());
        Ok(Self {
            label: String::new(),
            serials: serials.into_iter().map(SerialTrace::from_accesses).collect(),
        })
    }

    /// Total number of accesses across all serials.
    pub fn len(&self) -> usize {
        self.serials.iter().map(SerialTrace::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.serials.iter().all(SerialTrace::is_empty)
    }
}

fn parse_err(line: usize, reason: &str) -> TraceLogError {
    TraceLogError::Parse {
        line,
        reason: reason.to_string(),
    }
}

fn parse_num(tok: &str, line: usize) -> Result<u32, TraceLogError> {
    let parsed = match tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => tok.parse::<u32>(),
    };
    parsed.map_err(|e| parse_err(line, &format!("bad number {:?}: {}", tok, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DUMP: &str = "\
# two threads racing on one word
serial 0
0x81c6f5fa 0xb5cf020 8 1 63084
0x81c6f69d 0x7b92930 4 0 63089
serial 1
0x821fa4f2 0x7b92930 4 0 66942
0x821f94a8 0x7b9293c 4 1 66947
";

    #[test]
    fn parse_text_dump() {
        let log = TraceLog::parse_text(DUMP).unwrap();
        assert_eq!(log.serials.len(), 2);
        assert_eq!(log.len(), 4);
        assert_eq!(log.serials[0][0].inst, 0x81c6f5fa);
        assert_eq!(log.serials[0][0].kind, AccessKind::Store);
        assert_eq!(log.serials[0][1].size, 4);
        assert_eq!(log.serials[1].thread(), Some(1));
        assert_eq!(log.serials[1][1].timestamp, 66947);
    }

    #[test]
    fn parse_rejects_access_without_header() {
        let err = TraceLog::parse_text("0x1 0x2 4 0 1\n").unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 1, .. }));
    }

    #[test]
    fn parse_rejects_bad_kind() {
        let err = TraceLog::parse_text("serial 0\n0x1 0x2 4 9 1\n").unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 2, .. }));
        assert!(err.to_string().contains("unknown access kind"));
    }

    #[test]
    fn parse_rejects_sparse_serial_ids() {
        let err = TraceLog::parse_text("serial 4000000000\n").unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 1, .. }));
        assert!(err.to_string().contains("skips past serial 0"));

        let err = TraceLog::parse_text("serial 0\n0x1 0x2 4 0 1\nserial 2\n").unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 3, .. }));
    }

    #[test]
    fn parse_reopens_serial() {
        let raw = "serial 0\n0x1 0x2 4 0 1\nserial 1\n0x3 0x2 4 1 2\nserial 0\n0x4 0x2 4 0 3\n";
        let log = TraceLog::parse_text(raw).unwrap();
        assert_eq!(log.serials.len(), 2);
        assert_eq!(log.serials[0].len(), 2);
    }

    #[test]
    fn parse_rejects_short_line() {
        let err = TraceLog::parse_text("serial 0\n0x1 0x2 4\n").unwrap_err();
        assert!(err.to_string().contains("expected 5 fields"));
    }

    #[test]
    fn save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");

        let mut log = TraceLog::parse_text(DUMP).unwrap();
        log.label = "watchqueue".to_string();
        log.save(&path).unwrap();

        let loaded = TraceLog::load(&path).unwrap();
        assert_eq!(loaded, log);
        let any = TraceLog::load_any(&path).unwrap();
        assert_eq!(any, log);
    }

    #[test]
    fn load_any_reads_text_dump() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watchqueue");
        std::fs::write(&path, DUMP).unwrap();

        let log = TraceLog::load_any(&path).unwrap();
        assert_eq!(log.label, "watchqueue");
        assert_eq!(log.serials.len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let result = TraceLog::load(Path::new("/nonexistent/trace.json"));
        assert!(matches!(result, Err(TraceLogError::Io(_))));
    }
}

//! Append-only, hash-chained audit trail of provisioning runs.

use crate::constants;
use crate::core::inspect::Check;
use crate::core::paths::HostPaths;
use crate::util::fs as host_fs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const HASH_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// `apply` or `rollback`.
    pub action: String,
    pub actor: String,
    /// Step name or rolled-back artifact.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<usize>,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u8>,
}

/// What happened, before chaining.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: String,
    pub actor: String,
    pub target: String,
    pub changed: Option<usize>,
    pub result: AuditResult,
}

impl AuditRecord {
    pub fn success(action: &str, actor: &str, target: &str, changed: Option<usize>) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            target: target.to_string(),
            changed,
            result: AuditResult {
                success: true,
                error: None,
            },
        }
    }

    pub fn failure(action: &str, actor: &str, target: &str, error: String) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            target: target.to_string(),
            changed: None,
            result: AuditResult {
                success: false,
                error: Some(error),
            },
        }
    }
}

/// Append a record to the audit log, chained to the previous entry.
///
/// Callers hold the run lock, so appends are serialized.
pub fn append(paths: &HostPaths, record: AuditRecord) -> Result<AuditEntry> {
    host_fs::ensure_dir(&paths.state_dir, constants::STATE_DIR_MODE)?;
    let prev_hash = read_log(paths, None)?
        .last()
        .and_then(|e| e.entry_hash.clone());

    let mut entry = AuditEntry {
        timestamp: Utc::now(),
        action: record.action,
        actor: record.actor,
        target: record.target,
        changed: record.changed,
        result: record.result,
        prev_hash,
        entry_hash: None,
        hash_version: Some(HASH_VERSION),
    };
    entry.entry_hash = Some(compute_entry_hash(&entry)?);

    let line = serde_json::to_string(&entry).context("serialize audit entry")?;
    append_line(&paths.audit_log, &line)?;
    Ok(entry)
}

/// Compute canonical hash for an entry (excludes entry_hash field).
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = canonicalize_value(&value);
    let canonical_str = serde_json::to_string(&canonical).context("serialize canonical json")?;
    let hash = Sha256::digest(canonical_str.as_bytes());
    Ok(format!("{:064x}", hash))
}

/// Canonicalize JSON by recursively sorting object keys.
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(audit_path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .with_context(|| format!("open audit log {}", audit_path.display()))?;
    writeln!(file, "{}", line).context("write audit entry")?;
    host_fs::set_permissions(audit_path, constants::AUDIT_LOG_MODE)
        .context("set audit log permissions")?;
    Ok(())
}

/// Read audit entries, keeping the last `limit` when given.
pub fn read_log(paths: &HostPaths, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    if !paths.audit_log.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(&paths.audit_log)
        .with_context(|| format!("open audit log {}", paths.audit_log.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for line in reader.lines() {
        let line = line.context("read audit log line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => malformed += 1,
        }
    }

    if malformed > 0 {
        eprintln!("warning: {} malformed audit entries skipped", malformed);
    }

    if let Some(limit) = limit {
        if entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
    }

    Ok(entries)
}

/// Check every entry's link to its predecessor and its own hash.
///
/// Yields one failed check per broken entry, or a single passing
/// `audit chain` check when the whole log is intact.
pub fn verify_chain(paths: &HostPaths) -> Result<Vec<Check>> {
    let entries = read_log(paths, None)?;
    if entries.is_empty() {
        return Ok(vec![Check::warn("audit chain", "no entries recorded yet")]);
    }

    let mut checks = Vec::new();
    let mut prev_entry_hash: Option<String> = None;
    for (i, entry) in entries.iter().enumerate() {
        let name = format!("entry {} ({} {})", i + 1, entry.action, entry.target);
        if i > 0 && entry.prev_hash != prev_entry_hash {
            checks.push(Check::fail(
                name.as_str(),
                format!("prev_hash mismatch (expected {:?}, got {:?})", prev_entry_hash, entry.prev_hash),
            ));
        }
        match &entry.entry_hash {
            Some(stored) => match compute_entry_hash(entry) {
                Ok(computed) if &computed == stored => {}
                Ok(_) => checks.push(Check::fail(name.as_str(), "entry_hash mismatch (tampered?)")),
                Err(e) => checks.push(Check::fail(name.as_str(), format!("cannot compute hash: {}", e))),
            },
            None => checks.push(Check::fail(name.as_str(), "missing entry_hash")),
        }
        prev_entry_hash = entry.entry_hash.clone();
    }

    if checks.is_empty() {
        checks.push(Check::pass(
            "audit chain",
            format!("{} entries linked and unmodified", entries.len()),
        ));
    }
    Ok(checks)
}

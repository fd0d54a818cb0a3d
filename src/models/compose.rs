//! Orchestration manifest (`docker-compose.yml`) model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    pub user: String,
    pub read_only: bool,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub pids_limit: u32,
    pub mem_limit: String,
    pub cpus: f64,
    pub volumes: Vec<String>,
    pub logging: ComposeLogging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeLogging {
    pub driver: String,
    pub options: BTreeMap<String, String>,
}

/// A short-syntax bind mount `source:target[:mode]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub mode: String,
}

impl BindMount {
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split(':');
        let source = parts.next().filter(|s| !s.is_empty())?;
        let target = parts.next().filter(|s| !s.is_empty())?;
        let mode = parts.next().unwrap_or("rw");
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            target: target.to_string(),
            mode: mode.to_string(),
        })
    }

    pub fn is_read_write(&self) -> bool {
        self.mode.split(',').any(|flag| flag == "rw")
    }
}

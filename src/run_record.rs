//! Persistent record of the latest provisioning run.
//!
//! Written to `<state_dir>/provision-run.json` after preflight passes and
//! rewritten after every step, so a host left half-provisioned shows which
//! step stopped it. The record is informational only; it never causes a step
//! to be skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{IoContext, ProvisionError, Result};

const RUN_RECORD_FILENAME: &str = "provision-run.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub fqdn: String,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn start(fqdn: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            run_id: format!("{}-{}", now.unix_timestamp(), std::process::id()),
            status: RunStatus::Running,
            fqdn: fqdn.to_string(),
            created_at_utc: timestamp(now),
            finished_at_utc: None,
            completed_steps: Vec::new(),
            failed_step: None,
            error: None,
        }
    }

    pub fn step_completed(&mut self, step: &str) {
        self.completed_steps.push(step.to_string());
    }

    pub fn finish_success(&mut self) {
        self.status = RunStatus::Success;
        self.finished_at_utc = Some(timestamp(OffsetDateTime::now_utc()));
    }

    pub fn finish_failed(&mut self, step: &str, error: &str) {
        self.status = RunStatus::Failed;
        self.failed_step = Some(step.to_string());
        self.error = Some(error.to_string());
        self.finished_at_utc = Some(timestamp(OffsetDateTime::now_utc()));
    }
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn record_path(state_dir: &Path) -> PathBuf {
    state_dir.join(RUN_RECORD_FILENAME)
}

/// Load the last written record, if any.
pub fn load(state_dir: &Path) -> Result<Option<RunRecord>> {
    let path = record_path(state_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path).io_context(|| format!("reading run record '{}'", path.display()))?;
    let record = serde_json::from_slice(&bytes).map_err(|err| {
        ProvisionError::io(
            format!("parsing run record '{}'", path.display()),
            err.into(),
        )
    })?;
    Ok(Some(record))
}

/// Write the record via a temp file and rename.
pub fn save(state_dir: &Path, record: &RunRecord) -> Result<()> {
    fs::create_dir_all(state_dir)
        .io_context(|| format!("creating state directory '{}'", state_dir.display()))?;
    let path = record_path(state_dir);
    let tmp = state_dir.join(format!(".{RUN_RECORD_FILENAME}.tmp"));
    let json = serde_json::to_vec_pretty(record).map_err(|err| {
        ProvisionError::io(format!("encoding run record '{}'", path.display()), err.into())
    })?;
    fs::write(&tmp, json).io_context(|| format!("writing run record '{}'", tmp.display()))?;
    fs::rename(&tmp, &path)
        .io_context(|| format!("renaming '{}' -> '{}'", tmp.display(), path.display()))?;
    Ok(())
}

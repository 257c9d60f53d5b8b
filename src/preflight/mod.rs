//! Preflight checks run before anything on the host is touched.
//!
//! Order matters: privilege first, then the OS identity, then tool lookup.
//! None of these checks write to the filesystem or spawn mutating commands.
//!
//! # Example
//!
//! ```rust
//! use mailhost_provision::preflight::{check_required_tools, parse_os_release};
//!
//! let identity = parse_os_release("ID=ubuntu\nVERSION_ID=\"22.04\"\n");
//! assert_eq!(identity.version_id.as_deref(), Some("22.04"));
//!
//! let tools = vec!["sh".to_string()];
//! assert!(check_required_tools(&tools).is_ok());
//! ```

use std::fs;
use std::path::Path;

use crate::error::{ProvisionError, Result};
use crate::process::command_exists;

/// Effective UID of this process.
pub fn current_euid() -> u32 {
    unsafe { libc::geteuid() }
}

/// Fail unless running as root.
pub fn check_privileges(euid: u32) -> Result<()> {
    if euid == 0 {
        Ok(())
    } else {
        Err(ProvisionError::Permission { euid })
    }
}

/// `ID` and `VERSION_ID` from an os-release file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsIdentity {
    pub id: Option<String>,
    pub version_id: Option<String>,
}

impl OsIdentity {
    pub fn describe(&self) -> String {
        format!(
            "{} {}",
            self.id.as_deref().unwrap_or("unknown"),
            self.version_id.as_deref().unwrap_or("unknown")
        )
    }
}

pub fn parse_os_release(content: &str) -> OsIdentity {
    let mut identity = OsIdentity::default();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
        match key.trim() {
            "ID" => identity.id = Some(value),
            "VERSION_ID" => identity.version_id = Some(value),
            _ => {}
        }
    }
    identity
}

/// Fail unless the os-release at `os_release` names the expected distro/version.
///
/// An unreadable os-release is reported as an unsupported platform rather
/// than an I/O error: a host without one is not Ubuntu.
pub fn check_platform(os_release: &Path, expected_id: &str, expected_version: &str) -> Result<()> {
    let expected = format!("{expected_id} {expected_version}");
    let content = match fs::read_to_string(os_release) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProvisionError::UnsupportedPlatform {
                expected,
                found: format!("no {}", os_release.display()),
            });
        }
        Err(err) => {
            return Err(ProvisionError::io(
                format!("reading os identity '{}'", os_release.display()),
                err,
            ))
        }
    };

    let identity = parse_os_release(&content);
    let matches = identity.id.as_deref() == Some(expected_id)
        && identity.version_id.as_deref() == Some(expected_version);
    if matches {
        Ok(())
    } else {
        Err(ProvisionError::UnsupportedPlatform {
            expected,
            found: identity.describe(),
        })
    }
}

/// Check that every tool resolves on `PATH`.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` listing every missing tool
pub fn check_required_tools(tools: &[String]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| !command_exists(tool))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::MissingTools { tools: missing })
    }
}

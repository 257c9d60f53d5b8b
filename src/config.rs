//! Provisioning configuration.
//!
//! The compiled-in defaults are the primary configuration: edit them before
//! building for a new host. A TOML file named by `MAILHOST_PROVISION_CONFIG`
//! may override individual keys; missing keys keep their defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, ProvisionError, Result};

/// Environment variable naming an optional TOML override file.
pub const CONFIG_ENV: &str = "MAILHOST_PROVISION_CONFIG";

pub const DEFAULT_HOSTNAME: &str = "mail";
pub const DEFAULT_DOMAIN: &str = "example.com";
pub const DEFAULT_CONTACT_EMAIL: &str = "postmaster@example.com";
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://files.zimbra.com/downloads/10.0.0_GA/zcs-10.0.0_GA_4518.UBUNTU22_64.20230301065514.tgz";

/// SSH, SMTP, HTTP, POP3, IMAP, HTTPS, SMTPS, submission, IMAPS, POP3S, admin console.
pub const DEFAULT_TCP_PORTS: &[u16] = &[22, 25, 80, 110, 143, 443, 465, 587, 993, 995, 7071];

pub const DEFAULT_PACKAGES: &[&str] = &[
    "net-tools",
    "netcat-openbsd",
    "libidn12",
    "libpcre3",
    "libgmp10",
    "libexpat1",
    "libstdc++6",
    "libperl5.34",
    "libaio1",
    "resolvconf",
    "unzip",
    "pax",
    "sysstat",
    "sqlite3",
    "wget",
    "ufw",
    "certbot",
];

pub const DEFAULT_REQUIRED_TOOLS: &[&str] = &["hostnamectl", "apt-get", "tar", "su"];

/// Filesystem locations touched on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostPaths {
    pub os_release: PathBuf,
    pub hosts_file: PathBuf,
    pub install_dir: PathBuf,
    pub letsencrypt_live_dir: PathBuf,
    /// Mail server installation root (holds `bin/` and `ssl/`).
    pub mail_root: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            os_release: PathBuf::from("/etc/os-release"),
            hosts_file: PathBuf::from("/etc/hosts"),
            install_dir: PathBuf::from("/opt/mailhost-install"),
            letsencrypt_live_dir: PathBuf::from("/etc/letsencrypt/live"),
            mail_root: PathBuf::from("/opt/zimbra"),
            state_dir: PathBuf::from("/var/lib/mailhost-provision"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Short host label, also written as the hosts-file alias.
    pub hostname: String,
    pub domain: String,
    pub contact_email: String,
    pub download_url: String,
    pub archive_sha256: Option<String>,
    pub tcp_ports: Vec<u16>,
    pub packages: Vec<String>,
    pub required_tools: Vec<String>,
    pub expected_os_id: String,
    pub expected_os_version: String,
    /// Overrides local IP detection when set.
    pub ip_address: Option<String>,
    pub service_user: String,
    pub installer_entry: String,
    pub paths: HostPaths,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            archive_sha256: None,
            tcp_ports: DEFAULT_TCP_PORTS.to_vec(),
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            required_tools: DEFAULT_REQUIRED_TOOLS.iter().map(|t| t.to_string()).collect(),
            expected_os_id: "ubuntu".to_string(),
            expected_os_version: "22.04".to_string(),
            ip_address: None,
            service_user: "zimbra".to_string(),
            installer_entry: "install.sh".to_string(),
            paths: HostPaths::default(),
        }
    }
}

impl ProvisionConfig {
    /// Fully-qualified host name, `<hostname>.<domain>`.
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.hostname, self.domain)
    }

    /// File name of the installer bundle, taken from the last URL segment.
    pub fn archive_file_name(&self) -> Result<String> {
        let trimmed = self
            .download_url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        match trimmed.rsplit('/').next() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(ProvisionError::Config(format!(
                "download_url '{}' has no file name",
                self.download_url
            ))),
        }
    }

    pub fn archive_path(&self) -> Result<PathBuf> {
        Ok(self.paths.install_dir.join(self.archive_file_name()?))
    }

    /// Defaults, overridden by the TOML file named in [`CONFIG_ENV`] if set.
    pub fn load() -> Result<Self> {
        let config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .io_context(|| format!("reading provisioning config '{}'", path.display()))?;
        Self::from_toml_str(&raw).map_err(|err| match err {
            ProvisionError::Config(msg) => {
                ProvisionError::Config(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| ProvisionError::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !is_dns_label(&self.hostname) {
            return invalid(format!(
                "hostname '{}' is not a valid DNS label",
                self.hostname
            ));
        }
        if !self.domain.contains('.') || !self.domain.split('.').all(is_dns_label) {
            return invalid(format!("domain '{}' is not a valid domain", self.domain));
        }
        let email_ok = self
            .contact_email
            .split_once('@')
            .is_some_and(|(user, host)| !user.is_empty() && host.contains('.'));
        if !email_ok {
            return invalid(format!(
                "contact_email '{}' is not an address",
                self.contact_email
            ));
        }
        if !self.download_url.starts_with("https://") {
            return invalid(format!(
                "download_url '{}' must use https",
                self.download_url
            ));
        }
        self.archive_file_name()?;

        let mut seen = Vec::with_capacity(self.tcp_ports.len());
        for port in &self.tcp_ports {
            if *port == 0 {
                return invalid("tcp_ports must not contain 0".to_string());
            }
            if seen.contains(port) {
                return invalid(format!("tcp_ports lists {port} twice"));
            }
            seen.push(*port);
        }

        if self.packages.iter().all(|p| p.trim().is_empty()) {
            return invalid("packages must not be empty".to_string());
        }
        if self.service_user.trim().is_empty() {
            return invalid("service_user must not be empty".to_string());
        }
        if self.installer_entry.contains('/') || self.installer_entry.is_empty() {
            return invalid(format!(
                "installer_entry '{}' must be a bare file name",
                self.installer_entry
            ));
        }
        if let Some(digest) = &self.archive_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return invalid(format!(
                    "archive_sha256 '{digest}' is not a sha256 hex digest"
                ));
            }
        }
        if let Some(ip) = &self.ip_address {
            if ip.parse::<std::net::IpAddr>().is_err() {
                return invalid(format!("ip_address '{ip}' is not an IP address"));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> Result<()> {
    Err(ProvisionError::Config(message))
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

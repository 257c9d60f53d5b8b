//! Hostname and name-resolution table.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{IpAddr, UdpSocket};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{IoContext, ProvisionError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// Outcome of [`ensure_hosts_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostsEntryOutcome {
    /// A line already names the host; nothing was written, even if its IP differs.
    AlreadyPresent,
    Appended,
}

pub fn set_hostname_command(fqdn: &str) -> CommandSpec {
    CommandSpec::new("hostnamectl").arg("set-hostname").arg(fqdn)
}

pub fn set_hostname(runner: &mut dyn CommandRunner, fqdn: &str) -> Result<()> {
    runner.run(&set_hostname_command(fqdn))
}

/// True if an active (non-comment) line in `content` maps some address to `fqdn`.
pub fn hosts_has_entry(content: &str, fqdn: &str) -> bool {
    content.lines().any(|line| {
        let active = line.split('#').next().unwrap_or_default();
        let mut fields = active.split_whitespace();
        fields.next().is_some() && fields.any(|name| name.eq_ignore_ascii_case(fqdn))
    })
}

/// Append `<ip> <fqdn> <alias>` to the hosts file unless `fqdn` is already mapped.
///
/// The guard is by name only: an existing line with a stale address is left
/// untouched.
pub fn ensure_hosts_entry(
    hosts_file: &Path,
    ip: IpAddr,
    fqdn: &str,
    alias: &str,
) -> Result<HostsEntryOutcome> {
    let existing = match fs::read_to_string(hosts_file) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(ProvisionError::io(
                format!("reading hosts file '{}'", hosts_file.display()),
                err,
            ))
        }
    };

    if hosts_has_entry(&existing, fqdn) {
        debug!(hosts = %hosts_file.display(), fqdn, "hosts entry already present");
        return Ok(HostsEntryOutcome::AlreadyPresent);
    }

    let mut line = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        line.push('\n');
    }
    line.push_str(&format!("{ip} {fqdn} {alias}\n"));

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(hosts_file)
        .io_context(|| format!("opening hosts file '{}'", hosts_file.display()))?;
    file.write_all(line.as_bytes())
        .io_context(|| format!("appending to hosts file '{}'", hosts_file.display()))?;

    info!(hosts = %hosts_file.display(), %ip, fqdn, "hosts entry appended");
    Ok(HostsEntryOutcome::Appended)
}

/// Resolve the host's address: the configured override, or the local side of
/// an outbound UDP route.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn resolve_local_ip(configured: Option<&str>) -> Result<IpAddr> {
    if let Some(raw) = configured {
        return raw
            .parse()
            .map_err(|_| ProvisionError::Config(format!("ip_address '{raw}' is not an IP address")));
    }

    let probe = "1.1.1.1:80";
    let network = |err: std::io::Error| ProvisionError::Network {
        url: probe.to_string(),
        message: format!("detecting local address: {err}"),
    };
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(network)?;
    socket.connect(probe).map_err(network)?;
    let addr = socket.local_addr().map_err(network)?;
    Ok(addr.ip())
}

//! Certificate issuance and deployment.
//!
//! Issuance uses certbot's standalone challenge, which binds its own listener
//! on port 80. Deployment copies the issued files where the service account
//! can read them, hands them to the mail server's certificate manager, and
//! restarts the mail service.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ProvisionConfig;
use crate::error::{IoContext, Result};
use crate::process::{ensure_exists, CommandRunner, CommandSpec};

/// Files certbot leaves under `<live_dir>/<fqdn>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub private_key: PathBuf,
    pub certificate: PathBuf,
    pub chain: PathBuf,
}

impl IssuedCertificate {
    pub fn in_live_dir(live_dir: &Path, fqdn: &str) -> Self {
        let dir = live_dir.join(fqdn);
        Self {
            private_key: dir.join("privkey.pem"),
            certificate: dir.join("cert.pem"),
            chain: dir.join("chain.pem"),
        }
    }

    pub fn ensure_present(&self) -> Result<()> {
        ensure_exists(&self.private_key)?;
        ensure_exists(&self.certificate)?;
        ensure_exists(&self.chain)
    }
}

/// Where deployment places copies readable by the service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTargets {
    /// The mail server's commercial key slot.
    pub commercial_key: PathBuf,
    pub certificate: PathBuf,
    pub chain: PathBuf,
}

impl DeployTargets {
    pub fn for_config(config: &ProvisionConfig) -> Self {
        let staging = config.paths.install_dir.join("certs");
        Self {
            commercial_key: config
                .paths
                .mail_root
                .join("ssl/zimbra/commercial/commercial.key"),
            certificate: staging.join("cert.pem"),
            chain: staging.join("chain.pem"),
        }
    }
}

pub fn issue_command(fqdn: &str, contact_email: &str) -> CommandSpec {
    CommandSpec::new("certbot").args([
        "certonly",
        "--standalone",
        "-d",
        fqdn,
        "--non-interactive",
        "--agree-tos",
        "-m",
        contact_email,
    ])
}

/// `su - <user> -c "<script>"`, the mail tools only run as the service account.
fn as_service_user(user: &str, script: String) -> CommandSpec {
    CommandSpec::new("su").args(["-", user, "-c"]).arg(script)
}

pub fn deploy_command(config: &ProvisionConfig, targets: &DeployTargets) -> CommandSpec {
    let zmcertmgr = config.paths.mail_root.join("bin/zmcertmgr");
    as_service_user(
        &config.service_user,
        format!(
            "{} deploycrt comm {} {}",
            zmcertmgr.display(),
            targets.certificate.display(),
            targets.chain.display()
        ),
    )
}

pub fn restart_command(config: &ProvisionConfig) -> CommandSpec {
    let zmcontrol = config.paths.mail_root.join("bin/zmcontrol");
    as_service_user(
        &config.service_user,
        format!("{} restart", zmcontrol.display()),
    )
}

/// `chown -R` the deployed copies over to the service account.
pub fn ownership_command(config: &ProvisionConfig, targets: &DeployTargets) -> CommandSpec {
    CommandSpec::new("chown")
        .arg("-R")
        .arg(format!("{0}:{0}", config.service_user))
        .path_arg(&targets.commercial_key)
        .path_arg(&targets.certificate)
        .path_arg(&targets.chain)
}

/// Shell line for certbot's `--deploy-hook`: the same copy, chown, deploy and
/// restart sequence [`deploy`] performs, run after every successful renewal.
pub fn renewal_deploy_hook(config: &ProvisionConfig) -> String {
    let issued =
        IssuedCertificate::in_live_dir(&config.paths.letsencrypt_live_dir, &config.fqdn());
    let targets = DeployTargets::for_config(config);
    let copies = [
        (&issued.private_key, &targets.commercial_key),
        (&issued.certificate, &targets.certificate),
        (&issued.chain, &targets.chain),
    ]
    .into_iter()
    .map(|(src, dst)| format!("cp {} {}", src.display(), dst.display()));

    copies
        .chain([
            ownership_command(config, &targets).to_string(),
            deploy_command(config, &targets).to_string(),
            restart_command(config).to_string(),
        ])
        .collect::<Vec<_>>()
        .join(" && ")
}

fn copy_into(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .io_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::copy(src, dst)
        .io_context(|| format!("copying '{}' to '{}'", src.display(), dst.display()))?;
    Ok(())
}

/// Request a certificate for the configured FQDN.
pub fn issue(runner: &mut dyn CommandRunner, config: &ProvisionConfig) -> Result<IssuedCertificate> {
    let fqdn = config.fqdn();
    runner.run(&issue_command(&fqdn, &config.contact_email))?;

    let issued = IssuedCertificate::in_live_dir(&config.paths.letsencrypt_live_dir, &fqdn);
    issued.ensure_present()?;
    info!(fqdn = %fqdn, cert = %issued.certificate.display(), "certificate issued");
    Ok(issued)
}

/// Copy the issued files into place, deploy them and restart the mail service.
pub fn deploy(
    runner: &mut dyn CommandRunner,
    config: &ProvisionConfig,
    issued: &IssuedCertificate,
) -> Result<DeployTargets> {
    let targets = DeployTargets::for_config(config);
    copy_into(&issued.private_key, &targets.commercial_key)?;
    copy_into(&issued.certificate, &targets.certificate)?;
    copy_into(&issued.chain, &targets.chain)?;

    runner.run(&ownership_command(config, &targets))?;
    runner.run(&deploy_command(config, &targets))?;
    runner.run(&restart_command(config))?;
    Ok(targets)
}

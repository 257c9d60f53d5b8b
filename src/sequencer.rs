//! The provisioning driver.
//!
//! Runs [`Step::ALL`] in order and stops at the first error. Nothing is
//! rolled back: the host stays in whatever state the failing step left it,
//! and the run record says where that was.

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::artifact::{self, DownloadOutcome, Fetcher};
use crate::certs;
use crate::config::ProvisionConfig;
use crate::console;
use crate::error::{IoContext, ProvisionError, Result};
use crate::firewall;
use crate::host::{self, HostsEntryOutcome};
use crate::installer;
use crate::packages;
use crate::preflight;
use crate::process::CommandRunner;
use crate::report;
use crate::run_record::{self, RunRecord, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Preflight,
    Hostname,
    PackageUpgrade,
    PackageInstall,
    Firewall,
    Artifact,
    DelegatedInstall,
    Certificate,
    Report,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::Preflight,
        Step::Hostname,
        Step::PackageUpgrade,
        Step::PackageInstall,
        Step::Firewall,
        Step::Artifact,
        Step::DelegatedInstall,
        Step::Certificate,
        Step::Report,
    ];

    /// 1-based position in [`Step::ALL`].
    pub fn number(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map_or(0, |idx| idx + 1)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Step::Preflight => "preflight",
            Step::Hostname => "hostname",
            Step::PackageUpgrade => "package_upgrade",
            Step::PackageInstall => "package_install",
            Step::Firewall => "firewall",
            Step::Artifact => "artifact",
            Step::DelegatedInstall => "delegated_install",
            Step::Certificate => "certificate",
            Step::Report => "report",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Preflight => "Privilege and OS checks",
            Step::Hostname => "Hostname configuration",
            Step::PackageUpgrade => "Package index update/upgrade",
            Step::PackageInstall => "Dependency package installation",
            Step::Firewall => "Firewall rules",
            Step::Artifact => "Installer bundle download and extraction",
            Step::DelegatedInstall => "Interactive mail server installer",
            Step::Certificate => "TLS certificate issuance and deployment",
            Step::Report => "Post-install report",
        }
    }
}

/// The step that stopped the run and why.
#[derive(Debug, Error)]
#[error("step {}/{} ({}) failed", .step.number(), Step::ALL.len(), .step.slug())]
pub struct StepFailure {
    pub step: Step,
    #[source]
    pub error: ProvisionError,
}

/// Values one step hands to a later one.
#[derive(Debug, Default)]
pub struct ProvisionState {
    pub ip: Option<IpAddr>,
    pub archive: Option<PathBuf>,
    pub installer_dir: Option<PathBuf>,
    pub report: Option<String>,
    pub completed: Vec<Step>,
}

pub struct Sequencer<'a> {
    config: &'a ProvisionConfig,
    runner: &'a mut dyn CommandRunner,
    fetcher: &'a dyn Fetcher,
    euid: u32,
    state: ProvisionState,
    record: Option<RunRecord>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        runner: &'a mut dyn CommandRunner,
        fetcher: &'a dyn Fetcher,
        euid: u32,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
            euid,
            state: ProvisionState::default(),
            record: None,
        }
    }

    pub fn run(mut self) -> std::result::Result<ProvisionState, StepFailure> {
        let total = Step::ALL.len();
        for step in Step::ALL {
            console::step_banner(step.number(), total, step.label());
            let span = info_span!("step", step = step.slug());
            let _guard = span.enter();

            if let Err(error) = self.run_step(step) {
                self.record_failure(step, &error);
                return Err(StepFailure { step, error });
            }
            self.state.completed.push(step);
            self.record_progress(step)
                .map_err(|error| StepFailure { step, error })?;
            info!("step complete");
        }

        self.record_success().map_err(|error| StepFailure {
            step: Step::Report,
            error,
        })?;
        Ok(self.state)
    }

    fn run_step(&mut self, step: Step) -> Result<()> {
        match step {
            Step::Preflight => self.preflight(),
            Step::Hostname => self.hostname(),
            Step::PackageUpgrade => packages::refresh_and_upgrade(self.runner),
            Step::PackageInstall => packages::install(self.runner, &self.config.packages),
            Step::Firewall => firewall::configure(self.runner, &self.config.tcp_ports),
            Step::Artifact => self.artifact(),
            Step::DelegatedInstall => self.delegated_install(),
            Step::Certificate => self.certificate(),
            Step::Report => self.report(),
        }
    }

    fn preflight(&mut self) -> Result<()> {
        let config = self.config;
        preflight::check_privileges(self.euid)?;
        preflight::check_platform(
            &config.paths.os_release,
            &config.expected_os_id,
            &config.expected_os_version,
        )?;
        preflight::check_required_tools(&config.required_tools)?;
        console::ok(&format!(
            "running as root on {} {}",
            config.expected_os_id, config.expected_os_version
        ));
        Ok(())
    }

    fn hostname(&mut self) -> Result<()> {
        let config = self.config;
        let fqdn = config.fqdn();
        let ip = host::resolve_local_ip(config.ip_address.as_deref())?;
        self.state.ip = Some(ip);

        console::status(&format!("setting hostname to {fqdn}"));
        host::set_hostname(self.runner, &fqdn)?;

        match host::ensure_hosts_entry(&config.paths.hosts_file, ip, &fqdn, &config.hostname)? {
            HostsEntryOutcome::Appended => console::ok(&format!(
                "added '{ip} {fqdn} {}' to {}",
                config.hostname,
                config.paths.hosts_file.display()
            )),
            HostsEntryOutcome::AlreadyPresent => console::warn(&format!(
                "{} already maps {fqdn}; leaving it unchanged",
                config.paths.hosts_file.display()
            )),
        }
        Ok(())
    }

    fn artifact(&mut self) -> Result<()> {
        let config = self.config;
        let install_dir = &config.paths.install_dir;
        fs::create_dir_all(install_dir)
            .io_context(|| format!("creating install directory '{}'", install_dir.display()))?;

        let archive = config.archive_path()?;
        match artifact::acquire(self.fetcher, &config.download_url, &archive)? {
            DownloadOutcome::AlreadyPresent => console::warn(&format!(
                "{} already exists; skipping download",
                archive.display()
            )),
            DownloadOutcome::Downloaded => {
                console::ok(&format!("downloaded {}", archive.display()))
            }
        }

        if let Some(expected) = &config.archive_sha256 {
            artifact::verify_sha256(&archive, expected)?;
            console::ok("archive checksum verified");
        }

        artifact::extract(self.runner, &archive, install_dir)?;
        self.state.archive = Some(archive);
        Ok(())
    }

    fn delegated_install(&mut self) -> Result<()> {
        let config = self.config;
        let archive = match &self.state.archive {
            Some(archive) => archive.clone(),
            None => config.archive_path()?,
        };
        let installer_dir = installer::locate_installer_dir(&archive, &config.paths.install_dir)?;

        console::status(&format!(
            "starting {} in {}; answer its prompts to continue",
            config.installer_entry,
            installer_dir.display()
        ));
        installer::run_interactive(self.runner, &installer_dir, &config.installer_entry)?;
        self.state.installer_dir = Some(installer_dir);
        Ok(())
    }

    fn certificate(&mut self) -> Result<()> {
        let config = self.config;
        console::status(&format!(
            "requesting certificate for {} (standalone challenge)",
            config.fqdn()
        ));
        let issued = certs::issue(self.runner, config)?;
        let targets = certs::deploy(self.runner, config, &issued)?;
        console::ok(&format!(
            "certificate deployed ({}) and mail service restarted",
            targets.certificate.display()
        ));
        Ok(())
    }

    fn report(&mut self) -> Result<()> {
        let ip = match self.state.ip {
            Some(ip) => ip,
            None => host::resolve_local_ip(self.config.ip_address.as_deref())?,
        };
        let rendered = report::render(self.config, ip);
        println!();
        print!("{rendered}");
        self.state.report = Some(rendered);
        Ok(())
    }

    /// Preflight opens the record; every later step extends it.
    fn record_progress(&mut self, step: Step) -> Result<()> {
        let state_dir = &self.config.paths.state_dir;
        if step == Step::Preflight {
            match run_record::load(state_dir) {
                Ok(Some(previous)) if previous.status != RunStatus::Success => {
                    console::warn(&format!(
                        "previous run {} stopped at {}",
                        previous.run_id,
                        previous.failed_step.as_deref().unwrap_or("an unknown step")
                    ));
                }
                Ok(_) => {}
                // Informational only; this run's record replaces it.
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable run record");
                    console::warn(&format!(
                        "previous run record is unreadable ({err}); replacing it"
                    ));
                }
            }
            self.record = Some(RunRecord::start(&self.config.fqdn()));
        }

        match self.record.as_mut() {
            Some(record) => {
                record.step_completed(step.slug());
                run_record::save(state_dir, record)
            }
            None => Ok(()),
        }
    }

    fn record_success(&mut self) -> Result<()> {
        let Some(record) = self.record.as_mut() else {
            return Ok(());
        };
        record.finish_success();
        run_record::save(&self.config.paths.state_dir, record).map_err(|err| {
            ProvisionError::RecordNotSaved {
                source: Box::new(err),
            }
        })
    }

    fn record_failure(&mut self, step: Step, error: &ProvisionError) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        record.finish_failed(step.slug(), &error.to_string());
        if let Err(save_err) = run_record::save(&self.config.paths.state_dir, record) {
            warn!(error = %save_err, "could not write failed run record");
        }
    }
}

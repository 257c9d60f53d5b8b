use std::cell::Cell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mailhost_provision::error::Result;
use mailhost_provision::run_record::{self, RunStatus};
use mailhost_provision::{
    CommandRunner, CommandSpec, Fetcher, HostPaths, ProvisionConfig, ProvisionError, Sequencer,
    Step,
};
use tempfile::TempDir;

const JAMMY: &str = "ID=ubuntu\nVERSION_ID=\"22.04\"\n";
const STOCK_HOSTS: &str = "127.0.0.1 localhost\n";

struct Host {
    _tmp: TempDir,
    root: PathBuf,
    config: ProvisionConfig,
}

impl Host {
    fn new(os_release: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        fs::write(root.join("os-release"), os_release).unwrap();
        fs::write(root.join("hosts"), STOCK_HOSTS).unwrap();

        let config = ProvisionConfig {
            download_url: "https://downloads.example.net/zcs-test.tgz".into(),
            required_tools: Vec::new(),
            ip_address: Some("203.0.113.10".into()),
            paths: HostPaths {
                os_release: root.join("os-release"),
                hosts_file: root.join("hosts"),
                install_dir: root.join("install"),
                letsencrypt_live_dir: root.join("letsencrypt/live"),
                mail_root: root.join("zimbra"),
                state_dir: root.join("state"),
            },
            ..ProvisionConfig::default()
        };

        Self {
            _tmp: tmp,
            root,
            config,
        }
    }

    fn hosts(&self) -> String {
        fs::read_to_string(&self.config.paths.hosts_file).unwrap()
    }
}

fn write_bundle(dest: &Path) {
    let file = File::create(dest).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
    for (path, body) in [
        ("zcs-test/install.sh", "#!/bin/sh\n"),
        ("zcs-test/packages/README", "pkgs\n"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        builder.append_data(&mut header, path, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

struct BundleFetcher {
    calls: Cell<usize>,
}

impl BundleFetcher {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
        }
    }
}

impl Fetcher for BundleFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        write_bundle(dest);
        Ok(())
    }
}

/// Records every command. `tar` really unpacks and `certbot` leaves PEM files
/// behind so later steps see what the real tools would produce.
struct FakeHost {
    commands: Vec<String>,
    live_dir: PathBuf,
    fail_on: Option<&'static str>,
}

impl FakeHost {
    fn new(config: &ProvisionConfig) -> Self {
        Self {
            commands: Vec::new(),
            live_dir: config.paths.letsencrypt_live_dir.join(config.fqdn()),
            fail_on: None,
        }
    }

    fn failing_on(mut self, prefix: &'static str) -> Self {
        self.fail_on = Some(prefix);
        self
    }

    fn ran(&self, prefix: &str) -> bool {
        self.commands.iter().any(|c| c.starts_with(prefix))
    }
}

impl CommandRunner for FakeHost {
    fn run(&mut self, cmd: &CommandSpec) -> Result<()> {
        let rendered = cmd.to_string();
        self.commands.push(rendered.clone());

        if let Some(prefix) = self.fail_on {
            if rendered.starts_with(prefix) {
                return Err(ProvisionError::ExternalCommand {
                    command: rendered,
                    status: "exit status: 100".into(),
                });
            }
        }

        match cmd.program.as_str() {
            "tar" => {
                let archive = File::open(&cmd.args[1]).unwrap();
                tar::Archive::new(GzDecoder::new(archive))
                    .unpack(&cmd.args[3])
                    .unwrap();
            }
            "certbot" => {
                fs::create_dir_all(&self.live_dir).unwrap();
                for name in ["privkey.pem", "cert.pem", "chain.pem"] {
                    fs::write(self.live_dir.join(name), name).unwrap();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[test]
fn non_root_stops_before_any_mutation() {
    let host = Host::new(JAMMY);
    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();

    let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 1000)
        .run()
        .unwrap_err();

    assert_eq!(failure.step, Step::Preflight);
    assert!(matches!(failure.error, ProvisionError::Permission { euid: 1000 }));
    assert!(runner.commands.is_empty());
    assert_eq!(fetcher.calls.get(), 0);
    assert_eq!(host.hosts(), STOCK_HOSTS);
    assert!(!host.config.paths.state_dir.exists());
    assert!(!host.config.paths.install_dir.exists());
}

#[test]
fn wrong_release_stops_before_any_mutation() {
    let host = Host::new("ID=ubuntu\nVERSION_ID=\"24.04\"\n");
    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();

    let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap_err();

    assert_eq!(failure.step, Step::Preflight);
    assert!(matches!(
        failure.error,
        ProvisionError::UnsupportedPlatform { .. }
    ));
    assert!(runner.commands.is_empty());
    assert_eq!(host.hosts(), STOCK_HOSTS);
    assert!(!host.config.paths.state_dir.exists());
}

#[test]
fn full_run_reports_host_domain_and_ip() {
    let host = Host::new(JAMMY);
    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();

    let state = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap();

    assert_eq!(state.completed, Step::ALL.to_vec());
    let report = state.report.unwrap();
    assert!(report.contains("mail.example.com"));
    assert!(report.contains("example.com"));
    assert!(report.contains("203.0.113.10"));

    assert!(host
        .hosts()
        .ends_with("203.0.113.10 mail.example.com mail\n"));
    assert_eq!(fetcher.calls.get(), 1);
    assert_eq!(
        state.installer_dir.unwrap(),
        host.config.paths.install_dir.join("zcs-test")
    );

    let order: Vec<&str> = runner
        .commands
        .iter()
        .map(|c| c.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(order.first(), Some(&"hostnamectl"));
    let firewall_enable = runner
        .commands
        .iter()
        .position(|c| c == "ufw --force enable")
        .unwrap();
    let installer = order.iter().position(|p| *p == "./install.sh").unwrap();
    let certbot = order.iter().position(|p| *p == "certbot").unwrap();
    assert!(firewall_enable < installer && installer < certbot);
    assert!(runner.commands.last().unwrap().ends_with("zmcontrol restart'"));

    let key = host
        .root
        .join("zimbra/ssl/zimbra/commercial/commercial.key");
    assert_eq!(fs::read_to_string(key).unwrap(), "privkey.pem");

    let record = run_record::load(&host.config.paths.state_dir)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.completed_steps.len(), 9);
}

#[test]
fn rerun_does_not_duplicate_hosts_entry() {
    let host = Host::new(JAMMY);
    let fetcher = BundleFetcher::new();

    for _ in 0..2 {
        let mut runner = FakeHost::new(&host.config);
        Sequencer::new(&host.config, &mut runner, &fetcher, 0)
            .run()
            .unwrap();
    }

    assert_eq!(host.hosts().matches("mail.example.com").count(), 1);
}

#[test]
fn existing_archive_skips_download_but_still_extracts() {
    let host = Host::new(JAMMY);
    fs::create_dir_all(&host.config.paths.install_dir).unwrap();
    write_bundle(&host.config.archive_path().unwrap());

    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();
    Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap();

    assert_eq!(fetcher.calls.get(), 0);
    assert!(runner.ran("tar -xzf"));
    assert!(host
        .config
        .paths
        .install_dir
        .join("zcs-test/install.sh")
        .is_file());
}

#[test]
fn failing_package_manager_halts_the_run() {
    let host = Host::new(JAMMY);
    let mut runner = FakeHost::new(&host.config).failing_on("apt-get update");
    let fetcher = BundleFetcher::new();

    let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap_err();

    assert_eq!(failure.step, Step::PackageUpgrade);
    assert!(matches!(
        failure.error,
        ProvisionError::ExternalCommand { .. }
    ));
    assert!(!runner.ran("apt-get -y upgrade"));
    assert!(!runner.ran("ufw"));
    assert!(!runner.ran("certbot"));
    assert_eq!(fetcher.calls.get(), 0);

    let record = run_record::load(&host.config.paths.state_dir)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.completed_steps, vec!["preflight", "hostname"]);
    assert_eq!(record.failed_step.as_deref(), Some("package_upgrade"));
}

#[test]
fn failing_firewall_and_certbot_halt_the_run() {
    for (prefix, step, never) in [
        ("ufw --force enable", Step::Firewall, "tar"),
        ("certbot", Step::Certificate, "su -"),
    ] {
        let host = Host::new(JAMMY);
        let mut runner = FakeHost::new(&host.config).failing_on(prefix);
        let fetcher = BundleFetcher::new();

        let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
            .run()
            .unwrap_err();

        assert_eq!(failure.step, step);
        assert!(!runner.ran(never), "{never} ran after {prefix} failed");
        assert!(!host.config.paths.mail_root.exists());
    }
}

#[test]
fn failing_certificate_deploy_never_restarts_the_service() {
    let host = Host::new(JAMMY);
    let mut runner = FakeHost::new(&host.config).failing_on("su - zimbra -c");
    let fetcher = BundleFetcher::new();

    let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap_err();

    assert_eq!(failure.step, Step::Certificate);
    assert!(runner.ran("chown -R zimbra:zimbra"));
    assert!(runner.commands.last().unwrap().contains("zmcertmgr deploycrt"));
    assert!(!runner.commands.iter().any(|c| c.contains("zmcontrol restart")));

    let record = run_record::load(&host.config.paths.state_dir)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.failed_step.as_deref(), Some("certificate"));
}

#[test]
fn corrupt_run_record_is_replaced() {
    let host = Host::new(JAMMY);
    let state_dir = &host.config.paths.state_dir;
    fs::create_dir_all(state_dir).unwrap();
    fs::write(run_record::record_path(state_dir), "{trunc").unwrap();

    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();
    let state = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap();

    assert_eq!(state.completed, Step::ALL.to_vec());
    let record = run_record::load(state_dir).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.completed_steps.len(), 9);
}

#[test]
fn checksum_mismatch_is_fatal_and_not_refetched() {
    let mut host = Host::new(JAMMY);
    host.config.archive_sha256 = Some("0".repeat(64));
    let mut runner = FakeHost::new(&host.config);
    let fetcher = BundleFetcher::new();

    let failure = Sequencer::new(&host.config, &mut runner, &fetcher, 0)
        .run()
        .unwrap_err();

    assert_eq!(failure.step, Step::Artifact);
    assert!(matches!(
        failure.error,
        ProvisionError::ChecksumMismatch { .. }
    ));
    assert_eq!(fetcher.calls.get(), 1);
    assert!(!runner.ran("tar"));
}

use std::process::ExitCode;

use anyhow::{Context, Result};
use mailhost_provision::preflight::current_euid;
use mailhost_provision::{console, HttpFetcher, ProvisionConfig, Sequencer, SystemRunner};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  mailhost-provision\n\n\
     Takes no arguments. Edit the defaults in src/config.rs, or point\n\
     MAILHOST_PROVISION_CONFIG at a TOML file overriding them, then run as root."
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [flag] if flag == "-h" || flag == "--help" => {
            println!("{}", usage());
            return ExitCode::SUCCESS;
        }
        _ => {
            eprintln!("{}", usage());
            return ExitCode::from(2);
        }
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            console::fail(&format!("{err:#}"));
            console::fail("host left as-is for inspection; nothing was rolled back");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = ProvisionConfig::load().context("loading provisioning configuration")?;
    let fetcher = HttpFetcher::new().context("preparing HTTP client")?;
    let mut runner = SystemRunner;

    Sequencer::new(&config, &mut runner, &fetcher, current_euid()).run()?;

    console::ok(&format!("{} provisioned", config.fqdn()));
    Ok(())
}

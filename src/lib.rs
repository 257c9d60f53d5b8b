//! Provisioning for an OSE mail server on a fresh Ubuntu 22.04 host.
//!
//! The crate drives a fixed nine-step sequence against the host OS:
//!
//! - **Preflight** - root privileges, OS identity, required tools
//! - **Host setup** - hostname, hosts entry, apt upgrade and dependencies, ufw
//! - **Installer** - bundle download/extraction, then the vendor's interactive installer
//! - **Certificates** - certbot standalone issuance, deployment, service restart
//! - **Report** - DNS and renewal next steps for the operator
//!
//! # Architecture
//!
//! ```text
//! mailhost-provision (bin)
//!     │
//!     ├── ProvisionConfig::load()     compiled-in defaults, optional TOML override
//!     └── Sequencer::run()            first error stops the run, no rollback
//!             │
//!             ├── CommandRunner       apt-get, ufw, tar, certbot, su ...
//!             ├── Fetcher             HTTPS bundle download
//!             └── run_record          <state_dir>/provision-run.json
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mailhost_provision::{HttpFetcher, ProvisionConfig, Sequencer, SystemRunner};
//!
//! let config = ProvisionConfig::load()?;
//! let fetcher = HttpFetcher::new()?;
//! let mut runner = SystemRunner;
//! let state = Sequencer::new(&config, &mut runner, &fetcher, 0).run()?;
//! ```

pub mod artifact;
pub mod certs;
pub mod config;
pub mod console;
pub mod error;
pub mod firewall;
pub mod host;
pub mod installer;
pub mod packages;
pub mod preflight;
pub mod process;
pub mod report;
pub mod run_record;
pub mod sequencer;

pub use artifact::{Fetcher, HttpFetcher};
pub use config::{HostPaths, ProvisionConfig};
pub use error::ProvisionError;
pub use process::{CommandRunner, CommandSpec, SystemRunner};
pub use sequencer::{ProvisionState, Sequencer, Step, StepFailure};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{IoContext, ProvisionError, Result};

/// Downloads a URL to a local file.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTPS fetcher. Connect timeout only; the body may take as long
/// as the bundle needs.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .user_agent(concat!("mailhost-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProvisionError::Network {
                url: String::new(),
                message: format!("building HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let network = |message: String| ProvisionError::Network {
            url: url.to_string(),
            message,
        };

        debug!(url, dest = %dest.display(), "downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("server answered {status}")));
        }

        let file = File::create(dest).io_context(|| format!("creating '{}'", dest.display()))?;
        let mut writer = BufWriter::new(file);
        response
            .copy_to(&mut writer)
            .map_err(|err| network(format!("reading body: {err}")))?;
        writer
            .flush()
            .io_context(|| format!("flushing '{}'", dest.display()))?;
        Ok(())
    }
}

//! Hand-off to the mail server's own interactive installer.
//!
//! The installer prompts the operator on the terminal and blocks until they
//! finish. Nothing here scripts its answers or inspects what it does.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::artifact::archive_top_level_dir;
use crate::error::Result;
use crate::process::{ensure_exists, CommandRunner, CommandSpec};

/// Directory the bundle extracts into: `<install_dir>/<first archive entry's top dir>`.
pub fn locate_installer_dir(archive: &Path, install_dir: &Path) -> Result<PathBuf> {
    Ok(install_dir.join(archive_top_level_dir(archive)?))
}

pub fn installer_command(installer_dir: &Path, entry: &str) -> CommandSpec {
    CommandSpec::new(format!("./{entry}"))
        .current_dir(installer_dir)
        .interactive()
}

pub fn run_interactive(
    runner: &mut dyn CommandRunner,
    installer_dir: &Path,
    entry: &str,
) -> Result<()> {
    ensure_exists(&installer_dir.join(entry))?;
    info!(dir = %installer_dir.display(), entry, "handing over to interactive installer");
    runner.run(&installer_command(installer_dir, entry))
}

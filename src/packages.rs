//! Package manager invocations.
//!
//! All apt calls run with `DEBIAN_FRONTEND=noninteractive` so that debconf
//! never stops to ask questions; any non-zero exit aborts the run.

use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec};

fn apt_get() -> CommandSpec {
    CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

/// `apt-get update` followed by `apt-get -y upgrade`.
pub fn upgrade_commands() -> Vec<CommandSpec> {
    vec![
        apt_get().arg("update"),
        apt_get().args(["-y", "upgrade"]),
    ]
}

pub fn install_command(packages: &[String]) -> CommandSpec {
    apt_get().args(["install", "-y"]).args(
        packages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty()),
    )
}

pub fn refresh_and_upgrade(runner: &mut dyn CommandRunner) -> Result<()> {
    for cmd in upgrade_commands() {
        runner.run(&cmd)?;
    }
    Ok(())
}

pub fn install(runner: &mut dyn CommandRunner, packages: &[String]) -> Result<()> {
    runner.run(&install_command(packages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_refreshes_before_upgrading() {
        let rendered: Vec<String> = upgrade_commands().iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, vec!["apt-get update", "apt-get -y upgrade"]);
    }

    #[test]
    fn every_apt_call_is_noninteractive() {
        let mut all = upgrade_commands();
        all.push(install_command(&["ufw".to_string()]));
        for cmd in all {
            assert!(cmd
                .env
                .contains(&("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())));
        }
    }

    #[test]
    fn install_skips_blank_names() {
        let cmd = install_command(&["ufw".into(), " ".into(), "certbot".into()]);
        assert_eq!(cmd.to_string(), "apt-get install -y ufw certbot");
    }
}

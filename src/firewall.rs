//! Firewall allow-list via `ufw`.

use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec};

/// One `ufw allow <port>/tcp` per port, then a forced enable.
///
/// `--force` skips ufw's "may disrupt existing ssh connections" prompt.
pub fn firewall_commands(ports: &[u16]) -> Vec<CommandSpec> {
    let mut cmds: Vec<CommandSpec> = ports
        .iter()
        .map(|port| CommandSpec::new("ufw").arg("allow").arg(format!("{port}/tcp")))
        .collect();
    cmds.push(CommandSpec::new("ufw").args(["--force", "enable"]));
    cmds
}

pub fn configure(runner: &mut dyn CommandRunner, ports: &[u16]) -> Result<()> {
    for cmd in firewall_commands(ports) {
        runner.run(&cmd)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_precede_enable() {
        let rendered: Vec<String> = firewall_commands(&[22, 25])
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec!["ufw allow 22/tcp", "ufw allow 25/tcp", "ufw --force enable"]
        );
    }
}

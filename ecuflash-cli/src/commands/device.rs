//! Commands that only talk to the ECU.

use {
    super::{connect_and_read, new_session},
    crate::{Cli, config::Config},
    anyhow::Result,
    console::style,
    log::debug,
};

/// Version command implementation.
pub(crate) fn cmd_version(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = new_session(config);
    let version = connect_and_read(cli, config, &mut session)?;
    debug!(
        "year {} month {} minor {} patch {}",
        version.year(),
        version.month(),
        version.minor(),
        version.patch()
    );
    session.disconnect();
    Ok(())
}

/// Boot command implementation.
pub(crate) fn cmd_boot(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = new_session(config);
    connect_and_read(cli, config, &mut session)?;
    session.enter_update_mode()?;

    if !cli.quiet {
        eprintln!(
            "{} Serial closed. ECU should now appear as STM32 bootloader (DFU).",
            style("🔄").cyan()
        );
    }
    Ok(())
}

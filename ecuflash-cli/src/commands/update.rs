//! Check, download and update command implementations.

use {
    super::{CliSession, connect_and_read, ensure_not_interrupted, new_session, spinner},
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, theme::ColorfulTheme},
    ecuflash::{
        FlashVariant, UpdateCheck,
        protocol::{DFU_ENUMERATION_WAIT, DFU_START_ADDRESS},
    },
    std::{io::IsTerminal, path::Path, thread},
};

/// Connect, read the ECU version and run the update check.
fn run_check(cli: &Cli, config: &Config, session: &mut CliSession) -> Result<UpdateCheck> {
    connect_and_read(cli, config, session)?;
    ensure_not_interrupted()?;

    let variant = FlashVariant::from_large_flash(cli.large_flash || config.large_flash());
    let pb = spinner(
        cli,
        &format!("Checking for latest {variant} firmware and configuration..."),
    );
    let check = session
        .check_updates(variant)
        .cloned();
    pb.finish_and_clear();
    let check = check.context("Update check failed")?;

    if !cli.quiet {
        print_check(&check);
    }
    Ok(check)
}

fn print_check(check: &UpdateCheck) {
    let selection = &check.selection;
    eprintln!(
        "{} Latest firmware: {} ({} bytes)",
        style("ℹ").blue(),
        style(&selection.firmware.name).cyan(),
        check.firmware_len
    );
    match (&selection.config, check.config_len) {
        (Some(file), Some(len)) => eprintln!(
            "{} Configuration:   {} ({len} bytes)",
            style("ℹ").blue(),
            style(&file.name).cyan()
        ),
        _ => eprintln!(
            "{} Configuration:   {}",
            style("ℹ").blue(),
            style("(none found)").dim()
        ),
    }

    if check.is_newer {
        eprintln!(
            "{} Update available: {}",
            style("✓").green(),
            style(&selection.firmware_version).bold()
        );
    } else {
        eprintln!("{} Already up to date", style("✓").green());
    }
}

/// Check command implementation.
pub(crate) fn cmd_check(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = new_session(config);
    run_check(cli, config, &mut session)?;
    session.disconnect();
    Ok(())
}

/// Download command implementation.
pub(crate) fn cmd_download(cli: &Cli, config: &Config, out_dir: &Path) -> Result<()> {
    let mut session = new_session(config);
    run_check(cli, config, &mut session)?;
    let written = session
        .save_downloads(out_dir)
        .with_context(|| format!("Failed to save downloads to {}", out_dir.display()))?;
    session.disconnect();

    if !cli.quiet {
        for path in &written {
            eprintln!("{} Saved {}", style("💾").cyan(), style(path.display()).yellow());
        }
    }
    Ok(())
}

/// Update command implementation.
pub(crate) fn cmd_update(cli: &Cli, config: &Config, force: bool, yes: bool) -> Result<()> {
    if !yes {
        ensure_can_prompt(cli)?;
    }

    let mut session = new_session(config);
    let check = run_check(cli, config, &mut session)?;
    session.flash_plan(force)?;

    if !yes && !confirm_flash(&check, config.dfu_alt())? {
        return Err(ecuflash::Error::UserCancelled.into());
    }
    ensure_not_interrupted()?;

    session.enter_update_mode()?;
    if !cli.quiet {
        eprintln!(
            "{} Serial closed; waiting for the STM32 bootloader (DFU)...",
            style("🔄").cyan()
        );
    }
    thread::sleep(DFU_ENUMERATION_WAIT);
    ensure_not_interrupted()?;

    let pb = spinner(
        cli,
        &format!("Flashing {} via DFU...", check.selection.firmware.name),
    );
    let result = session.flash(force, |_| true);
    pb.finish_and_clear();
    result?;

    if !cli.quiet {
        eprintln!(
            "\n{} Flash complete. Power-cycle the ECU after your normal wait time.",
            style("🎉").green().bold()
        );
    }
    Ok(())
}

fn ensure_can_prompt(cli: &Cli) -> Result<()> {
    if cli.non_interactive {
        return Err(CliError::Usage(
            "flashing needs confirmation; pass --yes in non-interactive mode".to_string(),
        )
        .into());
    }
    if !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
        return Err(CliError::Usage(
            "confirmation requires an interactive terminal; pass --yes to skip it".to_string(),
        )
        .into());
    }
    Ok(())
}

fn confirm_flash(check: &UpdateCheck, alt: u8) -> Result<bool> {
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Flash {} now? (ALT {alt} @ 0x{DFU_START_ADDRESS:08X})",
            check.selection.firmware.name
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?;
    Ok(answer.unwrap_or(false))
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Confirmation cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Confirmation prompt failed: {io_err}")).into()
            }
        },
    }
}

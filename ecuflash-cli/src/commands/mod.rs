//! Command implementations.
//!
//! Each subcommand family is implemented in its own module; this module holds
//! the session setup they share.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod update;

use {
    crate::{
        Cli, CliError,
        config::Config,
        serial::{open_port, resolve_port},
        use_fancy_output, was_interrupted,
    },
    anyhow::{Context, Result},
    console::style,
    ecuflash::{DfuUtil, GithubRepository, UpdateSession, Version, VersionReader},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    std::time::Duration,
};

/// Session type used by every device command.
pub(crate) type CliSession = UpdateSession<GithubRepository, DfuUtil>;

pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Build a disconnected session from the merged configuration.
pub(crate) fn new_session(config: &Config) -> CliSession {
    let mut flasher = DfuUtil::new()
        .with_alt(config.dfu_alt())
        .with_device(config.flash.device.clone());
    if let Some(program) = &config.flash.dfu_util {
        flasher = flasher.with_program(program);
    }

    UpdateSession::new(GithubRepository::new(config.github()), flasher)
        .with_collections(config.collections())
        .with_reader(VersionReader::new(config.version_timeout()))
        .with_transfer_size(config.transfer_size())
}

/// Open the ECU's serial port and read its firmware version.
pub(crate) fn connect_and_read(
    cli: &Cli,
    config: &Config,
    session: &mut CliSession,
) -> Result<Version> {
    let choice = resolve_port(cli.port.as_deref(), cli.baud, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} @ {} baud",
            style("🔌").cyan(),
            choice.name,
            choice.baud
        );
    }

    let port = open_port(&choice)?;
    session.connect(port)?;
    ensure_not_interrupted()?;

    let pb = spinner(cli, "Reading ECU version...");
    let version = session.read_version();
    pb.finish_and_clear();
    let version = version.context("Could not read the ECU version")?;

    if !cli.quiet {
        eprintln!(
            "{} ECU firmware: {}",
            style("✓").green(),
            style(&version).bold()
        );
    }
    Ok(version)
}

/// Spinner on stderr, hidden in quiet or non-TTY mode.
pub(crate) fn spinner(cli: &Cli, message: &str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

//! ecuflash CLI - Command-line tool for updating Speeduino ECU firmware.
//!
//! ## Features
//!
//! - Read the firmware version reported by the ECU
//! - Check the published firmware and tuning configuration files
//! - Download the newest release for offline use
//! - Reboot the ECU into its DFU bootloader and flash it
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    },
    thiserror::Error,
};

mod commands;
mod config;
mod serial;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Failures that map to a dedicated exit code.
#[derive(Debug, Error)]
enum CliError {
    /// Invalid invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Stopped by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// ecuflash - Check and update Speeduino ECU firmware.
///
/// Environment variables:
///   ECUFLASH_PORT              - Serial port of the ECU
///   ECUFLASH_BAUD              - Baud rate (default: 115200)
///   ECUFLASH_LARGE_FLASH       - Use 1 MB firmware builds
///   ECUFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "ecuflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port of the ECU (e.g. /dev/ttyACM0, COM3).
    #[arg(short, long, global = true, env = "ECUFLASH_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "ECUFLASH_BAUD")]
    baud: Option<u32>,

    /// Select 1 MB flash firmware builds.
    #[arg(long, global = true, env = "ECUFLASH_LARGE_FLASH")]
    large_flash: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "ECUFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read the firmware version from the ECU.
    Version,

    /// Compare the ECU firmware with the newest published release.
    Check,

    /// Download the newest firmware and its configuration file.
    Download {
        /// Directory to write the files to.
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },

    /// Reboot the ECU into its DFU bootloader.
    Boot,

    /// Check, reboot into the bootloader and flash the newest firmware.
    Update {
        /// Flash even if the firmware is not newer than the ECU's.
        #[arg(long)]
        force: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ecuflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    ecuflash::set_interrupt_checker(was_interrupted);

    if let Err(err) = run(&cli) {
        if is_silent(&err) {
            debug!("{err:#}");
            return;
        }
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Version => commands::device::cmd_version(cli, &config),
        Commands::Check => commands::update::cmd_check(cli, &config),
        Commands::Download { out_dir } => commands::update::cmd_download(cli, &config, out_dir),
        Commands::Boot => commands::device::cmd_boot(cli, &config),
        Commands::Update { force, yes } => commands::update::cmd_update(cli, &config, *force, *yes),
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: ecuflash completions bash \
                         (or use ecuflash completions --install)"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}

/// Declined confirmations end the program quietly.
fn is_silent(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ecuflash::Error>(),
        Some(ecuflash::Error::UserCancelled)
    )
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if was_interrupted()
        || matches!(
            err.downcast_ref::<ecuflash::Error>(),
            Some(ecuflash::Error::Interrupted)
        )
    {
        return 130;
    }
    1
}

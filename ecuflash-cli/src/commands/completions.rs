//! Shell completion generation and installation.

use {
    crate::Cli,
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    directories::BaseDirs,
    std::{
        env, fs,
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

/// Binary name used in completion scripts and file names.
const BIN_NAME: &str = "ecuflash";

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, &mut io::stdout());
}

/// Detect the user's current shell from `$SHELL`.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Match a shell binary path to its `Shell`.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where the completion script for `shell` is installed.
fn install_path(dirs: &BaseDirs, shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs
            .data_local_dir()
            .join("bash-completion")
            .join("completions")
            .join(BIN_NAME),
        Shell::Zsh => dirs
            .home_dir()
            .join(".zfunc")
            .join(format!("_{BIN_NAME}")),
        Shell::Fish => dirs
            .config_dir()
            .join("fish")
            .join("completions")
            .join(format!("{BIN_NAME}.fish")),
        Shell::Elvish => dirs
            .config_dir()
            .join("elvish")
            .join("lib")
            .join(format!("{BIN_NAME}.elv")),
        Shell::PowerShell => dirs
            .config_dir()
            .join("powershell")
            .join("completions")
            .join(format!("{BIN_NAME}.ps1")),
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             ecuflash completions --install bash",
        )?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = install_path(&dirs, shell)?;

    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => {
            eprintln!(
                "To activate now: {}",
                style(format!("source {}", path.display())).cyan()
            );
        },
        Shell::Zsh => {
            add_zsh_fpath(dirs.home_dir())?;
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => {
            eprintln!(
                "Add this to your PowerShell profile: {}",
                style(format!(". {}", path.display())).cyan()
            );
        },
        _ => eprintln!("Completions will be loaded on new shell sessions."),
    }

    Ok(())
}

/// Make sure `~/.zfunc` is on zsh's `fpath`.
fn add_zsh_fpath(home: &Path) -> Result<()> {
    const FPATH_LINE: &str = "fpath=(~/.zfunc $fpath)";

    let zshrc = home.join(".zshrc");
    let present = fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(FPATH_LINE));
    if present {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# {BIN_NAME} completions")?;
    writeln!(file, "{FPATH_LINE}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;
    eprintln!(
        "{} Added fpath to {}",
        style("✓").green().bold(),
        style(zshrc.display()).yellow()
    );
    Ok(())
}

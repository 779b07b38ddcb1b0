mod cli;
mod cmd;
mod config;
mod disk;
mod error;
mod guided;
mod host;
mod logging;
mod lsblk;
mod mirrors;
mod profiles;
mod prompt;
mod steps;
mod target;
#[cfg(test)]
mod testing;
mod ui;

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tracing::{debug, error, info};

use cli::Cli;
use config::Config;
use error::InstallerError;
use guided::GuidedBuilder;
use host::Host;
use prompt::{NonInteractive, Prompt, Terminal};
use steps::{InstallOptions, Installer};
use target::Pacstrap;

// ── Global dry-run flag ───────────────────────────────────────────────────────

/// When `true`, no system command is actually executed.
/// All shell operations are simulated with a short delay.
/// Set by passing `--dry-run` on the command line.
pub static DRY_RUN: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::Relaxed)
}

const COUNTDOWN_SECS: u32 = 5;

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse_args();

    if cli.help {
        println!("{}", cli::HELP_POINTER);
        return;
    }
    if cli.dry_run {
        DRY_RUN.store(true, Ordering::Relaxed);
    }

    if let Err(e) = run(&cli) {
        error!(error = %e, "installation aborted");
        println!();
        ui::print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), InstallerError> {
    check_root()?;
    let log_path = logging::init(&cli.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), dry_run = is_dry_run(), "archguided starting");

    ui::print_banner();
    if is_dry_run() {
        ui::print_warning("DRY-RUN MODE: no disk will be touched, no command will run.");
    }

    let host = Host::live();
    log_disk_layout(&host, "before installation");
    if !host.packages.mirrors_reachable() {
        return Err(InstallerError::MirrorsUnreachable(log_path.display().to_string()));
    }

    let mut config = load_config(cli.config.as_ref())?;
    if cli.advanced {
        config.advanced = true;
    }

    let prompt: Box<dyn Prompt> = if cli.silent {
        Box::new(NonInteractive)
    } else {
        Box::new(Terminal)
    };

    let result = install(cli, &mut config, &host, prompt.as_ref());
    log_disk_layout(&host, "after installation");
    result
}

fn install(
    cli: &Cli,
    config: &mut Config,
    host: &Host,
    prompt: &dyn Prompt,
) -> Result<(), InstallerError> {
    GuidedBuilder::new(prompt, host).ask_user_questions(config)?;

    config.validate(host.system.has_uefi())?;
    let saved = config.save_log(&cli.log_dir)?;
    info!(path = %saved.display(), "configuration saved");

    let options = InstallOptions {
        silent: cli.silent,
        countdown: COUNTDOWN_SECS,
        reflector_timeout: Duration::from_secs(cli.reflector_timeout),
    };
    let installer = Installer::new(config, host, prompt, &options);
    installer.confirm()?;
    installer.perform_installation(&Pacstrap::new(config.mount_point()))?;

    info!("installation finished");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&PathBuf>) -> Result<Config, InstallerError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Config::load_from_file(path)
        }
        None => Ok(Config::default()),
    }
}

fn log_disk_layout(host: &Host, when: &str) {
    debug!(%when, layout = %host.disks.layout_report(), "disk layout");
}

/// Checks that the process is running as root (UID 0).
/// Skipped automatically in dry-run mode.
fn check_root() -> Result<(), InstallerError> {
    if is_dry_run() {
        return Ok(());
    }

    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Uid:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u32>().ok())
        })
        .unwrap_or(1); // default to non-root if unreadable

    if uid != 0 {
        return Err(InstallerError::NotRoot);
    }

    Ok(())
}

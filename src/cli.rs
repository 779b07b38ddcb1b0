use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_LOG_DIR: &str = "/var/log/archinstall";
pub const HELP_POINTER: &str = "See `man archinstall` for help.";

/// archguided - guided Arch Linux installer
#[derive(Parser, Debug)]
#[command(name = "archguided")]
#[command(about = "Guided Arch Linux installer")]
#[command(version, disable_help_flag = true)]
pub struct Cli {
    /// Print where to find documentation and exit.
    #[arg(long)]
    pub help: bool,

    /// Never prompt; every answer must come from --config.
    #[arg(long)]
    pub silent: bool,

    /// JSON configuration that pre-answers questions.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also ask the advanced questions (locale and encoding).
    #[arg(long)]
    pub advanced: bool,

    /// Simulate every system command instead of running it.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Where install.log and user_configuration.json are written.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Seconds to wait for reflector to finish before continuing.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub reflector_timeout: u64,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["archguided"]).unwrap();
        assert!(!cli.help && !cli.silent && !cli.advanced && !cli.dry_run);
        assert!(cli.config.is_none());
        assert_eq!(cli.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(cli.reflector_timeout, 300);
    }

    #[test]
    fn help_is_a_plain_flag() {
        let cli = Cli::try_parse_from(["archguided", "--help"]).unwrap();
        assert!(cli.help);
    }

    #[test]
    fn silent_install_from_config() {
        let cli = Cli::try_parse_from([
            "archguided",
            "--silent",
            "--config",
            "/root/user_configuration.json",
            "--reflector-timeout",
            "30",
        ])
        .unwrap();
        assert!(cli.silent);
        assert_eq!(
            cli.config.unwrap().to_str().unwrap(),
            "/root/user_configuration.json"
        );
        assert_eq!(cli.reflector_timeout, 30);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["archguided", "--format-all"]).is_err());
    }
}

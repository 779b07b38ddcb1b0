use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{0}' failed with exit code {1}")]
    CommandFailed(String, i32),

    #[error("Command '{0}' not found. Is it installed?")]
    CommandNotFound(String),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root (sudo)")]
    NotRoot,

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Configuration JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No answer for '{0}' in the configuration (silent mode never prompts)")]
    MissingAnswer(String),

    #[error("Arch Linux mirrors are not reachable. Check your connection and the log file '{0}'.")]
    MirrorsUnreachable(String),

    #[error("Filesystem '{0}' is not supported")]
    UnsupportedFilesystem(String),

    #[error("Unknown packages: {}", .0.join(", "))]
    UnknownPackages(Vec<String>),

    #[error("{0} is not an available disk")]
    UnknownDisk(String),

    #[error("Keyboard layout '{0}' is not supported")]
    UnsupportedLayout(String),

    #[error("Profile '{0}' preparation requirements were not fulfilled")]
    ProfilePreparation(String),

    #[error("Profile '{0}' post-install configuration failed")]
    ProfilePostInstall(String),
}

impl InstallerError {
    /// Shorthand used by validation code paths.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

use tracing::info;

use crate::{config::Config, error::InstallerError, target::InstallTarget};

/// The sudoers rule every superuser gets.
pub fn sudoers_line(username: &str) -> String {
    format!("{} ALL=(ALL) NOPASSWD: ALL\n", username)
}

/// Ordinary users first, then superusers with their sudoers rule.
pub fn create(config: &Config, target: &dyn InstallTarget) -> Result<(), InstallerError> {
    for user in config.users.iter().flatten() {
        target.user_create(&user.username, &user.password)?;
        info!(username = %user.username, "user created");
    }
    for user in config.superusers.iter().flatten() {
        target.user_create(&user.username, &user.password)?;
        target.grant_sudo(&user.username)?;
        info!(username = %user.username, "superuser created");
    }
    Ok(())
}

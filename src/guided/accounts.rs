use tracing::info;

use super::GuidedBuilder;
use crate::{
    config::{validate_hostname, validate_username, Config, User},
    error::InstallerError,
    ui,
};

const DEFAULT_SUPERUSER: &str = "archuser";

impl GuidedBuilder<'_> {
    pub(super) fn ask_hostname(&self, config: &mut Config) -> Result<(), InstallerError> {
        loop {
            let hostname = match config.hostname.take() {
                Some(h) => h,
                None => self.prompt.input("Hostname for the installation", None)?,
            };
            match validate_hostname(&hostname) {
                Ok(()) => {
                    info!(%hostname, "hostname");
                    config.hostname = Some(hostname);
                    return Ok(());
                }
                Err(msg) => self.reject(&InstallerError::invalid(msg)),
            }
        }
    }

    /// Optional. Skipped when a superuser is already configured.
    pub(super) fn ask_root_password(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.root_password.is_some() || !config.superuser_names().is_empty() {
            return Ok(());
        }
        let password = self
            .prompt
            .password("Root password (blank to create a superuser instead)", true)?;
        config.root_password = Some(password).filter(|p| !p.is_empty());
        Ok(())
    }

    /// Without a root password the system needs exactly one superuser
    /// with a non-empty secret.
    pub(super) fn ask_superuser(&self, config: &mut Config) -> Result<(), InstallerError> {
        let has_root = config.root_password.as_deref().map_or(false, |p| !p.is_empty());
        if has_root || !config.superuser_names().is_empty() {
            return Ok(());
        }

        ui::print_info("No root password was set, a superuser will be created instead.");
        let username = self.ask_username("Superuser name", Some(DEFAULT_SUPERUSER), &[])?;
        let password = self.ask_secret(&username)?;
        info!(%username, "superuser");
        config.superusers = Some(vec![User { username, password }]);
        Ok(())
    }

    /// Extra accounts. Without a root password the single superuser is
    /// already chosen, so everyone added here is an ordinary user.
    pub(super) fn ask_additional_users(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.users.is_some() {
            config.superusers.get_or_insert_with(Vec::new);
            return Ok(());
        }

        let sudo_allowed = config.root_password.as_deref().map_or(false, |p| !p.is_empty());
        let mut users = Vec::new();
        let mut superusers = config.superusers.take().unwrap_or_default();
        while self.prompt.confirm("Add another user?", false)? {
            let taken: Vec<String> = users
                .iter()
                .chain(superusers.iter())
                .map(|u: &User| u.username.clone())
                .collect();
            let username = self.ask_username("Username", None, &taken)?;
            let password = self.ask_secret(&username)?;
            let sudo = sudo_allowed
                && self
                    .prompt
                    .confirm(&format!("Should {} be a superuser (sudo)?", username), false)?;
            info!(%username, sudo, "additional user");
            let user = User { username, password };
            if sudo {
                superusers.push(user);
            } else {
                users.push(user);
            }
        }
        config.users = Some(users);
        config.superusers = Some(superusers);
        Ok(())
    }

    /// Users loaded without a secret, such as from a stripped log, get one now.
    pub(super) fn fill_missing_passwords(&self, config: &mut Config) -> Result<(), InstallerError> {
        let mut accounts: Vec<&mut User> = Vec::new();
        accounts.extend(config.users.iter_mut().flatten());
        accounts.extend(config.superusers.iter_mut().flatten());
        for user in accounts.into_iter().filter(|u| u.password.is_empty()) {
            user.password = self.ask_secret(&user.username)?;
        }
        Ok(())
    }

    fn ask_username(
        &self,
        prompt: &str,
        default: Option<&str>,
        taken: &[String],
    ) -> Result<String, InstallerError> {
        loop {
            let username = self.prompt.input(prompt, default)?;
            if taken.contains(&username) {
                self.reject(&InstallerError::invalid(format!("'{}' already exists", username)));
                continue;
            }
            match validate_username(&username) {
                Ok(()) => return Ok(username),
                Err(msg) => self.reject(&InstallerError::invalid(msg)),
            }
        }
    }

    fn ask_secret(&self, username: &str) -> Result<String, InstallerError> {
        loop {
            let password = self
                .prompt
                .password(&format!("Password for user {}", username), true)?;
            if !password.is_empty() {
                return Ok(password);
            }
            self.reject(&InstallerError::invalid("the password must not be empty"));
        }
    }
}

use strum::IntoEnumIterator;
use tracing::info;

use super::GuidedBuilder;
use crate::{
    config::{AudioServer, Config, Kernel},
    error::InstallerError,
    profiles::Profile,
    ui,
};

impl GuidedBuilder<'_> {
    /// A profile with a preparation check must pass it; failing is fatal.
    pub(super) fn select_profile(&self, config: &mut Config) -> Result<(), InstallerError> {
        let profile = match config.profile {
            Some(p) => p,
            None => {
                let profiles: Vec<Profile> = Profile::iter().collect();
                let items: Vec<String> = profiles
                    .iter()
                    .map(|p| format!("{:<10} {}", p.to_string(), p.description()))
                    .collect();
                let choice = self.prompt.select("Profile", &items, 0)?;
                profiles[choice]
            }
        };
        info!(%profile, "profile");
        config.profile = Some(profile);

        if self.host.profiles.has_prep(profile) && !self.host.profiles.prepare(profile) {
            return Err(InstallerError::ProfilePreparation(profile.to_string()));
        }
        Ok(())
    }

    /// Only desktop profiles get an audio server.
    pub(super) fn select_audio(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.audio.is_some() {
            return Ok(());
        }
        if !config.profile.map_or(false, Profile::is_desktop) {
            return Ok(());
        }
        let servers: Vec<AudioServer> = AudioServer::iter().collect();
        let items: Vec<String> = servers.iter().map(ToString::to_string).collect();
        let choice = self.prompt.select("Audio server", &items, 0)?;
        config.audio = Some(servers[choice]);
        Ok(())
    }

    pub(super) fn select_kernels(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.kernels.as_ref().map_or(false, |k| !k.is_empty()) {
            return Ok(());
        }
        let kernels: Vec<Kernel> = Kernel::iter().collect();
        let items: Vec<String> = kernels.iter().map(|k| k.display_name().to_string()).collect();
        let defaults: Vec<bool> = kernels.iter().map(|&k| k == Kernel::Linux).collect();
        loop {
            let picked = self.prompt.multi_select("Kernels", &items, &defaults)?;
            if picked.is_empty() {
                self.reject(&InstallerError::invalid("select at least one kernel"));
                continue;
            }
            config.kernels = Some(picked.into_iter().map(|i| kernels[i]).collect());
            return Ok(());
        }
    }

    /// Every name is checked against the package index; one unknown name
    /// discards the whole list.
    pub(super) fn select_packages(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.packages.is_none() {
            ui::print_info("Only the base system, kernels and profile packages are installed.");
            ui::print_info("Add anything else you need here, e.g. a web browser.");
        }
        loop {
            let packages: Vec<String> = match config.packages.take() {
                Some(p) => p,
                None => self
                    .prompt
                    .input("Additional packages (space separated, blank for none)", None)?
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            };
            if packages.is_empty() {
                config.packages = Some(packages);
                return Ok(());
            }
            let pb = ui::spinner("Verifying that additional packages exist…");
            let checked = self.host.packages.validate_packages(&packages);
            pb.finish_and_clear();
            match checked {
                Ok(()) => {
                    info!(?packages, "additional packages");
                    config.packages = Some(packages);
                    return Ok(());
                }
                Err(e) => self.reject(&e),
            }
        }
    }
}

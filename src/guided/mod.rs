//! The question phase: fills in every undecided field of a [`Config`].
//!
//! Questions run in a fixed order and each one is skipped when its field
//! already holds a value, so a configuration file can answer any subset.
//! Invalid answers are reported and asked again; the only fatal outcome is
//! a profile whose preparation check fails.

mod accounts;
mod disk;
mod network;
mod software;

use tracing::{info, warn};

use crate::{
    config::{
        Bootloader, Config, MirrorRegion, DEFAULT_ENCODING, DEFAULT_KEYBOARD_LAYOUT,
        DEFAULT_LANGUAGE, DEFAULT_MIRROR_REGION,
    },
    error::InstallerError,
    host::Host,
    mirrors,
    prompt::Prompt,
    ui,
};

pub struct GuidedBuilder<'a> {
    prompt: &'a dyn Prompt,
    host: &'a Host,
    uefi: bool,
}

impl<'a> GuidedBuilder<'a> {
    pub fn new(prompt: &'a dyn Prompt, host: &'a Host) -> Self {
        GuidedBuilder {
            prompt,
            host,
            uefi: host.system.has_uefi(),
        }
    }

    pub fn ask_user_questions(&self, config: &mut Config) -> Result<(), InstallerError> {
        self.select_keyboard_layout(config)?;
        self.select_mirror_region(config)?;
        self.select_locale(config)?;
        self.select_disk(config)?;
        self.select_partition_disposition(config)?;
        self.ask_encryption(config)?;
        self.select_bootloader(config);
        self.ask_hostname(config)?;
        self.ask_root_password(config)?;
        self.ask_superuser(config)?;
        self.ask_additional_users(config)?;
        self.fill_missing_passwords(config)?;
        self.select_profile(config)?;
        self.select_audio(config)?;
        self.select_kernels(config)?;
        self.select_packages(config)?;
        self.select_network(config)?;
        self.select_timezone(config)?;
        Ok(())
    }

    /// Reports a rejected answer; the caller loops to ask again.
    fn reject(&self, err: &InstallerError) {
        warn!(error = %err, "answer rejected");
        ui::print_warning(&err.to_string());
    }

    /// Applies the layout to the live console right away so the remaining
    /// questions are typed with it. A layout the console refuses is dropped
    /// and asked for again.
    fn select_keyboard_layout(&self, config: &mut Config) -> Result<(), InstallerError> {
        loop {
            let layout = match config.keyboard_language.take() {
                Some(layout) => layout,
                None => self
                    .prompt
                    .input("Keyboard layout", Some(DEFAULT_KEYBOARD_LAYOUT))?,
            };
            match self.host.console.set_keyboard_layout(&layout) {
                Ok(()) => {
                    info!(%layout, "keyboard layout");
                    config.keyboard_language = Some(layout);
                    return Ok(());
                }
                Err(e) => self.reject(&e),
            }
        }
    }

    /// Resolves the region name to its mirrors. A pre-seeded region that
    /// already lists mirrors is kept as given.
    fn select_mirror_region(&self, config: &mut Config) -> Result<(), InstallerError> {
        if let Some(MirrorRegion { ref mirrors, .. }) = config.mirror_region {
            if !mirrors.is_empty() {
                return Ok(());
            }
        }

        let regions = self.host.packages.mirror_regions()?;
        loop {
            let name = match config.mirror_region.take() {
                Some(region) => region.name,
                None => self
                    .prompt
                    .input("Mirror region", Some(DEFAULT_MIRROR_REGION))?,
            };
            match mirrors::find_region(&regions, &name) {
                Some(region) => {
                    info!(region = %region.name, mirrors = region.mirrors.len(), "mirror region");
                    config.mirror_region = Some(region);
                    return Ok(());
                }
                None => self.reject(&InstallerError::invalid(format!(
                    "'{}' is not a known mirror region",
                    name
                ))),
            }
        }
    }

    /// Only asked in advanced mode; blanks fall back to the defaults.
    fn select_locale(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.sys_language.is_none() && config.advanced {
            let language = self.prompt.input("System locale (language)", Some(DEFAULT_LANGUAGE))?;
            let encoding = self.prompt.input("System encoding", Some(DEFAULT_ENCODING))?;
            config.sys_language = Some(language).filter(|s| !s.is_empty());
            config.sys_encoding = Some(encoding).filter(|s| !s.is_empty());
            ui::print_info("Additional locales need post-install configuration.");
        }
        config.sys_language.get_or_insert_with(|| DEFAULT_LANGUAGE.to_string());
        config.sys_encoding.get_or_insert_with(|| DEFAULT_ENCODING.to_string());
        info!(locale = %config.locale(), "system language");
        Ok(())
    }

    fn select_bootloader(&self, config: &mut Config) {
        let bootloader = *config.bootloader.get_or_insert(Bootloader::default());
        info!(%bootloader, "bootloader");
    }
}

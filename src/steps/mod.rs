//! The execution phase: replays a validated [`Config`] against the disk and
//! the install target in a fixed order.

pub mod aur;
pub mod base;
pub mod chroot;
pub mod disk;
pub mod tweaks;
pub mod users;
pub mod wait;

use std::time::Duration;

use tracing::{info, warn};

use crate::{
    config::{Config, Kernel},
    error::InstallerError,
    host::Host,
    prompt::Prompt,
    target::{BootContext, InstallTarget},
    ui,
};

const TOTAL_STEPS: u8 = 8;

pub struct InstallOptions {
    /// No confirmation and no chroot shell offer.
    pub silent: bool,
    /// Seconds counted down before the disk is touched.
    pub countdown: u32,
    pub reflector_timeout: Duration,
}

pub struct Installer<'a> {
    config: &'a Config,
    host: &'a Host,
    prompt: &'a dyn Prompt,
    options: &'a InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: &'a Config,
        host: &'a Host,
        prompt: &'a dyn Prompt,
        options: &'a InstallOptions,
    ) -> Self {
        Installer {
            config,
            host,
            prompt,
            options,
        }
    }

    /// Prints the summary and asks for the go-ahead, then counts down
    /// before anything destructive happens.
    pub fn confirm(&self) -> Result<(), InstallerError> {
        print_summary(self.config);
        if !self.options.silent
            && !self.prompt.confirm("Start the installation with this configuration?", true)?
        {
            return Err(InstallerError::Cancelled);
        }
        if let Some(ref disk) = self.config.harddrive {
            if self.options.countdown > 0 {
                ui::countdown(&format!("Formatting {}", disk.path), self.options.countdown);
            }
        }
        Ok(())
    }

    /// Every step in order. Mounts and the unlocked root volume are
    /// released when this returns, error or not.
    pub fn perform_installation(&self, target: &dyn InstallTarget) -> Result<(), InstallerError> {
        let config = self.config;
        let uefi = self.host.system.has_uefi();

        ui::print_step(1, TOTAL_STEPS, "Disk Preparation");
        let prepared = disk::prepare(config, self.host.disks.as_ref(), uefi)?;

        ui::print_step(2, TOTAL_STEPS, "Mirrors");
        info!("waiting for automatic mirror selection (reflector) to complete");
        let pb = ui::spinner("Waiting for reflector to finish…");
        let settled = wait::wait_for_service(
            self.host.system.as_ref(),
            wait::REFLECTOR,
            self.options.reflector_timeout,
            std::thread::sleep,
        );
        pb.finish_and_clear();
        if !settled {
            ui::print_warning("reflector is still running, continuing anyway.");
        }
        if let Some(ref region) = config.mirror_region {
            self.host.packages.use_mirrors(region)?;
        }

        ui::print_step(3, TOTAL_STEPS, "Base System");
        let boot = BootContext {
            uefi,
            disk: prepared.disk.clone(),
            root_device: prepared.root_device.clone(),
            crypt_device: prepared.crypt_device.clone(),
            kernel: config
                .kernels
                .as_ref()
                .and_then(|k| k.first().copied())
                .unwrap_or(Kernel::Linux),
        };
        base::bootstrap(config, target, &boot)?;

        ui::print_step(4, TOTAL_STEPS, "Network and Audio");
        base::configure_network(config, target)?;
        base::install_audio(config, target)?;

        ui::print_step(5, TOTAL_STEPS, "Packages");
        tweaks::apply(target)?;
        if let Some(ref packages) = config.packages {
            target.add_packages(packages)?;
        }
        if let Some(profile) = config.profile {
            let packages: Vec<String> = profile.packages().iter().map(|p| p.to_string()).collect();
            if !packages.is_empty() {
                info!(%profile, "installing profile");
                target.add_packages(&packages)?;
            }
        }

        ui::print_step(6, TOTAL_STEPS, "Users and System Settings");
        users::create(config, target)?;
        if let Some(ref timezone) = config.timezone {
            target.set_timezone(timezone)?;
        }
        if config.ntp == Some(true) {
            target.activate_ntp()?;
        }
        if let Some(ref password) = config.root_password {
            if !password.is_empty() {
                target.set_password("root", password)?;
            }
        }
        if let Some(ref layout) = config.keyboard_language {
            target.set_keyboard_layout(layout)?;
        }

        if let Some(profile) = config.profile {
            if self.host.profiles.has_post_install(profile)
                && !self.host.profiles.post_install(profile, target)
            {
                return Err(InstallerError::ProfilePostInstall(profile.to_string()));
            }
        }

        ui::print_step(7, TOTAL_STEPS, "Extras");
        self.install_extras(target);

        ui::print_step(8, TOTAL_STEPS, "Finish");
        ui::print_success("Installation complete.");
        if !self.options.silent {
            chroot::offer_shell(self.prompt, target)?;
        }

        drop(prepared);
        Ok(())
    }

    /// Services, AUR and custom commands. Nothing here stops the run.
    fn install_extras(&self, target: &dyn InstallTarget) {
        let config = self.config;
        if !config.services.is_empty() {
            if let Err(e) = target.enable_services(&config.services) {
                warn!(error = %e, "enabling services failed");
                ui::print_warning(&format!("Enabling services failed: {}", e));
            }
        }

        match (config.aur_helper.as_deref(), config.superuser_names().first()) {
            (None, _) if !config.aur_packages.is_empty() => {
                warn!("AUR packages requested without an AUR helper");
                ui::print_warning(
                    "No AUR helper specified. No AUR packages will be installed. Add 'aur-helper' to the config.",
                );
            }
            (Some(helper), Some(&user)) => {
                aur::install_helper(helper, user, target);
                if !config.aur_packages.is_empty() {
                    aur::install_packages(
                        helper,
                        user,
                        &config.aur_packages,
                        self.host.packages.as_ref(),
                        target,
                    );
                }
            }
            (Some(_), None) => warn!("AUR helper requested without a superuser to build it"),
            (None, _) => {}
        }

        chroot::run_custom_commands(&config.custom_commands, target);
    }
}

/// Runs a command in the target; logs the exit status and keeps going.
pub fn best_effort(target: &dyn InstallTarget, command: &str, runas: Option<&str>) -> bool {
    match target.arch_chroot(command, runas) {
        Ok(0) => true,
        Ok(status) => {
            warn!(command, status, "command failed");
            ui::print_warning(&format!("'{}' exited with code {}.", command, status));
            false
        }
        Err(e) => {
            warn!(command, error = %e, "command could not run");
            ui::print_warning(&format!("'{}' could not run: {}", command, e));
            false
        }
    }
}

fn print_summary(config: &Config) {
    let disk = match config.harddrive {
        Some(ref d) if d.keep_partitions == Some(true) => format!("{} (keep partitions)", d.path),
        Some(ref d) => format!("{} (wipe)", d.path),
        None => format!("pre-mounted at {}", config.mount_point()),
    };
    let kernels = config
        .kernels
        .iter()
        .flatten()
        .map(|k| k.package_name())
        .collect::<Vec<_>>()
        .join(", ");
    let users = config
        .users
        .iter()
        .flatten()
        .chain(config.superusers.iter().flatten())
        .map(|u| u.username.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let encrypted = if config.encryption_password().is_some() { "LUKS2" } else { "no" };

    let rows = [
        ("Disk", disk),
        ("Filesystem", config.filesystem.map(|f| f.to_string()).unwrap_or_default()),
        ("Encryption", encrypted.to_string()),
        ("Bootloader", config.bootloader.unwrap_or_default().to_string()),
        ("Hostname", config.hostname.clone().unwrap_or_default()),
        ("Locale", config.locale()),
        ("Profile", config.profile.map(|p| p.to_string()).unwrap_or_default()),
        ("Kernels", kernels),
        ("Users", users),
        ("Timezone", config.timezone.clone().unwrap_or_else(|| "unset".to_string())),
    ];
    let rows: Vec<(&str, &str)> = rows.iter().map(|(k, v)| (*k, v.as_str())).collect();

    println!();
    ui::print_kv_box("Configuration", &rows);
    println!();
}

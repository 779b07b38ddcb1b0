use tracing::info;

use crate::{
    config::{Config, Kernel, NetworkConfig, DEFAULT_ENCODING, DEFAULT_LANGUAGE},
    error::InstallerError,
    target::{BootContext, InstallTarget},
    ui,
};

const MKINITCPIO_CONF: &str = "/etc/mkinitcpio.conf";

/// `pacstrap`, `fstab`, locale, hostname, mirrors and the bootloader.
pub fn bootstrap(
    config: &Config,
    target: &dyn InstallTarget,
    boot: &BootContext,
) -> Result<(), InstallerError> {
    let kernels = config.kernels.clone().unwrap_or_else(|| vec![Kernel::Linux]);
    target.minimal_installation(&kernels)?;

    let language = config.sys_language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
    let encoding = config.sys_encoding.as_deref().unwrap_or(DEFAULT_ENCODING);
    target.set_locale(language, &encoding.to_uppercase())?;

    if let Some(ref hostname) = config.hostname {
        target.set_hostname(hostname)?;
    }
    if let Some(ref region) = config.mirror_region {
        if !region.mirrors.is_empty() {
            target.set_mirrors(region)?;
        }
    }

    if boot.crypt_device.is_some() {
        target.replace_in_file(
            MKINITCPIO_CONF,
            " block filesystems",
            " block encrypt filesystems",
        )?;
        let status = target.arch_chroot("mkinitcpio -P", None)?;
        if status != 0 {
            return Err(InstallerError::CommandFailed("mkinitcpio".to_string(), status));
        }
    }

    let bootloader = config.bootloader.unwrap_or_default();
    target.add_bootloader(bootloader, boot)?;
    ui::print_success(&format!("{} installed.", bootloader));
    Ok(())
}

pub fn configure_network(config: &Config, target: &dyn InstallTarget) -> Result<(), InstallerError> {
    match config.nic {
        Some(NetworkConfig::CopyIso) => target.copy_iso_network_config(),
        Some(NetworkConfig::NetworkManager) => {
            target.add_packages(&["networkmanager".to_string()])?;
            target.enable_services(&["NetworkManager.service".to_string()])
        }
        Some(NetworkConfig::Interface(ref nic)) => {
            target.configure_nic(nic)?;
            target.enable_services(&["systemd-networkd".to_string(), "systemd-resolved".to_string()])
        }
        Some(NetworkConfig::Unconfigured) | None => Ok(()),
    }
}

pub fn install_audio(config: &Config, target: &dyn InstallTarget) -> Result<(), InstallerError> {
    let Some(audio) = config.audio else {
        info!("no audio server will be installed");
        return Ok(());
    };
    info!(%audio, "installing audio server");
    ui::print_info(&format!("Installing {}…", audio));
    let packages: Vec<String> = audio.packages().iter().map(|p| p.to_string()).collect();
    target.add_packages(&packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AudioServer, InterfaceConfig, MirrorRegion},
        testing::{Journal, RecordingTarget},
    };

    fn boot(crypt: Option<&str>) -> BootContext {
        BootContext {
            uefi: true,
            disk: Some("/dev/sda".into()),
            root_device: "/dev/sda2".into(),
            crypt_device: crypt.map(str::to_string),
            kernel: Kernel::Linux,
        }
    }

    #[test]
    fn bootstrap_uppercases_encoding_and_skips_empty_mirrors() {
        let journal = Journal::default();
        let config = Config {
            sys_language: Some("sv_SE".into()),
            hostname: Some("archbox".into()),
            mirror_region: Some(MirrorRegion { name: "Sweden".into(), mirrors: vec![] }),
            kernels: Some(vec![Kernel::LinuxLts]),
            ..Default::default()
        };
        bootstrap(&config, &RecordingTarget::new(&journal), &boot(None)).unwrap();
        assert_eq!(
            journal.entries(),
            vec![
                "minimal_installation linux-lts",
                "set_locale sv_SE UTF-8",
                "set_hostname archbox",
                "add_bootloader systemd-bootctl /dev/sda2",
            ]
        );
    }

    #[test]
    fn encrypted_root_rebuilds_the_initramfs() {
        let journal = Journal::default();
        bootstrap(&Config::default(), &RecordingTarget::new(&journal), &boot(Some("/dev/sda2")))
            .unwrap();
        let hooks = journal.position("replace_in_file /etc/mkinitcpio.conf").unwrap();
        let initramfs = journal.position("arch_chroot mkinitcpio -P").unwrap();
        let loader = journal.position("add_bootloader").unwrap();
        assert!(hooks < initramfs && initramfs < loader);
    }

    #[test]
    fn failed_bootstrap_propagates() {
        let journal = Journal::default();
        let target = RecordingTarget { fail: Some("minimal_installation"), ..RecordingTarget::new(&journal) };
        assert!(bootstrap(&Config::default(), &target, &boot(None)).is_err());
        assert_eq!(journal.entries().len(), 1);
    }

    #[test]
    fn network_choices_map_to_target_calls() {
        let journal = Journal::default();
        let target = RecordingTarget::new(&journal);
        let mut config = Config { nic: Some(NetworkConfig::NetworkManager), ..Default::default() };
        configure_network(&config, &target).unwrap();
        config.nic = Some(NetworkConfig::Interface(InterfaceConfig {
            nic: "eth0".into(),
            dhcp: true,
            ip: None,
            gateway: None,
            dns: vec![],
        }));
        configure_network(&config, &target).unwrap();
        config.nic = Some(NetworkConfig::Unconfigured);
        configure_network(&config, &target).unwrap();
        assert_eq!(
            journal.entries(),
            vec![
                "add_packages networkmanager",
                "enable_services NetworkManager.service",
                "configure_nic eth0",
                "enable_services systemd-networkd systemd-resolved",
            ]
        );
    }

    #[test]
    fn audio_installs_its_package_set() {
        let journal = Journal::default();
        let config = Config { audio: Some(AudioServer::Pulseaudio), ..Default::default() };
        install_audio(&config, &RecordingTarget::new(&journal)).unwrap();
        install_audio(&Config::default(), &RecordingTarget::new(&journal)).unwrap();
        assert_eq!(journal.entries(), vec!["add_packages pulseaudio"]);
    }
}

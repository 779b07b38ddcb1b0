//! The installed system under construction, mounted at a root directory.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use tracing::{debug, info};

use crate::{
    cmd,
    config::{Bootloader, InterfaceConfig, Kernel, MirrorRegion},
    error::InstallerError,
    steps::disk::LUKS_NAME,
};

/// Base packages every installation gets, kernels are added on top.
pub const BASE_PACKAGES: &[&str] = &["base", "base-devel", "linux-firmware", "sudo"];

/// What the bootloader needs to know about the disk layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootContext {
    pub uefi: bool,
    /// Whole disk, needed by BIOS GRUB.
    pub disk: Option<String>,
    /// Block device holding the root filesystem (the mapper device when encrypted).
    pub root_device: String,
    /// Underlying LUKS partition when the root filesystem is encrypted.
    pub crypt_device: Option<String>,
    pub kernel: Kernel,
}

pub trait InstallTarget {
    fn root(&self) -> &str;
    /// `pacstrap` the base system and write `fstab`.
    fn minimal_installation(&self, kernels: &[Kernel]) -> Result<(), InstallerError>;
    fn set_locale(&self, language: &str, encoding: &str) -> Result<(), InstallerError>;
    fn set_hostname(&self, hostname: &str) -> Result<(), InstallerError>;
    fn set_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError>;
    fn add_bootloader(&self, bootloader: Bootloader, boot: &BootContext)
        -> Result<(), InstallerError>;
    fn add_packages(&self, packages: &[String]) -> Result<(), InstallerError>;
    fn enable_services(&self, services: &[String]) -> Result<(), InstallerError>;
    fn copy_iso_network_config(&self) -> Result<(), InstallerError>;
    fn configure_nic(&self, nic: &InterfaceConfig) -> Result<(), InstallerError>;
    fn user_create(&self, username: &str, password: &str) -> Result<(), InstallerError>;
    /// Unrestricted, passwordless `sudo` for `username`.
    fn grant_sudo(&self, username: &str) -> Result<(), InstallerError>;
    fn set_password(&self, username: &str, password: &str) -> Result<(), InstallerError>;
    fn set_timezone(&self, timezone: &str) -> Result<(), InstallerError>;
    fn activate_ntp(&self) -> Result<(), InstallerError>;
    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError>;
    /// Literal search-and-replace inside a file of the target.
    fn replace_in_file(&self, path: &str, before: &str, after: &str)
        -> Result<(), InstallerError>;
    /// Runs `command` through a shell inside the target; returns its exit code.
    fn arch_chroot(&self, command: &str, runas: Option<&str>) -> Result<i32, InstallerError>;
    fn drop_to_shell(&self) -> Result<(), InstallerError>;
}

// ── Live target ───────────────────────────────────────────────────────────────

/// Target driven by `pacstrap`, `genfstab` and `arch-chroot`.
pub struct Pacstrap {
    root: String,
}

impl Pacstrap {
    pub fn new(root: impl Into<String>) -> Self {
        Pacstrap { root: root.into() }
    }

    fn path(&self, rel: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}", self.root.trim_end_matches('/'), rel.trim_start_matches('/')))
    }

    fn write_file(&self, rel: &str, contents: &str) -> Result<(), InstallerError> {
        let path = self.path(rel);
        if crate::is_dry_run() {
            info!(path = %path.display(), "dry-run: skipped write");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        debug!(path = %path.display(), "written");
        Ok(())
    }

    fn append_file(&self, rel: &str, contents: &str) -> Result<(), InstallerError> {
        let path = self.path(rel);
        if crate::is_dry_run() {
            info!(path = %path.display(), "dry-run: skipped append");
            return Ok(());
        }
        let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Runs a chroot command that must succeed.
    fn chroot(&self, args: &[&str], spin_msg: &str, done_msg: &str) -> Result<(), InstallerError> {
        let mut full = vec![self.root.as_str()];
        full.extend_from_slice(args);
        cmd::run_with_spinner("arch-chroot", &full, spin_msg, done_msg)
    }

    fn kernel_cmdline(boot: &BootContext) -> Result<String, InstallerError> {
        cmdline(boot, |dev| {
            if crate::is_dry_run() {
                return Ok("00000000-0000-0000-0000-000000000000".to_string());
            }
            Ok(cmd::run_capture("blkid", &["-s", "UUID", "-o", "value", dev])?
                .trim()
                .to_string())
        })
    }
}

/// Kernel parameters for the installed root. An encrypted root is unlocked
/// by the `encrypt` hook under the same mapper name the installer used.
fn cmdline(
    boot: &BootContext,
    uuid: impl Fn(&str) -> Result<String, InstallerError>,
) -> Result<String, InstallerError> {
    Ok(match boot.crypt_device {
        Some(ref luks) => format!(
            "cryptdevice=UUID={}:{name} root=/dev/mapper/{name} rw",
            uuid(luks)?,
            name = LUKS_NAME
        ),
        None => format!("root=UUID={} rw", uuid(&boot.root_device)?),
    })
}

impl InstallTarget for Pacstrap {
    fn root(&self) -> &str {
        &self.root
    }

    fn minimal_installation(&self, kernels: &[Kernel]) -> Result<(), InstallerError> {
        let mut args: Vec<&str> = vec!["-K", self.root.as_str()];
        args.extend_from_slice(BASE_PACKAGES);
        args.extend(kernels.iter().map(|k| k.package_name()));

        // pacstrap streams download output, keep it interactive.
        cmd::run_interactive("pacstrap", &args)?;
        crate::ui::print_success("Base system installed.");

        let fstab = self.path("/etc/fstab");
        let pb = crate::ui::spinner("Generating fstab (UUID-based)…");
        let result = cmd::run_append_to_file(
            "genfstab",
            &["-U", self.root.as_str()],
            &fstab.to_string_lossy(),
        );
        match result {
            Ok(()) => crate::ui::done_spinner(pb, &format!("fstab written to {}.", fstab.display())),
            Err(_) => pb.finish_and_clear(),
        }
        result
    }

    fn set_locale(&self, language: &str, encoding: &str) -> Result<(), InstallerError> {
        let locale = format!("{}.{}", language, encoding);
        self.append_file("/etc/locale.gen", &format!("{} {}\n", locale, encoding))?;
        self.write_file("/etc/locale.conf", &format!("LANG={}\n", locale))?;
        self.chroot(
            &["locale-gen"],
            &format!("Generating locale {}…", locale),
            &format!("Locale {} generated.", locale),
        )
    }

    fn set_hostname(&self, hostname: &str) -> Result<(), InstallerError> {
        self.write_file("/etc/hostname", &format!("{}\n", hostname))
    }

    fn set_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError> {
        self.write_file("/etc/pacman.d/mirrorlist", &region.mirrorlist())
    }

    fn add_bootloader(
        &self,
        bootloader: Bootloader,
        boot: &BootContext,
    ) -> Result<(), InstallerError> {
        let cmdline = Self::kernel_cmdline(boot)?;
        match bootloader {
            Bootloader::SystemdBoot => {
                self.chroot(
                    &["bootctl", "--esp-path=/boot", "install"],
                    "Installing systemd-boot…",
                    "systemd-boot installed.",
                )?;
                let kernel = boot.kernel.package_name();
                self.write_file("/boot/loader/loader.conf", "default arch.conf\ntimeout 3\n")?;
                self.write_file(
                    "/boot/loader/entries/arch.conf",
                    &format!(
                        "title Arch Linux\nlinux /vmlinuz-{k}\ninitrd /initramfs-{k}.img\noptions {c}\n",
                        k = kernel,
                        c = cmdline
                    ),
                )
            }
            Bootloader::Grub => {
                let mut packages = vec!["grub".to_string()];
                if boot.uefi {
                    packages.push("efibootmgr".to_string());
                }
                self.add_packages(&packages)?;
                if boot.crypt_device.is_some() {
                    self.replace_in_file(
                        "/etc/default/grub",
                        "GRUB_CMDLINE_LINUX=\"\"",
                        &format!("GRUB_CMDLINE_LINUX=\"{}\"", cmdline),
                    )?;
                }
                if boot.uefi {
                    self.chroot(
                        &[
                            "grub-install",
                            "--target=x86_64-efi",
                            "--efi-directory=/boot",
                            "--bootloader-id=GRUB",
                        ],
                        "Installing GRUB (UEFI)…",
                        "GRUB installed.",
                    )?;
                } else {
                    let disk = boot.disk.as_deref().ok_or_else(|| {
                        InstallerError::invalid("BIOS GRUB needs the target disk")
                    })?;
                    self.chroot(
                        &["grub-install", "--target=i386-pc", disk],
                        "Installing GRUB (BIOS)…",
                        "GRUB installed.",
                    )?;
                }
                self.chroot(
                    &["grub-mkconfig", "-o", "/boot/grub/grub.cfg"],
                    "Generating GRUB configuration…",
                    "GRUB configuration written.",
                )
            }
        }
    }

    fn add_packages(&self, packages: &[String]) -> Result<(), InstallerError> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec![self.root.as_str(), "pacman", "-S", "--noconfirm", "--needed"];
        args.extend(packages.iter().map(String::as_str));
        cmd::run_interactive("arch-chroot", &args)
    }

    fn enable_services(&self, services: &[String]) -> Result<(), InstallerError> {
        for service in services {
            self.chroot(
                &["systemctl", "enable", service],
                &format!("Enabling {}…", service),
                &format!("{} enabled.", service),
            )?;
        }
        Ok(())
    }

    fn copy_iso_network_config(&self) -> Result<(), InstallerError> {
        let dest = self.path("/etc/systemd/network");
        if !crate::is_dry_run() {
            fs::create_dir_all(&dest)?;
            for entry in fs::read_dir("/etc/systemd/network")?.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |e| e == "network") {
                    fs::copy(&path, dest.join(entry.file_name()))?;
                }
            }
        }
        self.enable_services(&["systemd-networkd".to_string(), "systemd-resolved".to_string()])
    }

    fn configure_nic(&self, nic: &InterfaceConfig) -> Result<(), InstallerError> {
        self.write_file(
            &format!("/etc/systemd/network/10-{}.network", nic.nic),
            &nic.network_unit(),
        )
    }

    fn user_create(&self, username: &str, password: &str) -> Result<(), InstallerError> {
        self.chroot(
            &["useradd", "-m", username],
            &format!("Creating user {}…", username),
            &format!("User {} created.", username),
        )?;
        self.set_password(username, password)
    }

    fn grant_sudo(&self, username: &str) -> Result<(), InstallerError> {
        self.append_file("/etc/sudoers", &crate::steps::users::sudoers_line(username))
    }

    fn set_password(&self, username: &str, password: &str) -> Result<(), InstallerError> {
        cmd::run_with_stdin(
            "arch-chroot",
            &[self.root.as_str(), "chpasswd"],
            &format!("{}:{}\n", username, password),
        )
    }

    fn set_timezone(&self, timezone: &str) -> Result<(), InstallerError> {
        let zone = format!("{}/{}", crate::host::ZONEINFO, timezone);
        self.chroot(
            &["ln", "-sf", &zone, "/etc/localtime"],
            &format!("Setting timezone {}…", timezone),
            &format!("Timezone set to {}.", timezone),
        )
    }

    fn activate_ntp(&self) -> Result<(), InstallerError> {
        cmd::run_best_effort("timedatectl", &["set-ntp", "true"]);
        self.enable_services(&["systemd-timesyncd".to_string()])
    }

    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError> {
        self.write_file("/etc/vconsole.conf", &format!("KEYMAP={}\n", layout))
    }

    fn replace_in_file(&self, path: &str, before: &str, after: &str) -> Result<(), InstallerError> {
        let full = self.path(path);
        if crate::is_dry_run() {
            info!(path = %full.display(), "dry-run: skipped edit");
            return Ok(());
        }
        let data = fs::read_to_string(&full)?;
        fs::write(&full, data.replace(before, after))?;
        Ok(())
    }

    fn arch_chroot(&self, command: &str, runas: Option<&str>) -> Result<i32, InstallerError> {
        match runas {
            Some(user) => cmd::run_status(
                "arch-chroot",
                &[self.root.as_str(), "su", "-", user, "-c", command],
            ),
            None => cmd::run_status("arch-chroot", &[self.root.as_str(), "bash", "-c", command]),
        }
    }

    fn drop_to_shell(&self) -> Result<(), InstallerError> {
        // Hands the terminal over to the chroot shell.
        cmd::run_interactive("arch-chroot", &[self.root.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_in_target() {
        let target = Pacstrap::new("/mnt/");
        assert_eq!(target.path("/etc/hostname"), PathBuf::from("/mnt/etc/hostname"));
        assert_eq!(target.path("etc/fstab"), PathBuf::from("/mnt/etc/fstab"));
    }

    fn boot_context(crypt: Option<&str>, root: &str) -> BootContext {
        BootContext {
            uefi: true,
            disk: Some("/dev/sda".into()),
            root_device: root.into(),
            crypt_device: crypt.map(str::to_string),
            kernel: Kernel::Linux,
        }
    }

    #[test]
    fn encrypted_root_is_found_under_the_unlocked_name() {
        let boot = boot_context(Some("/dev/sda2"), "/dev/mapper/luksloop");
        let line = cmdline(&boot, |dev| Ok(format!("uuid-of-{}", dev))).unwrap();
        assert_eq!(
            line,
            "cryptdevice=UUID=uuid-of-/dev/sda2:luksloop root=/dev/mapper/luksloop rw"
        );
        let unlocked = line.split(':').nth(1).and_then(|s| s.split(' ').next()).unwrap();
        assert!(line.contains(&format!("root=/dev/mapper/{} ", unlocked)));
    }

    #[test]
    fn plain_root_uses_its_uuid() {
        let boot = boot_context(None, "/dev/sda2");
        let line = cmdline(&boot, |dev| Ok(format!("uuid-of-{}", dev))).unwrap();
        assert_eq!(line, "root=UUID=uuid-of-/dev/sda2 rw");
    }

    #[test]
    fn replace_in_file_edits_target_copy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/pacman.conf"), "#Color\n").unwrap();

        let target = Pacstrap::new(dir.path().to_string_lossy());
        target.replace_in_file("/etc/pacman.conf", "#Color", "Color").unwrap();

        let data = std::fs::read_to_string(dir.path().join("etc/pacman.conf")).unwrap();
        assert_eq!(data, "Color\n");
    }

    #[test]
    fn hostname_and_keymap_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let target = Pacstrap::new(dir.path().to_string_lossy());
        target.set_hostname("archbox").unwrap();
        target.set_keyboard_layout("sv-latin1").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("etc/hostname")).unwrap(),
            "archbox\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("etc/vconsole.conf")).unwrap(),
            "KEYMAP=sv-latin1\n"
        );
    }

    #[test]
    fn grant_sudo_appends_nopasswd_rule() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        let target = Pacstrap::new(dir.path().to_string_lossy());
        target.grant_sudo("alice").unwrap();
        target.grant_sudo("bob").unwrap();
        let sudoers = std::fs::read_to_string(dir.path().join("etc/sudoers")).unwrap();
        assert_eq!(sudoers, "alice ALL=(ALL) NOPASSWD: ALL\nbob ALL=(ALL) NOPASSWD: ALL\n");
    }
}

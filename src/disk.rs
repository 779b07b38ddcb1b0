use tracing::{debug, warn};

use crate::{
    cmd,
    config::{Filesystem, Harddrive, Partition},
    error::InstallerError,
    host::DiskManager,
    lsblk,
};

/// Size of the boot partition created when a disk is wiped.
const BOOT_PARTITION_END: &str = "513MiB";
const PROBE_MAPPER_NAME: &str = "archguided-probe";

// ── Live disk manager ─────────────────────────────────────────────────────────

pub struct LiveDisks;

impl DiskManager for LiveDisks {
    fn all_disks(&self) -> Result<Vec<Harddrive>, InstallerError> {
        Ok(lsblk::list_disks())
    }

    fn detect_inner_filesystem(&self, partition: &Partition, secret: &str) -> Option<Filesystem> {
        cmd::run_with_stdin(
            "cryptsetup",
            &["--readonly", "--key-file", "-", "open", &partition.path, PROBE_MAPPER_NAME],
            secret,
        )
        .ok()?;
        let inner = lsblk::fstype(&format!("/dev/mapper/{}", PROBE_MAPPER_NAME));
        cmd::run_best_effort("cryptsetup", &["close", PROBE_MAPPER_NAME]);
        debug!(partition = %partition.path, ?inner, "probed encrypted volume");
        inner.and_then(|fs| fs.parse().ok())
    }

    /// GPT + ESP on UEFI, MBR + bootable flag on BIOS. Partition 1 is the
    /// 512 MiB boot partition, partition 2 takes the rest of the disk.
    fn partition_entire_disk(
        &self,
        disk: &Harddrive,
        root_filesystem: Filesystem,
        uefi: bool,
    ) -> Result<Vec<Partition>, InstallerError> {
        let dev = disk.path.as_str();
        let (label, flag) = if uefi { ("gpt", "esp") } else { ("msdos", "boot") };

        cmd::run_with_spinner(
            "wipefs",
            &["--all", dev],
            &format!("Clearing signatures on {}…", dev),
            &format!("{} signatures cleared.", dev),
        )?;
        cmd::run_with_spinner(
            "parted",
            &["--script", dev, "mklabel", label],
            &format!("Writing {} partition table…", label),
            &format!("{} partition table written to {}.", label, dev),
        )?;
        cmd::run_with_spinner(
            "parted",
            &[
                "--script", "--align", "optimal", dev,
                "mkpart", "primary", "fat32", "1MiB", BOOT_PARTITION_END,
                "set", "1", flag, "on",
                "mkpart", "primary", BOOT_PARTITION_END, "100%",
            ],
            "Creating boot and root partitions…",
            "Boot and root partitions created.",
        )?;
        cmd::run_best_effort("partprobe", &[dev]);

        let mut boot = Partition::new(lsblk::part_path(dev, 1), "512M", None);
        boot.filesystem = Some(Filesystem::Vfat);
        boot.target_mountpoint = Some("/boot".to_string());
        boot.allow_formatting = true;

        let mut root = Partition::new(lsblk::part_path(dev, 2), String::new(), None);
        root.filesystem = Some(root_filesystem);
        root.target_mountpoint = Some("/".to_string());
        root.allow_formatting = true;

        Ok(vec![boot, root])
    }

    fn format(&self, device: &str, filesystem: Filesystem) -> Result<(), InstallerError> {
        let (program, args) = filesystem.format_command(device);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_with_spinner(
            program,
            &args,
            &format!("Formatting {} as {}…", device, filesystem),
            &format!("{} formatted as {}.", device, filesystem),
        )
    }

    fn luks_format(&self, device: &str, secret: &str) -> Result<(), InstallerError> {
        let pb = crate::ui::spinner(format!("Encrypting {} (LUKS2)…", device));
        let result = cmd::run_with_stdin(
            "cryptsetup",
            &["--batch-mode", "--type", "luks2", "--key-file", "-", "luksFormat", device],
            secret,
        );
        match result {
            Ok(()) => crate::ui::done_spinner(pb, &format!("{} encrypted.", device)),
            Err(_) => pb.finish_and_clear(),
        }
        result
    }

    fn luks_open(&self, device: &str, name: &str, secret: &str) -> Result<String, InstallerError> {
        cmd::run_with_stdin("cryptsetup", &["--key-file", "-", "open", device, name], secret)?;
        Ok(format!("/dev/mapper/{}", name))
    }

    fn luks_close(&self, name: &str) -> Result<(), InstallerError> {
        cmd::run_quiet("cryptsetup", &["close", name])
    }

    fn mount(&self, device: &str, target: &str) -> Result<(), InstallerError> {
        if !crate::is_dry_run() {
            std::fs::create_dir_all(target)?;
        }
        cmd::run_with_spinner(
            "mount",
            &[device, target],
            &format!("Mounting {} → {}…", device, target),
            &format!("{} mounted at {}.", device, target),
        )
    }

    fn unmount(&self, target: &str) -> Result<(), InstallerError> {
        cmd::run_quiet("umount", &[target])
    }

    fn mounted_source(&self, target: &str) -> Option<String> {
        cmd::run_capture("findmnt", &["--noheadings", "--output", "SOURCE", target])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn layout_report(&self) -> String {
        cmd::run_capture("lsblk", &["--fs", "--paths"]).unwrap_or_default()
    }
}

// ── Scoped resources ──────────────────────────────────────────────────────────

/// A mounted filesystem; unmounted when dropped, including on error paths.
pub struct MountGuard<'a> {
    disks: &'a dyn DiskManager,
    target: String,
}

impl<'a> MountGuard<'a> {
    pub fn mount(
        disks: &'a dyn DiskManager,
        device: &str,
        target: &str,
    ) -> Result<Self, InstallerError> {
        disks.mount(device, target)?;
        Ok(MountGuard {
            disks,
            target: target.to_string(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        debug!(target = %self.target, "unmounting");
        if let Err(e) = self.disks.unmount(&self.target) {
            warn!(target = %self.target, error = %e, "unmount failed");
        }
    }
}

/// An unlocked LUKS volume; locked again when dropped.
pub struct LuksGuard<'a> {
    disks: &'a dyn DiskManager,
    name: String,
    device: String,
}

impl<'a> LuksGuard<'a> {
    pub fn open(
        disks: &'a dyn DiskManager,
        partition: &str,
        name: &str,
        secret: &str,
    ) -> Result<Self, InstallerError> {
        let device = disks.luks_open(partition, name, secret)?;
        Ok(LuksGuard {
            disks,
            name: name.to_string(),
            device,
        })
    }

    /// Mapper device of the unlocked volume.
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for LuksGuard<'_> {
    fn drop(&mut self) {
        debug!(name = %self.name, "locking encrypted volume");
        if let Err(e) = self.disks.luks_close(&self.name) {
            warn!(name = %self.name, error = %e, "closing encrypted volume failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDisks;

    #[test]
    fn guards_release_in_reverse_order() {
        let disks = FakeDisks::default();
        {
            let luks = LuksGuard::open(&disks, "/dev/sda2", "luksloop", "pw").unwrap();
            let root = MountGuard::mount(&disks, luks.device(), "/mnt").unwrap();
            let _boot = MountGuard::mount(&disks, "/dev/sda1", "/mnt/boot").unwrap();
            assert_eq!(root.target(), "/mnt");
        }
        assert_eq!(
            disks.calls(),
            vec![
                "luks_open /dev/sda2 luksloop",
                "mount /dev/mapper/luksloop /mnt",
                "mount /dev/sda1 /mnt/boot",
                "unmount /mnt/boot",
                "unmount /mnt",
                "luks_close luksloop",
            ]
        );
    }

    #[test]
    fn guard_unmounts_when_scope_exits_with_error() {
        let disks = FakeDisks::default();
        let result: Result<(), InstallerError> = (|| {
            let _root = MountGuard::mount(&disks, "/dev/sda2", "/mnt")?;
            Err(InstallerError::Cancelled)
        })();
        assert!(result.is_err());
        assert_eq!(disks.calls().last().unwrap(), "unmount /mnt");
    }

    #[test]
    fn probe_rejects_unknown_filesystems() {
        let disks = FakeDisks::default();
        assert_eq!(disks.probe_filesystem(" btrfs ").unwrap(), Filesystem::Btrfs);
        assert!(matches!(
            disks.probe_filesystem("zfs"),
            Err(InstallerError::UnsupportedFilesystem(ref s)) if s == "zfs"
        ));
    }
}

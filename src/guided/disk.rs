use tracing::{debug, info};

use super::GuidedBuilder;
use crate::{
    config::{Config, Encryption, Filesystem, Harddrive, Partition},
    error::InstallerError,
    ui,
};

const WIPE: usize = 0;

impl GuidedBuilder<'_> {
    /// Picks the target disk, or "none" to install into an already-mounted
    /// target. A pre-seeded path must name one of the enumerated disks.
    pub(super) fn select_disk(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.harddrive.is_none() && config.target_mount.is_some() {
            return Ok(());
        }

        let disks = self.host.disks.all_disks()?;
        if let Some(seeded) = config.harddrive.take() {
            match disks.iter().find(|d| d.path == seeded.path) {
                Some(found) => {
                    config.harddrive = Some(merge_seeded(found, seeded));
                    return Ok(());
                }
                None => self.reject(&InstallerError::UnknownDisk(seeded.path)),
            }
        }

        let mut items: Vec<String> = disks.iter().map(Harddrive::display).collect();
        items.push(format!(
            "None, install into the system already mounted at {}",
            config.mount_point()
        ));

        let choice = self.prompt.select("Target disk", &items, 0)?;
        match disks.get(choice) {
            Some(disk) => {
                info!(disk = %disk.path, "block device");
                config.harddrive = Some(disk.clone());
            }
            None => {
                info!(target = %config.mount_point(), "using pre-mounted target");
                config.target_mount = Some(config.mount_point().to_string());
            }
        }
        Ok(())
    }

    /// Wipe or keep. A disk without partitions is wiped without asking.
    pub(super) fn select_partition_disposition(
        &self,
        config: &mut Config,
    ) -> Result<(), InstallerError> {
        let known_secret = config.encryption_password().map(str::to_string);
        let Some(disk) = config.harddrive.as_mut() else {
            return Ok(());
        };
        if disk.keep_partitions.is_some() {
            return Ok(());
        }

        if !disk.has_partitions() {
            disk.keep_partitions = Some(false);
            let fs = *config.filesystem.get_or_insert(Filesystem::default());
            info!(disk = %disk.path, filesystem = %fs, "empty disk, formatting everything");
            return Ok(());
        }

        ui::print_kv_box(
            &disk.path,
            &disk
                .partitions
                .iter()
                .map(|p| (p.path.as_str(), p.detected_filesystem.as_deref().unwrap_or("unformatted")))
                .collect::<Vec<_>>(),
        );

        let items = vec![
            format!("Wipe {} and use the entire disk", disk.path),
            "Keep existing partitions and assign mount points".to_string(),
        ];
        if self.prompt.select("Existing partitions", &items, WIPE)? == WIPE {
            ui::print_warning(&format!("Everything on {} will be formatted.", disk.path));
            disk.keep_partitions = Some(false);
            config.filesystem.get_or_insert(Filesystem::default());
            return Ok(());
        }

        disk.keep_partitions = Some(true);
        self.assign_mount_points(disk, known_secret.as_deref())?;
        info!(disk = %disk.path, "using existing partition table");
        Ok(())
    }

    /// Loops over (partition, mount point, filesystem) until both `/` and
    /// `/boot` have a partition. Partitions we cannot handle are listed but
    /// not offered.
    fn assign_mount_points(
        &self,
        disk: &mut Harddrive,
        known_secret: Option<&str>,
    ) -> Result<(), InstallerError> {
        let candidates: Vec<usize> = (0..disk.partitions.len())
            .filter(|&i| disk.partitions[i].filesystem_supported())
            .collect();
        for p in disk.partitions.iter().filter(|p| !p.filesystem_supported()) {
            ui::print_warning(&format!("{} (filesystem not supported)", p.path));
        }
        ui::print_info("Pick partitions by mount point inside the installation: / for root, /boot for boot.");

        loop {
            let mut items: Vec<String> = candidates
                .iter()
                .map(|&i| disk.partitions[i].display())
                .collect();
            items.push("Done".to_string());

            let choice = self
                .prompt
                .select("Partition to assign a mount point", &items, 0)?;
            let Some(&index) = candidates.get(choice) else {
                if disk.find_partition("/").is_some() && disk.find_partition("/boot").is_some() {
                    return Ok(());
                }
                self.reject(&InstallerError::invalid(
                    "both / and /boot need a partition before continuing",
                ));
                continue;
            };

            let path = disk.partitions[index].path.clone();
            let mountpoint = self
                .prompt
                .input(&format!("Mount point for {}", path), None)?;
            if mountpoint.is_empty() {
                continue;
            }
            let filesystem = self.choose_filesystem(&disk.partitions[index], known_secret)?;

            // A mount point belongs to one partition only.
            if let Some(previous) = disk.find_partition_mut(&mountpoint) {
                previous.target_mountpoint = None;
                previous.allow_formatting = false;
            }
            let partition = &mut disk.partitions[index];
            partition.target_mountpoint = Some(mountpoint);
            partition.filesystem = Some(filesystem);
            partition.allow_formatting = true;
            debug!(partition = %partition.path, mountpoint = ?partition.target_mountpoint, %filesystem, "assigned");
        }
    }

    /// Blank keeps the current filesystem; on a LUKS volume the filesystem
    /// inside it is detected with the volume's secret.
    fn choose_filesystem(
        &self,
        partition: &Partition,
        known_secret: Option<&str>,
    ) -> Result<Filesystem, InstallerError> {
        let current = partition
            .filesystem
            .map(|fs| fs.to_string())
            .or_else(|| partition.detected_filesystem.clone())
            .unwrap_or_else(|| "none".to_string());

        loop {
            let answer = self.prompt.input(
                &format!("Filesystem for {} (blank keeps {})", partition.path, current),
                None,
            )?;

            if !answer.is_empty() {
                match self.host.disks.probe_filesystem(&answer) {
                    Ok(fs) => return Ok(fs),
                    Err(e) => {
                        self.reject(&e);
                        continue;
                    }
                }
            }

            if partition.is_luks() {
                let secret = match known_secret {
                    Some(s) => s.to_string(),
                    None => self.prompt.password(
                        &format!("Existing encryption password for {}", partition.path),
                        false,
                    )?,
                };
                match self.host.disks.detect_inner_filesystem(partition, &secret) {
                    Some(fs) => {
                        info!(partition = %partition.path, filesystem = %fs, "detected inside encrypted volume");
                        return Ok(fs);
                    }
                    None => self.reject(&InstallerError::invalid(
                        "could not detect the filesystem inside the encrypted volume, enter one explicitly",
                    )),
                }
                continue;
            }

            match partition.filesystem {
                Some(fs) => return Ok(fs),
                None => self.reject(&InstallerError::invalid(format!(
                    "{} has no filesystem to keep, enter one",
                    partition.path
                ))),
            }
        }
    }

    /// Blank means no encryption. Only asked when installing to a disk.
    pub(super) fn ask_encryption(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.harddrive.is_none() || config.encryption.is_some() {
            return Ok(());
        }
        let secret = self
            .prompt
            .password("Disk encryption password (blank for no encryption)", true)?;
        config.encryption = Some(if secret.is_empty() {
            Encryption::None
        } else {
            info!("root partition will be encrypted");
            Encryption::Luks { password: secret }
        });
        Ok(())
    }
}

/// Fresh device data from the enumeration, plus the seeded partitioning
/// decisions when there are any.
fn merge_seeded(found: &Harddrive, seeded: Harddrive) -> Harddrive {
    let mut disk = found.clone();
    if seeded.keep_partitions.is_some() {
        disk.keep_partitions = seeded.keep_partitions;
        disk.partitions = seeded.partitions;
    }
    disk
}

use tracing::{debug, info};

use crate::{
    config::Config,
    disk::{LuksGuard, MountGuard},
    error::InstallerError,
    host::DiskManager,
};

/// Mapper name of the unlocked root volume.
pub const LUKS_NAME: &str = "luksloop";

/// The mounted target. Fields drop in declaration order, so `/boot` is
/// unmounted before the root and the root before its volume is locked.
pub struct PreparedDisk<'a> {
    _boot: Option<MountGuard<'a>>,
    _root: Option<MountGuard<'a>>,
    _luks: Option<LuksGuard<'a>>,
    /// Whole disk, `None` for a pre-mounted target.
    pub disk: Option<String>,
    /// Device carrying the root filesystem (mapper device when encrypted).
    pub root_device: String,
    /// Underlying partition of an encrypted root.
    pub crypt_device: Option<String>,
}

/// Wipes or keeps the partition table, formats what is marked for it,
/// unlocks an encrypted root and mounts everything under the mount point.
/// Without a disk the target is expected to be mounted already.
pub fn prepare<'a>(
    config: &Config,
    disks: &'a dyn DiskManager,
    uefi: bool,
) -> Result<PreparedDisk<'a>, InstallerError> {
    let mount_point = config.mount_point();
    let Some(seeded) = config.harddrive.as_ref() else {
        let root_device = disks.mounted_source(mount_point).ok_or_else(|| {
            InstallerError::invalid(format!("nothing is mounted at {}", mount_point))
        })?;
        info!(%mount_point, %root_device, "using pre-mounted target");
        return Ok(PreparedDisk {
            _boot: None,
            _root: None,
            _luks: None,
            disk: None,
            root_device,
            crypt_device: None,
        });
    };

    let mut disk = seeded.clone();
    if disk.keep_partitions == Some(false) {
        let filesystem = config.filesystem.unwrap_or_default();
        disk.partitions = disks.partition_entire_disk(&disk, filesystem, uefi)?;
    }

    let secret = config.encryption_password();
    if secret.is_some() {
        disk.find_partition_mut("/")
            .ok_or_else(|| InstallerError::invalid("no partition is mounted at /"))?
            .encrypted = true;
    }

    for partition in &disk.partitions {
        if !partition.safe_to_format() {
            debug!(partition = %partition.path, "not marked for formatting");
            continue;
        }
        match (partition.encrypted, secret, partition.filesystem) {
            (true, Some(secret), _) => disks.luks_format(&partition.path, secret)?,
            (_, _, Some(fs)) => disks.format(&partition.path, fs)?,
            _ => {}
        }
    }

    let root = disk
        .find_partition("/")
        .ok_or_else(|| InstallerError::invalid("no partition is mounted at /"))?;

    let (luks, root_guard, root_device, crypt_device) = match secret {
        Some(secret) => {
            let luks = LuksGuard::open(disks, &root.path, LUKS_NAME, secret)?;
            if let Some(fs) = root.filesystem {
                disks.format(luks.device(), fs)?;
            }
            let guard = MountGuard::mount(disks, luks.device(), mount_point)?;
            let device = luks.device().to_string();
            (Some(luks), guard, device, Some(root.path.clone()))
        }
        None => {
            let guard = MountGuard::mount(disks, &root.path, mount_point)?;
            (None, guard, root.path.clone(), None)
        }
    };

    let boot_guard = if uefi {
        let boot = disk
            .find_partition("/boot")
            .ok_or_else(|| InstallerError::invalid("UEFI systems need a partition mounted at /boot"))?;
        let target = format!("{}/boot", mount_point.trim_end_matches('/'));
        Some(MountGuard::mount(disks, &boot.path, &target)?)
    } else {
        None
    };
    info!(
        root = root_guard.target(),
        boot = boot_guard.as_ref().map(|g| g.target()).unwrap_or("-"),
        %root_device,
        "target mounted"
    );

    Ok(PreparedDisk {
        _boot: boot_guard,
        _root: Some(root_guard),
        _luks: luks,
        disk: Some(disk.path),
        root_device,
        crypt_device,
    })
}

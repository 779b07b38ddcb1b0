//! Capability interfaces the guided builder and the execution planner talk to.
//!
//! Each trait is narrow so tests can swap in fakes; the `Live*` types
//! implement them on top of the live medium's OS tools.

use std::{
    collections::BTreeMap,
    path::{Component, Path},
};

use crate::{
    cmd,
    config::{Filesystem, Harddrive, MirrorRegion, Partition},
    disk::LiveDisks,
    error::InstallerError,
    mirrors::LivePackages,
    profiles::{LiveProfiles, Profile},
    target::InstallTarget,
};

pub trait Console {
    /// Switches the live console to `layout`.
    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError>;
}

pub trait DiskManager {
    fn all_disks(&self) -> Result<Vec<Harddrive>, InstallerError>;

    /// Checks that `name` is a filesystem we have a `mkfs` command for.
    /// Nothing is executed.
    fn probe_filesystem(&self, name: &str) -> Result<Filesystem, InstallerError> {
        let fs: Filesystem = name
            .trim()
            .parse()
            .map_err(|_| InstallerError::UnsupportedFilesystem(name.trim().to_string()))?;
        Ok(fs)
    }

    /// Unlocks `partition` read-only and reports the filesystem inside it.
    fn detect_inner_filesystem(&self, partition: &Partition, secret: &str) -> Option<Filesystem>;

    /// Wipes `disk` and lays out a boot partition plus a root partition.
    fn partition_entire_disk(
        &self,
        disk: &Harddrive,
        root_filesystem: Filesystem,
        uefi: bool,
    ) -> Result<Vec<Partition>, InstallerError>;

    fn format(&self, device: &str, filesystem: Filesystem) -> Result<(), InstallerError>;
    fn luks_format(&self, device: &str, secret: &str) -> Result<(), InstallerError>;
    /// Returns the mapper device of the unlocked volume.
    fn luks_open(&self, device: &str, name: &str, secret: &str) -> Result<String, InstallerError>;
    fn luks_close(&self, name: &str) -> Result<(), InstallerError>;
    fn mount(&self, device: &str, target: &str) -> Result<(), InstallerError>;
    fn unmount(&self, target: &str) -> Result<(), InstallerError>;
    /// Block device mounted at `target`, if any.
    fn mounted_source(&self, target: &str) -> Option<String>;

    /// Free-form block device report for the support log.
    fn layout_report(&self) -> String;
}

pub trait PackageIndex {
    fn mirrors_reachable(&self) -> bool;
    /// Region name → mirror URLs.
    fn mirror_regions(&self) -> Result<BTreeMap<String, Vec<String>>, InstallerError>;
    /// Fails with `UnknownPackages` naming every package the index lacks.
    fn validate_packages(&self, packages: &[String]) -> Result<(), InstallerError>;
    /// Points the live medium at `region`.
    fn use_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError>;
    /// Refreshes the live medium's package databases; returns the exit code.
    fn sync_databases(&self) -> i32;
}

pub trait ProfileHooks {
    fn has_prep(&self, profile: Profile) -> bool;
    fn prepare(&self, profile: Profile) -> bool;
    fn has_post_install(&self, profile: Profile) -> bool;
    fn post_install(&self, profile: Profile, target: &dyn InstallTarget) -> bool;
}

pub trait SystemProbe {
    fn has_uefi(&self) -> bool;
    fn network_interfaces(&self) -> Vec<String>;
    fn timezone_exists(&self, timezone: &str) -> bool;
    /// systemd `ActiveState` of `unit` (`active`, `activating`, `inactive`, `failed`, …).
    fn service_state(&self, unit: &str) -> String;
}

/// Bundle of every collaborator the installer needs.
pub struct Host {
    pub console: Box<dyn Console>,
    pub disks: Box<dyn DiskManager>,
    pub packages: Box<dyn PackageIndex>,
    pub profiles: Box<dyn ProfileHooks>,
    pub system: Box<dyn SystemProbe>,
}

impl Host {
    pub fn live() -> Self {
        Host {
            console: Box::new(LiveConsole),
            disks: Box::new(LiveDisks),
            packages: Box::new(LivePackages::default()),
            profiles: Box::new(LiveProfiles),
            system: Box::new(LiveSystem),
        }
    }
}

// ── Live console ──────────────────────────────────────────────────────────────

pub struct LiveConsole;

impl Console for LiveConsole {
    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError> {
        if layout.is_empty() || layout.contains(char::is_whitespace) {
            return Err(InstallerError::UnsupportedLayout(layout.to_string()));
        }
        match cmd::run_quiet("loadkeys", &[layout]) {
            Ok(()) => Ok(()),
            Err(InstallerError::CommandFailed(..)) => {
                Err(InstallerError::UnsupportedLayout(layout.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

// ── Live system probe ─────────────────────────────────────────────────────────

pub const ZONEINFO: &str = "/usr/share/zoneinfo";

/// `timezone` names a file inside `zoneinfo`. Only plain relative names
/// like `Europe/Stockholm` qualify; absolute paths and `..` never do.
fn zoneinfo_file(zoneinfo: &Path, timezone: &str) -> bool {
    let name = Path::new(timezone);
    !timezone.is_empty()
        && name.components().all(|c| matches!(c, Component::Normal(_)))
        && zoneinfo.join(name).is_file()
}

pub struct LiveSystem;

impl SystemProbe for LiveSystem {
    /// UEFI when `/sys/firmware/efi/efivars` exists. Dry-run simulates UEFI
    /// so every prompt is exercised on development machines.
    fn has_uefi(&self) -> bool {
        crate::is_dry_run() || Path::new("/sys/firmware/efi/efivars").exists()
    }

    fn network_interfaces(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return vec![];
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != "lo")
            .collect();
        names.sort();
        names
    }

    fn timezone_exists(&self, timezone: &str) -> bool {
        zoneinfo_file(Path::new(ZONEINFO), timezone)
    }

    fn service_state(&self, unit: &str) -> String {
        cmd::run_capture(
            "systemctl",
            &["show", "--property=ActiveState", "--value", unit],
        )
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timezones_stay_inside_the_zoneinfo_tree() {
        let dir = tempfile::tempdir().unwrap();
        let zoneinfo = dir.path().join("zoneinfo");
        std::fs::create_dir_all(zoneinfo.join("Europe")).unwrap();
        std::fs::write(zoneinfo.join("Europe/Stockholm"), "TZif").unwrap();
        std::fs::write(dir.path().join("passwd"), "root:x:0:0").unwrap();

        assert!(zoneinfo_file(&zoneinfo, "Europe/Stockholm"));
        assert!(!zoneinfo_file(&zoneinfo, "Europe"));
        assert!(!zoneinfo_file(&zoneinfo, ""));
        assert!(!zoneinfo_file(&zoneinfo, "../passwd"));
        let absolute = dir.path().join("passwd");
        assert!(!zoneinfo_file(&zoneinfo, &absolute.to_string_lossy()));
        assert!(!zoneinfo_file(&zoneinfo, "./Europe/Stockholm"));
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{error::InstallerError, profiles::Profile};

pub const DEFAULT_LANGUAGE: &str = "en_US";
pub const DEFAULT_ENCODING: &str = "utf-8";
pub const DEFAULT_MOUNT_POINT: &str = "/mnt";
pub const DEFAULT_KEYBOARD_LAYOUT: &str = "us";
pub const DEFAULT_MIRROR_REGION: &str = "United States";
pub const CONFIG_LOG_FILE: &str = "user_configuration.json";

// ── Enums ─────────────────────────────────────────────────────────────────────

/// Filesystems the installer knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Filesystem {
    #[default]
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    #[strum(to_string = "vfat", serialize = "fat32")]
    Vfat,
}

impl Filesystem {
    /// The `mkfs` invocation that formats `device` with this filesystem.
    pub fn format_command(self, device: &str) -> (&'static str, Vec<String>) {
        let (program, flags): (&'static str, &[&str]) = match self {
            Filesystem::Ext4 => ("mkfs.ext4", &["-F"]),
            Filesystem::Btrfs => ("mkfs.btrfs", &["-f"]),
            Filesystem::Xfs => ("mkfs.xfs", &["-f"]),
            Filesystem::F2fs => ("mkfs.f2fs", &["-f"]),
            Filesystem::Vfat => ("mkfs.fat", &["-F32"]),
        };
        let mut args: Vec<String> = flags.iter().map(|s| s.to_string()).collect();
        args.push(device.to_string());
        (program, args)
    }
}

/// Which Linux kernel package to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Kernel {
    Linux,
    LinuxLts,
    LinuxZen,
    LinuxHardened,
}

impl Kernel {
    /// The `pacstrap` package name for this variant.
    pub fn package_name(self) -> &'static str {
        match self {
            Kernel::Linux => "linux",
            Kernel::LinuxLts => "linux-lts",
            Kernel::LinuxZen => "linux-zen",
            Kernel::LinuxHardened => "linux-hardened",
        }
    }

    /// Human-readable label shown to the user.
    pub fn display_name(self) -> &'static str {
        match self {
            Kernel::Linux => "Linux stable",
            Kernel::LinuxLts => "Linux LTS (long-term support)",
            Kernel::LinuxZen => "Linux Zen (performance-optimized)",
            Kernel::LinuxHardened => "Linux Hardened (security-focused)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
pub enum Bootloader {
    #[default]
    #[serde(rename = "systemd-bootctl")]
    #[strum(serialize = "systemd-bootctl")]
    SystemdBoot,
    #[serde(rename = "grub-install")]
    #[strum(serialize = "grub-install")]
    Grub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AudioServer {
    Pipewire,
    Pulseaudio,
}

impl AudioServer {
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            AudioServer::Pipewire => &[
                "pipewire",
                "pipewire-alsa",
                "pipewire-jack",
                "pipewire-pulse",
                "gst-plugin-pipewire",
                "libpulse",
                "wireplumber",
            ],
            AudioServer::Pulseaudio => &["pulseaudio"],
        }
    }
}

// ── Structured values ─────────────────────────────────────────────────────────

/// A mirror region and the servers it resolves to. Pre-seeded documents may
/// give just the region name (`"mirror-region": "Sweden"`); its servers are
/// looked up by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RegionSeed")]
pub struct MirrorRegion {
    pub name: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionSeed {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        mirrors: Vec<String>,
    },
}

impl From<RegionSeed> for MirrorRegion {
    fn from(seed: RegionSeed) -> Self {
        match seed {
            RegionSeed::Name(name) => MirrorRegion { name, mirrors: vec![] },
            RegionSeed::Full { name, mirrors } => MirrorRegion { name, mirrors },
        }
    }
}

impl MirrorRegion {
    /// Renders the region in `/etc/pacman.d/mirrorlist` format.
    pub fn mirrorlist(&self) -> String {
        let mut out = format!("## {}\n", self.name);
        for url in &self.mirrors {
            out.push_str(&format!("Server = {}\n", url));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encryption {
    None,
    Luks {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        password: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Static or DHCP configuration for one interface via systemd-networkd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub nic: String,
    #[serde(default)]
    pub dhcp: bool,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
}

impl InterfaceConfig {
    /// Contents of `/etc/systemd/network/10-<nic>.network`.
    pub fn network_unit(&self) -> String {
        let mut out = format!("[Match]\nName={}\n\n[Network]\n", self.nic);
        if self.dhcp {
            out.push_str("DHCP=yes\n");
        } else {
            if let Some(ref ip) = self.ip {
                out.push_str(&format!("Address={}\n", ip));
            }
            if let Some(ref gw) = self.gateway {
                out.push_str(&format!("Gateway={}\n", gw));
            }
            for dns in &self.dns {
                out.push_str(&format!("DNS={}\n", dns));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkConfig {
    CopyIso,
    NetworkManager,
    Interface(InterfaceConfig),
    Unconfigured,
}

// ── Disks ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Partition {
    pub path: String,
    #[serde(default)]
    pub size: String,
    /// Filesystem reported by `lsblk` (may be one we cannot create, e.g. `crypto_LUKS`).
    #[serde(default)]
    pub detected_filesystem: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub target_mountpoint: Option<String>,
    #[serde(default)]
    pub filesystem: Option<Filesystem>,
    #[serde(default)]
    pub allow_formatting: bool,
}

impl Partition {
    pub fn new(path: impl Into<String>, size: impl Into<String>, fstype: Option<String>) -> Self {
        let fstype = fstype.filter(|s| !s.is_empty());
        let filesystem = fstype.as_deref().and_then(|s| s.parse().ok());
        let encrypted = fstype.as_deref() == Some("crypto_LUKS");
        Partition {
            path: path.into(),
            size: size.into(),
            detected_filesystem: fstype,
            encrypted,
            target_mountpoint: None,
            filesystem,
            allow_formatting: false,
        }
    }

    pub fn is_luks(&self) -> bool {
        self.detected_filesystem.as_deref() == Some("crypto_LUKS")
    }

    /// Whether the partition can be offered for mount-point assignment.
    pub fn filesystem_supported(&self) -> bool {
        self.filesystem.is_some() || self.is_luks()
    }

    /// Marked for formatting with everything the formatter needs.
    pub fn safe_to_format(&self) -> bool {
        self.allow_formatting && self.target_mountpoint.is_some() && self.filesystem.is_some()
    }

    /// One-line label shown in the partition selector.
    pub fn display(&self) -> String {
        let fs = self.detected_filesystem.as_deref().unwrap_or("unformatted");
        match self.target_mountpoint {
            Some(ref mp) => format!("{:<16} {:>8}  {:<12} → {}", self.path, self.size, fs, mp),
            None => format!("{:<16} {:>8}  {}", self.path, self.size, fs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Harddrive {
    pub path: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub model: String,
    /// `None` until the wipe-or-keep disposition has been decided.
    #[serde(default)]
    pub keep_partitions: Option<bool>,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

impl Harddrive {
    pub fn has_partitions(&self) -> bool {
        !self.partitions.is_empty()
    }

    pub fn find_partition(&self, mountpoint: &str) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.target_mountpoint.as_deref() == Some(mountpoint))
    }

    pub fn find_partition_mut(&mut self, mountpoint: &str) -> Option<&mut Partition> {
        self.partitions
            .iter_mut()
            .find(|p| p.target_mountpoint.as_deref() == Some(mountpoint))
    }

    /// One-line label shown in the disk selector.
    pub fn display(&self) -> String {
        let model = if self.model.is_empty() { "-" } else { self.model.as_str() };
        format!("{:<12}  {:>8}   {}", self.path, self.size, model)
    }
}

// ── Configuration record ──────────────────────────────────────────────────────

/// Every answer the guided installer collects. `None` means "not decided yet";
/// the builder only asks for fields that are still `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub keyboard_language: Option<String>,
    pub mirror_region: Option<MirrorRegion>,
    pub sys_language: Option<String>,
    pub sys_encoding: Option<String>,
    pub harddrive: Option<Harddrive>,
    pub target_mount: Option<String>,
    pub filesystem: Option<Filesystem>,
    pub encryption: Option<Encryption>,
    pub bootloader: Option<Bootloader>,
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,
    pub users: Option<Vec<User>>,
    pub superusers: Option<Vec<User>>,
    pub profile: Option<Profile>,
    pub audio: Option<AudioServer>,
    pub kernels: Option<Vec<Kernel>>,
    pub packages: Option<Vec<String>>,
    pub nic: Option<NetworkConfig>,
    pub timezone: Option<String>,
    pub ntp: Option<bool>,
    pub aur_helper: Option<String>,
    pub aur_packages: Vec<String>,
    pub custom_commands: Vec<String>,
    pub services: Vec<String>,
    pub advanced: bool,
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, InstallerError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// `<language>.<encoding>`, falling back to the defaults.
    pub fn locale(&self) -> String {
        format!(
            "{}.{}",
            self.sys_language.as_deref().unwrap_or(DEFAULT_LANGUAGE),
            self.sys_encoding.as_deref().unwrap_or(DEFAULT_ENCODING)
        )
    }

    /// Where the new system gets mounted during installation.
    pub fn mount_point(&self) -> &str {
        self.target_mount.as_deref().unwrap_or(DEFAULT_MOUNT_POINT)
    }

    pub fn encryption_password(&self) -> Option<&str> {
        match self.encryption {
            Some(Encryption::Luks { ref password }) if !password.is_empty() => Some(password.as_str()),
            _ => None,
        }
    }

    pub fn superuser_names(&self) -> Vec<&str> {
        self.superusers
            .iter()
            .flatten()
            .map(|u| u.username.as_str())
            .collect()
    }

    /// Copy with every secret stripped, suitable for the support log.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.root_password = None;
        if let Some(Encryption::Luks { ref mut password }) = copy.encryption {
            password.clear();
        }
        for user in copy.users.iter_mut().chain(copy.superusers.iter_mut()).flatten() {
            user.password.clear();
        }
        copy
    }

    /// Pretty JSON with keys sorted at every level.
    pub fn to_sorted_json(&self) -> Result<String, InstallerError> {
        // serde_json::Map is a BTreeMap unless `preserve_order` is enabled.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Writes the redacted configuration to `<dir>/user_configuration.json`.
    pub fn save_log(&self, dir: &Path) -> Result<PathBuf, InstallerError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_LOG_FILE);
        fs::write(&path, self.redacted().to_sorted_json()?)?;
        Ok(path)
    }

    /// Consistency checks run once every question has been answered.
    pub fn validate(&self, uefi: bool) -> Result<(), InstallerError> {
        if self.keyboard_language.as_deref().map_or(true, str::is_empty) {
            return Err(InstallerError::invalid("keyboard layout must be set"));
        }
        if self.mirror_region.is_none() {
            return Err(InstallerError::invalid("mirror region must be set"));
        }

        match self.hostname {
            Some(ref h) => validate_hostname(h).map_err(InstallerError::invalid)?,
            None => return Err(InstallerError::invalid("hostname must be set")),
        }

        match self.harddrive {
            Some(ref disk) => validate_disk(disk, self.filesystem, uefi)?,
            None if self.target_mount.is_none() => {
                return Err(InstallerError::invalid(
                    "either a disk or an already-mounted target is required",
                ))
            }
            None => {}
        }

        if let Some(Encryption::Luks { ref password }) = self.encryption {
            if password.is_empty() {
                return Err(InstallerError::invalid("encryption password is empty"));
            }
        }

        let has_root_password = self.root_password.as_deref().map_or(false, |p| !p.is_empty());
        if !has_root_password && self.superuser_names().is_empty() {
            return Err(InstallerError::invalid(
                "without a root password at least one superuser is required",
            ));
        }
        for user in self.users.iter().chain(self.superusers.iter()).flatten() {
            validate_username(&user.username).map_err(InstallerError::invalid)?;
            if user.password.is_empty() {
                return Err(InstallerError::invalid(format!(
                    "user '{}' has no password",
                    user.username
                )));
            }
        }

        if self.kernels.as_ref().map_or(true, Vec::is_empty) {
            return Err(InstallerError::invalid("at least one kernel is required"));
        }

        if self.aur_helper.is_some() && self.superuser_names().is_empty() {
            return Err(InstallerError::invalid(
                "an AUR helper is built as a superuser, but none is configured",
            ));
        }

        Ok(())
    }
}

fn validate_disk(
    disk: &Harddrive,
    filesystem: Option<Filesystem>,
    uefi: bool,
) -> Result<(), InstallerError> {
    match disk.keep_partitions {
        None => Err(InstallerError::invalid(format!(
            "no partitioning decision for {}",
            disk.path
        ))),
        Some(false) if filesystem.is_none() => Err(InstallerError::invalid(format!(
            "wiping {} requires a root filesystem",
            disk.path
        ))),
        Some(false) => Ok(()),
        Some(true) => {
            if let Some(p) = disk
                .partitions
                .iter()
                .find(|p| p.allow_formatting && !p.safe_to_format())
            {
                return Err(InstallerError::invalid(format!(
                    "{} is marked for formatting without a mount point and filesystem",
                    p.path
                )));
            }
            if disk.find_partition("/").is_none() {
                return Err(InstallerError::invalid("no partition is mounted at /"));
            }
            if uefi && disk.find_partition("/boot").is_none() {
                return Err(InstallerError::invalid(
                    "UEFI systems need a partition mounted at /boot",
                ));
            }
            Ok(())
        }
    }
}

/// RFC 1123 label: 1–63 chars, alphanumeric or '-', no leading/trailing '-'.
pub fn validate_hostname(hostname: &str) -> Result<(), String> {
    if hostname.is_empty() || hostname.len() > 63 {
        return Err("Hostname must be 1-63 characters long".to_string());
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err("Hostname cannot start or end with '-'".to_string());
    }
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("Hostname can only contain letters, numbers, and '-'".to_string());
    }
    Ok(())
}

/// Same rules `useradd` applies by default.
pub fn validate_username(username: &str) -> Result<(), String> {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return Err("Username must not be empty".to_string());
    };
    if username.len() > 32 {
        return Err("Username must be at most 32 characters long".to_string());
    }
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err("Username must start with a lowercase letter or '_'".to_string());
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err("Username can only contain a-z, 0-9, '_' and '-'".to_string());
    }
    Ok(())
}

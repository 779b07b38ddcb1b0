//! Scripted prompter and in-memory collaborators for unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    rc::Rc,
};

use crate::{
    config::{Bootloader, Filesystem, Harddrive, InterfaceConfig, Kernel, MirrorRegion, Partition},
    error::InstallerError,
    host::{Console, DiskManager, Host, PackageIndex, ProfileHooks, SystemProbe},
    lsblk,
    profiles::Profile,
    prompt::Prompt,
    target::{BootContext, InstallTarget},
};

// ── Journal ───────────────────────────────────────────────────────────────────

/// Shared, ordered record of every call made to the fakes.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.borrow().iter().any(|e| e == entry)
    }

    /// Index of the first entry equal to `head` or made of `head` followed
    /// by more words. `unmount /mnt` does not match `unmount /mnt/boot`.
    pub fn position(&self, head: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| {
            e.strip_prefix(head)
                .map_or(false, |rest| rest.is_empty() || rest.starts_with(' '))
        })
    }
}

// ── Scripted prompter ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Answer {
    Text(&'static str),
    Secret(&'static str),
    Index(usize),
    Indices(Vec<usize>),
    Bool(bool),
}

/// Replays canned answers in order; panics when a question gets the wrong
/// kind of answer or the script runs out.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: RefCell<VecDeque<Answer>>,
    asked: Cell<usize>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<Answer>) -> Self {
        ScriptedPrompt {
            answers: RefCell::new(answers.into()),
            ..Default::default()
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    fn next(&self, prompt: &str) -> Answer {
        self.asked.set(self.asked.get() + 1);
        self.questions.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("script exhausted at '{}'", prompt))
    }
}

impl Prompt for ScriptedPrompt {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, InstallerError> {
        match self.next(prompt) {
            Answer::Text("") => Ok(default.unwrap_or_default().to_string()),
            Answer::Text(s) => Ok(s.trim().to_string()),
            other => panic!("'{}' expected text, script has {:?}", prompt, other),
        }
    }

    fn password(&self, prompt: &str, _confirm: bool) -> Result<String, InstallerError> {
        match self.next(prompt) {
            Answer::Secret(s) => Ok(s.to_string()),
            other => panic!("'{}' expected a secret, script has {:?}", prompt, other),
        }
    }

    fn select(&self, prompt: &str, items: &[String], _: usize) -> Result<usize, InstallerError> {
        match self.next(prompt) {
            Answer::Index(i) => {
                assert!(i < items.len(), "'{}' has no item {}", prompt, i);
                Ok(i)
            }
            other => panic!("'{}' expected an index, script has {:?}", prompt, other),
        }
    }

    fn multi_select(
        &self,
        prompt: &str,
        _: &[String],
        _: &[bool],
    ) -> Result<Vec<usize>, InstallerError> {
        match self.next(prompt) {
            Answer::Indices(v) => Ok(v),
            other => panic!("'{}' expected indices, script has {:?}", prompt, other),
        }
    }

    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool, InstallerError> {
        match self.next(prompt) {
            Answer::Bool(b) => Ok(b),
            other => panic!("'{}' expected yes/no, script has {:?}", prompt, other),
        }
    }
}

// ── Fake collaborators ────────────────────────────────────────────────────────

pub struct FakeConsole {
    pub journal: Journal,
    pub layouts: Vec<&'static str>,
}

impl Console for FakeConsole {
    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError> {
        if self.layouts.contains(&layout) {
            self.journal.record(format!("loadkeys {}", layout));
            Ok(())
        } else {
            Err(InstallerError::UnsupportedLayout(layout.to_string()))
        }
    }
}

#[derive(Default)]
pub struct FakeDisks {
    pub journal: Journal,
    pub disks: Vec<Harddrive>,
    /// What `detect_inner_filesystem` finds behind the right secret.
    pub inner: Option<(&'static str, Filesystem)>,
}

impl FakeDisks {
    pub fn calls(&self) -> Vec<String> {
        self.journal.entries()
    }
}

impl DiskManager for FakeDisks {
    fn all_disks(&self) -> Result<Vec<Harddrive>, InstallerError> {
        Ok(self.disks.clone())
    }

    fn detect_inner_filesystem(&self, partition: &Partition, secret: &str) -> Option<Filesystem> {
        self.journal.record(format!("detect_inner_filesystem {}", partition.path));
        match self.inner {
            Some((expected, fs)) if expected == secret => Some(fs),
            _ => None,
        }
    }

    fn partition_entire_disk(
        &self,
        disk: &Harddrive,
        root_filesystem: Filesystem,
        uefi: bool,
    ) -> Result<Vec<Partition>, InstallerError> {
        self.journal.record(format!(
            "partition_entire_disk {} {} {}",
            disk.path,
            root_filesystem,
            if uefi { "gpt" } else { "msdos" }
        ));
        let mut boot = Partition::new(lsblk::part_path(&disk.path, 1), "512M", None);
        boot.filesystem = Some(Filesystem::Vfat);
        boot.target_mountpoint = Some("/boot".into());
        boot.allow_formatting = true;
        let mut root = Partition::new(lsblk::part_path(&disk.path, 2), "", None);
        root.filesystem = Some(root_filesystem);
        root.target_mountpoint = Some("/".into());
        root.allow_formatting = true;
        Ok(vec![boot, root])
    }

    fn format(&self, device: &str, filesystem: Filesystem) -> Result<(), InstallerError> {
        self.journal.record(format!("format {} {}", device, filesystem));
        Ok(())
    }

    fn luks_format(&self, device: &str, _secret: &str) -> Result<(), InstallerError> {
        self.journal.record(format!("luks_format {}", device));
        Ok(())
    }

    fn luks_open(&self, device: &str, name: &str, _secret: &str) -> Result<String, InstallerError> {
        self.journal.record(format!("luks_open {} {}", device, name));
        Ok(format!("/dev/mapper/{}", name))
    }

    fn luks_close(&self, name: &str) -> Result<(), InstallerError> {
        self.journal.record(format!("luks_close {}", name));
        Ok(())
    }

    fn mount(&self, device: &str, target: &str) -> Result<(), InstallerError> {
        self.journal.record(format!("mount {} {}", device, target));
        Ok(())
    }

    fn unmount(&self, target: &str) -> Result<(), InstallerError> {
        self.journal.record(format!("unmount {}", target));
        Ok(())
    }

    fn mounted_source(&self, _target: &str) -> Option<String> {
        Some("/dev/vdb1".to_string())
    }

    fn layout_report(&self) -> String {
        "NAME FSTYPE\n/dev/sda".to_string()
    }
}

pub struct FakePackages {
    pub journal: Journal,
    pub regions: BTreeMap<String, Vec<String>>,
    pub known: Vec<&'static str>,
    pub reachable: bool,
    pub sync_status: i32,
}

impl PackageIndex for FakePackages {
    fn mirrors_reachable(&self) -> bool {
        self.reachable
    }

    fn mirror_regions(&self) -> Result<BTreeMap<String, Vec<String>>, InstallerError> {
        Ok(self.regions.clone())
    }

    fn validate_packages(&self, packages: &[String]) -> Result<(), InstallerError> {
        let unknown: Vec<String> = packages
            .iter()
            .filter(|p| !self.known.contains(&p.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::UnknownPackages(unknown))
        }
    }

    fn use_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError> {
        self.journal.record(format!("use_mirrors {}", region.name));
        Ok(())
    }

    fn sync_databases(&self) -> i32 {
        self.journal.record("sync_databases");
        self.sync_status
    }
}

pub struct FakeProfiles {
    pub journal: Journal,
    pub prep_ok: bool,
    pub post_ok: bool,
}

impl ProfileHooks for FakeProfiles {
    fn has_prep(&self, profile: Profile) -> bool {
        profile.is_desktop()
    }

    fn prepare(&self, profile: Profile) -> bool {
        self.journal.record(format!("prepare {}", profile));
        self.prep_ok
    }

    fn has_post_install(&self, profile: Profile) -> bool {
        profile.service().is_some()
    }

    fn post_install(&self, profile: Profile, _target: &dyn InstallTarget) -> bool {
        self.journal.record(format!("post_install {}", profile));
        self.post_ok
    }
}

pub struct FakeSystem {
    pub uefi: bool,
    pub nics: Vec<String>,
    pub timezones: Vec<&'static str>,
    /// Successive `service_state` answers; the last one repeats.
    pub states: RefCell<VecDeque<String>>,
}

impl SystemProbe for FakeSystem {
    fn has_uefi(&self) -> bool {
        self.uefi
    }

    fn network_interfaces(&self) -> Vec<String> {
        self.nics.clone()
    }

    fn timezone_exists(&self, timezone: &str) -> bool {
        self.timezones.contains(&timezone)
    }

    fn service_state(&self, _unit: &str) -> String {
        let mut states = self.states.borrow_mut();
        if states.len() > 1 {
            states.pop_front().unwrap_or_default()
        } else {
            states.front().cloned().unwrap_or_else(|| "inactive".to_string())
        }
    }
}

pub fn sample_regions() -> BTreeMap<String, Vec<String>> {
    let mut regions = BTreeMap::new();
    regions.insert(
        "Sweden".to_string(),
        vec!["https://ftp.lysator.liu.se/pub/archlinux/$repo/os/$arch".to_string()],
    );
    regions.insert(
        "United States".to_string(),
        vec!["https://mirrors.kernel.org/archlinux/$repo/os/$arch".to_string()],
    );
    regions
}

pub fn blank_disk(path: &str) -> Harddrive {
    Harddrive {
        path: path.to_string(),
        size: "20G".to_string(),
        model: "QEMU HARDDISK".to_string(),
        keep_partitions: None,
        partitions: vec![],
    }
}

/// Disk with an ESP, an ext4 root and a LUKS volume.
pub fn partitioned_disk(path: &str) -> Harddrive {
    Harddrive {
        partitions: vec![
            Partition::new(lsblk::part_path(path, 1), "512M", Some("vfat".into())),
            Partition::new(lsblk::part_path(path, 2), "15G", Some("ext4".into())),
            Partition::new(lsblk::part_path(path, 3), "4G", Some("crypto_LUKS".into())),
        ],
        ..blank_disk(path)
    }
}

/// UEFI host with one blank disk and every collaborator reporting to `journal`.
pub fn fake_host(journal: &Journal) -> Host {
    Host {
        console: Box::new(FakeConsole {
            journal: journal.clone(),
            layouts: vec!["us", "sv-latin1", "de"],
        }),
        disks: Box::new(FakeDisks {
            journal: journal.clone(),
            disks: vec![blank_disk("/dev/sda")],
            inner: None,
        }),
        packages: Box::new(FakePackages {
            journal: journal.clone(),
            regions: sample_regions(),
            known: vec!["firefox", "vim", "git", "htop"],
            reachable: true,
            sync_status: 0,
        }),
        profiles: Box::new(FakeProfiles {
            journal: journal.clone(),
            prep_ok: true,
            post_ok: true,
        }),
        system: Box::new(FakeSystem {
            uefi: true,
            nics: vec!["enp1s0".to_string()],
            timezones: vec!["UTC", "Europe/Stockholm"],
            states: RefCell::new(VecDeque::new()),
        }),
    }
}

// ── Recording target ──────────────────────────────────────────────────────────

/// Install target that records every call; `fail` names a method that
/// returns an error, `chroot_status` is returned by every `arch_chroot`.
pub struct RecordingTarget {
    pub journal: Journal,
    pub fail: Option<&'static str>,
    pub chroot_status: i32,
}

impl RecordingTarget {
    pub fn new(journal: &Journal) -> Self {
        RecordingTarget {
            journal: journal.clone(),
            fail: None,
            chroot_status: 0,
        }
    }

    fn call(&self, method: &'static str, detail: String) -> Result<(), InstallerError> {
        let entry = if detail.is_empty() {
            method.to_string()
        } else {
            format!("{} {}", method, detail)
        };
        self.journal.record(entry);
        if self.fail == Some(method) {
            return Err(InstallerError::CommandFailed(method.to_string(), 1));
        }
        Ok(())
    }
}

impl InstallTarget for RecordingTarget {
    fn root(&self) -> &str {
        "/mnt"
    }

    fn minimal_installation(&self, kernels: &[Kernel]) -> Result<(), InstallerError> {
        let names: Vec<&str> = kernels.iter().map(|k| k.package_name()).collect();
        self.call("minimal_installation", names.join(" "))
    }

    fn set_locale(&self, language: &str, encoding: &str) -> Result<(), InstallerError> {
        self.call("set_locale", format!("{} {}", language, encoding))
    }

    fn set_hostname(&self, hostname: &str) -> Result<(), InstallerError> {
        self.call("set_hostname", hostname.to_string())
    }

    fn set_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError> {
        self.call("set_mirrors", region.name.clone())
    }

    fn add_bootloader(&self, bootloader: Bootloader, boot: &BootContext)
        -> Result<(), InstallerError> {
        self.call("add_bootloader", format!("{} {}", bootloader, boot.root_device))
    }

    fn add_packages(&self, packages: &[String]) -> Result<(), InstallerError> {
        self.call("add_packages", packages.join(" "))
    }

    fn enable_services(&self, services: &[String]) -> Result<(), InstallerError> {
        self.call("enable_services", services.join(" "))
    }

    fn copy_iso_network_config(&self) -> Result<(), InstallerError> {
        self.call("copy_iso_network_config", String::new())
    }

    fn configure_nic(&self, nic: &InterfaceConfig) -> Result<(), InstallerError> {
        self.call("configure_nic", nic.nic.clone())
    }

    fn user_create(&self, username: &str, _password: &str) -> Result<(), InstallerError> {
        self.call("user_create", username.to_string())
    }

    fn grant_sudo(&self, username: &str) -> Result<(), InstallerError> {
        self.call("grant_sudo", username.to_string())
    }

    fn set_password(&self, username: &str, _password: &str) -> Result<(), InstallerError> {
        self.call("set_password", username.to_string())
    }

    fn set_timezone(&self, timezone: &str) -> Result<(), InstallerError> {
        self.call("set_timezone", timezone.to_string())
    }

    fn activate_ntp(&self) -> Result<(), InstallerError> {
        self.call("activate_ntp", String::new())
    }

    fn set_keyboard_layout(&self, layout: &str) -> Result<(), InstallerError> {
        self.call("set_keyboard_layout", layout.to_string())
    }

    fn replace_in_file(&self, path: &str, _before: &str, _after: &str)
        -> Result<(), InstallerError> {
        self.call("replace_in_file", path.to_string())
    }

    fn arch_chroot(&self, command: &str, runas: Option<&str>) -> Result<i32, InstallerError> {
        let detail = match runas {
            Some(user) => format!("[{}] {}", user, command),
            None => command.to_string(),
        };
        self.call("arch_chroot", detail)?;
        Ok(self.chroot_status)
    }

    fn drop_to_shell(&self) -> Result<(), InstallerError> {
        self.call("drop_to_shell", String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_matches_whole_words() {
        let journal = Journal::default();
        journal.record("unmount /mnt/boot");
        journal.record("unmount /mnt");
        journal.record("add_packages vim git");
        assert_eq!(journal.position("unmount /mnt"), Some(1));
        assert_eq!(journal.position("unmount"), Some(0));
        assert_eq!(journal.position("add_packages vim"), Some(2));
        assert_eq!(journal.position("add_packages vi"), None);
    }
}

use std::{cell::RefCell, collections::BTreeMap};

use tracing::{debug, info};

use crate::{cmd, config::MirrorRegion, error::InstallerError, host::PackageIndex};

const MIRRORLIST_URL: &str =
    "https://archlinux.org/mirrorlist/?country=all&protocol=https&use_mirror_status=on";
const REACHABILITY_URL: &str = "https://archlinux.org/";
const LIVE_MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";

/// Package index backed by the live medium's `pacman` and the upstream
/// mirror list generator.
pub struct LivePackages {
    mirrorlist_url: String,
    mirrorlist_path: String,
    regions: RefCell<Option<BTreeMap<String, Vec<String>>>>,
}

impl Default for LivePackages {
    fn default() -> Self {
        LivePackages {
            mirrorlist_url: MIRRORLIST_URL.to_string(),
            mirrorlist_path: LIVE_MIRRORLIST.to_string(),
            regions: RefCell::new(None),
        }
    }
}

impl LivePackages {
    fn package_exists(name: &str) -> bool {
        cmd::run_capture("pacman", &["-Si", name]).is_ok()
            || cmd::run_capture("pacman", &["-Sg", name]).is_ok()
    }
}

impl PackageIndex for LivePackages {
    fn mirrors_reachable(&self) -> bool {
        crate::is_dry_run()
            || cmd::run_capture(
                "curl",
                &["--silent", "--head", "--max-time", "10", REACHABILITY_URL],
            )
            .is_ok()
    }

    fn mirror_regions(&self) -> Result<BTreeMap<String, Vec<String>>, InstallerError> {
        if let Some(ref cached) = *self.regions.borrow() {
            return Ok(cached.clone());
        }
        let body = cmd::run_capture(
            "curl",
            &["--silent", "--fail", "--max-time", "30", &self.mirrorlist_url],
        )?;
        let regions = parse_mirrorlist(&body);
        debug!(count = regions.len(), "mirror regions loaded");
        *self.regions.borrow_mut() = Some(regions.clone());
        Ok(regions)
    }

    fn validate_packages(&self, packages: &[String]) -> Result<(), InstallerError> {
        let unknown: Vec<String> = packages
            .iter()
            .filter(|p| !Self::package_exists(p))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::UnknownPackages(unknown))
        }
    }

    fn use_mirrors(&self, region: &MirrorRegion) -> Result<(), InstallerError> {
        info!(region = %region.name, "using mirrors on the live medium");
        if crate::is_dry_run() {
            return Ok(());
        }
        std::fs::write(&self.mirrorlist_path, region.mirrorlist())?;
        Ok(())
    }

    fn sync_databases(&self) -> i32 {
        cmd::run_status("pacman", &["-Syy"]).unwrap_or(-1)
    }
}

/// Parses the upstream mirrorlist format:
///
/// ```text
/// ## Sweden
/// #Server = https://ftp.acc.umu.se/mirror/archlinux/$repo/os/$arch
/// ```
///
/// Headings without any server (the generator's banner) are dropped.
pub fn parse_mirrorlist(body: &str) -> BTreeMap<String, Vec<String>> {
    let mut regions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in body.lines().map(str::trim) {
        if let Some(heading) = line.strip_prefix("## ") {
            current = Some(heading.trim().to_string());
            continue;
        }
        let server = line
            .trim_start_matches('#')
            .trim()
            .strip_prefix("Server")
            .map(|rest| rest.trim_start().trim_start_matches('=').trim());
        if let (Some(region), Some(url)) = (current.as_ref(), server) {
            if !url.is_empty() {
                regions.entry(region.clone()).or_default().push(url.to_string());
            }
        }
    }

    regions
}

/// Case-insensitive lookup of a region name.
pub fn find_region(
    regions: &BTreeMap<String, Vec<String>>,
    name: &str,
) -> Option<MirrorRegion> {
    let wanted = name.trim();
    regions
        .iter()
        .find(|(region, _)| region.eq_ignore_ascii_case(wanted))
        .map(|(region, mirrors)| MirrorRegion {
            name: region.clone(),
            mirrors: mirrors.clone(),
        })
}

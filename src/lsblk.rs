use std::collections::HashMap;

use crate::{
    cmd,
    config::{Harddrive, Partition},
};

const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,MODEL,FSTYPE,PKNAME";

// ── Public API ────────────────────────────────────────────────────────────────

/// Returns all block devices of type `disk` with their partitions.
/// Falls back to an empty list if `lsblk` is unavailable.
pub fn list_disks() -> Vec<Harddrive> {
    match cmd::run_capture("lsblk", &["--pairs", "--paths", "--output", LSBLK_COLUMNS]) {
        Ok(output) => parse_devices(&output),
        Err(_) => vec![],
    }
}

/// Filesystem type `lsblk` reports for `device`, if any.
pub fn fstype(device: &str) -> Option<String> {
    cmd::run_capture("lsblk", &["--noheadings", "--nodeps", "--output", "FSTYPE", device])
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Partition device path for partition `n` of `disk`.
///
/// `/dev/sda` → `/dev/sda1`, `/dev/nvme0n1` → `/dev/nvme0n1p1`.
pub fn part_path(disk: &str, n: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, n)
    } else {
        format!("{}{}", disk, n)
    }
}

/// Builds disks from `lsblk --pairs --paths` output; partitions are attached
/// to their parent through `PKNAME`.
pub fn parse_devices(output: &str) -> Vec<Harddrive> {
    let rows: Vec<HashMap<String, String>> = output.lines().map(parse_pairs).collect();
    let field = |m: &HashMap<String, String>, k: &str| m.get(k).cloned().unwrap_or_default();

    let mut disks: Vec<Harddrive> = rows
        .iter()
        .filter(|m| m.get("TYPE").map(String::as_str) == Some("disk"))
        .map(|m| Harddrive {
            path: field(m, "NAME"),
            size: field(m, "SIZE"),
            model: field(m, "MODEL").trim().to_string(),
            keep_partitions: None,
            partitions: vec![],
        })
        .collect();

    for m in rows
        .iter()
        .filter(|m| m.get("TYPE").map(String::as_str) == Some("part"))
    {
        let parent = field(m, "PKNAME");
        if let Some(disk) = disks.iter_mut().find(|d| d.path == parent) {
            disk.partitions.push(Partition::new(
                field(m, "NAME"),
                field(m, "SIZE"),
                m.get("FSTYPE").cloned(),
            ));
        }
    }

    disks
}

// ── lsblk --pairs parser ──────────────────────────────────────────────────────
//
// Each line looks like:   NAME="/dev/sda1" SIZE="512M" TYPE="part" FSTYPE="vfat"

fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..]; // skip opening "

        let Some(close) = rest.find('"') else { break };
        let value = rest[..close].to_string();
        rest = &rest[close + 1..]; // skip closing "

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}

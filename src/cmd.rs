use std::{
    fs::OpenOptions,
    io::{self, Write},
    process::{Command, Stdio},
};

use dialoguer::Confirm;
use tracing::{debug, info};

use crate::{error::InstallerError, ui};

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        eprintln!("{}", err.trim());
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Logs the command and returns `true` when it must not actually run.
fn simulated(program: &str, args: &[&str]) -> bool {
    let line = command_line(program, args);
    if crate::is_dry_run() {
        info!(command = %line, "dry-run: skipped");
        true
    } else {
        debug!(command = %line, "running");
        false
    }
}

/// Maps a binary name to its Arch Linux package name.
fn package_for(program: &str) -> &str {
    match program {
        "mkfs.fat" | "mkfs.vfat" | "fsck.fat" | "fatlabel" => "dosfstools",
        "mkfs.ext4" | "mkfs.ext3" | "mkfs.ext2" | "e2fsck" | "resize2fs" | "tune2fs" => {
            "e2fsprogs"
        }
        "mkfs.btrfs" | "btrfs" => "btrfs-progs",
        "mkfs.xfs" | "xfs_repair" => "xfsprogs",
        "mkfs.f2fs" => "f2fs-tools",
        "mount" | "umount" | "lsblk" | "blkid" | "findmnt" | "wipefs" => "util-linux",
        "parted" => "parted",
        "cryptsetup" => "cryptsetup",
        "pacstrap" | "genfstab" | "arch-chroot" => "arch-install-scripts",
        "loadkeys" => "kbd",
        "curl" => "curl",
        other => other,
    }
}

/// When `program` is not found, asks the user if they want to install the
/// correct package via `pacman -S`. Returns `Ok(())` if installed successfully,
/// or `Err(CommandNotFound)` if the user declines.
fn offer_install(program: &str) -> Result<(), InstallerError> {
    let pkg = package_for(program);

    ui::print_warning(&format!("Command '{}' not found.", program));
    println!();

    if !Confirm::new()
        .with_prompt(format!("Install '{}' with pacman?", pkg))
        .default(true)
        .interact()?
    {
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }

    println!();
    let status = Command::new("pacman")
        .args(["-Sy", "--noconfirm", pkg])
        .status()
        .map_err(|e| not_found_or_io("pacman", e))?;

    if !status.success() {
        return Err(InstallerError::CommandFailed(
            "pacman".to_string(),
            status.code().unwrap_or(-1),
        ));
    }

    let available = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !available {
        ui::print_error(&format!(
            "'{}' still not found after install. Check the package name.",
            program
        ));
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }

    Ok(())
}

/// Runs `attempt`, and on a missing binary offers to install it and retries once.
fn with_install_retry<T>(
    program: &str,
    attempt: impl Fn() -> Result<T, InstallerError>,
) -> Result<T, InstallerError> {
    match attempt() {
        Err(InstallerError::CommandNotFound(_)) => {
            offer_install(program)?;
            attempt()
        }
        other => other,
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs a command silently, discarding all output and ignoring any error.
/// Use for cleanup operations where partial failure is acceptable (e.g. umount).
pub fn run_best_effort(program: &str, args: &[&str]) {
    if simulated(program, args) {
        return;
    }
    let _ = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Run a command that **takes over the terminal** (stdin/stdout/stderr inherited).
/// Use for interactive or chatty programs: `pacstrap`, `arch-chroot`.
pub fn run_interactive(program: &str, args: &[&str]) -> Result<(), InstallerError> {
    if simulated(program, args) {
        return Ok(());
    }
    with_install_retry(program, || {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| not_found_or_io(program, e))?;

        if !status.success() {
            return Err(InstallerError::CommandFailed(
                program.to_string(),
                status.code().unwrap_or(-1),
            ));
        }
        Ok(())
    })
}

/// Runs a command with inherited output and reports its exit code instead of
/// failing. Used by best-effort steps that only log the outcome.
pub fn run_status(program: &str, args: &[&str]) -> Result<i32, InstallerError> {
    if simulated(program, args) {
        return Ok(0);
    }
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| not_found_or_io(program, e))?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a command **silently** while displaying a spinner.
/// On success prints `done_msg` with a ✓.
/// On failure prints captured output and returns an error.
pub fn run_with_spinner(
    program: &str,
    args: &[&str],
    spin_msg: &str,
    done_msg: &str,
) -> Result<(), InstallerError> {
    if simulated(program, args) {
        ui::print_success(done_msg);
        return Ok(());
    }
    with_install_retry(program, || {
        let pb = ui::spinner(spin_msg);
        let result = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| not_found_or_io(program, e));
        pb.finish_and_clear();

        match result {
            Err(e) => Err(e),
            Ok(output) if !output.status.success() => {
                print_captured_output(&output.stdout, &output.stderr);
                Err(InstallerError::CommandFailed(
                    program.to_string(),
                    output.status.code().unwrap_or(-1),
                ))
            }
            Ok(_) => {
                ui::print_success(done_msg);
                Ok(())
            }
        }
    })
}

/// Runs a command with all output discarded; only the exit status matters.
pub fn run_quiet(program: &str, args: &[&str]) -> Result<(), InstallerError> {
    if simulated(program, args) {
        return Ok(());
    }
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| not_found_or_io(program, e))?;

    if !status.success() {
        return Err(InstallerError::CommandFailed(
            program.to_string(),
            status.code().unwrap_or(-1),
        ));
    }
    Ok(())
}

/// Runs a command feeding `input` on stdin, so secrets never show up in `ps`.
pub fn run_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), InstallerError> {
    if simulated(program, args) {
        return Ok(());
    }
    with_install_retry(program, || {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found_or_io(program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            print_captured_output(&output.stdout, &output.stderr);
            return Err(InstallerError::CommandFailed(
                program.to_string(),
                output.status.code().unwrap_or(-1),
            ));
        }
        Ok(())
    })
}

/// Run a command, capture its stdout, and return it as a `String`.
/// Read-only, so it also runs in dry-run mode.
pub fn run_capture(program: &str, args: &[&str]) -> Result<String, InstallerError> {
    debug!(command = %command_line(program, args), "capturing");
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| not_found_or_io(program, e))?;

    if !output.status.success() {
        return Err(InstallerError::CommandFailed(
            program.to_string(),
            output.status.code().unwrap_or(-1),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command and **append** its stdout to a file (equivalent to `>> path`).
pub fn run_append_to_file(
    program: &str,
    args: &[&str],
    file_path: &str,
) -> Result<(), InstallerError> {
    if simulated(program, args) {
        return Ok(());
    }
    with_install_retry(program, || {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(file_path)?;

        let status = Command::new(program)
            .args(args)
            .stdout(file)
            .stderr(Stdio::piped())
            .status()
            .map_err(|e| not_found_or_io(program, e))?;

        if !status.success() {
            return Err(InstallerError::CommandFailed(
                program.to_string(),
                status.code().unwrap_or(-1),
            ));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_binaries_to_packages() {
        assert_eq!(package_for("pacstrap"), "arch-install-scripts");
        assert_eq!(package_for("mkfs.f2fs"), "f2fs-tools");
        assert_eq!(package_for("cryptsetup"), "cryptsetup");
        assert_eq!(package_for("unknown-tool"), "unknown-tool");
    }

    #[test]
    fn capture_reports_missing_binary() {
        let err = run_capture("definitely-not-a-real-binary-xyz", &[]).unwrap_err();
        assert!(matches!(err, InstallerError::CommandNotFound(_)));
    }

    #[test]
    fn command_line_joins_arguments() {
        assert_eq!(command_line("mount", &["/dev/sda2", "/mnt"]), "mount /dev/sda2 /mnt");
    }
}

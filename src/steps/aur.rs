use tracing::{info, warn};

use super::best_effort;
use crate::{host::PackageIndex, target::InstallTarget, ui};

/// Builds `helper` from the AUR as `user`. Failures are logged, never fatal.
pub fn install_helper(helper: &str, user: &str, target: &dyn InstallTarget) {
    ui::print_info(&format!("Installing AUR helper {}…", helper));
    if let Err(e) = target.add_packages(&["git".to_string()]) {
        warn!(error = %e, "could not install git for the AUR helper");
    }

    let checkout = format!("/home/{}/{}", user, helper);
    let mut commands = vec![
        format!("git clone https://aur.archlinux.org/{}.git {}", helper, checkout),
        format!("cd {} && makepkg -si --noconfirm", checkout),
    ];
    if helper == "yay" {
        // Persist non-interactive defaults for later `yay -S` runs.
        commands.push(
            "/usr/bin/yay --save --nocleanmenu --nodiffmenu --noeditmenu --removemake".to_string(),
        );
    }
    for command in &commands {
        best_effort(target, command, Some(user));
    }
}

/// Installs each package with `helper` after refreshing the databases.
pub fn install_packages(
    helper: &str,
    user: &str,
    packages: &[String],
    index: &dyn PackageIndex,
    target: &dyn InstallTarget,
) {
    let status = index.sync_databases();
    if status != 0 {
        warn!(status, "could not sync package databases, skipping AUR packages");
        ui::print_warning(&format!("Could not sync mirrors (exit code {}).", status));
        return;
    }
    for package in packages {
        info!(%package, "installing AUR package");
        let command = format!("/usr/bin/{} -S --noconfirm {}", helper, package);
        if best_effort(target, &command, Some(user)) {
            ui::print_success(&format!("Installed {}.", package));
        }
    }
}

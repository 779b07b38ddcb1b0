use console::style;
use tracing::warn;

use super::best_effort;
use crate::{error::InstallerError, prompt::Prompt, target::InstallTarget, ui};

/// Runs the user's post-install commands inside the target, one by one.
pub fn run_custom_commands(commands: &[String], target: &dyn InstallTarget) {
    for command in commands {
        ui::print_info(&format!("Running: {}", command));
        best_effort(target, command, None);
    }
}

/// Offers an interactive shell inside the new system.
pub fn offer_shell(prompt: &dyn Prompt, target: &dyn InstallTarget) -> Result<(), InstallerError> {
    println!();
    ui::print_info("Post-installation tips: https://wiki.archlinux.org/title/Installation_guide#Post-installation");
    if !prompt.confirm(
        "Chroot into the new installation for post-installation configuration?",
        true,
    )? {
        ui::print_info(&format!("Enter manually any time:  arch-chroot {}", target.root()));
        return Ok(());
    }

    println!();
    println!(
        "  {}",
        style("Tip: type 'exit' or press Ctrl-D to leave the chroot.")
            .dim()
            .italic()
    );
    println!("{}", style("─".repeat(52)).dim());

    match target.drop_to_shell() {
        Ok(()) => ui::print_success("Exited chroot."),
        Err(e) => warn!(error = %e, "chroot shell ended with an error"),
    }
    Ok(())
}

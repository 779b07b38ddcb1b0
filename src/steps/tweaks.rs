use crate::{error::InstallerError, target::InstallTarget};

pub const PACMAN_CONF: &str = "/etc/pacman.conf";
pub const MAKEPKG_CONF: &str = "/etc/makepkg.conf";

/// A literal search-and-replace in a file of the installed system.
pub struct Tweak {
    pub path: &'static str,
    pub before: &'static str,
    pub after: &'static str,
}

/// Enables multilib, coloured output and parallel downloads in pacman,
/// and builds with every core in makepkg.
pub const TWEAKS: &[Tweak] = &[
    Tweak {
        path: PACMAN_CONF,
        before: "#[multilib]\n#Include = /etc/pacman.d/mirrorlist",
        after: "[multilib]\nInclude = /etc/pacman.d/mirrorlist",
    },
    Tweak {
        path: PACMAN_CONF,
        before: "#Color",
        after: "Color",
    },
    Tweak {
        path: PACMAN_CONF,
        before: "#ParallelDownloads = 5",
        after: "ParallelDownloads = 5",
    },
    Tweak {
        path: MAKEPKG_CONF,
        before: "#MAKEFLAGS=\"-j2\"",
        after: "MAKEFLAGS=\"-j$(nproc)\"",
    },
];

pub fn apply(target: &dyn InstallTarget) -> Result<(), InstallerError> {
    for tweak in TWEAKS {
        target.replace_in_file(tweak.path, tweak.before, tweak.after)?;
    }
    Ok(())
}

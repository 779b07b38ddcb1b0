//! Installation profiles: named bundles of packages plus optional
//! preparation and post-install hooks.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{info, warn};

use crate::{host::ProfileHooks, target::InstallTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Profile {
    /// Base system only.
    Minimal,
    /// Headless machine with SSH.
    Server,
    Gnome,
    Kde,
    Xfce,
    Sway,
    I3,
    Hyprland,
}

impl Profile {
    /// Desktop-class profiles get an audio server question.
    pub fn is_desktop(self) -> bool {
        !matches!(self, Profile::Minimal | Profile::Server)
    }

    pub fn description(self) -> &'static str {
        match self {
            Profile::Minimal => "no GUI, base system only",
            Profile::Server => "headless, OpenSSH enabled",
            Profile::Gnome => "GNOME desktop environment",
            Profile::Kde => "KDE Plasma desktop",
            Profile::Xfce => "lightweight traditional desktop",
            Profile::Sway => "i3-compatible Wayland compositor",
            Profile::I3 => "tiling window manager (X11)",
            Profile::Hyprland => "animated tiling Wayland compositor",
        }
    }

    /// Packages installed into the target for this profile.
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Profile::Minimal => &[],
            Profile::Server => &["openssh"],
            Profile::Gnome => &["gnome", "gnome-tweaks", "gdm", "networkmanager"],
            Profile::Kde => &["plasma-meta", "konsole", "dolphin", "sddm", "networkmanager"],
            Profile::Xfce => &[
                "xfce4",
                "xfce4-goodies",
                "lightdm",
                "lightdm-gtk-greeter",
                "networkmanager",
            ],
            Profile::Sway => &[
                "sway",
                "swaylock",
                "swayidle",
                "xdg-desktop-portal-wlr",
                "foot",
                "wofi",
                "sddm",
            ],
            Profile::I3 => &[
                "i3-wm",
                "i3status",
                "i3lock",
                "alacritty",
                "dmenu",
                "xorg-server",
                "lightdm",
                "lightdm-gtk-greeter",
            ],
            Profile::Hyprland => &[
                "hyprland",
                "xdg-desktop-portal-hyprland",
                "waybar",
                "kitty",
                "wofi",
                "sddm",
            ],
        }
    }

    /// Service enabled by the post-install hook.
    pub fn service(self) -> Option<&'static str> {
        match self {
            Profile::Minimal => None,
            Profile::Server => Some("sshd"),
            Profile::Gnome => Some("gdm"),
            Profile::Kde | Profile::Sway | Profile::Hyprland => Some("sddm"),
            Profile::Xfce | Profile::I3 => Some("lightdm"),
        }
    }
}

// ── Live hooks ────────────────────────────────────────────────────────────────

/// Preparation: desktop profiles need a DRM device to drive a display.
/// Post-install: enables the profile's display manager or daemon.
pub struct LiveProfiles;

impl ProfileHooks for LiveProfiles {
    fn has_prep(&self, profile: Profile) -> bool {
        profile.is_desktop()
    }

    fn prepare(&self, profile: Profile) -> bool {
        if crate::is_dry_run() {
            return true;
        }
        let has_gpu = std::fs::read_dir(Path::new("/sys/class/drm"))
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.file_name().to_string_lossy().starts_with("card"))
            })
            .unwrap_or(false);
        if !has_gpu {
            warn!(%profile, "no DRM display device found");
        }
        has_gpu
    }

    fn has_post_install(&self, profile: Profile) -> bool {
        profile.service().is_some()
    }

    fn post_install(&self, profile: Profile, target: &dyn InstallTarget) -> bool {
        let Some(service) = profile.service() else {
            return true;
        };
        match target.enable_services(&[service.to_string()]) {
            Ok(()) => {
                info!(%profile, service, "profile service enabled");
                true
            }
            Err(e) => {
                warn!(%profile, service, error = %e, "profile post-install failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn only_gui_profiles_are_desktop() {
        assert!(!Profile::Minimal.is_desktop());
        assert!(!Profile::Server.is_desktop());
        assert!(Profile::Gnome.is_desktop());
        assert!(Profile::Hyprland.is_desktop());
    }

    #[test]
    fn desktop_profiles_ship_their_display_manager() {
        for profile in Profile::iter().filter(|p| p.is_desktop()) {
            let service = profile.service().expect("desktop profile without a service");
            assert!(
                profile.packages().contains(&service),
                "{profile} does not install {service}"
            );
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("KDE".parse::<Profile>().unwrap(), Profile::Kde);
        assert_eq!(Profile::I3.to_string(), "i3");
    }
}

use std::net::IpAddr;

use tracing::{info, warn};

use super::GuidedBuilder;
use crate::{
    config::{Config, InterfaceConfig, NetworkConfig},
    error::InstallerError,
    ui,
};

const COPY_ISO: usize = 0;
const NETWORK_MANAGER: usize = 1;

impl GuidedBuilder<'_> {
    pub(super) fn select_network(&self, config: &mut Config) -> Result<(), InstallerError> {
        if config.nic.is_some() {
            return Ok(());
        }

        let nics = self.host.system.network_interfaces();
        let mut items = vec![
            "Copy the live medium's network configuration".to_string(),
            "Use NetworkManager".to_string(),
        ];
        items.extend(nics.iter().map(|nic| format!("Configure {} manually", nic)));
        items.push("Leave the network unconfigured".to_string());

        let choice = self.prompt.select("Network", &items, COPY_ISO)?;
        let nic = match choice {
            COPY_ISO => NetworkConfig::CopyIso,
            NETWORK_MANAGER => NetworkConfig::NetworkManager,
            i => match nics.get(i - 2) {
                Some(nic) => NetworkConfig::Interface(self.ask_interface(nic)?),
                None => {
                    warn!("network left unconfigured");
                    ui::print_warning(
                        "No network configuration was selected. The network stays unavailable until configured manually.",
                    );
                    NetworkConfig::Unconfigured
                }
            },
        };
        config.nic = Some(nic);
        Ok(())
    }

    fn ask_interface(&self, nic: &str) -> Result<InterfaceConfig, InstallerError> {
        if self.prompt.confirm(&format!("Use DHCP on {}?", nic), true)? {
            return Ok(InterfaceConfig {
                nic: nic.to_string(),
                dhcp: true,
                ip: None,
                gateway: None,
                dns: vec![],
            });
        }

        let ip = loop {
            let answer = self
                .prompt
                .input(&format!("IP address and prefix for {} (e.g. 192.168.1.10/24)", nic), None)?;
            match validate_cidr(&answer) {
                Ok(()) => break answer,
                Err(msg) => self.reject(&InstallerError::invalid(msg)),
            }
        };
        let gateway = loop {
            let answer = self.prompt.input("Gateway (blank for none)", None)?;
            if answer.is_empty() {
                break None;
            }
            match answer.parse::<IpAddr>() {
                Ok(_) => break Some(answer),
                Err(_) => self.reject(&InstallerError::invalid(format!(
                    "'{}' is not an IP address",
                    answer
                ))),
            }
        };
        let dns = loop {
            let answer = self.prompt.input("DNS servers (space separated, blank for none)", None)?;
            let servers: Vec<String> = answer.split_whitespace().map(str::to_string).collect();
            match servers.iter().find(|s| s.parse::<IpAddr>().is_err()) {
                Some(bad) => self.reject(&InstallerError::invalid(format!(
                    "'{}' is not an IP address",
                    bad
                ))),
                None => break servers,
            }
        };

        Ok(InterfaceConfig {
            nic: nic.to_string(),
            dhcp: false,
            ip: Some(ip),
            gateway,
            dns,
        })
    }

    /// The zone must exist in the zoneinfo database; blank skips. NTP is
    /// offered only once a timezone is set.
    pub(super) fn select_timezone(&self, config: &mut Config) -> Result<(), InstallerError> {
        while config.timezone.is_none() {
            let answer = self
                .prompt
                .input("Timezone (e.g. Europe/Stockholm, blank to skip)", None)?;
            if answer.is_empty() {
                break;
            }
            if self.host.system.timezone_exists(&answer) {
                info!(timezone = %answer, "timezone");
                config.timezone = Some(answer);
            } else {
                self.reject(&InstallerError::invalid(format!("unknown timezone '{}'", answer)));
            }
        }

        if config.timezone.is_some() && config.ntp.is_none() {
            let ntp = self
                .prompt
                .confirm("Use automatic time synchronization (NTP)?", true)?;
            if ntp {
                ui::print_info("Hardware clock setup may still be needed for NTP, see the Arch wiki.");
            }
            config.ntp = Some(ntp);
        }
        Ok(())
    }
}

/// `address/prefix` with a prefix that fits the address family.
fn validate_cidr(value: &str) -> Result<(), String> {
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| format!("'{}' needs a /prefix", value))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| format!("'{}' is not an IP address", addr))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    match prefix.parse::<u8>() {
        Ok(p) if p <= max => Ok(()),
        _ => Err(format!("'{}' is not a valid prefix length", prefix)),
    }
}

use std::fs;
use std::net::Ipv4Addr;

use anyhow::{Result, anyhow};
use tokio::runtime::Handle as RtHandle;

use crate::command::HostCommand;
use crate::constants::{
    FILE_ETC_LSB_RELEASE, FILE_ETC_OS_RELEASE, IFACE_ALIAS_SEPARATOR, IFACE_LOOPBACK,
};
use crate::netlink::NetlinkConnection;

/// Everything the configuration loop needs from the machine it runs on.
pub trait Host {
    /// Names of all network interfaces visible to the kernel.
    fn interfaces(&self) -> Result<Vec<String>>;

    /// The IPv4 address assigned to `interface` itself, ignoring aliases.
    fn ipv4_address(&self, interface: &str) -> Result<Option<Ipv4Addr>>;

    fn distro_codename(&self) -> Option<String>;

    fn run(&self, command: &HostCommand) -> Result<()>;
}

pub struct LinuxHost {
    rt: RtHandle,
    nl: NetlinkConnection,
}

impl LinuxHost {
    pub fn new(rt: RtHandle) -> Result<Self> {
        let nl = NetlinkConnection::new(&rt)?;
        Ok(Self { rt, nl })
    }
}

impl Host for LinuxHost {
    fn interfaces(&self) -> Result<Vec<String>> {
        let links = self.rt.block_on(self.nl.get_links())?;
        Ok(links.into_iter().map(|l| l.name).collect())
    }

    fn ipv4_address(&self, interface: &str) -> Result<Option<Ipv4Addr>> {
        self.rt.block_on(async {
            let link = self
                .nl
                .get_links()
                .await?
                .into_iter()
                .find(|l| l.name == interface)
                .ok_or_else(|| anyhow!("interface {} not found", interface))?;
            self.nl.ipv4_address(link.ifindex, interface).await
        })
    }

    fn distro_codename(&self) -> Option<String> {
        let os_release = fs::read_to_string(FILE_ETC_OS_RELEASE).ok();
        let lsb_release = fs::read_to_string(FILE_ETC_LSB_RELEASE).ok();
        codename_from_release_files(os_release.as_deref(), lsb_release.as_deref())
    }

    fn run(&self, command: &HostCommand) -> Result<()> {
        command.execute()
    }
}

/// Physical interfaces only: no loopback, no `eth0:1` style aliases.
pub fn is_configurable_interface(name: &str) -> bool {
    !name.is_empty() && name != IFACE_LOOPBACK && !name.contains(IFACE_ALIAS_SEPARATOR)
}

pub(crate) fn codename_from_release_files(
    os_release: Option<&str>,
    lsb_release: Option<&str>,
) -> Option<String> {
    os_release
        .and_then(|s| {
            release_value(s, "VERSION_CODENAME").or_else(|| release_value(s, "UBUNTU_CODENAME"))
        })
        .or_else(|| lsb_release.and_then(|s| release_value(s, "DISTRIB_CODENAME")))
}

// Parse a KEY=value line from a shell-style release file.
fn release_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k.trim() != key {
            return None;
        }
        let v = v.trim().trim_matches('"').trim_matches('\'');
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_is_configurable_interface() {
        assert_eq!(is_configurable_interface("eth0"), true);
        assert_eq!(is_configurable_interface("ens5"), true);
        assert_eq!(is_configurable_interface("lo"), false);
        assert_eq!(is_configurable_interface("eth0:0"), false);
        assert_eq!(is_configurable_interface(""), false);
    }

    #[test]
    fn test_codename_from_os_release() {
        let os_release = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nVERSION_CODENAME=jammy\nUBUNTU_CODENAME=jammy\n";
        assert_eq!(
            codename_from_release_files(Some(os_release), None),
            Some("jammy".to_string())
        );
    }

    #[test]
    fn test_codename_falls_back_to_lsb_release() {
        let os_release = "NAME=\"Ubuntu\"\nVERSION=\"12.04.5 LTS, Precise Pangolin\"\n";
        let lsb_release = "DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=12.04\nDISTRIB_CODENAME=precise\n";
        assert_eq!(
            codename_from_release_files(Some(os_release), Some(lsb_release)),
            Some("precise".to_string())
        );
        assert_eq!(
            codename_from_release_files(None, Some(lsb_release)),
            Some("precise".to_string())
        );
    }

    #[test]
    fn test_codename_missing() {
        assert_eq!(codename_from_release_files(None, None), None);
        assert_eq!(
            codename_from_release_files(Some("NAME=\"Amazon Linux\"\nVERSION_CODENAME=\n"), None),
            None
        );
    }
}

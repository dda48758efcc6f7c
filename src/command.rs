use std::fmt;
use std::net::Ipv4Addr;
use std::process::Command;

use anyhow::{Result, anyhow};
use log::debug;

use crate::constants::{PROGRAM_DHCLIENT, PROGRAM_IP, PROGRAM_IPTABLES};

/// An external command with its exact argument vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: ToString>(mut self, arg: S) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn dhclient(interface: &str) -> Self {
        Self::new(PROGRAM_DHCLIENT).arg(interface)
    }

    pub fn ip_rule_add_fwmark(mark: u32, table: u32) -> Self {
        Self::new(PROGRAM_IP)
            .args(["rule", "add", "fwmark"])
            .arg(mark)
            .arg("table")
            .arg(table)
    }

    pub fn ip_route_add_default(gateway: Ipv4Addr, interface: &str, table: u32) -> Self {
        Self::new(PROGRAM_IP)
            .args(["route", "add", "default", "via"])
            .arg(gateway)
            .arg("dev")
            .arg(interface)
            .arg("table")
            .arg(table)
    }

    /// `replace` rather than `add`, so an alias left by an earlier run is not an error.
    pub fn ip_addr_replace_alias(
        address: Ipv4Addr,
        prefix_len: u8,
        interface: &str,
        label: &str,
    ) -> Self {
        Self::new(PROGRAM_IP)
            .args(["addr", "replace"])
            .arg(format!("{}/{}", address, prefix_len))
            .arg("dev")
            .arg(interface)
            .arg("label")
            .arg(label)
    }

    /// Mark locally generated packets belonging to connections originally
    /// addressed to `address`, so the reply leaves through the policy table.
    pub fn iptables_mark_ctorigdst(address: Ipv4Addr, mark: u32) -> Self {
        Self::new(PROGRAM_IPTABLES)
            .args(["-t", "mangle", "-A", "OUTPUT", "-m", "conntrack", "--ctorigdst"])
            .arg(address)
            .args(["-j", "MARK", "--set-mark"])
            .arg(mark)
    }

    pub fn ip_route_del(route: &str) -> Self {
        Self::new(PROGRAM_IP).args(["route", "del"]).arg(route)
    }

    /// Run to completion. A nonzero exit or a signal is an error.
    pub fn execute(&self) -> Result<()> {
        debug!("Running {}", self);
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| anyhow!("unable to run {}: {}", self, e))?;
        match output.status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(anyhow!(
                "{} failed with exit code {}: {}",
                self,
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            None => Err(anyhow!("{} terminated by signal", self)),
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

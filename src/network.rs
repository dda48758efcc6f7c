//! Per-interface network configuration driven by instance metadata.
//!
//! Every interface the metadata declares gets its DHCP address (obtained here
//! if the interface has none yet), its secondary addresses as `<iface>:<n>`
//! aliases, and a fwmark policy route so replies to connections addressed to
//! any of its addresses leave through the same interface. Instances with
//! several interfaces in one subnet would otherwise answer everything out of
//! whichever interface owns the main table's default route.

use std::net::Ipv4Addr;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::command::HostCommand;
use crate::config::Config;
use crate::host::{Host, is_configurable_interface};
use crate::metadata::{InterfaceDescriptor, MetadataSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasReport {
    pub label: String,
    pub address: Ipv4Addr,
}

/// What was done to one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceReport {
    pub name: String,
    pub device_number: u32,
    pub primary: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// The interface had no address and was brought up with DHCP on this run.
    pub newly_configured: bool,
    pub aliases: Vec<AliasReport>,
}

pub fn configure_network<H, M>(
    host: &H,
    source: &M,
    config: &Config,
) -> Result<Vec<InterfaceReport>>
where
    H: Host,
    M: MetadataSource,
{
    let metadata = source
        .fetch()
        .context("unable to get instance metadata")?;
    let descriptors = metadata
        .interfaces()
        .context("unable to read network interfaces from instance metadata")?;
    check_interface_count(host, &descriptors)?;

    let codename = host.distro_codename();
    let offset = config.device_offset(codename.as_deref());
    if offset != 0 {
        info!(
            "Shifting device numbers by {} on {}",
            offset,
            codename.as_deref().unwrap_or_default()
        );
    }

    let mut reports = Vec::with_capacity(descriptors.len());
    for descriptor in &descriptors {
        let report = configure_interface(host, config, descriptor, offset)?;
        reports.push(report);
    }

    cleanup_routes(host, config);

    Ok(reports)
}

fn check_interface_count<H: Host>(host: &H, descriptors: &[InterfaceDescriptor]) -> Result<()> {
    let interfaces: Vec<String> = host
        .interfaces()
        .context("unable to list network interfaces")?
        .into_iter()
        .filter(|name| is_configurable_interface(name))
        .collect();
    info!(
        "Metadata declares {} interfaces, host has {}: {}",
        descriptors.len(),
        interfaces.len(),
        interfaces.join(", ")
    );
    if interfaces.len() != descriptors.len() {
        return Err(anyhow!(
            "interface count mismatch: metadata declares {} but host has {}",
            descriptors.len(),
            interfaces.len()
        ));
    }
    Ok(())
}

fn configure_interface<H: Host>(
    host: &H,
    config: &Config,
    descriptor: &InterfaceDescriptor,
    offset: u32,
) -> Result<InterfaceReport> {
    let name = config.interface_name(descriptor.device_number, offset);
    let mark = policy_mark(descriptor.device_number);
    info!(
        "Configuring {} for MAC {} (device number {})",
        name, descriptor.mac, descriptor.device_number
    );

    let (primary, newly_configured) = resolve_primary_address(host, &name)?;
    let gateway = infer_gateway(primary, config.gateway_host_octet);
    info!("{} has address {}, assuming gateway {}", name, primary, gateway);

    let secondaries = secondary_addresses(descriptor, primary)?;

    if newly_configured {
        install_policy_routing(host, &name, primary, gateway, mark)?;
    }

    let mut aliases = Vec::with_capacity(secondaries.len());
    for (index, address) in secondaries.into_iter().enumerate() {
        let label = config.alias_name(&name, index);
        info!("Adding {} to {}", address, label);
        run(
            host,
            &HostCommand::ip_addr_replace_alias(address, config.prefix_len, &name, &label),
        )?;
        run(host, &HostCommand::iptables_mark_ctorigdst(address, mark))?;
        aliases.push(AliasReport { label, address });
    }

    Ok(InterfaceReport {
        name,
        device_number: descriptor.device_number,
        primary,
        gateway,
        newly_configured,
        aliases,
    })
}

// Returns the interface address and whether DHCP had to be run to get it.
fn resolve_primary_address<H: Host>(host: &H, name: &str) -> Result<(Ipv4Addr, bool)> {
    if let Some(address) = host.ipv4_address(name)? {
        return Ok((address, false));
    }
    info!("{} has no address, running DHCP", name);
    run(host, &HostCommand::dhclient(name))?;
    let address = host
        .ipv4_address(name)?
        .ok_or_else(|| anyhow!("{} has no IPv4 address after DHCP", name))?;
    Ok((address, true))
}

fn install_policy_routing<H: Host>(
    host: &H,
    name: &str,
    primary: Ipv4Addr,
    gateway: Ipv4Addr,
    mark: u32,
) -> Result<()> {
    info!("Routing replies for {} through table {}", name, mark);
    run(host, &HostCommand::ip_rule_add_fwmark(mark, mark))?;
    run(host, &HostCommand::ip_route_add_default(gateway, name, mark))?;
    run(host, &HostCommand::iptables_mark_ctorigdst(primary, mark))
}

fn secondary_addresses(
    descriptor: &InterfaceDescriptor,
    primary: Ipv4Addr,
) -> Result<Vec<Ipv4Addr>> {
    let mut addresses = descriptor.addresses.clone();
    let position = addresses
        .iter()
        .position(|a| *a == primary)
        .ok_or_else(|| {
            anyhow!(
                "address {} is not declared in metadata for MAC {}",
                primary,
                descriptor.mac
            )
        })?;
    addresses.remove(position);
    Ok(addresses)
}

// dhclient can leave a 10.0.0.0/8 supernet route behind that shadows the
// policy tables. The main table's default route is never touched.
fn cleanup_routes<H: Host>(host: &H, config: &Config) {
    let command = HostCommand::ip_route_del(&config.cleanup_route);
    for _ in 0..config.cleanup_attempts {
        if let Err(e) = run(host, &command) {
            warn!("Ignoring route cleanup failure: {:#}", e);
        }
    }
}

fn run<H: Host>(host: &H, command: &HostCommand) -> Result<()> {
    info!("Running {}", command);
    host.run(command)
}

/// Mark and routing table for an interface. Zero means unmarked, so start at one.
pub fn policy_mark(device_number: u32) -> u32 {
    device_number.saturating_add(1)
}

/// Assumes the gateway sits at a fixed host octet of the address's /24. This
/// holds for default VPC subnets and is wrong for anything else.
pub fn infer_gateway(address: Ipv4Addr, host_octet: u8) -> Ipv4Addr {
    let [a, b, c, _] = address.octets();
    Ipv4Addr::new(a, b, c, host_octet)
}

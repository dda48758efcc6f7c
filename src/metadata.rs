//! Instance metadata as consumed by the interface configuration loop.
//!
//! The metadata tree mirrors `network/interfaces/macs/<mac>/...` from IMDS.
//! `local-ipv4s` arrives as a bare string when the interface has one address
//! and as a list when it has several, and `device-number` may be a string or
//! an integer depending on who produced the document. Both are normalized
//! into [`InterfaceDescriptor`] before anything else looks at them.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::Deserialize;

use crate::aws::imds::{ImdsClient, split_listing};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LocalIpv4s {
    One(String),
    Many(Vec<String>),
}

impl LocalIpv4s {
    /// Build from a raw IMDS value, where multiple addresses are newline separated.
    pub fn from_listing(listing: &str) -> Self {
        let mut entries = split_listing(listing);
        if entries.len() == 1 {
            Self::One(entries.remove(0))
        } else {
            Self::Many(entries)
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeviceNumber {
    Number(u32),
    Text(String),
}

impl DeviceNumber {
    pub fn value(&self) -> Result<u32> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| anyhow!("invalid device number {:?}: {}", s, e)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MacMetadata {
    pub device_number: DeviceNumber,
    pub local_ipv4s: LocalIpv4s,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InterfacesMetadata {
    pub macs: BTreeMap<String, MacMetadata>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkMetadata {
    pub interfaces: InterfacesMetadata,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstanceMetadata {
    pub network: NetworkMetadata,
}

/// One network interface as declared by the metadata service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub device_number: u32,
    pub mac: String,
    /// Declared addresses in metadata order. The first one is what DHCP hands out.
    pub addresses: Vec<Ipv4Addr>,
}

impl InstanceMetadata {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| anyhow!("unable to parse instance metadata: {}", e))
    }

    /// Normalized interface descriptors, ordered by device number.
    pub fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
        let mut descriptors = Vec::new();
        let mut seen = HashSet::new();
        for (mac, entry) in &self.network.interfaces.macs {
            let mac = normalize_mac(mac);
            let device_number = entry
                .device_number
                .value()
                .with_context(|| format!("bad metadata for MAC {}", mac))?;
            if !seen.insert(device_number) {
                return Err(anyhow!(
                    "device number {} is declared by more than one MAC",
                    device_number
                ));
            }
            let addresses = entry
                .local_ipv4s
                .to_vec()
                .iter()
                .map(|a| {
                    a.trim()
                        .parse::<Ipv4Addr>()
                        .map_err(|e| anyhow!("invalid address {:?} for MAC {}: {}", a, mac, e))
                })
                .collect::<Result<Vec<_>>>()?;
            if addresses.is_empty() {
                return Err(anyhow!("no local IPv4 addresses declared for MAC {}", mac));
            }
            descriptors.push(InterfaceDescriptor {
                device_number,
                mac,
                addresses,
            });
        }
        descriptors.sort_by_key(|d| d.device_number);
        Ok(descriptors)
    }
}

fn normalize_mac(mac: &str) -> String {
    mac.trim().trim_end_matches('/').to_ascii_lowercase()
}

pub trait MetadataSource {
    fn fetch(&self) -> Result<InstanceMetadata>;
}

impl MetadataSource for InstanceMetadata {
    fn fetch(&self) -> Result<InstanceMetadata> {
        Ok(self.clone())
    }
}

impl MetadataSource for ImdsClient {
    fn fetch(&self) -> Result<InstanceMetadata> {
        let mut macs = BTreeMap::new();
        for mac in self.list_metadata("network/interfaces/macs/")? {
            let device_number =
                self.get_metadata(&format!("network/interfaces/macs/{}/device-number", mac))?;
            let local_ipv4s =
                self.get_metadata(&format!("network/interfaces/macs/{}/local-ipv4s", mac))?;
            debug!(
                "IMDS MAC {}: device-number={} local-ipv4s={:?}",
                mac,
                device_number.trim(),
                local_ipv4s
            );
            macs.insert(
                mac,
                MacMetadata {
                    device_number: DeviceNumber::Text(device_number),
                    local_ipv4s: LocalIpv4s::from_listing(&local_ipv4s),
                },
            );
        }
        Ok(InstanceMetadata {
            network: NetworkMetadata {
                interfaces: InterfacesMetadata { macs },
            },
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_single_string_and_one_element_list_normalize_alike() {
        let single = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "0", "local-ipv4s": "10.0.5.37"}
            }}}}"#,
        )
        .unwrap();
        let list = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "0", "local-ipv4s": ["10.0.5.37"]}
            }}}}"#,
        )
        .unwrap();
        assert_eq!(single.interfaces().unwrap(), list.interfaces().unwrap());
        assert_eq!(
            single.interfaces().unwrap(),
            vec![InterfaceDescriptor {
                device_number: 0,
                mac: "0a:00:00:00:00:01".to_string(),
                addresses: vec![Ipv4Addr::new(10, 0, 5, 37)],
            }]
        );
    }

    #[test]
    fn test_interfaces_sorted_by_device_number() {
        let metadata = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": 1, "local-ipv4s": ["10.0.5.40", "10.0.5.41"]},
                "0A:00:00:00:00:02/": {"device-number": "0", "local-ipv4s": "10.0.5.37"}
            }}}}"#,
        )
        .unwrap();
        let interfaces = metadata.interfaces().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].device_number, 0);
        assert_eq!(interfaces[0].mac, "0a:00:00:00:00:02");
        assert_eq!(interfaces[1].device_number, 1);
        assert_eq!(
            interfaces[1].addresses,
            vec![Ipv4Addr::new(10, 0, 5, 40), Ipv4Addr::new(10, 0, 5, 41)]
        );
    }

    #[test]
    fn test_missing_network_is_rejected() {
        assert!(InstanceMetadata::from_json("{}").is_err());
        assert!(InstanceMetadata::from_json(r#"{"network": {"interfaces": {}}}"#).is_err());
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let metadata = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "0", "local-ipv4s": "10.0.5"}
            }}}}"#,
        )
        .unwrap();
        assert!(metadata.interfaces().is_err());
    }

    #[test]
    fn test_empty_address_list_is_rejected() {
        let metadata = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "0", "local-ipv4s": []}
            }}}}"#,
        )
        .unwrap();
        assert!(metadata.interfaces().is_err());
    }

    #[test]
    fn test_duplicate_device_number_is_rejected() {
        let metadata = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "1", "local-ipv4s": "10.0.5.37"},
                "0a:00:00:00:00:02": {"device-number": "1", "local-ipv4s": "10.0.5.38"}
            }}}}"#,
        )
        .unwrap();
        assert!(metadata.interfaces().is_err());
    }

    #[test]
    fn test_bad_device_number_is_rejected() {
        let metadata = InstanceMetadata::from_json(
            r#"{"network": {"interfaces": {"macs": {
                "0a:00:00:00:00:01": {"device-number": "eth0", "local-ipv4s": "10.0.5.37"}
            }}}}"#,
        )
        .unwrap();
        assert!(metadata.interfaces().is_err());
    }

    #[test]
    fn test_local_ipv4s_from_listing() {
        assert_eq!(
            LocalIpv4s::from_listing("10.0.5.37"),
            LocalIpv4s::One("10.0.5.37".to_string())
        );
        assert_eq!(
            LocalIpv4s::from_listing("10.0.5.37\n10.0.5.38\n"),
            LocalIpv4s::Many(vec!["10.0.5.37".to_string(), "10.0.5.38".to_string()])
        );
    }
}

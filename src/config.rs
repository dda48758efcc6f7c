use crate::constants::IFACE_ALIAS_SEPARATOR;

/// Shift applied to metadata device numbers on a specific distribution,
/// whose kernel numbers interfaces differently from the metadata service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceNumberOffset {
    pub codename: String,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub interface_prefix: String,
    pub prefix_len: u8,
    pub gateway_host_octet: u8,
    pub device_offsets: Vec<DeviceNumberOffset>,
    pub cleanup_route: String,
    pub cleanup_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface_prefix: "eth".to_string(),
            prefix_len: 24,
            gateway_host_octet: 1,
            device_offsets: vec![DeviceNumberOffset {
                codename: "precise".to_string(),
                offset: 3,
            }],
            cleanup_route: "10.0.0.0/8".to_string(),
            cleanup_attempts: 2,
        }
    }
}

impl Config {
    pub fn device_offset(&self, codename: Option<&str>) -> u32 {
        codename
            .and_then(|c| self.device_offsets.iter().find(|o| o.codename == c))
            .map(|o| o.offset)
            .unwrap_or(0)
    }

    pub fn interface_name(&self, device_number: u32, offset: u32) -> String {
        format!(
            "{}{}",
            self.interface_prefix,
            device_number.saturating_add(offset)
        )
    }

    pub fn alias_name(&self, interface: &str, index: usize) -> String {
        format!("{}{}{}", interface, IFACE_ALIAS_SEPARATOR, index)
    }
}

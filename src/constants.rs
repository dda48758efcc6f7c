pub const FILE_ETC_LSB_RELEASE: &str = "/etc/lsb-release";
pub const FILE_ETC_OS_RELEASE: &str = "/etc/os-release";
pub const FILE_DEV_LOG: &str = "/dev/log";

pub const PROGRAM_DHCLIENT: &str = "dhclient";
pub const PROGRAM_IP: &str = "ip";
pub const PROGRAM_IPTABLES: &str = "iptables";

pub const IFACE_LOOPBACK: &str = "lo";
pub const IFACE_ALIAS_SEPARATOR: char = ':';

pub const SYSLOG_TAG: &str = "ec2-netconf";

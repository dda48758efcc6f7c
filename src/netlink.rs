use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Result, anyhow};
use futures::{Stream, StreamExt};
use netlink_packet_route::AddressFamily;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::{Error as NlError, Handle as NlHandle, new_connection};
use tokio::runtime::Handle as RtHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkEntry {
    pub(crate) name: String,
    pub(crate) ifindex: u32,
}

pub(crate) struct NetlinkConnection {
    handle: NlHandle,
}

impl NetlinkConnection {
    pub(crate) fn new(rt: &RtHandle) -> Result<Self> {
        // The connection task must be spawned from within the runtime context.
        let _guard = rt.enter();
        let (connection, handle, _) =
            new_connection().map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
        rt.spawn(connection);
        Ok(Self { handle })
    }

    pub(crate) async fn get_links(&self) -> Result<Vec<LinkEntry>> {
        let mut entries = Vec::new();
        let mut links = self.link_stream();
        while let Some(link_res) = links.next().await {
            let link = link_res?;
            entries.push(extract_link(&link));
        }
        Ok(entries)
    }

    pub(crate) fn link_stream(&self) -> impl Stream<Item = Result<LinkMessage, NlError>> {
        self.handle.link().get().execute()
    }

    pub(crate) fn address_stream(
        &self,
        ifindex: Option<u32>,
    ) -> impl Stream<Item = Result<AddressMessage, NlError>> {
        let mut req = self.handle.address().get();
        if let Some(i) = ifindex {
            req = req.set_link_index_filter(i);
        }
        req.execute()
    }

    /// First IPv4 address on `ifindex` whose label is exactly `label`.
    /// Alias addresses carry `<label>:<n>` and are skipped.
    pub(crate) async fn ipv4_address(&self, ifindex: u32, label: &str) -> Result<Option<Ipv4Addr>> {
        let mut addrs = self.address_stream(Some(ifindex));
        while let Some(addr_res) = addrs.next().await {
            let msg = addr_res?;
            if msg.header.family != AddressFamily::Inet || msg.header.index != ifindex {
                continue;
            }
            if let Some(address) = labelled_ipv4(&msg, label) {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }
}

fn extract_link(link: &LinkMessage) -> LinkEntry {
    let name = link
        .attributes
        .iter()
        .find_map(|nla| match nla {
            LinkAttribute::IfName(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap_or_default();
    LinkEntry {
        name,
        ifindex: link.header.index,
    }
}

fn labelled_ipv4(msg: &AddressMessage, label: &str) -> Option<Ipv4Addr> {
    let mut address = None;
    // An unlabelled address belongs to the link itself.
    let mut addr_label: Option<&str> = None;
    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(IpAddr::V4(v4)) => address = Some(*v4),
            AddressAttribute::Address(IpAddr::V4(v4)) if address.is_none() => {
                address = Some(*v4)
            }
            AddressAttribute::Label(l) => addr_label = Some(l),
            _ => {}
        }
    }
    match addr_label {
        Some(l) if l != label => None,
        _ => address,
    }
}

//! Kernel configuration channel over rtnetlink sockets
//!
//! Native netlink operations for link, address, and route management,
//! replacing `ip(8)` command invocations. All public methods are synchronous:
//! the channel owns a current-thread tokio runtime and drives the netlink
//! connection from the calling OS thread, so namespace-scoped call sequences
//! never migrate between threads.

use std::fmt;

use futures::TryStreamExt;
use ipnet::IpNet;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{
    InfoData, InfoKind, InfoVlan, InfoVrf, LinkAttribute, LinkFlags, LinkInfo, LinkMessage,
};
use netlink_packet_route::route::RouteMessage;
use netlink_packet_route::AddressFamily;
use rtnetlink::Handle;

use crate::error::{Error, Result};

/// Address-family filter for address and route listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    All,
    V4,
    V6,
    Mpls,
}

impl Family {
    fn matches(self, family: AddressFamily) -> bool {
        match self {
            Family::All => true,
            Family::V4 => family == AddressFamily::Inet,
            Family::V6 => family == AddressFamily::Inet6,
            Family::Mpls => family == AddressFamily::Mpls,
        }
    }
}

/// Interface kind as reported by the kernel's link-info attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfKind {
    Veth,
    Bridge,
    Vrf,
    Vlan,
    /// Physical or otherwise kind-less interface
    Plain,
    Other(String),
}

impl fmt::Display for IfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfKind::Veth => write!(f, "veth"),
            IfKind::Bridge => write!(f, "bridge"),
            IfKind::Vrf => write!(f, "vrf"),
            IfKind::Vlan => write!(f, "vlan"),
            IfKind::Plain => write!(f, "plain"),
            IfKind::Other(k) => write!(f, "{}", k),
        }
    }
}

/// Snapshot of a kernel network interface.
///
/// The kernel is the source of truth; an `Iface` is a point-in-time copy and
/// must be re-fetched after any operation that can change the underlying
/// attributes (a namespace move reassigns the index, for one).
#[derive(Debug, Clone)]
pub struct Iface {
    pub name: String,
    pub index: u32,
    pub up: bool,
    pub kind: IfKind,
    pub mtu: u32,
    pub txqlen: u32,
    pub num_tx_queues: u32,
    pub num_rx_queues: u32,
    /// Index of the master (bridge or VRF) this interface is bound to
    pub master: Option<u32>,
    /// Peer index for veth, parent index for vlan
    pub link: Option<u32>,
    /// Forwarding-table id, VRF only
    pub vrf_table: Option<u32>,
    /// 802.1q id, VLAN only
    pub vlan_id: Option<u16>,
}

impl Iface {
    fn from_msg(msg: &LinkMessage) -> Self {
        let mut iface = Iface {
            name: String::new(),
            index: msg.header.index,
            up: msg.header.flags.contains(LinkFlags::Up),
            kind: IfKind::Plain,
            mtu: 0,
            txqlen: 0,
            num_tx_queues: 0,
            num_rx_queues: 0,
            master: None,
            link: None,
            vrf_table: None,
            vlan_id: None,
        };
        for attr in &msg.attributes {
            match attr {
                LinkAttribute::IfName(name) => iface.name = name.clone(),
                LinkAttribute::Mtu(mtu) => iface.mtu = *mtu,
                LinkAttribute::TxQueueLen(len) => iface.txqlen = *len,
                LinkAttribute::NumTxQueues(n) => iface.num_tx_queues = *n,
                LinkAttribute::NumRxQueues(n) => iface.num_rx_queues = *n,
                LinkAttribute::Controller(idx) => iface.master = Some(*idx),
                LinkAttribute::Link(idx) => iface.link = Some(*idx),
                LinkAttribute::LinkInfo(info) => {
                    for entry in info {
                        match entry {
                            LinkInfo::Kind(kind) => iface.kind = kind_of(kind),
                            LinkInfo::Data(InfoData::Vrf(attrs)) => {
                                for vrf in attrs {
                                    if let InfoVrf::TableId(id) = vrf {
                                        iface.vrf_table = Some(*id);
                                    }
                                }
                            }
                            LinkInfo::Data(InfoData::Vlan(attrs)) => {
                                for vlan in attrs {
                                    if let InfoVlan::Id(id) = vlan {
                                        iface.vlan_id = Some(*id);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        iface
    }
}

fn kind_of(kind: &InfoKind) -> IfKind {
    match kind {
        InfoKind::Veth => IfKind::Veth,
        InfoKind::Bridge => IfKind::Bridge,
        InfoKind::Vrf => IfKind::Vrf,
        InfoKind::Vlan => IfKind::Vlan,
        other => IfKind::Other(format!("{other:?}").to_lowercase()),
    }
}

/// Extract the errno carried by a netlink error reply, if any
fn errno_of(err: &rtnetlink::Error) -> Option<i32> {
    match err {
        rtnetlink::Error::NetlinkError(msg) => Some(msg.raw_code().abs()),
        _ => None,
    }
}

fn link_err(op: &'static str, name: &str, err: rtnetlink::Error) -> Error {
    match errno_of(&err) {
        Some(code) if code == libc::ENODEV || code == libc::ENOENT => {
            Error::InterfaceNotFound(name.to_string())
        }
        Some(code) if code == libc::EEXIST => Error::InterfaceExists(name.to_string()),
        _ => Error::Netlink {
            op,
            target: name.to_string(),
            source: err,
        },
    }
}

fn addr_err(op: &'static str, link: &str, prefix: IpNet, err: rtnetlink::Error) -> Error {
    match errno_of(&err) {
        Some(code) if code == libc::EADDRNOTAVAIL || code == libc::ENOENT => {
            Error::AddressNotFound {
                link: link.to_string(),
                prefix,
            }
        }
        Some(code) if code == libc::EEXIST => Error::AddressExists {
            link: link.to_string(),
            prefix,
        },
        _ => Error::Netlink {
            op,
            target: format!("{link}, {prefix}"),
            source: err,
        },
    }
}

fn route_err(op: &'static str, dst: IpNet, err: rtnetlink::Error) -> Error {
    match errno_of(&err) {
        Some(code) if code == libc::ESRCH || code == libc::ENOENT => Error::RouteNotFound(dst),
        Some(code) if code == libc::EEXIST => Error::RouteExists(dst),
        _ => Error::Netlink {
            op,
            target: dst.to_string(),
            source: err,
        },
    }
}

/// Synchronous handle on the kernel's rtnetlink configuration interface.
///
/// A channel's socket is bound to the network namespace that was current on
/// the calling thread when [`Channel::new`] ran. After switching namespaces,
/// open a fresh channel; the old one keeps talking to the old namespace.
pub struct Channel {
    rt: tokio::runtime::Runtime,
    handle: Handle,
}

impl Channel {
    /// Open an rtnetlink socket in the current network namespace.
    ///
    /// Must be called from synchronous code: the channel blocks the calling
    /// thread on its own runtime and cannot live inside another one.
    pub fn new() -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(Error::ChannelSetup)?;
        let handle = rt.block_on(async {
            let (connection, handle, _) =
                rtnetlink::new_connection().map_err(Error::ChannelSetup)?;
            let _task = tokio::spawn(connection);
            Ok::<_, Error>(handle)
        })?;
        Ok(Self { rt, handle })
    }

    /// Resolve an interface by name in this channel's namespace.
    pub fn link_by_name(&self, name: &str) -> Result<Iface> {
        self.rt.block_on(async {
            let mut links = self
                .handle
                .link()
                .get()
                .match_name(name.to_string())
                .execute();
            match links.try_next().await {
                Ok(Some(msg)) => Ok(Iface::from_msg(&msg)),
                Ok(None) => Err(Error::InterfaceNotFound(name.to_string())),
                Err(err) => Err(link_err("link_by_name", name, err)),
            }
        })
    }

    /// Resolve an interface by kernel index.
    pub fn link_by_index(&self, index: u32) -> Result<Iface> {
        self.rt.block_on(async {
            let mut links = self.handle.link().get().match_index(index).execute();
            match links.try_next().await {
                Ok(Some(msg)) => Ok(Iface::from_msg(&msg)),
                Ok(None) => Err(Error::InterfaceNotFound(format!("ifindex {index}"))),
                Err(err) => Err(link_err("link_by_index", &format!("ifindex {index}"), err)),
            }
        })
    }

    /// Snapshot every interface visible in this channel's namespace.
    pub fn links(&self) -> Result<Vec<Iface>> {
        self.rt.block_on(async {
            let mut stream = self.handle.link().get().execute();
            let mut out = Vec::new();
            loop {
                match stream.try_next().await {
                    Ok(Some(msg)) => out.push(Iface::from_msg(&msg)),
                    Ok(None) => return Ok(out),
                    Err(err) => return Err(link_err("link_list", "*", err)),
                }
            }
        })
    }

    /// Create a link from a prepared message. `name` is used only for error
    /// reporting and classification.
    pub fn link_add(&self, msg: LinkMessage, name: &str) -> Result<()> {
        self.rt.block_on(async {
            self.handle
                .link()
                .add(msg)
                .execute()
                .await
                .map_err(|err| link_err("link_add", name, err))
        })
    }

    /// Apply a prepared link-set message (admin state, master, rename, netns).
    pub fn link_set(&self, msg: LinkMessage, op: &'static str, name: &str) -> Result<()> {
        self.rt.block_on(async {
            self.handle
                .link()
                .set(msg)
                .execute()
                .await
                .map_err(|err| link_err(op, name, err))
        })
    }

    /// Delete the interface with the given name.
    pub fn link_del(&self, name: &str) -> Result<()> {
        let iface = self.link_by_name(name)?;
        self.rt.block_on(async {
            self.handle
                .link()
                .del(iface.index)
                .execute()
                .await
                .map_err(|err| link_err("link_del", name, err))
        })
    }

    fn addr_request(&self, name: &str, prefix: IpNet, replace: bool) -> Result<()> {
        let iface = self.link_by_name(name)?;
        self.rt.block_on(async {
            let req = self
                .handle
                .address()
                .add(iface.index, prefix.addr(), prefix.prefix_len());
            let req = if replace { req.replace() } else { req };
            req.execute().await.map_err(|err| {
                addr_err(
                    if replace { "addr_replace" } else { "addr_add" },
                    name,
                    prefix,
                    err,
                )
            })
        })
    }

    /// Add a prefix to an interface; fails `AddressExists` on an exact
    /// duplicate.
    pub fn addr_add(&self, name: &str, prefix: IpNet) -> Result<()> {
        self.addr_request(name, prefix, false)
    }

    /// Add-or-update a prefix on an interface. Succeeds whether or not the
    /// prefix was already bound, which is what makes re-runs safe.
    pub fn addr_replace(&self, name: &str, prefix: IpNet) -> Result<()> {
        self.addr_request(name, prefix, true)
    }

    /// Remove a prefix from an interface.
    pub fn addr_del(&self, name: &str, prefix: IpNet) -> Result<()> {
        let iface = self.link_by_name(name)?;
        let msg = self
            .addr_messages(iface.index)?
            .into_iter()
            .find(|m| addr_msg_matches(m, prefix))
            .ok_or(Error::AddressNotFound {
                link: name.to_string(),
                prefix,
            })?;
        self.rt.block_on(async {
            self.handle
                .address()
                .del(msg)
                .execute()
                .await
                .map_err(|err| addr_err("addr_del", name, prefix, err))
        })
    }

    /// List the prefixes bound to an interface, filtered by family.
    /// The result is an unordered set.
    pub fn addr_list(&self, name: &str, family: Family) -> Result<Vec<IpNet>> {
        let iface = self.link_by_name(name)?;
        let mut out = Vec::new();
        for msg in self.addr_messages(iface.index)? {
            if !family.matches(msg.header.family) {
                continue;
            }
            if let Some(net) = addr_msg_prefix(&msg) {
                out.push(net);
            }
        }
        Ok(out)
    }

    fn addr_messages(&self, index: u32) -> Result<Vec<AddressMessage>> {
        self.rt.block_on(async {
            let mut stream = self
                .handle
                .address()
                .get()
                .set_link_index_filter(index)
                .execute();
            let mut out = Vec::new();
            loop {
                match stream.try_next().await {
                    Ok(Some(msg)) => out.push(msg),
                    Ok(None) => return Ok(out),
                    Err(err) => {
                        return Err(Error::Netlink {
                            op: "addr_list",
                            target: format!("ifindex {index}"),
                            source: err,
                        });
                    }
                }
            }
        })
    }

    /// Install a route; fails `RouteExists` if an equal route is present.
    pub fn route_add(&self, msg: RouteMessage, dst: IpNet) -> Result<()> {
        self.rt.block_on(async {
            self.handle
                .route()
                .add(msg)
                .execute()
                .await
                .map_err(|err| route_err("route_add", dst, err))
        })
    }

    /// Install-or-update a route.
    pub fn route_replace(&self, msg: RouteMessage, dst: IpNet) -> Result<()> {
        self.rt.block_on(async {
            self.handle
                .route()
                .add(msg)
                .replace()
                .execute()
                .await
                .map_err(|err| route_err("route_replace", dst, err))
        })
    }

    /// Remove a route.
    pub fn route_del(&self, msg: RouteMessage, dst: IpNet) -> Result<()> {
        self.rt.block_on(async {
            self.handle
                .route()
                .del(msg)
                .execute()
                .await
                .map_err(|err| route_err("route_del", dst, err))
        })
    }

    /// Dump routes matching the family of the filter message.
    pub fn route_dump(&self, filter: RouteMessage) -> Result<Vec<RouteMessage>> {
        self.rt.block_on(async {
            let mut stream = self.handle.route().get(filter).execute();
            let mut out = Vec::new();
            loop {
                match stream.try_next().await {
                    Ok(Some(msg)) => out.push(msg),
                    Ok(None) => return Ok(out),
                    Err(err) => {
                        return Err(Error::Netlink {
                            op: "route_dump",
                            target: "*".to_string(),
                            source: err,
                        });
                    }
                }
            }
        })
    }
}

fn addr_msg_matches(msg: &AddressMessage, prefix: IpNet) -> bool {
    addr_msg_prefix(msg) == Some(prefix)
}

/// The interface address carried by an address message. IFA_LOCAL is the
/// interface's own address on point-to-point links; fall back to IFA_ADDRESS.
fn addr_msg_prefix(msg: &AddressMessage) -> Option<IpNet> {
    let mut local = None;
    let mut address = None;
    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(ip) => local = Some(*ip),
            AddressAttribute::Address(ip) => address = Some(*ip),
            _ => {}
        }
    }
    let ip = local.or(address)?;
    IpNet::new(ip, msg.header.prefix_len).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_filter() {
        assert!(Family::All.matches(AddressFamily::Inet));
        assert!(Family::All.matches(AddressFamily::Inet6));
        assert!(Family::V4.matches(AddressFamily::Inet));
        assert!(!Family::V4.matches(AddressFamily::Inet6));
        assert!(Family::V6.matches(AddressFamily::Inet6));
        assert!(!Family::Mpls.matches(AddressFamily::Inet));
    }

    #[test]
    fn test_iface_parses_link_message() {
        let mut msg = LinkMessage::default();
        msg.header.index = 7;
        msg.header.flags = LinkFlags::Up | LinkFlags::LowerUp;
        msg.attributes.push(LinkAttribute::IfName("vrf1".into()));
        msg.attributes.push(LinkAttribute::Mtu(1500));
        msg.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vrf),
            LinkInfo::Data(InfoData::Vrf(vec![InfoVrf::TableId(10)])),
        ]));

        let iface = Iface::from_msg(&msg);
        assert_eq!(iface.name, "vrf1");
        assert_eq!(iface.index, 7);
        assert!(iface.up);
        assert_eq!(iface.kind, IfKind::Vrf);
        assert_eq!(iface.vrf_table, Some(10));
        assert_eq!(iface.vlan_id, None);
    }

    #[test]
    fn test_vlan_info_is_parsed() {
        let mut msg = LinkMessage::default();
        msg.header.index = 9;
        msg.attributes.push(LinkAttribute::IfName("eth0.100".into()));
        msg.attributes.push(LinkAttribute::Link(2));
        msg.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vlan),
            LinkInfo::Data(InfoData::Vlan(vec![InfoVlan::Id(100)])),
        ]));

        let iface = Iface::from_msg(&msg);
        assert_eq!(iface.kind, IfKind::Vlan);
        assert_eq!(iface.vlan_id, Some(100));
        assert_eq!(iface.link, Some(2));
    }
}

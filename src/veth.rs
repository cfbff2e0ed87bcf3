//! Veth pair management
//!
//! Veth pairs are virtual Ethernet cables: two interfaces created and
//! destroyed together by the kernel. The two endpoints may live in different
//! namespaces, in which case only the local one is resolvable by name here
//! and the peer handle is absent until the namespace is switched.

use ipnet::IpNet;
use netlink_packet_route::link::LinkAttribute;
use rtnetlink::LinkVeth;

use crate::error::{Error, Result};
use crate::link;
use crate::netlink::{Channel, IfKind, Iface};

pub const DEFAULT_TXQLEN: u32 = 1000;
pub const DEFAULT_MTU: u32 = 1500;
pub const DEFAULT_QUEUES: u32 = 1;

/// Which endpoint of a pair an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Peer,
}

/// A veth pair, seen from one endpoint.
///
/// `peer` is `None` when the other endpoint lives in a different namespace.
#[derive(Debug, Clone)]
pub struct Veth {
    pub iface: Iface,
    pub peer: Option<Iface>,
}

impl Veth {
    /// Resolve a veth endpoint by name. Fails `WrongKind` if the name
    /// belongs to a different interface kind.
    pub fn get_by_name(ch: &Channel, name: &str) -> Result<Self> {
        let iface = ch.link_by_name(name)?;
        if iface.kind != IfKind::Veth {
            return Err(Error::WrongKind {
                name: name.to_string(),
                expected: IfKind::Veth,
                actual: iface.kind,
            });
        }
        let peer = match peer_of(ch, &iface) {
            Ok(peer) => Some(peer),
            // The peer belongs to a different namespace.
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        Ok(Self { iface, peer })
    }

    /// Create a veth pair with default queueing parameters, optionally
    /// bringing both endpoints up.
    ///
    /// Creation and bring-up are one logical unit: when the up step fails
    /// the pair is left in place (retrievable by name) and the error names
    /// the endpoint that stayed down.
    pub fn add(ch: &Channel, name: &str, peer: &str, bring_up: bool) -> Result<Self> {
        let mut msg = LinkVeth::new(name, peer).mtu(DEFAULT_MTU).build();
        msg.attributes.push(LinkAttribute::TxQueueLen(DEFAULT_TXQLEN));
        msg.attributes.push(LinkAttribute::NumTxQueues(DEFAULT_QUEUES));
        msg.attributes.push(LinkAttribute::NumRxQueues(DEFAULT_QUEUES));
        ch.link_add(msg, name)?;
        if bring_up {
            for endpoint in [name, peer] {
                if let Err(e) = link::up(ch, endpoint) {
                    return Err(Error::BringUp {
                        name: endpoint.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }
        Self::get_by_name(ch, name)
    }

    /// Delete the pair through either endpoint; the kernel removes both.
    pub fn delete(ch: &Channel, name: &str) -> Result<()> {
        // Resolve first so a name collision with another kind is refused.
        Self::get_by_name(ch, name)?;
        ch.link_del(name)
    }

    /// True if a veth endpoint with this name exists.
    pub fn exists(ch: &Channel, name: &str) -> Result<bool> {
        match Self::get_by_name(ch, name) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn name(&self) -> &str {
        &self.iface.name
    }

    /// Peer name, when the peer is resolvable from this namespace.
    pub fn peer_name(&self) -> Option<&str> {
        self.peer.as_ref().map(|p| p.name.as_str())
    }

    pub fn mtu(&self) -> u32 {
        self.iface.mtu
    }

    pub fn txqlen(&self) -> u32 {
        self.iface.txqlen
    }

    fn side_name(&self, side: Side) -> Result<&str> {
        match side {
            Side::Local => Ok(self.name()),
            Side::Peer => self
                .peer_name()
                .ok_or_else(|| Error::InterfaceNotFound(format!("peer of {}", self.name()))),
        }
    }

    /// Add a prefix to one endpoint; fails when the peer side is requested
    /// but lives in another namespace.
    pub fn addr_add(&self, ch: &Channel, side: Side, prefix: IpNet, up: bool) -> Result<()> {
        link::addr_add(ch, self.side_name(side)?, prefix, up)
    }

    /// Add-or-update a prefix on one endpoint.
    pub fn addr_replace(&self, ch: &Channel, side: Side, prefix: IpNet, up: bool) -> Result<()> {
        link::addr_replace(ch, self.side_name(side)?, prefix, up)
    }

    /// Remove a prefix from one endpoint.
    pub fn addr_del(&self, ch: &Channel, side: Side, prefix: IpNet) -> Result<()> {
        link::addr_del(ch, self.side_name(side)?, prefix)
    }
}

/// Resolve the peer endpoint of a veth interface through its peer index.
///
/// The peer index is namespace-scoped: once the peer has been moved away,
/// the same index may belong to an unrelated interface here. The candidate
/// only counts when it points back at `iface`.
pub fn peer_of(ch: &Channel, iface: &Iface) -> Result<Iface> {
    let peer_index = iface
        .link
        .ok_or_else(|| Error::InterfaceNotFound(format!("peer of {}", iface.name)))?;
    let peer = ch.link_by_index(peer_index)?;
    if peer.kind == IfKind::Veth && peer.link == Some(iface.index) {
        return Ok(peer);
    }
    Err(Error::InterfaceNotFound(format!("peer of {}", iface.name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_is_not_veth() {
        let ch = Channel::new().unwrap();
        assert!(matches!(
            Veth::get_by_name(&ch, "lo").unwrap_err(),
            Error::WrongKind { .. }
        ));
        // WrongKind is a naming collision, not absence
        assert!(matches!(
            Veth::exists(&ch, "lo").unwrap_err(),
            Error::WrongKind { .. }
        ));
        assert!(!Veth::exists(&ch, "nonexistent12345").unwrap());
    }

    #[test]
    #[ignore = "requires root and CAP_NET_ADMIN"]
    fn test_pair_create_and_delete() {
        let ch = Channel::new().unwrap();
        let veth = Veth::add(&ch, "nrveth0", "nrveth1", true).unwrap();
        assert_eq!(veth.name(), "nrveth0");
        assert_eq!(veth.peer_name(), Some("nrveth1"));
        assert_eq!(veth.txqlen(), DEFAULT_TXQLEN);
        assert_eq!(veth.mtu(), DEFAULT_MTU);
        assert!(veth.iface.up);

        // deleting either end removes both
        Veth::delete(&ch, "nrveth1").unwrap();
        assert!(!Veth::exists(&ch, "nrveth0").unwrap());
        assert!(!Veth::exists(&ch, "nrveth1").unwrap());
    }
}

//! Route construction and table operations
//!
//! Routes are built as plain values (destination, next-hops, flags) and only
//! converted to netlink messages at install time, with the forwarding-table
//! id injected by the caller: 0 selects the main table, a VRF supplies its
//! own table id.

use std::net::IpAddr;

use bitflags::bitflags;
use ipnet::IpNet;
use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteFlags, RouteMessage, RouteNextHop, RouteNextHopFlags,
    RouteProtocol, RouteScope, RouteType,
};
use netlink_packet_route::AddressFamily;

use crate::error::{Error, Result};
use crate::netlink::{Channel, Family};

/// The kernel's main routing table
pub const MAIN_TABLE: u32 = 254;

bitflags! {
    /// Administrative flags applicable to a route or a single next-hop
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AdminFlags: u32 {
        /// Skip the next-hop reachability check
        const ONLINK = 1;
        /// Next-hop resolution may leak across VRF boundaries
        const PERVASIVE = 2;
    }
}

/// Anything carrying a mutable set of administrative flags. Implemented by
/// [`Route`] and [`NextHop`]; the flag mutators are generic over this trait,
/// so there is no runtime type dispatch to get wrong.
pub trait Flagged {
    fn flags(&self) -> AdminFlags;
    fn flags_mut(&mut self) -> &mut AdminFlags;
}

pub fn set_onlink<T: Flagged>(target: &mut T) {
    target.flags_mut().insert(AdminFlags::ONLINK);
}

pub fn clear_onlink<T: Flagged>(target: &mut T) {
    target.flags_mut().remove(AdminFlags::ONLINK);
}

pub fn set_pervasive<T: Flagged>(target: &mut T) {
    target.flags_mut().insert(AdminFlags::PERVASIVE);
}

pub fn clear_pervasive<T: Flagged>(target: &mut T) {
    target.flags_mut().remove(AdminFlags::PERVASIVE);
}

/// One next-hop of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub gateway: IpAddr,
    /// Multipath weight; `None` means the kernel default
    pub weight: Option<u8>,
    /// Outgoing interface, if pinned
    pub ifindex: Option<u32>,
    pub flags: AdminFlags,
}

impl NextHop {
    pub fn new(gateway: IpAddr) -> Self {
        Self {
            gateway,
            weight: None,
            ifindex: None,
            flags: AdminFlags::empty(),
        }
    }
}

impl Flagged for NextHop {
    fn flags(&self) -> AdminFlags {
        self.flags
    }
    fn flags_mut(&mut self) -> &mut AdminFlags {
        &mut self.flags
    }
}

/// A unicast route: destination prefix plus an ordered, non-empty set of
/// next-hops. Multiple next-hops model equal/unequal-cost multipath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: IpNet,
    pub next_hops: Vec<NextHop>,
    pub flags: AdminFlags,
}

impl Flagged for Route {
    fn flags(&self) -> AdminFlags {
        self.flags
    }
    fn flags_mut(&mut self) -> &mut AdminFlags {
        &mut self.flags
    }
}

impl Route {
    /// Build a route from a destination and one gateway per next-hop.
    ///
    /// This is the one pure validation in the crate: an empty gateway list
    /// fails [`Error::EmptyNextHops`], and a gateway whose address family
    /// differs from the destination's fails [`Error::FamilyMismatch`]. The
    /// destination itself is non-optional by construction.
    pub fn build(destination: IpNet, gateways: &[IpAddr]) -> Result<Self> {
        if gateways.is_empty() {
            return Err(Error::EmptyNextHops(destination));
        }
        let mut route = Route {
            destination,
            next_hops: Vec::with_capacity(gateways.len()),
            flags: AdminFlags::empty(),
        };
        for gw in gateways {
            route.push_next_hop(NextHop::new(*gw))?;
        }
        Ok(route)
    }

    /// Append a next-hop, checking its family against the destination.
    pub fn push_next_hop(&mut self, hop: NextHop) -> Result<()> {
        let matches = match (self.destination, hop.gateway) {
            (IpNet::V4(_), IpAddr::V4(_)) | (IpNet::V6(_), IpAddr::V6(_)) => true,
            _ => false,
        };
        if !matches {
            return Err(Error::FamilyMismatch {
                destination: self.destination,
                gateway: hop.gateway,
            });
        }
        self.next_hops.push(hop);
        Ok(())
    }

    /// Install the route in `table` (0 selects the main table); fails
    /// `RouteExists` if an equal route is already present.
    pub fn install(&self, ch: &Channel, table: u32) -> Result<()> {
        ch.route_add(self.to_message(table), self.destination)
    }

    /// Install-or-update the route in `table`.
    pub fn replace(&self, ch: &Channel, table: u32) -> Result<()> {
        ch.route_replace(self.to_message(table), self.destination)
    }

    /// Remove the route from `table`; absent routes fail `RouteNotFound`.
    pub fn remove(&self, ch: &Channel, table: u32) -> Result<()> {
        ch.route_del(self.to_message(table), self.destination)
    }

    fn to_message(&self, table: u32) -> RouteMessage {
        let table = if table == 0 { MAIN_TABLE } else { table };
        let mut msg = RouteMessage::default();
        msg.header.address_family = match self.destination {
            IpNet::V4(_) => AddressFamily::Inet,
            IpNet::V6(_) => AddressFamily::Inet6,
        };
        msg.header.destination_prefix_length = self.destination.prefix_len();
        msg.header.protocol = RouteProtocol::Static;
        msg.header.scope = RouteScope::Universe;
        msg.header.kind = RouteType::Unicast;
        msg.header.flags = route_flags(self.flags);
        // RTA_TABLE carries the full 32-bit id; the header field is capped
        // at one byte.
        msg.header.table = if table < 256 { table as u8 } else { 0 };
        msg.attributes.push(RouteAttribute::Table(table));
        msg.attributes
            .push(RouteAttribute::Destination(route_address(
                self.destination.addr(),
            )));
        msg.attributes
            .push(RouteAttribute::MultiPath(
                self.next_hops.iter().map(encode_next_hop).collect(),
            ));
        msg
    }
}

fn route_address(ip: IpAddr) -> RouteAddress {
    match ip {
        IpAddr::V4(v4) => RouteAddress::Inet(v4),
        IpAddr::V6(v6) => RouteAddress::Inet6(v6),
    }
}

fn route_flags(flags: AdminFlags) -> RouteFlags {
    let mut out = RouteFlags::empty();
    if flags.contains(AdminFlags::ONLINK) {
        out |= RouteFlags::Onlink;
    }
    if flags.contains(AdminFlags::PERVASIVE) {
        out |= RouteFlags::Pervasive;
    }
    out
}

fn next_hop_flags(flags: AdminFlags) -> RouteNextHopFlags {
    let mut out = RouteNextHopFlags::empty();
    if flags.contains(AdminFlags::ONLINK) {
        out |= RouteNextHopFlags::Onlink;
    }
    if flags.contains(AdminFlags::PERVASIVE) {
        out |= RouteNextHopFlags::Pervasive;
    }
    out
}

fn encode_next_hop(hop: &NextHop) -> RouteNextHop {
    let mut out = RouteNextHop::default();
    out.flags = next_hop_flags(hop.flags);
    // rtnh_hops carries weight minus one
    out.hops = hop.weight.map(|w| w.saturating_sub(1)).unwrap_or(0);
    out.interface_index = hop.ifindex.unwrap_or(0);
    out.attributes = vec![RouteAttribute::Gateway(route_address(hop.gateway))];
    out
}

/// Route-type filter for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    All,
    Unicast,
    Local,
}

impl KindFilter {
    fn matches(self, kind: RouteType) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Unicast => kind == RouteType::Unicast,
            KindFilter::Local => kind == RouteType::Local,
        }
    }
}

/// List the routes of a forwarding table (0 selects the main table).
pub fn dump(ch: &Channel, table: u32, family: Family, kind: KindFilter) -> Result<Vec<Route>> {
    let table = if table == 0 { MAIN_TABLE } else { table };
    let mut filter = RouteMessage::default();
    filter.header.address_family = match family {
        Family::V4 => AddressFamily::Inet,
        Family::V6 => AddressFamily::Inet6,
        Family::Mpls => AddressFamily::Mpls,
        Family::All => AddressFamily::Unspec,
    };
    let mut out = Vec::new();
    for msg in ch.route_dump(filter)? {
        if table_of(&msg) != table || !kind.matches(msg.header.kind) {
            continue;
        }
        if let Some(route) = decode(&msg) {
            out.push(route);
        }
    }
    Ok(out)
}

fn table_of(msg: &RouteMessage) -> u32 {
    for attr in &msg.attributes {
        if let RouteAttribute::Table(id) = attr {
            return *id;
        }
    }
    u32::from(msg.header.table)
}

fn decode(msg: &RouteMessage) -> Option<Route> {
    let prefix_len = msg.header.destination_prefix_length;
    let mut destination = None;
    let mut hops = Vec::new();
    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Destination(addr) => {
                destination = decode_address(addr)
                    .and_then(|ip| IpNet::new(ip, prefix_len).ok());
            }
            RouteAttribute::Gateway(addr) => {
                if let Some(ip) = decode_address(addr) {
                    hops.push(NextHop::new(ip));
                }
            }
            RouteAttribute::MultiPath(next_hops) => {
                for nh in next_hops {
                    for nh_attr in &nh.attributes {
                        if let RouteAttribute::Gateway(addr) = nh_attr {
                            if let Some(ip) = decode_address(addr) {
                                let mut hop = NextHop::new(ip);
                                hop.ifindex = Some(nh.interface_index);
                                hops.push(hop);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    // A missing RTA_DST means the all-zeroes default for the family.
    let destination = destination.or_else(|| match msg.header.address_family {
        AddressFamily::Inet => IpNet::new(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0).ok(),
        AddressFamily::Inet6 => IpNet::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0).ok(),
        _ => None,
    })?;
    Some(Route {
        destination,
        next_hops: hops,
        flags: AdminFlags::empty(),
    })
}

fn decode_address(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
        RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_rejects_empty_next_hops() {
        let err = Route::build(prefix("10.0.0.0/8"), &[]).unwrap_err();
        assert!(matches!(err, Error::EmptyNextHops(_)));
    }

    #[test]
    fn test_build_single_next_hop() {
        let gw: IpAddr = "192.168.1.1".parse().unwrap();
        let route = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap();
        assert_eq!(route.next_hops.len(), 1);
        assert_eq!(route.next_hops[0].gateway, gw);
    }

    #[test]
    fn test_build_rejects_mixed_families() {
        let gw: IpAddr = "2001:db8::1".parse().unwrap();
        let err = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap_err();
        assert!(matches!(err, Error::FamilyMismatch { .. }));
    }

    #[test]
    fn test_flag_mutators_work_on_routes_and_next_hops() {
        let gw: IpAddr = "192.168.1.1".parse().unwrap();
        let mut route = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap();
        set_onlink(&mut route);
        set_pervasive(&mut route);
        assert!(route.flags().contains(AdminFlags::ONLINK | AdminFlags::PERVASIVE));
        clear_onlink(&mut route);
        assert!(!route.flags().contains(AdminFlags::ONLINK));
        assert!(route.flags().contains(AdminFlags::PERVASIVE));

        let mut hop = NextHop::new(gw);
        set_onlink(&mut hop);
        assert!(hop.flags().contains(AdminFlags::ONLINK));
        clear_pervasive(&mut hop);
        assert!(!hop.flags().contains(AdminFlags::PERVASIVE));
    }

    #[test]
    fn test_message_carries_table_and_multipath() {
        let gws: Vec<IpAddr> = vec![
            "192.168.1.1".parse().unwrap(),
            "192.168.1.2".parse().unwrap(),
        ];
        let mut route = Route::build(prefix("10.0.0.0/8"), &gws).unwrap();
        set_onlink(&mut route.next_hops[1]);
        let msg = route.to_message(10);
        assert_eq!(msg.header.table, 10);
        assert_eq!(msg.header.destination_prefix_length, 8);

        let tables: Vec<_> = msg
            .attributes
            .iter()
            .filter_map(|a| match a {
                RouteAttribute::Table(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(tables, vec![10]);

        let hops = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::MultiPath(h) => Some(h),
                _ => None,
            })
            .expect("multipath attribute");
        assert_eq!(hops.len(), 2);
        assert!(hops[1].flags.contains(RouteNextHopFlags::Onlink));
    }

    #[test]
    fn test_zero_table_selects_main() {
        let gw: IpAddr = "192.168.1.1".parse().unwrap();
        let route = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap();
        let msg = route.to_message(0);
        assert_eq!(u32::from(msg.header.table), MAIN_TABLE);
    }

    #[test]
    fn test_wide_table_id_moves_to_attribute() {
        let gw: IpAddr = "192.168.1.1".parse().unwrap();
        let route = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap();
        let msg = route.to_message(0x1_0000);
        assert_eq!(msg.header.table, 0);
        assert!(msg
            .attributes
            .iter()
            .any(|a| matches!(a, RouteAttribute::Table(t) if *t == 0x1_0000)));
    }

    #[test]
    fn test_decode_roundtrips_a_message() {
        let gw: IpAddr = "192.168.1.1".parse().unwrap();
        let route = Route::build(prefix("10.0.0.0/8"), &[gw]).unwrap();
        let msg = route.to_message(10);
        let decoded = decode(&msg).unwrap();
        assert_eq!(decoded.destination, prefix("10.0.0.0/8"));
        assert_eq!(decoded.next_hops.len(), 1);
        assert_eq!(decoded.next_hops[0].gateway, gw);
        assert_eq!(table_of(&msg), 10);
    }
}

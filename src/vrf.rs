//! VRF interface management
//!
//! A VRF is a master interface with an attached forwarding table. Interfaces
//! bound to it have their route lookups scoped to that table, and routes
//! installed "into the VRF" are routes installed into its table.

use rtnetlink::LinkVrf;

use crate::error::{Error, Result};
use crate::link;
use crate::netlink::{Channel, Family, IfKind, Iface};
use crate::route::{self, KindFilter, Route};

/// A VRF interface and its forwarding-table id
#[derive(Debug, Clone)]
pub struct Vrf {
    pub iface: Iface,
    table: u32,
}

impl Vrf {
    fn from_iface(iface: Iface) -> Result<Self> {
        if iface.kind != IfKind::Vrf {
            return Err(Error::WrongKind {
                name: iface.name,
                expected: IfKind::Vrf,
                actual: iface.kind,
            });
        }
        let table = iface.vrf_table.unwrap_or_default();
        Ok(Self { iface, table })
    }

    /// Resolve a VRF by name. Fails `WrongKind` if the name belongs to a
    /// different interface kind.
    pub fn get_by_name(ch: &Channel, name: &str) -> Result<Self> {
        Self::from_iface(ch.link_by_name(name)?)
    }

    /// Resolve a VRF by kernel index.
    pub fn get_by_index(ch: &Channel, index: u32) -> Result<Self> {
        Self::from_iface(ch.link_by_index(index)?)
    }

    /// Create a VRF bound to `table`, optionally bringing it up.
    pub fn add(ch: &Channel, name: &str, table: u32, bring_up: bool) -> Result<Self> {
        ch.link_add(LinkVrf::new(name, table).build(), name)?;
        if bring_up {
            if let Err(e) = link::up(ch, name) {
                return Err(Error::BringUp {
                    name: name.to_string(),
                    source: Box::new(e),
                });
            }
        }
        Self::get_by_name(ch, name)
    }

    /// Resolve a VRF, creating it (brought up) when absent.
    pub fn ensure(ch: &Channel, name: &str, table: u32) -> Result<Self> {
        match Self::get_by_name(ch, name) {
            Ok(vrf) => Ok(vrf),
            Err(e) if e.is_not_found() => Self::add(ch, name, table, true),
            Err(e) => Err(e),
        }
    }

    /// Delete a VRF by name.
    pub fn delete(ch: &Channel, name: &str) -> Result<()> {
        Self::get_by_name(ch, name)?;
        ch.link_del(name)
    }

    /// True if a VRF with this name exists.
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

    /// Forwarding-table id of this VRF.
    pub fn table(&self) -> u32 {
        self.table
    }

    /// Two handles describe the same VRF when name, index, and table agree.
    pub fn same_as(&self, other: &Vrf) -> bool {
        self.name() == other.name()
            && self.iface.index == other.iface.index
            && self.table == other.table
    }

    pub fn up(&self, ch: &Channel) -> Result<()> {
        link::up(ch, self.name())
    }

    pub fn down(&self, ch: &Channel) -> Result<()> {
        link::down(ch, self.name())
    }

    /// Bind an interface to this VRF, scoping its routing to the VRF table.
    pub fn bind_if(&self, ch: &Channel, if_name: &str) -> Result<()> {
        link::bind(ch, self.name(), if_name)
    }

    /// Names of the interfaces currently bound to this VRF.
    pub fn ports(&self, ch: &Channel) -> Result<Vec<String>> {
        Ok(ch
            .links()?
            .into_iter()
            .filter(|l| l.master == Some(self.iface.index))
            .map(|l| l.name)
            .collect())
    }

    /// List the routes of this VRF's table.
    pub fn routes(&self, ch: &Channel, family: Family, kind: KindFilter) -> Result<Vec<Route>> {
        route::dump(ch, self.table, family, kind)
    }

    /// Install a route into this VRF's table.
    pub fn route_install(&self, ch: &Channel, route: &Route) -> Result<()> {
        route.install(ch, self.table)
    }

    /// Install-or-update a route in this VRF's table.
    pub fn route_replace(&self, ch: &Channel, route: &Route) -> Result<()> {
        route.replace(ch, self.table)
    }

    /// Remove a route from this VRF's table.
    pub fn route_remove(&self, ch: &Channel, route: &Route) -> Result<()> {
        route.remove(ch, self.table)
    }
}

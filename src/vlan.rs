//! VLAN sub-interface management

use rtnetlink::LinkVlan;

use crate::error::{Error, Result};
use crate::link;
use crate::netlink::{Channel, IfKind, Iface};

/// A 802.1q sub-interface of a parent link
#[derive(Debug, Clone)]
pub struct Vlan {
    pub iface: Iface,
}

impl Vlan {
    /// Resolve a VLAN sub-interface by name. Fails `WrongKind` if the name
    /// belongs to a different interface kind.
    pub fn get_by_name(ch: &Channel, name: &str) -> Result<Self> {
        let iface = ch.link_by_name(name)?;
        if iface.kind != IfKind::Vlan {
            return Err(Error::WrongKind {
                name: name.to_string(),
                expected: IfKind::Vlan,
                actual: iface.kind,
            });
        }
        Ok(Self { iface })
    }

    /// Create the sub-interface `<parent>.<vlan_id>` on a parent link,
    /// optionally bringing it up.
    pub fn add(ch: &Channel, parent: &str, vlan_id: u16, bring_up: bool) -> Result<Self> {
        let parent_if = ch.link_by_name(parent)?;
        let name = format!("{parent}.{vlan_id}");
        ch.link_add(
            LinkVlan::new(&name, parent_if.index, vlan_id).build(),
            &name,
        )?;
        if bring_up {
            if let Err(e) = link::up(ch, &name) {
                return Err(Error::BringUp {
                    name,
                    source: Box::new(e),
                });
            }
        }
        Self::get_by_name(ch, &name)
    }

    /// Delete a VLAN sub-interface by name.
    pub fn delete(ch: &Channel, name: &str) -> Result<()> {
        Self::get_by_name(ch, name)?;
        ch.link_del(name)
    }

    /// True if a VLAN sub-interface with this name exists.
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

    /// 802.1q id of this sub-interface.
    pub fn vlan_id(&self) -> u16 {
        self.iface.vlan_id.unwrap_or_default()
    }

    /// Kernel index of the parent link.
    pub fn parent_index(&self) -> Option<u32> {
        self.iface.link
    }
}

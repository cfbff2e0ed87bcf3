//! Bridge interface management
//!
//! Provides:
//! - Creation and deletion of bridge interfaces
//! - Adding/removing port interfaces
//! - Port enumeration, used to refuse deleting a still-wired bridge

use rtnetlink::LinkBridge;

use crate::error::{Error, Result};
use crate::link;
use crate::netlink::{Channel, IfKind, Iface};

/// A bridge interface
#[derive(Debug, Clone)]
pub struct Bridge {
    pub iface: Iface,
}

impl Bridge {
    /// Resolve a bridge by name. Fails `WrongKind` if the name belongs to a
    /// different interface kind.
    pub fn get_by_name(ch: &Channel, name: &str) -> Result<Self> {
        let iface = ch.link_by_name(name)?;
        if iface.kind != IfKind::Bridge {
            return Err(Error::WrongKind {
                name: name.to_string(),
                expected: IfKind::Bridge,
                actual: iface.kind,
            });
        }
        Ok(Self { iface })
    }

    /// Resolve a bridge by kernel index.
    pub fn get_by_index(ch: &Channel, index: u32) -> Result<Self> {
        let iface = ch.link_by_index(index)?;
        if iface.kind != IfKind::Bridge {
            return Err(Error::WrongKind {
                name: iface.name,
                expected: IfKind::Bridge,
                actual: iface.kind,
            });
        }
        Ok(Self { iface })
    }

    /// Create a bridge, optionally bringing it up.
    pub fn add(ch: &Channel, name: &str, bring_up: bool) -> Result<Self> {
        ch.link_add(LinkBridge::new(name).build(), name)?;
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

    /// Resolve a bridge, creating it (brought up) when absent.
    pub fn ensure(ch: &Channel, name: &str) -> Result<Self> {
        match Self::get_by_name(ch, name) {
            Ok(bridge) => Ok(bridge),
            Err(e) if e.is_not_found() => Self::add(ch, name, true),
            Err(e) => Err(e),
        }
    }

    /// Delete a bridge by name.
    pub fn delete(ch: &Channel, name: &str) -> Result<()> {
        Self::get_by_name(ch, name)?;
        ch.link_del(name)
    }

    /// True if a bridge with this name exists.
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

    pub fn up(&self, ch: &Channel) -> Result<()> {
        link::up(ch, self.name())
    }

    pub fn down(&self, ch: &Channel) -> Result<()> {
        link::down(ch, self.name())
    }

    /// Bind an interface as a port of this bridge.
    pub fn bind_port(&self, ch: &Channel, if_name: &str) -> Result<()> {
        link::bind(ch, self.name(), if_name)
    }

    /// Names of the interfaces currently bound to this bridge.
    pub fn ports(&self, ch: &Channel) -> Result<Vec<String>> {
        Ok(ch
            .links()?
            .into_iter()
            .filter(|l| l.master == Some(self.iface.index))
            .map(|l| l.name)
            .collect())
    }
}

/// Names of all bridge interfaces in the current namespace.
pub fn list(ch: &Channel) -> Result<Vec<String>> {
    Ok(ch
        .links()?
        .into_iter()
        .filter(|l| l.kind == IfKind::Bridge)
        .map(|l| l.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_exists_check() {
        let ch = Channel::new().unwrap();
        // lo exists but is not a bridge
        assert!(matches!(
            Bridge::get_by_name(&ch, "lo").unwrap_err(),
            Error::WrongKind { .. }
        ));
        // a random name should not exist
        assert!(!Bridge::exists(&ch, "nonexistent12345").unwrap());
    }
}

//! Generic interface operations
//!
//! Name-level operations that apply to any interface kind: administrative
//! state, renaming, master binding, address management, and namespace
//! relocation. The kind-specific accessors (veth, bridge, vrf, vlan) build
//! on these.

use std::os::fd::AsRawFd;

use ipnet::IpNet;
use rtnetlink::LinkUnspec;
use tracing::debug;

use crate::error::Result;
use crate::netlink::{Channel, Family};
use crate::netns;

/// Target namespace for an interface move
#[derive(Debug, Clone)]
pub enum NsTarget {
    /// Named, persistent namespace under /run/netns
    Name(String),
    /// Namespace owned by a process
    Pid(u32),
}

/// Ifindex of the named interface in the channel's namespace.
pub fn index_of(ch: &Channel, name: &str) -> Result<u32> {
    Ok(ch.link_by_name(name)?.index)
}

/// Name of the interface with the given ifindex.
pub fn name_of(ch: &Channel, index: u32) -> Result<String> {
    Ok(ch.link_by_index(index)?.name)
}

/// Bring an interface up.
pub fn up(ch: &Channel, name: &str) -> Result<()> {
    let iface = ch.link_by_name(name)?;
    ch.link_set(
        LinkUnspec::new_with_index(iface.index).up().build(),
        "link_up",
        name,
    )
}

/// Bring an interface down.
pub fn down(ch: &Channel, name: &str) -> Result<()> {
    let iface = ch.link_by_name(name)?;
    ch.link_set(
        LinkUnspec::new_with_index(iface.index).down().build(),
        "link_down",
        name,
    )
}

/// Administrative state of an interface.
pub fn is_up(ch: &Channel, name: &str) -> Result<bool> {
    Ok(ch.link_by_name(name)?.up)
}

/// Rename an interface. The kernel refuses to rename a running interface,
/// so a momentary down/up cycle happens around the rename; the interface is
/// brought back up even when the rename itself fails.
pub fn rename(ch: &Channel, old_name: &str, new_name: &str) -> Result<()> {
    let iface = ch.link_by_name(old_name)?;
    if iface.up {
        down(ch, old_name)?;
    }
    let renamed = ch.link_set(
        LinkUnspec::new_with_index(iface.index)
            .name(new_name.to_string())
            .build(),
        "link_rename",
        old_name,
    );
    if iface.up {
        let name = if renamed.is_ok() { new_name } else { old_name };
        up(ch, name)?;
    }
    renamed
}

/// Bind `subordinate` to `master` (bridge port or VRF member). Rebinding an
/// already-bound interface just changes the master.
pub fn bind(ch: &Channel, master: &str, subordinate: &str) -> Result<()> {
    let master_if = ch.link_by_name(master)?;
    let sub = ch.link_by_name(subordinate)?;
    ch.link_set(
        LinkUnspec::new_with_index(sub.index)
            .controller(master_if.index)
            .build(),
        "link_bind",
        subordinate,
    )
}

/// Clear the master association of an interface. A no-op when the interface
/// is already unbound.
pub fn unbind(ch: &Channel, subordinate: &str) -> Result<()> {
    let sub = ch.link_by_name(subordinate)?;
    ch.link_set(
        LinkUnspec::new_with_index(sub.index).nocontroller().build(),
        "link_unbind",
        subordinate,
    )
}

/// Add a prefix to an interface, optionally bringing it up. Fails
/// `AddressExists` when the exact prefix is already bound; idempotent setup
/// paths use [`addr_replace`] instead.
pub fn addr_add(ch: &Channel, name: &str, prefix: IpNet, bring_up: bool) -> Result<()> {
    ch.addr_add(name, prefix)?;
    if bring_up {
        up(ch, name)?;
    }
    Ok(())
}

/// Add-or-update a prefix on an interface, optionally bringing it up.
/// Succeeds whether or not the prefix was already present.
pub fn addr_replace(ch: &Channel, name: &str, prefix: IpNet, bring_up: bool) -> Result<()> {
    ch.addr_replace(name, prefix)?;
    if bring_up {
        up(ch, name)?;
    }
    Ok(())
}

/// Remove a prefix from an interface.
pub fn addr_del(ch: &Channel, name: &str, prefix: IpNet) -> Result<()> {
    ch.addr_del(name, prefix)
}

/// Unordered set of prefixes bound to an interface.
pub fn addr_list(ch: &Channel, name: &str, family: Family) -> Result<Vec<IpNet>> {
    ch.addr_list(name, family)
}

/// True if `prefix` is bound to `name`.
pub fn has_prefix(ch: &Channel, name: &str, prefix: IpNet) -> Result<bool> {
    Ok(addr_list(ch, name, Family::All)?.contains(&prefix))
}

/// Names of every interface visible in the channel's namespace.
pub fn list(ch: &Channel) -> Result<Vec<String>> {
    Ok(ch.links()?.into_iter().map(|l| l.name).collect())
}

/// Move an interface into a network namespace. After this returns the
/// interface is no longer resolvable by name through `ch`.
pub fn set_netns(ch: &Channel, name: &str, target: &NsTarget) -> Result<()> {
    let iface = ch.link_by_name(name)?;
    // The handle has to outlive the request: the message only carries the
    // raw descriptor.
    let (_handle, msg) = match target {
        NsTarget::Name(ns) => {
            let handle = netns::get(ns)?;
            let fd = handle.as_raw_fd();
            (
                Some(handle),
                LinkUnspec::new_with_index(iface.index)
                    .setns_by_fd(fd)
                    .build(),
            )
        }
        NsTarget::Pid(pid) => (
            None,
            LinkUnspec::new_with_index(iface.index)
                .setns_by_pid(*pid)
                .build(),
        ),
    };
    ch.link_set(msg, "link_set_netns", name)
}

/// Move an interface out of the named namespace back to the root namespace.
///
/// Switches the calling thread into `ns`, re-homes the interface to pid 1
/// (the root-namespace init process), and switches back. The switch-back
/// runs on every path. A failed move is recoverable and reported as such;
/// a failed switch-back is namespace-context loss, reported distinctly per
/// the rules of [`netns::with_netns`].
pub fn unset_netns(name: &str, ns: &str) -> Result<()> {
    debug!(iface = name, ns, "moving interface back to root namespace");
    netns::with_netns(ns, || {
        let ch = Channel::new()?;
        set_netns(&ch, name, &NsTarget::Pid(1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::veth::Veth;

    #[test]
    #[ignore = "requires root and CAP_NET_ADMIN"]
    fn test_address_add_and_replace_idempotence() {
        let ch = Channel::new().unwrap();
        Veth::add(&ch, "nrtest0", "nrtest1", true).unwrap();
        let prefix: IpNet = "192.168.77.1/24".parse().unwrap();

        // replace twice must succeed and leave exactly one instance
        addr_replace(&ch, "nrtest0", prefix, true).unwrap();
        addr_replace(&ch, "nrtest0", prefix, true).unwrap();
        let bound = addr_list(&ch, "nrtest0", Family::V4).unwrap();
        assert_eq!(bound.iter().filter(|p| **p == prefix).count(), 1);

        // add over the same prefix must classify as already-exists
        let err = addr_add(&ch, "nrtest0", prefix, false).unwrap_err();
        assert!(err.is_already_exists());

        addr_del(&ch, "nrtest0", prefix).unwrap();
        assert!(!has_prefix(&ch, "nrtest0", prefix).unwrap());
        Veth::delete(&ch, "nrtest0").unwrap();
    }
}

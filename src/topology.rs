//! Topology orchestration
//!
//! The build and teardown protocols that compose namespaces, veth pairs,
//! masters, addresses, and routes into a working topology. Neither protocol
//! keeps state between runs: every step re-reads the kernel and reconciles,
//! so both tolerate re-running against a partially existing topology.
//!
//! Build fails fast on the first fatal error and unwinds the objects it
//! created in this invocation (compensating actions in reverse order, their
//! own failures logged, never escalated). Teardown is the opposite: missing
//! objects count as success, step failures are logged and the protocol keeps
//! going, and only losing the caller's namespace context is fatal.
//!
//! Everything runs on the calling OS thread. Namespace switches and the
//! operations that depend on them are never handed to another thread, which
//! is what makes the enter/operate/restore discipline sound.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::link::{self, NsTarget};
use crate::netlink::Channel;
use crate::netns;
use crate::route::{self, Route};
use crate::veth::Veth;
use crate::vrf::Vrf;

/// Kind of master object an endpoint can be bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterKind {
    Bridge,
    Vrf { table: u32 },
}

/// A bridge or VRF that endpoints bind to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Master {
    pub name: String,
    pub kind: MasterKind,
}

/// One endpoint of a veth link: where it goes and what it carries.
///
/// An endpoint is placed either in a namespace or under a master, never
/// both, since a root-namespace process cannot bind an interface that lives in
/// another namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub namespace: Option<String>,
    pub master: Option<String>,
    pub address: Option<IpNet>,
}

impl Endpoint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            master: None,
            address: None,
        }
    }

    pub fn in_namespace(mut self, ns: &str) -> Self {
        self.namespace = Some(ns.to_string());
        self
    }

    pub fn bound_to(mut self, master: &str) -> Self {
        self.master = Some(master.to_string());
        self
    }

    pub fn with_address(mut self, prefix: IpNet) -> Self {
        self.address = Some(prefix);
        self
    }
}

/// A veth pair and the placement of its two endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethLink {
    pub a: Endpoint,
    pub b: Endpoint,
}

/// A route the topology installs once its interfaces are wired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub destination: IpNet,
    pub via: Vec<IpAddr>,
    /// Install into this VRF's table; `None` targets the main table
    pub vrf: Option<String>,
    pub onlink: bool,
}

/// Declarative description of a multi-namespace topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub name: String,
    pub namespaces: Vec<String>,
    pub masters: Vec<Master>,
    pub links: Vec<VethLink>,
    pub routes: Vec<RouteSpec>,
}

/// Observed condition of a topology's kernel objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyState {
    Absent,
    PartiallyBuilt,
    Built,
}

/// Compensating action recorded while building
#[derive(Debug)]
enum Undo {
    DeleteVeth(String),
    DeleteNamespace(String),
    DeleteMaster(String),
}

impl Topology {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespaces: Vec::new(),
            masters: Vec::new(),
            links: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// The dual-namespace reference topology: `ns1` and `ns2` joined by the
    /// veth pair `ns1-ns2`/`ns2-ns1` with one /24 address on each side.
    pub fn dual_ns() -> Self {
        Self {
            name: "dual-ns".to_string(),
            namespaces: vec!["ns1".to_string(), "ns2".to_string()],
            masters: Vec::new(),
            links: vec![VethLink {
                a: Endpoint::new("ns1-ns2")
                    .in_namespace("ns1")
                    .with_address(literal_prefix("192.168.1.1/24")),
                b: Endpoint::new("ns2-ns1")
                    .in_namespace("ns2")
                    .with_address(literal_prefix("192.168.1.2/24")),
            }],
            routes: Vec::new(),
        }
    }

    /// The bridge fan-out reference topology: bridge `br1` wired to VRF
    /// `vrf1` (table 10) through two veth pairs, addresses on the VRF legs.
    pub fn bridge_fanout() -> Self {
        Self {
            name: "bridge-fanout".to_string(),
            namespaces: Vec::new(),
            masters: vec![
                Master {
                    name: "br1".to_string(),
                    kind: MasterKind::Bridge,
                },
                Master {
                    name: "vrf1".to_string(),
                    kind: MasterKind::Vrf { table: 10 },
                },
            ],
            links: vec![
                VethLink {
                    a: Endpoint::new("vrf1-a")
                        .bound_to("vrf1")
                        .with_address(literal_prefix("192.168.1.1/24")),
                    b: Endpoint::new("br1-a").bound_to("br1"),
                },
                VethLink {
                    a: Endpoint::new("vrf1-b")
                        .bound_to("vrf1")
                        .with_address(literal_prefix("192.168.1.2/24")),
                    b: Endpoint::new("br1-b").bound_to("br1"),
                },
            ],
            routes: Vec::new(),
        }
    }

    fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.links.iter().flat_map(|l| [&l.a, &l.b])
    }

    /// Check internal consistency: unique names and resolvable references.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for ns in &self.namespaces {
            if !names.insert(ns.as_str()) {
                return Err(Error::ConfigValidation(format!(
                    "duplicate namespace '{ns}'"
                )));
            }
        }
        let mut master_names = HashSet::new();
        for m in &self.masters {
            if !master_names.insert(m.name.as_str()) {
                return Err(Error::ConfigValidation(format!(
                    "duplicate master '{}'",
                    m.name
                )));
            }
        }
        let mut endpoint_names = HashSet::new();
        for ep in self.endpoints() {
            if !endpoint_names.insert(ep.name.as_str()) {
                return Err(Error::ConfigValidation(format!(
                    "duplicate endpoint '{}'",
                    ep.name
                )));
            }
            if ep.master.is_some() && ep.namespace.is_some() {
                return Err(Error::ConfigValidation(format!(
                    "endpoint '{}' declares both a master and a namespace",
                    ep.name
                )));
            }
            if let Some(master) = &ep.master {
                if !master_names.contains(master.as_str()) {
                    return Err(Error::ConfigValidation(format!(
                        "endpoint '{}' references unknown master '{master}'",
                        ep.name
                    )));
                }
            }
            if let Some(ns) = &ep.namespace {
                if !self.namespaces.iter().any(|n| n == ns) {
                    return Err(Error::ConfigValidation(format!(
                        "endpoint '{}' references unknown namespace '{ns}'",
                        ep.name
                    )));
                }
            }
        }
        for r in &self.routes {
            if r.via.is_empty() {
                return Err(Error::EmptyNextHops(r.destination));
            }
            if let Some(vrf) = &r.vrf {
                let is_vrf = self
                    .masters
                    .iter()
                    .any(|m| &m.name == vrf && matches!(m.kind, MasterKind::Vrf { .. }));
                if !is_vrf {
                    return Err(Error::ConfigValidation(format!(
                        "route to {} references unknown VRF '{vrf}'",
                        r.destination
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the topology, reconciling each step against live kernel state.
    ///
    /// `ch` must be a channel opened in the namespace the caller wants the
    /// root-side objects in. On a fatal error the objects created by this
    /// invocation are unwound best-effort before the error is returned.
    pub fn build(&self, ch: &Channel) -> Result<()> {
        self.validate()?;
        info!(topology = %self.name, "building topology");
        let mut undo: Vec<Undo> = Vec::new();

        // Masters first: endpoints bind to them later.
        for m in &self.masters {
            if let Err(e) = self.ensure_master(ch, m, &mut undo) {
                return self.fail(ch, undo, e);
            }
        }

        // Veth pairs. A pair counts as present when either endpoint
        // resolves, in the root namespace or in its declared target
        // namespace. That is what makes a re-run after relocation a no-op.
        for l in &self.links {
            match self.pair_present(ch, l) {
                Ok(true) => debug!(pair = %l.a.name, "veth pair already present"),
                Ok(false) => {
                    if let Err(e) = Veth::add(ch, &l.a.name, &l.b.name, true) {
                        return self.fail(ch, undo, e);
                    }
                    debug!(pair = %l.a.name, peer = %l.b.name, "veth pair created");
                    undo.push(Undo::DeleteVeth(l.a.name.clone()));
                }
                Err(e) => return self.fail(ch, undo, e),
            }
        }

        // Namespaces, so relocation targets exist.
        for ns in &self.namespaces {
            match netns::add(ns) {
                Ok(_) => {
                    debug!(ns = %ns, "namespace created");
                    undo.push(Undo::DeleteNamespace(ns.clone()));
                }
                Err(e) if e.is_already_exists() => debug!(ns = %ns, "namespace already present"),
                Err(e) => return self.fail(ch, undo, e),
            }
        }

        // Relocate endpoints into their namespaces.
        for ep in self.endpoints() {
            let Some(ns) = &ep.namespace else { continue };
            match link::set_netns(ch, &ep.name, &NsTarget::Name(ns.clone())) {
                Ok(()) => debug!(iface = %ep.name, ns = %ns, "endpoint moved into namespace"),
                Err(e) if e.is_not_found() => {
                    // Gone from the root namespace: either a previous run
                    // moved it already, or it truly does not exist.
                    match in_namespace(ns, &ep.name) {
                        Ok(true) => debug!(iface = %ep.name, ns = %ns, "endpoint already in namespace"),
                        Ok(false) => return self.fail(ch, undo, e),
                        Err(probe) => return self.fail(ch, undo, probe),
                    }
                }
                Err(e) => return self.fail(ch, undo, e),
            }
        }

        // Bind root-side endpoints to their masters. Rebinding is implicit
        // unbind-and-bind, so this is safe to repeat.
        for ep in self.endpoints() {
            let Some(master) = &ep.master else { continue };
            if let Err(e) = link::bind(ch, master, &ep.name) {
                warn!(iface = %ep.name, master = %master, error = %e, "bind failed");
                return self.fail(ch, undo, e);
            }
            debug!(iface = %ep.name, master = %master, "endpoint bound");
        }

        // Per-namespace configuration: loopback up (best-effort), then
        // addresses. Replace, never add: an exact re-run must not fail.
        for ns in &self.namespaces {
            let result = netns::with_netns(ns, || {
                let nsch = Channel::new()?;
                if let Err(e) = link::up(&nsch, "lo") {
                    warn!(ns = %ns, error = %e, "failed to bring up loopback");
                }
                for ep in self.endpoints() {
                    if ep.namespace.as_deref() != Some(ns.as_str()) {
                        continue;
                    }
                    let Some(prefix) = ep.address else { continue };
                    match link::addr_replace(&nsch, &ep.name, prefix, true) {
                        Ok(()) => debug!(iface = %ep.name, %prefix, "address configured"),
                        Err(e) if e.is_already_exists() => {
                            debug!(iface = %ep.name, %prefix, "address already bound")
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            });
            if let Err(e) = result {
                return self.fail(ch, undo, e);
            }
        }

        // Root-namespace addresses.
        for ep in self.endpoints() {
            if ep.namespace.is_some() {
                continue;
            }
            let Some(prefix) = ep.address else { continue };
            match link::addr_replace(ch, &ep.name, prefix, true) {
                Ok(()) => debug!(iface = %ep.name, %prefix, "address configured"),
                Err(e) if e.is_already_exists() => {
                    debug!(iface = %ep.name, %prefix, "address already bound")
                }
                Err(e) => return self.fail(ch, undo, e),
            }
        }

        // Routes last, once every interface they depend on is up.
        for spec in &self.routes {
            if let Err(e) = self.install_route(ch, spec) {
                return self.fail(ch, undo, e);
            }
        }

        info!(topology = %self.name, "build complete");
        Ok(())
    }

    fn ensure_master(&self, ch: &Channel, m: &Master, undo: &mut Vec<Undo>) -> Result<()> {
        match &m.kind {
            MasterKind::Bridge => match Bridge::get_by_name(ch, &m.name) {
                Ok(_) => {
                    debug!(bridge = %m.name, "bridge already present");
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    Bridge::add(ch, &m.name, true)?;
                    debug!(bridge = %m.name, "bridge created");
                    undo.push(Undo::DeleteMaster(m.name.clone()));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            MasterKind::Vrf { table } => match Vrf::get_by_name(ch, &m.name) {
                Ok(vrf) => {
                    debug!(vrf = %m.name, table = vrf.table(), "vrf already present");
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    Vrf::add(ch, &m.name, *table, true)?;
                    debug!(vrf = %m.name, table, "vrf created");
                    undo.push(Undo::DeleteMaster(m.name.clone()));
                    Ok(())
                }
                Err(e) => Err(e),
            },
        }
    }

    fn pair_present(&self, ch: &Channel, l: &VethLink) -> Result<bool> {
        for ep in [&l.a, &l.b] {
            match Veth::exists(ch, &ep.name) {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    if let Some(ns) = &ep.namespace {
                        if netns::exists(ns) && in_namespace(ns, &ep.name)? {
                            return Ok(true);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn install_route(&self, ch: &Channel, spec: &RouteSpec) -> Result<()> {
        let mut r = Route::build(spec.destination, &spec.via)?;
        if spec.onlink {
            route::set_onlink(&mut r);
        }
        let table = match &spec.vrf {
            Some(vrf) => Vrf::get_by_name(ch, vrf)?.table(),
            None => 0,
        };
        r.replace(ch, table)?;
        debug!(destination = %spec.destination, table, "route installed");
        Ok(())
    }

    /// Unwind the undo stack and surface the original cause.
    fn fail(&self, ch: &Channel, mut undo: Vec<Undo>, cause: Error) -> Result<()> {
        if !undo.is_empty() {
            warn!(topology = %self.name, error = %cause, "build failed, rolling back created objects");
            while let Some(action) = undo.pop() {
                let outcome = match &action {
                    Undo::DeleteVeth(name) => Veth::delete(ch, name),
                    Undo::DeleteNamespace(name) => netns::delete(name),
                    Undo::DeleteMaster(name) => ch.link_del(name),
                };
                match outcome {
                    Ok(()) => debug!(?action, "rolled back"),
                    Err(e) if e.is_not_found() => debug!(?action, "already gone"),
                    Err(e) => warn!(?action, error = %e, "rollback step failed"),
                }
            }
        }
        Err(cause)
    }

    /// Tear the topology down, making maximum forward progress.
    ///
    /// Every step treats a missing object as done and logs (rather than
    /// propagates) other failures; the protocol only aborts when the
    /// calling thread's namespace context cannot be restored.
    pub fn teardown(&self, ch: &Channel) -> Result<()> {
        info!(topology = %self.name, "tearing down topology");

        // Unbind endpoints from their masters before the masters go away.
        for ep in self.endpoints() {
            let Some(master) = &ep.master else { continue };
            match link::unbind(ch, &ep.name) {
                Ok(()) => debug!(iface = %ep.name, master = %master, "endpoint unbound"),
                Err(e) if e.is_not_found() => debug!(iface = %ep.name, "already gone"),
                Err(e) => warn!(iface = %ep.name, error = %e, "unbind failed"),
            }
        }

        // Pull endpoints back into the root namespace so the later veth
        // delete can find them.
        for ep in self.endpoints() {
            let Some(ns) = &ep.namespace else { continue };
            if !netns::exists(ns) {
                debug!(ns = %ns, "namespace already gone");
                continue;
            }
            match link::unset_netns(&ep.name, ns) {
                Ok(()) => debug!(iface = %ep.name, ns = %ns, "endpoint moved back"),
                Err(e @ Error::NamespaceContextLost { .. }) => return Err(e),
                Err(e) if e.is_not_found() => debug!(iface = %ep.name, "not in namespace"),
                Err(e) => warn!(iface = %ep.name, ns = %ns, error = %e, "move-back failed"),
            }
        }

        // Main-table routes; VRF-scoped routes disappear with their VRF.
        for spec in &self.routes {
            if spec.vrf.is_some() {
                continue;
            }
            match Route::build(spec.destination, &spec.via)
                .and_then(|r| r.remove(ch, 0))
            {
                Ok(()) => debug!(destination = %spec.destination, "route removed"),
                Err(e) if e.is_not_found() => debug!(destination = %spec.destination, "route already gone"),
                Err(e) => warn!(destination = %spec.destination, error = %e, "route removal failed"),
            }
        }

        for l in &self.links {
            match Veth::delete(ch, &l.a.name) {
                Ok(()) => debug!(pair = %l.a.name, "veth pair deleted"),
                Err(e) if e.is_not_found() => debug!(pair = %l.a.name, "veth pair already gone"),
                Err(e) => warn!(pair = %l.a.name, error = %e, "veth delete failed"),
            }
        }

        for ns in &self.namespaces {
            match netns::delete(ns) {
                Ok(()) => debug!(ns = %ns, "namespace deleted"),
                Err(e) if e.is_not_found() => debug!(ns = %ns, "namespace already gone"),
                Err(e) => warn!(ns = %ns, error = %e, "namespace delete failed"),
            }
        }

        // Masters last, VRFs before bridges. A master that still has ports
        // bound (ports this topology does not know about) is left alone
        // and reported, rather than yanked out from under foreign wiring.
        for m in self.masters_in_delete_order() {
            match self.delete_master(ch, m) {
                Ok(()) => debug!(master = %m.name, "master deleted"),
                Err(e) if e.is_not_found() => debug!(master = %m.name, "master already gone"),
                Err(e) => warn!(master = %m.name, error = %e, "master delete failed"),
            }
        }

        info!(topology = %self.name, "teardown complete");
        Ok(())
    }

    fn masters_in_delete_order(&self) -> Vec<&Master> {
        let vrfs = self
            .masters
            .iter()
            .filter(|m| matches!(m.kind, MasterKind::Vrf { .. }));
        let bridges = self
            .masters
            .iter()
            .filter(|m| matches!(m.kind, MasterKind::Bridge));
        vrfs.chain(bridges).collect()
    }

    fn delete_master(&self, ch: &Channel, m: &Master) -> Result<()> {
        let ports = match m.kind {
            MasterKind::Bridge => Bridge::get_by_name(ch, &m.name)?.ports(ch)?,
            MasterKind::Vrf { .. } => Vrf::get_by_name(ch, &m.name)?.ports(ch)?,
        };
        if !ports.is_empty() {
            return Err(Error::MasterHasPorts {
                master: m.name.clone(),
                ports,
            });
        }
        ch.link_del(&m.name)
    }

    /// Probe live kernel state and classify it.
    pub fn state(&self, ch: &Channel) -> Result<TopologyState> {
        let mut present = 0usize;
        let mut total = 0usize;

        for m in &self.masters {
            total += 1;
            let found = match m.kind {
                MasterKind::Bridge => Bridge::exists(ch, &m.name)?,
                MasterKind::Vrf { .. } => Vrf::exists(ch, &m.name)?,
            };
            if found {
                present += 1;
            }
        }
        for ns in &self.namespaces {
            total += 1;
            if netns::exists(ns) {
                present += 1;
            }
        }
        for l in &self.links {
            total += 1;
            if self.pair_present(ch, l)? {
                present += 1;
            }
        }
        Ok(classify(present, total))
    }
}

/// Whether a veth endpoint with this name exists inside the namespace.
fn in_namespace(ns: &str, if_name: &str) -> Result<bool> {
    netns::with_netns(ns, || {
        let nsch = Channel::new()?;
        Veth::exists(&nsch, if_name)
    })
}

fn classify(present: usize, total: usize) -> TopologyState {
    if present == 0 && total > 0 {
        TopologyState::Absent
    } else if present == total {
        TopologyState::Built
    } else {
        TopologyState::PartiallyBuilt
    }
}

fn literal_prefix(s: &str) -> IpNet {
    s.parse().expect("static prefix literal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_topologies_validate() {
        Topology::dual_ns().validate().unwrap();
        Topology::bridge_fanout().validate().unwrap();
    }

    #[test]
    fn test_dual_ns_shape() {
        let t = Topology::dual_ns();
        assert_eq!(t.namespaces, vec!["ns1", "ns2"]);
        assert_eq!(t.links.len(), 1);
        let l = &t.links[0];
        assert_eq!(l.a.name, "ns1-ns2");
        assert_eq!(l.a.namespace.as_deref(), Some("ns1"));
        assert_eq!(l.b.name, "ns2-ns1");
        assert_eq!(
            l.a.address,
            Some("192.168.1.1/24".parse().unwrap())
        );
    }

    #[test]
    fn test_bridge_fanout_shape() {
        let t = Topology::bridge_fanout();
        assert_eq!(t.masters.len(), 2);
        assert!(t
            .masters
            .iter()
            .any(|m| m.name == "vrf1" && m.kind == MasterKind::Vrf { table: 10 }));
        // VRF-side legs carry the addresses, bridge-side legs carry none.
        for l in &t.links {
            assert!(l.a.address.is_some());
            assert!(l.b.address.is_none());
            assert_eq!(l.a.master.as_deref(), Some("vrf1"));
            assert_eq!(l.b.master.as_deref(), Some("br1"));
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_endpoints() {
        let mut t = Topology::dual_ns();
        let link = t.links[0].clone();
        t.links.push(link);
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_master() {
        let mut t = Topology::new("t");
        t.links.push(VethLink {
            a: Endpoint::new("a0").bound_to("nosuch"),
            b: Endpoint::new("b0"),
        });
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_namespace() {
        let mut t = Topology::new("t");
        t.links.push(VethLink {
            a: Endpoint::new("a0").in_namespace("nosuch"),
            b: Endpoint::new("b0"),
        });
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_validate_rejects_master_and_namespace() {
        let mut t = Topology::new("t");
        t.namespaces.push("ns1".to_string());
        t.masters.push(Master {
            name: "br0".to_string(),
            kind: MasterKind::Bridge,
        });
        t.links.push(VethLink {
            a: Endpoint::new("a0").in_namespace("ns1").bound_to("br0"),
            b: Endpoint::new("b0"),
        });
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_validate_rejects_empty_route_next_hops() {
        let mut t = Topology::new("t");
        t.routes.push(RouteSpec {
            destination: "10.0.0.0/8".parse().unwrap(),
            via: Vec::new(),
            vrf: None,
            onlink: false,
        });
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::EmptyNextHops(_)
        ));
    }

    #[test]
    fn test_validate_rejects_route_into_non_vrf() {
        let mut t = Topology::new("t");
        t.masters.push(Master {
            name: "br0".to_string(),
            kind: MasterKind::Bridge,
        });
        t.routes.push(RouteSpec {
            destination: "10.0.0.0/8".parse().unwrap(),
            via: vec!["192.168.1.1".parse().unwrap()],
            vrf: Some("br0".to_string()),
            onlink: false,
        });
        assert!(matches!(
            t.validate().unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_masters_delete_vrfs_before_bridges() {
        let t = Topology::bridge_fanout();
        let order: Vec<&str> = t
            .masters_in_delete_order()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(order, vec!["vrf1", "br1"]);
    }

    #[test]
    fn test_state_classification() {
        assert_eq!(classify(0, 3), TopologyState::Absent);
        assert_eq!(classify(3, 3), TopologyState::Built);
        assert_eq!(classify(1, 3), TopologyState::PartiallyBuilt);
        // an empty topology has nothing missing
        assert_eq!(classify(0, 0), TopologyState::Built);
    }

    #[test]
    #[ignore = "requires root and CAP_NET_ADMIN"]
    fn test_dual_ns_build_teardown_roundtrip() {
        let ch = Channel::new().unwrap();
        let t = Topology::dual_ns();
        let before = link::list(&ch).unwrap();

        t.build(&ch).unwrap();
        assert!(netns::exists("ns1"));
        assert!(netns::exists("ns2"));
        let inside = netns::with_netns("ns1", || {
            let nsch = Channel::new()?;
            let addrs = link::addr_list(&nsch, "ns1-ns2", crate::netlink::Family::V4)?;
            let lo_up = link::is_up(&nsch, "lo")?;
            Ok((addrs, lo_up))
        })
        .unwrap();
        assert_eq!(inside.0, vec!["192.168.1.1/24".parse().unwrap()]);
        assert!(inside.1);

        // Build must be idempotent.
        t.build(&ch).unwrap();
        assert_eq!(t.state(&ch).unwrap(), TopologyState::Built);

        t.teardown(&ch).unwrap();
        assert!(!netns::exists("ns1"));
        assert!(!netns::exists("ns2"));
        assert_eq!(t.state(&ch).unwrap(), TopologyState::Absent);
        // Teardown must be idempotent too.
        t.teardown(&ch).unwrap();

        let after = link::list(&ch).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    #[ignore = "requires root and CAP_NET_ADMIN"]
    fn test_bridge_fanout_build_teardown_roundtrip() {
        let ch = Channel::new().unwrap();
        let t = Topology::bridge_fanout();

        t.build(&ch).unwrap();
        assert!(Bridge::exists(&ch, "br1").unwrap());
        let vrf = Vrf::get_by_name(&ch, "vrf1").unwrap();
        assert_eq!(vrf.table(), 10);
        let mut ports = vrf.ports(&ch).unwrap();
        ports.sort();
        assert_eq!(ports, vec!["vrf1-a", "vrf1-b"]);
        assert!(link::has_prefix(&ch, "vrf1-a", "192.168.1.1/24".parse().unwrap()).unwrap());

        t.teardown(&ch).unwrap();
        assert!(!Bridge::exists(&ch, "br1").unwrap());
        assert!(!Vrf::exists(&ch, "vrf1").unwrap());
        assert!(!Veth::exists(&ch, "vrf1-a").unwrap());
        assert!(!Veth::exists(&ch, "br1-a").unwrap());
    }
}

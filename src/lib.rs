//! netrig: declarative management of Linux network-object primitives
//!
//! A thin, typed layer over veth pairs, bridges, VRFs, VLAN sub-interfaces,
//! IP addresses, routes, and network-namespace membership, plus an
//! idempotent topology orchestrator that composes them. Intended for small
//! orchestration scripts that stand up and tear down multi-namespace
//! topologies, and for the `netrig` CLI.
//!
//! All state lives in the kernel: nothing is persisted, every run
//! reconciles against what is actually there. The API is synchronous and
//! single-threaded by design; namespace membership is a per-OS-thread
//! attribute, and every operation here stays on the calling thread.
//!
//! Concurrent callers against the same topology are not supported; wrap
//! calls in external mutual exclusion if you need that.

pub mod bridge;
pub mod config;
pub mod error;
pub mod link;
pub mod netlink;
pub mod netns;
pub mod route;
pub mod topology;
pub mod veth;
pub mod vlan;
pub mod vrf;

pub use bridge::Bridge;
pub use error::{Error, Result};
pub use netlink::{Channel, Family, IfKind, Iface};
pub use route::{NextHop, Route};
pub use topology::{Topology, TopologyState};
pub use veth::Veth;
pub use vlan::Vlan;
pub use vrf::Vrf;

//! Unified error types for netrig

use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use thiserror::Error;

use crate::netlink::IfKind;

/// Main error type for netrig operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read topology file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse topology file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Topology validation failed: {0}")]
    ConfigValidation(String),

    // Kernel channel errors
    #[error("Failed to open netlink channel: {0}")]
    ChannelSetup(io::Error),

    #[error("{op}({target}): {source}")]
    Netlink {
        op: &'static str,
        target: String,
        source: rtnetlink::Error,
    },

    #[error("{op} failed: {source}")]
    Sys {
        op: &'static str,
        source: nix::errno::Errno,
    },

    // Classified kernel conditions: the idempotence branches of the
    // build/teardown protocols dispatch on these, never on error text.
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Interface '{0}' already exists")]
    InterfaceExists(String),

    #[error("Address {prefix} not found on '{link}'")]
    AddressNotFound { link: String, prefix: IpNet },

    #[error("Address {prefix} already bound to '{link}'")]
    AddressExists { link: String, prefix: IpNet },

    #[error("Route to {0} not found")]
    RouteNotFound(IpNet),

    #[error("Route to {0} already exists")]
    RouteExists(IpNet),

    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Namespace '{0}' already exists")]
    NamespaceExists(String),

    // Always-fatal conditions
    #[error("'{name}' is a {actual} interface, not {expected}")]
    WrongKind {
        name: String,
        expected: IfKind,
        actual: IfKind,
    },

    #[error("Route to {0} has no next-hops")]
    EmptyNextHops(IpNet),

    #[error("Gateway {gateway} does not match the address family of {destination}")]
    FamilyMismatch {
        destination: IpNet,
        gateway: IpAddr,
    },

    #[error("Master '{master}' still has bound ports: {}", .ports.join(", "))]
    MasterHasPorts { master: String, ports: Vec<String> },

    #[error("Interface '{name}' was created but could not be brought up: {source}")]
    BringUp {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to restore the original network namespace: {source}")]
    NamespaceContextLost { source: nix::errno::Errno },
}

impl Error {
    /// True for the "object is absent" family of conditions. The build
    /// protocol branches to creation on these; teardown treats them as
    /// already-done.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::InterfaceNotFound(_)
                | Error::AddressNotFound { .. }
                | Error::RouteNotFound(_)
                | Error::NamespaceNotFound(_)
        )
    }

    /// True for the "object is already present" family of conditions,
    /// expected on idempotent re-runs of the build protocol.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::InterfaceExists(_)
                | Error::AddressExists { .. }
                | Error::RouteExists(_)
                | Error::NamespaceExists(_)
        )
    }

    /// Failures that make the whole invocation unrecoverable: bad input,
    /// no channel, or a thread stranded in the wrong namespace. The CLI
    /// exits non-zero for these and only these.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            Error::ConfigRead { .. }
                | Error::ConfigParse(_)
                | Error::ConfigValidation(_)
                | Error::ChannelSetup(_)
                | Error::NamespaceContextLost { .. }
        )
    }
}

/// Result type alias for netrig operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_predicates() {
        let e = Error::InterfaceNotFound("veth0".into());
        assert!(e.is_not_found());
        assert!(!e.is_already_exists());

        let e = Error::NamespaceExists("ns1".into());
        assert!(e.is_already_exists());
        assert!(!e.is_not_found());

        let e = Error::NamespaceContextLost {
            source: nix::errno::Errno::EPERM,
        };
        assert!(e.is_fatal_setup());
        assert!(!e.is_not_found());
    }

    #[test]
    fn test_wrong_kind_is_always_fatal() {
        let e = Error::WrongKind {
            name: "br0".into(),
            expected: IfKind::Vrf,
            actual: IfKind::Bridge,
        };
        assert!(!e.is_not_found());
        assert!(!e.is_already_exists());
        assert!(!e.is_fatal_setup());
    }
}

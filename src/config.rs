//! Topology file loading
//!
//! Topologies are declared in TOML and validated into a [`Topology`]:
//!
//! ```toml
//! name = "demo"
//! namespaces = ["ns1", "ns2"]
//!
//! [[bridges]]
//! name = "br1"
//!
//! [[vrfs]]
//! name = "vrf1"
//! table = 10
//!
//! [[links]]
//! a = { name = "ns1-ns2", namespace = "ns1", address = "192.168.1.1/24" }
//! b = { name = "ns2-ns1", namespace = "ns2", address = "192.168.1.2/24" }
//!
//! [[routes]]
//! destination = "10.0.0.0/8"
//! via = ["192.168.1.2"]
//! vrf = "vrf1"
//! onlink = true
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::topology::{Endpoint, Master, MasterKind, RouteSpec, Topology, VethLink};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TopologyFile {
    name: String,
    #[serde(default)]
    namespaces: Vec<String>,
    #[serde(default)]
    bridges: Vec<BridgeSection>,
    #[serde(default)]
    vrfs: Vec<VrfSection>,
    #[serde(default)]
    links: Vec<LinkSection>,
    #[serde(default)]
    routes: Vec<RouteSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeSection {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VrfSection {
    name: String,
    table: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkSection {
    a: EndpointSection,
    b: EndpointSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointSection {
    name: String,
    namespace: Option<String>,
    master: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteSection {
    destination: String,
    via: Vec<String>,
    vrf: Option<String>,
    #[serde(default)]
    onlink: bool,
}

/// Load and validate a topology file.
pub fn load(path: &Path) -> Result<Topology> {
    let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parse and validate topology TOML.
pub fn parse(text: &str) -> Result<Topology> {
    let file: TopologyFile = toml::from_str(text)?;
    let topology = file.into_topology()?;
    topology.validate()?;
    Ok(topology)
}

impl TopologyFile {
    fn into_topology(self) -> Result<Topology> {
        let mut masters = Vec::new();
        for b in self.bridges {
            masters.push(Master {
                name: b.name,
                kind: MasterKind::Bridge,
            });
        }
        for v in self.vrfs {
            masters.push(Master {
                name: v.name,
                kind: MasterKind::Vrf { table: v.table },
            });
        }

        let mut links = Vec::new();
        for l in self.links {
            links.push(VethLink {
                a: l.a.into_endpoint()?,
                b: l.b.into_endpoint()?,
            });
        }

        let mut routes = Vec::new();
        for r in self.routes {
            let destination = r.destination.parse().map_err(|_| {
                Error::ConfigValidation(format!("bad destination prefix '{}'", r.destination))
            })?;
            let mut via = Vec::new();
            for gw in &r.via {
                via.push(gw.parse().map_err(|_| {
                    Error::ConfigValidation(format!("bad gateway address '{gw}'"))
                })?);
            }
            routes.push(RouteSpec {
                destination,
                via,
                vrf: r.vrf,
                onlink: r.onlink,
            });
        }

        Ok(Topology {
            name: self.name,
            namespaces: self.namespaces,
            masters,
            links,
            routes,
        })
    }
}

impl EndpointSection {
    fn into_endpoint(self) -> Result<Endpoint> {
        let address = match self.address {
            Some(text) => Some(text.parse().map_err(|_| {
                Error::ConfigValidation(format!(
                    "bad address '{text}' on endpoint '{}'",
                    self.name
                ))
            })?),
            None => None,
        };
        Ok(Endpoint {
            name: self.name,
            namespace: self.namespace,
            master: self.master,
            address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "demo"
namespaces = ["ns1", "ns2"]

[[links]]
a = { name = "ns1-ns2", namespace = "ns1", address = "192.168.1.1/24" }
b = { name = "ns2-ns1", namespace = "ns2", address = "192.168.1.2/24" }
"#;

    const FANOUT: &str = r#"
name = "fanout"

[[bridges]]
name = "br1"

[[vrfs]]
name = "vrf1"
table = 10

[[links]]
a = { name = "vrf1-a", master = "vrf1", address = "192.168.1.1/24" }
b = { name = "br1-a", master = "br1" }

[[routes]]
destination = "10.0.0.0/8"
via = ["192.168.1.2"]
vrf = "vrf1"
onlink = true
"#;

    #[test]
    fn test_parses_dual_namespace_topology() {
        let t = parse(SAMPLE).unwrap();
        assert_eq!(t.name, "demo");
        assert_eq!(t.namespaces, vec!["ns1", "ns2"]);
        assert_eq!(t.links.len(), 1);
        assert_eq!(
            t.links[0].a.address,
            Some("192.168.1.1/24".parse().unwrap())
        );
    }

    #[test]
    fn test_parses_fanout_topology() {
        let t = parse(FANOUT).unwrap();
        assert_eq!(t.masters.len(), 2);
        assert!(t
            .masters
            .iter()
            .any(|m| m.kind == MasterKind::Vrf { table: 10 }));
        assert_eq!(t.routes.len(), 1);
        assert!(t.routes[0].onlink);
        assert_eq!(t.routes[0].vrf.as_deref(), Some("vrf1"));
    }

    #[test]
    fn test_rejects_bad_address() {
        let text = SAMPLE.replace("192.168.1.1/24", "not-a-prefix");
        assert!(matches!(
            parse(&text).unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_rejects_unknown_master_reference() {
        let text = r#"
name = "broken"

[[links]]
a = { name = "a0", master = "missing" }
b = { name = "b0" }
"#;
        assert!(matches!(
            parse(text).unwrap_err(),
            Error::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let text = format!("{SAMPLE}\nbogus = true\n");
        assert!(matches!(parse(&text).unwrap_err(), Error::ConfigParse(_)));
    }
}

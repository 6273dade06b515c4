//! Expansion of link shorthands (`spine:swp1 -- leaf:swp21`) into concrete
//! point-to-point links.
//!
//! With N hosts behind the left name and M behind the right one, the left
//! base port grows into a range of M ports and the right one into a range of
//! N ports. Left host `i` and right host `j` are joined by left port `j` and
//! right port `i`.

use indexmap::IndexMap;
use serde::Serialize;

use crate::errors::{FabricError, Result};
use crate::inventory::{require_group, require_hosts, Inventory};
use crate::models::LinkSpec;
use crate::utils::range::{self, natural_cmp, natural_sort};

/// One end of a resolved link, seen from `host`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkNode {
    pub host: String,
    pub interface: String,
    pub neighbor: String,
    pub ngroup: String,
    pub ninterface: String,
}

/// Links of one collection: natural-ordered ids plus both endpoints per id
#[derive(Debug, Clone, Default)]
pub struct ResolvedLinks {
    nodes: IndexMap<String, [LinkNode; 2]>,
}

impl ResolvedLinks {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Both endpoints of one link
    pub fn nodes(&self, id: &str) -> Option<&[LinkNode; 2]> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LinkNode; 2])> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A shorthand after inventory lookup
#[derive(Debug, Clone)]
struct Expansion {
    shorthand: String,
    dev_a: String,
    dev_b: String,
    hosts_a: Vec<String>,
    ports_a: Vec<String>,
    hosts_b: Vec<String>,
    ports_b: Vec<String>,
}

/// Split `devA:portA -- devB:portB`
fn parse_shorthand(shorthand: &str) -> Result<(String, String, String, String)> {
    let malformed = || {
        FabricError::invalid_topology(format!(
            "malformed link '{}', expected 'name:port -- name:port'",
            shorthand
        ))
    };

    let sides: Vec<&str> = shorthand.split("--").map(str::trim).collect();
    let [a, b] = sides.as_slice() else { return Err(malformed()) };

    let (dev_a, port_a) = a.split_once(':').ok_or_else(malformed)?;
    let (dev_b, port_b) = b.split_once(':').ok_or_else(malformed)?;
    if [dev_a, port_a, dev_b, port_b].iter().any(|s| s.trim().is_empty()) {
        return Err(malformed());
    }

    Ok((
        dev_a.trim().to_string(),
        port_a.trim().to_string(),
        dev_b.trim().to_string(),
        port_b.trim().to_string(),
    ))
}

fn expand(inv: &dyn Inventory, shorthand: &str) -> Result<Expansion> {
    let (dev_a, port_a, dev_b, port_b) = parse_shorthand(shorthand)?;

    let mut hosts_a = require_hosts(inv, &dev_a)?;
    let mut hosts_b = require_hosts(inv, &dev_b)?;
    natural_sort(&mut hosts_a);
    natural_sort(&mut hosts_b);

    let ports = |base: &str, count: usize| -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        range::expand(&range::span(base, count)?)
    };
    let ports_a = ports(&port_a, hosts_b.len())?;
    let ports_b = ports(&port_b, hosts_a.len())?;

    Ok(Expansion {
        shorthand: shorthand.trim().to_string(),
        dev_a,
        dev_b,
        hosts_a,
        ports_a,
        hosts_b,
        ports_b,
    })
}

impl Expansion {
    /// Every (host, interface) this shorthand occupies
    fn endpoints(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (i, host_a) in self.hosts_a.iter().enumerate() {
            for (j, host_b) in self.hosts_b.iter().enumerate() {
                out.push((host_a.clone(), self.ports_a[j].clone()));
                out.push((host_b.clone(), self.ports_b[i].clone()));
            }
        }
        out
    }

    fn links(&self, inv: &dyn Inventory) -> Result<Vec<(String, [LinkNode; 2])>> {
        let mut out = Vec::new();
        for (i, host_a) in self.hosts_a.iter().enumerate() {
            for (j, host_b) in self.hosts_b.iter().enumerate() {
                if host_a == host_b {
                    return Err(FabricError::invalid_topology(format!(
                        "link '{}' connects {} to itself",
                        self.shorthand, host_a
                    )));
                }
                let (port_a, port_b) = (&self.ports_a[j], &self.ports_b[i]);
                let id = format!("{}:{} -- {}:{}", host_a, port_a, host_b, port_b);
                let nodes = [
                    LinkNode {
                        host: host_a.clone(),
                        interface: port_a.clone(),
                        neighbor: host_b.clone(),
                        ngroup: require_group(inv, host_b)?,
                        ninterface: port_b.clone(),
                    },
                    LinkNode {
                        host: host_b.clone(),
                        interface: port_b.clone(),
                        neighbor: host_a.clone(),
                        ngroup: require_group(inv, host_a)?,
                        ninterface: port_a.clone(),
                    },
                ];
                out.push((id, nodes));
            }
        }
        Ok(out)
    }

    /// `spine:swp1 -- leaf:swp21 --> spine:swp1-4 -- leaf:swp21-22`
    fn annotated(&self) -> Result<String> {
        Ok(format!(
            "{} --> {}:{} -- {}:{}",
            self.shorthand,
            self.dev_a,
            range::encode(&self.ports_a, false)?.join(","),
            self.dev_b,
            range::encode(&self.ports_b, false)?.join(","),
        ))
    }
}

#[derive(Serialize)]
struct Fragment {
    network_links: Vec<LinkSpec>,
}

/// Re-render offending declarations as a `network_links` YAML fragment
fn render_fragment(items: Vec<LinkSpec>) -> String {
    serde_yaml::to_string(&Fragment { network_links: items }).unwrap_or_else(|e| e.to_string())
}

fn with_links(spec: &LinkSpec, links: Vec<String>) -> LinkSpec {
    LinkSpec { links, ..spec.clone() }
}

fn check_duplicates(spec: &LinkSpec) -> Result<()> {
    for (i, a) in spec.links.iter().enumerate() {
        for b in &spec.links[i + 1..] {
            if a.trim() == b.trim() {
                return Err(FabricError::DuplicateLink {
                    link: a.trim().to_string(),
                    rendered: render_fragment(vec![with_links(spec, vec![a.clone(), b.clone()])]),
                });
            }
        }
    }
    Ok(())
}

/// Reject a (host, interface) claimed by two different shorthands, in the
/// same collection or across collections.
pub fn check_overlaps(inv: &dyn Inventory, specs: &[LinkSpec]) -> Result<()> {
    // (host, interface) -> (collection index, expansion index)
    let mut claimed: IndexMap<(String, String), (usize, usize)> = IndexMap::new();
    let mut expansions: Vec<Vec<Expansion>> = Vec::new();

    for (si, spec) in specs.iter().enumerate() {
        check_duplicates(spec)?;

        let mut mine = Vec::new();
        for (ei, shorthand) in spec.links.iter().enumerate() {
            let exp = expand(inv, shorthand)?;
            for endpoint in exp.endpoints() {
                match claimed.get(&endpoint) {
                    Some(&(s, e)) if (s, e) != (si, ei) => {
                        let first = &expansions.get(s).map_or(&mine, |v| v)[e];
                        let rendered = if s == si {
                            render_fragment(vec![with_links(spec, vec![first.annotated()?, exp.annotated()?])])
                        } else {
                            render_fragment(vec![
                                with_links(&specs[s], vec![first.annotated()?]),
                                with_links(spec, vec![exp.annotated()?]),
                            ])
                        };
                        return Err(FabricError::OverlappingInterface {
                            host: endpoint.0,
                            interface: endpoint.1,
                            rendered,
                        });
                    }
                    Some(_) => {}
                    None => {
                        claimed.insert(endpoint, (si, ei));
                    }
                }
            }
            mine.push(exp);
        }
        expansions.push(mine);
    }
    Ok(())
}

/// Resolve every shorthand of one collection
pub fn resolve(inv: &dyn Inventory, spec: &LinkSpec) -> Result<ResolvedLinks> {
    check_overlaps(inv, std::slice::from_ref(spec))?;

    let mut links: Vec<(String, [LinkNode; 2])> = Vec::new();
    for shorthand in &spec.links {
        links.extend(expand(inv, shorthand)?.links(inv)?);
    }
    links.sort_by(|a, b| natural_cmp(&a.0, &b.0));

    let mut resolved = ResolvedLinks::default();
    for (id, nodes) in links {
        resolved.nodes.entry(id).or_insert(nodes);
    }
    tracing::debug!("Resolved {} links for {}", resolved.len(), spec.name);
    Ok(resolved)
}

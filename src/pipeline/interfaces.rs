use std::collections::BTreeMap;

use indexmap::IndexMap;
use ipnet::Ipv4Net;

use crate::allocator::reconcile_subnets;
use crate::db::{pool_name, PoolRepo};
use crate::errors::Result;
use crate::links::{self, LinkNode};
use crate::models::{
    InterfaceType, IpInterface, IpNeighbor, LinkSpec, UnnumberedInterface, UnnumberedNeighbor,
};
use crate::utils::net::nth_host;
use crate::utils::range::natural_cmp;

use super::{cached, InterfaceMap, Pipeline};

/// Prefix length of every point-to-point link
const PTP_PREFIXLEN: u8 = 30;
/// VRF of links and sub-interfaces that name none
const DEFAULT_VRF: &str = "default";

/// One addressed point-to-point link. Sub-interface links exist once per
/// VLAN and carry the VLAN id in `vid`.
#[derive(Debug, Clone, PartialEq)]
pub struct PtpLink {
    pub id: String,
    pub vrf: String,
    pub vid: Option<String>,
    pub nodes: [LinkNode; 2],
    pub base: Ipv4Net,
}

impl PtpLink {
    /// Interface name of a node on this link (`swp1` or `swp1.4000`)
    fn interface(&self, node: &LinkNode) -> String {
        match &self.vid {
            Some(vid) => format!("{}.{}", node.interface, vid),
            None => node.interface.clone(),
        }
    }
}

fn sort_interfaces<T>(map: InterfaceMap<T>) -> InterfaceMap<T> {
    map.into_iter()
        .map(|(host, mut ifaces)| {
            ifaces.sort_by(|a, _, b, _| natural_cmp(a, b));
            (host, ifaces)
        })
        .collect()
}

impl Pipeline<'_> {
    /// Links of every `ip` and `sub_interface` collection, in declaration
    /// order. A sub-interface collection without `vifs` gets one link per
    /// tenant L3-VNI.
    pub fn ptp_links(&self) -> Result<&Vec<PtpLink>> {
        cached(&self.ptp_links, || {
            let catalog = self.vlan_catalog()?;
            let mut out = Vec::new();

            for spec in self.ip_link_specs() {
                let base = self.topology.link_block(&spec.name)?;
                let resolved = links::resolve(&self.inventory, spec)?;

                let vlans: Vec<(String, String)> = match (&spec.interface_type, &spec.vifs) {
                    (InterfaceType::SubInterface, Some(vifs)) => vifs
                        .iter()
                        .map(|vif| (vif.vid.clone(), vif.vrf.clone().unwrap_or_else(|| DEFAULT_VRF.to_string())))
                        .collect(),
                    (InterfaceType::SubInterface, None) => {
                        catalog.l3().map(|l3| (l3.id.clone(), l3.tenant.clone())).collect()
                    }
                    _ => Vec::new(),
                };

                for (id, nodes) in resolved.iter() {
                    if spec.interface_type == InterfaceType::Ip {
                        out.push(PtpLink {
                            id: id.to_string(),
                            vrf: spec.vrf.clone().unwrap_or_else(|| DEFAULT_VRF.to_string()),
                            vid: None,
                            nodes: nodes.clone(),
                            base,
                        });
                        continue;
                    }
                    for (vid, vrf) in &vlans {
                        out.push(PtpLink {
                            id: format!("{}_{}", id, vid),
                            vrf: vrf.clone(),
                            vid: Some(vid.clone()),
                            nodes: nodes.clone(),
                            base,
                        });
                    }
                }
            }
            Ok(out)
        })
    }

    /// link id -> /30, persisted in the link pool
    pub fn link_networks(&self) -> Result<&BTreeMap<String, Ipv4Net>> {
        cached(&self.link_networks, || {
            let before: BTreeMap<String, Ipv4Net> = PoolRepo::load(self.store, pool_name::IP_NETWORK_LINKS)?;
            let requests: Vec<(String, Ipv4Net)> =
                self.ptp_links()?.iter().map(|l| (l.id.clone(), l.base)).collect();

            let after = reconcile_subnets(pool_name::IP_NETWORK_LINKS, &requests, PTP_PREFIXLEN, &before)?;
            PoolRepo::save_if_changed(self.store, pool_name::IP_NETWORK_LINKS, &before, &after)?;
            Ok(after)
        })
    }

    /// Addressed interfaces: both ends of every point-to-point link plus the
    /// statically declared ones
    pub fn ip_interfaces(&self) -> Result<&InterfaceMap<IpInterface>> {
        cached(&self.ip_interfaces, || {
            let networks = self.link_networks()?;
            let mut out: InterfaceMap<IpInterface> = IndexMap::new();

            for link in self.ptp_links()? {
                let Some(net) = networks.get(&link.id) else { continue };
                let addrs = [nth_host(net, 1)?, nth_host(net, 2)?];

                for (idx, node) in link.nodes.iter().enumerate() {
                    out.entry(node.host.clone()).or_default().insert(
                        link.interface(node),
                        IpInterface {
                            ip: format!("{}/{}", addrs[idx], net.prefix_len()),
                            alias: Some(link.id.clone()),
                            vrf: link.vrf.clone(),
                            neighbor: Some(IpNeighbor {
                                host: node.neighbor.clone(),
                                address: addrs[1 - idx].to_string(),
                                interface: node.ninterface.clone(),
                                group: node.ngroup.clone(),
                            }),
                        },
                    );
                }
            }

            for (host, ifaces) in &self.topology.ip_interfaces {
                for (name, iface) in ifaces {
                    out.entry(host.clone()).or_default().insert(
                        name.clone(),
                        IpInterface {
                            ip: iface.address.clone(),
                            alias: iface.desc.clone(),
                            vrf: DEFAULT_VRF.to_string(),
                            neighbor: None,
                        },
                    );
                }
            }

            tracing::info!("Derived IP interfaces for {} hosts", out.len());
            Ok(sort_interfaces(out))
        })
    }

    /// Interfaces of `unnumbered` collections; no addressing, only peers
    pub fn unnumbered_interfaces(&self) -> Result<&InterfaceMap<UnnumberedInterface>> {
        cached(&self.unnumbered, || {
            let mut out: InterfaceMap<UnnumberedInterface> = IndexMap::new();

            for spec in self
                .topology
                .network_links
                .iter()
                .filter(|s| s.interface_type == InterfaceType::Unnumbered)
            {
                let vrf = spec.vrf.clone().unwrap_or_else(|| DEFAULT_VRF.to_string());
                for (id, nodes) in links::resolve(&self.inventory, spec)?.iter() {
                    for node in nodes {
                        out.entry(node.host.clone()).or_default().insert(
                            node.interface.clone(),
                            UnnumberedInterface {
                                alias: id.to_string(),
                                vrf: vrf.clone(),
                                neighbor: UnnumberedNeighbor {
                                    host: node.neighbor.clone(),
                                    interface: node.ninterface.clone(),
                                    group: node.ngroup.clone(),
                                },
                            },
                        );
                    }
                }
            }

            Ok(sort_interfaces(out))
        })
    }

    fn ip_link_specs(&self) -> impl Iterator<Item = &LinkSpec> {
        self.topology
            .network_links
            .iter()
            .filter(|s| s.interface_type != InterfaceType::Unnumbered)
    }
}

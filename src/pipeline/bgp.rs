use indexmap::IndexMap;

use crate::errors::{FabricError, Result};
use crate::inventory::require_hosts;
use crate::models::{group_role, BgpNeighbor, BgpVrf, Host, RemoteAs};

use super::{cached, HostMap, Pipeline};

/// ASN and router id of one host
#[derive(Debug, Clone)]
struct Speaker {
    asn: u32,
    router_id: String,
}

/// Peer seen through one local interface
struct Session<'a> {
    vrf: &'a str,
    host: &'a str,
    interface: &'a str,
    group: &'a str,
    /// neighbor address of a numbered session, `None` for unnumbered
    address: Option<&'a str>,
}

impl Pipeline<'_> {
    fn speakers(&self) -> Result<HostMap<Speaker>> {
        let mut out = HostMap::new();
        for (group, base) in &self.topology.base_asn {
            for name in require_hosts(&self.inventory, group)? {
                let host = Host::parse(&name)?;
                let asn = if group == group_role::SPINE {
                    *base
                } else {
                    base.checked_add(host.id).ok_or_else(|| {
                        FabricError::invalid_topology(format!("base_asn {} of '{}' overflows for {}", base, group, name))
                    })?
                };
                let router_id = self.loopback_addr(&name)?;
                out.insert(name, Speaker { asn, router_id });
            }
        }
        Ok(out)
    }

    /// BGP sessions of every host, grouped by VRF.
    ///
    /// Numbered peers use the neighbor address and ASN; unnumbered peers are
    /// addressed by interface with `remote-as external`.
    pub fn bgp_neighbors(&self) -> Result<&HostMap<IndexMap<String, BgpVrf>>> {
        cached(&self.bgp, || {
            let speakers = self.speakers()?;
            let speaker = |host: &str| {
                speakers.get(host).ok_or_else(|| {
                    FabricError::invalid_topology(format!("host '{}' has no base_asn for its group", host))
                })
            };

            // unnumbered entries replace numbered ones of the same name in place
            let mut sessions: HostMap<IndexMap<&str, Option<Session>>> = IndexMap::new();
            for (host, ifaces) in self.ip_interfaces()? {
                let entry = sessions.entry(host.clone()).or_default();
                for (name, iface) in ifaces {
                    let session = iface.neighbor.as_ref().map(|n| Session {
                        vrf: &iface.vrf,
                        host: &n.host,
                        interface: &n.interface,
                        group: &n.group,
                        address: Some(&n.address),
                    });
                    entry.insert(name.as_str(), session);
                }
            }
            for (host, ifaces) in self.unnumbered_interfaces()? {
                let entry = sessions.entry(host.clone()).or_default();
                for (name, iface) in ifaces {
                    let n = &iface.neighbor;
                    entry.insert(
                        name.as_str(),
                        Some(Session {
                            vrf: &iface.vrf,
                            host: &n.host,
                            interface: &n.interface,
                            group: &n.group,
                            address: None,
                        }),
                    );
                }
            }

            let mut out = HostMap::new();
            for (host, ifaces) in sessions {
                let mut vrfs: IndexMap<String, BgpVrf> = IndexMap::new();
                for (local, session) in ifaces {
                    let Some(s) = session else { continue };
                    let local_speaker = speaker(host.as_str())?;
                    let remote = speaker(s.host)?;

                    let (neighbor, remote_as) = match s.address {
                        Some(addr) => (addr.to_string(), RemoteAs::Asn(remote.asn)),
                        None => (local.to_string(), RemoteAs::External),
                    };

                    let vrf = vrfs.entry(s.vrf.to_string()).or_insert_with(|| BgpVrf {
                        router_id: local_speaker.router_id.clone(),
                        asn: local_speaker.asn,
                        neighbors: Vec::new(),
                        peer_groups: Vec::new(),
                    });
                    if !vrf.peer_groups.iter().any(|g| g == s.group) {
                        vrf.peer_groups.push(s.group.to_string());
                    }
                    vrf.neighbors.push(BgpNeighbor {
                        neighbor,
                        remote_as,
                        remote_id: remote.router_id.clone(),
                        peer_group: s.group.to_string(),
                        remote_host: s.host.to_string(),
                        remote_interface: s.interface.to_string(),
                        local_interface: local.to_string(),
                    });
                }
                out.insert(host, vrfs);
            }

            tracing::info!("Derived BGP sessions for {} hosts", out.len());
            Ok(out)
        })
    }
}

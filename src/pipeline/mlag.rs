use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::allocator::{reconcile_ids, CLAG_POOL};
use crate::db::{pool_name, PoolRepo};
use crate::errors::{FabricError, Result};
use crate::inventory::{peer_of, require_hosts};
use crate::models::{group_role, Bond, BridgeMembers, Host, HostBonds, MlagPeerlink};
use crate::utils::range;
use crate::utils::CLAG_SYSTEM_MAC_BASE;

use super::{cached, HostMap, Pipeline};

impl Pipeline<'_> {
    /// rack -> bond -> CLAG id, reconciled against `mlag_bonds`
    pub fn clag_ids(&self) -> Result<&BTreeMap<String, BTreeMap<String, u32>>> {
        cached(&self.clag_ids, || {
            let before: BTreeMap<String, BTreeMap<String, u32>> = PoolRepo::load(self.store, pool_name::CLAG_INTERFACES)?;

            let mut after = BTreeMap::new();
            for (rack, bonds) in &self.topology.mlag_bonds {
                let names: Vec<&str> = bonds.iter().map(|b| b.name.as_str()).collect();
                let current = before.get(rack).cloned().unwrap_or_default();
                after.insert(rack.clone(), reconcile_ids(&CLAG_POOL, &names, &current, &BTreeSet::new())?);
            }

            PoolRepo::save_if_changed(self.store, pool_name::CLAG_INTERFACES, &before, &after)?;
            Ok(after)
        })
    }

    /// Bonds and bridge membership of every leaf, by rack
    pub fn mlag_bonds(&self) -> Result<&HostMap<HostBonds>> {
        cached(&self.bonds, || {
            let clag_ids = self.clag_ids()?;
            let catalog = self.vlan_catalog()?;

            let mut out = HostMap::new();
            for (rack, specs) in &self.topology.mlag_bonds {
                let mut bonds = Vec::new();
                for spec in specs {
                    let vids = range::expand(&spec.vids)?;
                    let first = vids.first().ok_or_else(|| {
                        FabricError::invalid_topology(format!("bond '{}' in {} has no VLANs", spec.name, rack))
                    })?;
                    for vid in &vids {
                        catalog.require(vid)?;
                    }

                    let tenant = match &spec.vrf {
                        Some(vrf) => vrf.clone(),
                        None => catalog.require(first)?.tenant.clone(),
                    };
                    let clag_id = clag_ids
                        .get(rack)
                        .and_then(|ids| ids.get(&spec.name))
                        .copied()
                        .ok_or_else(|| FabricError::pool_exhausted(pool_name::CLAG_INTERFACES, spec.name.clone()))?;

                    bonds.push(Bond {
                        name: spec.name.clone(),
                        vids: range::encode(&vids, false)?.join(","),
                        clag_id,
                        alias: format!("{}.{}.{}", tenant, rack, clag_id),
                        tenant,
                        members: range::expand(&spec.members)?.join(","),
                    });
                }

                let mut grouped: IndexMap<&str, Vec<&str>> = IndexMap::new();
                for bond in &bonds {
                    grouped.entry(bond.vids.as_str()).or_default().push(bond.name.as_str());
                }
                let mut bridge = Vec::new();
                for (vids, names) in grouped {
                    let mode = if range::decode(vids)?.len() == 1 { "access" } else { "vids" };
                    bridge.push(BridgeMembers {
                        mode: mode.to_string(),
                        vids: vids.to_string(),
                        bonds: names.join(","),
                    });
                }

                let entry = HostBonds { bonds, bridge };
                for host in require_hosts(&self.inventory, rack)? {
                    out.insert(host, entry.clone());
                }
            }

            tracing::info!("Derived MLAG bonds for {} leaves", out.len());
            Ok(out)
        })
    }

    /// Peer link settings of every leaf
    pub fn mlag_peerlink(&self) -> Result<HostMap<MlagPeerlink>> {
        let leaves = self.members(group_role::LEAF);
        if leaves.is_empty() {
            return Ok(HostMap::new());
        }

        let interfaces = self.topology.mlag_peerlink_interfaces.as_deref().ok_or_else(|| {
            FabricError::invalid_topology("mlag_peerlink_interfaces is required when the inventory has leaves")
        })?;
        let interfaces = range::expand(interfaces)?.join(",");

        let mut out = HostMap::new();
        for name in leaves {
            let host = Host::parse(&name)?;
            let peer = peer_of(&self.inventory, &host)?
                .ok_or_else(|| FabricError::invalid_topology(format!("leaf '{}' has no MLAG peer", name)))?;

            let (priority, ip, peer_ip) = if host.is_odd() {
                ("1000", "169.254.1.1/30", "169.254.1.2")
            } else {
                ("2000", "169.254.1.2/30", "169.254.1.1")
            };

            out.insert(
                name,
                MlagPeerlink {
                    priority: priority.to_string(),
                    system_mac: (CLAG_SYSTEM_MAC_BASE - host.rack_id).to_string(),
                    interfaces: interfaces.clone(),
                    backup_ip: self.loopback_addr(&peer)?,
                    peer_ip: peer_ip.to_string(),
                    ip: ip.to_string(),
                },
            );
        }
        Ok(out)
    }
}

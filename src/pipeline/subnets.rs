use std::collections::BTreeMap;

use ipnet::Ipv4Net;

use crate::allocator::next_free_subnet;
use crate::db::{pool_name, PoolRepo};
use crate::errors::{FabricError, Result};
use crate::models::{SubnetAllocation, VlanNetwork};
use crate::utils::net::overlaps;

use super::{cached, Pipeline};

/// Prefix length of VLANs that ask for neither a prefix nor a length
const DEFAULT_VLAN_PREFIXLEN: u8 = 24;

impl Pipeline<'_> {
    /// Subnet of every L2 VLAN, keyed by `vlan{id}`.
    ///
    /// Manual prefixes are placed first so automatic allocations never take
    /// their space; an automatic entry that collides with a new manual prefix
    /// is moved.
    pub fn vlans_network(&self) -> Result<&BTreeMap<String, VlanNetwork>> {
        cached(&self.vlans_network, || {
            let catalog = self.vlan_catalog()?;
            let before: BTreeMap<String, VlanNetwork> = PoolRepo::load(self.store, pool_name::VLANS_NETWORK)?;

            let mut after: BTreeMap<String, VlanNetwork> = before
                .iter()
                .filter(|(vlan, _)| catalog.l2().any(|v| &v.vlan == *vlan))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            for vlan in catalog.l2() {
                let Some(prefix) = vlan.network_prefix else { continue };
                if prefix.addr() != prefix.network() {
                    return Err(FabricError::invalid_topology(format!(
                        "network_prefix {} of {} is not a network address",
                        prefix, vlan.vlan
                    )));
                }

                let clashes: Vec<(String, SubnetAllocation)> = after
                    .iter()
                    .filter(|(k, v)| **k != vlan.vlan && overlaps(&v.network_prefix, &prefix))
                    .map(|(k, v)| (k.clone(), v.allocation))
                    .collect();
                for (other, allocation) in clashes {
                    let other_is_manual = allocation == SubnetAllocation::Manual
                        && catalog.by_name(&other).is_some_and(|r| r.network_prefix.is_some());
                    if other_is_manual {
                        return Err(FabricError::invalid_topology(format!(
                            "network_prefix {} of {} overlaps {} of {}",
                            prefix, vlan.vlan, after[&other].network_prefix, other
                        )));
                    }
                    tracing::warn!("{} overlaps manual prefix {} of {}, reallocating", other, prefix, vlan.vlan);
                    after.remove(&other);
                }

                after.insert(
                    vlan.vlan.clone(),
                    VlanNetwork { allocation: SubnetAllocation::Manual, network_prefix: prefix },
                );
            }

            for vlan in catalog.l2().filter(|v| v.network_prefix.is_none()) {
                let (allocation, prefixlen) = match vlan.prefixlen {
                    Some(len) => (SubnetAllocation::AutoPrefixlen, len),
                    None => (SubnetAllocation::AutoNetworkPrefix, DEFAULT_VLAN_PREFIXLEN),
                };
                let base = self.topology.base_networks.vlans.ok_or_else(|| {
                    FabricError::invalid_topology(format!("base_networks.vlans is required to address {}", vlan.vlan))
                })?;

                let keep = after.get(&vlan.vlan).is_some_and(|cur| {
                    cur.allocation == allocation
                        && cur.network_prefix.prefix_len() == prefixlen
                        && base.contains(&cur.network_prefix)
                });
                if keep {
                    continue;
                }

                let used: Vec<Ipv4Net> = after
                    .iter()
                    .filter(|(k, _)| **k != vlan.vlan)
                    .map(|(_, v)| v.network_prefix)
                    .collect();
                let subnet = next_free_subnet(pool_name::VLANS_NETWORK, &base, prefixlen, &used)?;
                tracing::debug!("{} -> {} ({:?})", vlan.vlan, subnet, allocation);
                after.insert(vlan.vlan.clone(), VlanNetwork { allocation, network_prefix: subnet });
            }

            PoolRepo::save_if_changed(self.store, pool_name::VLANS_NETWORK, &before, &after)?;
            Ok(after)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::models::SubnetAllocation;
    use crate::pipeline::{fixture, Pipeline};
    use pretty_assertions::assert_eq;

    fn prefixes(topo: &crate::models::Topology, store: &crate::db::MemoryStore) -> Vec<(String, String, SubnetAllocation)> {
        let inv = fixture::inventory();
        let p = Pipeline::new(topo, &inv, store).unwrap();
        p.vlans_network()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.network_prefix.to_string(), v.allocation))
            .collect()
    }

    #[test]
    fn test_initial_allocation() {
        let (topo, store) = (fixture::topology(), fixture::store());
        assert_eq!(
            prefixes(&topo, &store),
            vec![
                ("vlan100".into(), "172.16.0.0/24".into(), SubnetAllocation::AutoPrefixlen),
                ("vlan101".into(), "172.16.1.0/24".into(), SubnetAllocation::AutoNetworkPrefix),
                ("vlan500".into(), "172.16.2.0/24".into(), SubnetAllocation::AutoNetworkPrefix),
                ("vlan501".into(), "10.10.0.0/24".into(), SubnetAllocation::Manual),
            ]
        );
        // stable on the next run
        assert_eq!(prefixes(&topo, &store)[0].1, "172.16.0.0/24");
    }

    #[test]
    fn test_new_tenant_leaves_existing_subnets() {
        let (mut topo, store) = (fixture::topology(), fixture::store());
        let before = prefixes(&topo, &store);

        let mut extra = topo.vlans["tenant01"][1].clone();
        extra.id = "300".into();
        topo.vlans.insert("tenant03".into(), vec![extra]);
        let after = prefixes(&topo, &store);

        assert_eq!(after[0], before[0]);
        assert_eq!(after[0].1, "172.16.0.0/24");
        assert_eq!(after[2], ("vlan300".into(), "172.16.3.0/24".into(), SubnetAllocation::AutoNetworkPrefix));
        assert_eq!(after[3], before[2]);
    }

    #[test]
    fn test_removed_vlan_is_reclaimed_without_moving_others() {
        let (mut topo, store) = (fixture::topology(), fixture::store());
        prefixes(&topo, &store);

        topo.vlans["tenant01"].remove(1);
        topo.mlag_bonds["rack01"][1].vids = "100".into();
        let after = prefixes(&topo, &store);
        assert_eq!(after.len(), 3);
        assert_eq!(after[0].1, "172.16.0.0/24");
        assert_eq!(after[1], ("vlan500".into(), "172.16.2.0/24".into(), SubnetAllocation::AutoNetworkPrefix));

        // the freed block is handed to the next newcomer
        let mut extra = topo.vlans["tenant01"][0].clone();
        extra.id = "102".into();
        extra.prefixlen = None;
        topo.vlans["tenant01"].push(extra);
        let again = prefixes(&topo, &store);
        assert_eq!(again[1], ("vlan102".into(), "172.16.1.0/24".into(), SubnetAllocation::AutoNetworkPrefix));
    }

    #[test]
    fn test_prefixlen_change_reallocates() {
        let (mut topo, store) = (fixture::topology(), fixture::store());
        prefixes(&topo, &store);

        topo.vlans["tenant01"][0].prefixlen = Some(25);
        let after = prefixes(&topo, &store);
        assert_eq!(after[0], ("vlan100".into(), "172.16.0.0/25".into(), SubnetAllocation::AutoPrefixlen));
        assert_eq!(after[1].1, "172.16.1.0/24");
    }

    #[test]
    fn test_manual_prefix_takes_over_auto_block() {
        let (mut topo, store) = (fixture::topology(), fixture::store());
        prefixes(&topo, &store);

        topo.vlans["tenant01"][1].network_prefix = Some("172.16.0.0/24".parse().unwrap());
        let after = prefixes(&topo, &store);
        assert_eq!(after[1], ("vlan101".into(), "172.16.0.0/24".into(), SubnetAllocation::Manual));
        assert_eq!(after[0].0, "vlan100");
        assert_ne!(after[0].1, "172.16.0.0/24");
    }

    #[test]
    fn test_conflicting_manual_prefixes() {
        let (mut topo, store) = (fixture::topology(), fixture::store());
        topo.vlans["tenant01"][1].network_prefix = Some("10.10.0.0/16".parse().unwrap());
        let inv = fixture::inventory();
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let err = p.vlans_network().unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }
}

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use ipnet::Ipv4Net;

use crate::allocator::{NAT_RULE_POOL, OOB_NAT_RULE};
use crate::db::{pool_name, PoolRepo};
use crate::errors::{FabricError, Result};
use crate::models::{HostNat, NatRule};

use super::vlans::DEFAULT_TENANT;
use super::{cached, HostMap, Pipeline};

const OOB_RULE_NAME: &str = "oob_management";

impl Pipeline<'_> {
    /// Rule number -> NAT rule. Rule 1 is always the OOB management network;
    /// every NAT-enabled VLAN subnet holds one rule of the 500-590 ladder.
    pub fn nat_rules(&self) -> Result<&BTreeMap<String, NatRule>> {
        cached(&self.nat_rules, || {
            let oob = self.topology.base_networks.oob_management.ok_or_else(|| {
                FabricError::invalid_topology("base_networks.oob_management is required for NAT rules")
            })?;
            let catalog = self.vlan_catalog()?;
            let networks = self.vlans_network()?;

            let mut nat_vlans: Vec<(Ipv4Net, NatRule)> = Vec::new();
            for vlan in catalog.l2().filter(|v| v.allow_nat) {
                let net = networks.get(&vlan.vlan).map(|n| n.network_prefix).ok_or_else(|| {
                    FabricError::invalid_topology(format!("{} has no subnet", vlan.vlan))
                })?;
                nat_vlans.push((
                    net,
                    NatRule { name: vlan.name.clone(), tenant: vlan.tenant.clone(), source_address: net },
                ));
            }

            let before: BTreeMap<String, NatRule> = PoolRepo::load(self.store, pool_name::NAT_RULES)?;

            let mut after: BTreeMap<String, NatRule> = BTreeMap::new();
            let mut covered: BTreeSet<Ipv4Net> = BTreeSet::new();
            for (key, rule) in &before {
                let on_ladder = key.parse::<u32>().is_ok_and(|n| NAT_RULE_POOL.contains(n));
                let wanted = nat_vlans.iter().any(|(net, _)| *net == rule.source_address);
                if on_ladder && wanted && covered.insert(rule.source_address) {
                    after.insert(key.clone(), rule.clone());
                } else if key != &OOB_NAT_RULE.to_string() {
                    tracing::debug!("Dropping NAT rule {} ({})", key, rule.source_address);
                }
            }

            let mut used: BTreeSet<u32> = after.keys().filter_map(|k| k.parse().ok()).collect();
            for (net, rule) in &nat_vlans {
                if covered.contains(net) {
                    continue;
                }
                let number = NAT_RULE_POOL.next_free(&used)?;
                used.insert(number);
                covered.insert(*net);
                tracing::debug!("Assigned NAT rule {} -> {}", number, net);
                after.insert(number.to_string(), rule.clone());
            }

            // a subnet may have moved to another VLAN since the rule was made
            for rule in after.values_mut() {
                if let Some((_, current)) = nat_vlans.iter().find(|(net, _)| *net == rule.source_address) {
                    rule.name = current.name.clone();
                    rule.tenant = current.tenant.clone();
                }
            }

            after.insert(
                OOB_NAT_RULE.to_string(),
                NatRule { name: OOB_RULE_NAME.to_string(), tenant: DEFAULT_TENANT.to_string(), source_address: oob },
            );

            PoolRepo::save_if_changed(self.store, pool_name::NAT_RULES, &before, &after)?;
            Ok(after)
        })
    }

    /// `nat_rules` in numeric rule order
    pub fn nat_rule_table(&self) -> Result<IndexMap<String, NatRule>> {
        let mut rules: Vec<(u32, &String, &NatRule)> = self
            .nat_rules()?
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|n| (n, k, v)))
            .collect();
        rules.sort_by_key(|(n, _, _)| *n);
        Ok(rules.into_iter().map(|(_, k, v)| (k.clone(), v.clone())).collect())
    }

    /// NAT entries of every host with `ip_nat: outside` interfaces. Each
    /// outside interface gets every rule, numbered from the rule number plus
    /// the interface's position among the host's outside interfaces.
    pub fn nat(&self) -> Result<HostMap<Vec<HostNat>>> {
        let table = self.nat_rule_table()?;

        let mut out = HostMap::new();
        for (host, ifaces) in &self.topology.ip_interfaces {
            let outside = ifaces.iter().filter(|(_, i)| i.is_nat_outside()).map(|(name, _)| name);
            let mut entries = Vec::new();
            for (index, iface) in outside.enumerate() {
                for (number, rule) in &table {
                    let base: u32 = number.parse().map_err(|_| {
                        FabricError::invalid_topology(format!("NAT rule '{}' is not a number", number))
                    })?;
                    entries.push(HostNat {
                        interface: iface.clone(),
                        name: rule.name.clone(),
                        rule: base + index as u32,
                        tenant: rule.tenant.clone(),
                        src_addr: rule.source_address.to_string(),
                    });
                }
            }
            if !entries.is_empty() {
                out.insert(host.clone(), entries);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{pool_name, AllocationStore, MemoryStore};
    use crate::models::StaticInterface;
    use crate::pipeline::{fixture, Pipeline};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_oob_rule_and_first_nat_vlan() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let view = p.render("nat_rules").unwrap();

        assert_eq!(
            view,
            json!({
                "1": {"name": "oob_management", "tenant": "default", "source_address": "172.24.0.0/24"},
                "500": {"name": "vlan500", "tenant": "tenant02", "source_address": "172.16.2.0/24"}
            })
        );
    }

    #[test]
    fn test_host_nat() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let view = p.render("nat").unwrap();

        assert_eq!(
            view["edge01"],
            json!([
                {"interface": "eth3", "name": "oob_management", "rule": 1, "tenant": "default", "src_addr": "172.24.0.0/24"},
                {"interface": "eth3", "name": "vlan500", "rule": 500, "tenant": "tenant02", "src_addr": "172.16.2.0/24"}
            ])
        );
        assert!(view.get("border01").is_none());
    }

    #[test]
    fn test_second_outside_interface_offsets_rules() {
        let (mut topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        topo.ip_interfaces["edge01"].insert(
            "eth4".into(),
            StaticInterface { address: "dhcp".into(), desc: None, ip_nat: Some("outside".into()) },
        );
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let rules: Vec<(String, u32)> =
            p.nat().unwrap()["edge01"].iter().map(|n| (n.interface.clone(), n.rule)).collect();
        assert_eq!(
            rules,
            vec![("eth3".into(), 1), ("eth3".into(), 500), ("eth4".into(), 2), ("eth4".into(), 501)]
        );
    }

    #[test]
    fn test_rules_reclaimed_and_reassigned() {
        let (mut topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        {
            let p = Pipeline::new(&topo, &inv, &store).unwrap();
            p.nat_rules().unwrap();
        }

        topo.vlans["tenant01"][1].allow_nat = true;
        {
            let p = Pipeline::new(&topo, &inv, &store).unwrap();
            let rules = p.nat_rules().unwrap();
            assert_eq!(rules["500"].name, "vlan500");
            assert_eq!(rules["510"].name, "vlan101");
        }

        topo.vlans["tenant02"][0].allow_nat = false;
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let keys: Vec<String> = p.nat_rule_table().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["1", "510"]);
    }

    #[test]
    fn test_off_ladder_rules_dropped() {
        let (topo, inv) = (fixture::topology(), fixture::inventory());
        let store = MemoryStore::new();
        let mut seeded = std::collections::BTreeMap::new();
        seeded.insert(
            "505".to_string(),
            json!({"name": "vlan500", "tenant": "tenant02", "source_address": "172.16.2.0/24"}),
        );
        store.save(pool_name::NAT_RULES, &seeded).unwrap();

        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let rules = p.nat_rules().unwrap();
        assert_eq!(rules.keys().collect::<Vec<_>>(), vec!["1", "500"]);
    }

    #[test]
    fn test_oob_network_required() {
        let mut topo = fixture::topology();
        topo.base_networks.oob_management = None;
        let (inv, store) = (fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        assert!(p.nat_rules().is_err());
    }
}

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::allocator::{reconcile_ids, L3VNI_POOL};
use crate::db::{pool_name, PoolRepo};
use crate::errors::{FabricError, Result};
use crate::models::{VlanKind, VlanRecord};

use super::{cached, Pipeline};

/// Tenant without an L3-VNI
pub const DEFAULT_TENANT: &str = "default";

/// Every VLAN of the fabric, keyed by interface name (`vlan100`)
#[derive(Debug, Clone, Default)]
pub struct VlanCatalog {
    records: IndexMap<String, VlanRecord>,
}

impl VlanCatalog {
    pub fn records(&self) -> &IndexMap<String, VlanRecord> {
        &self.records
    }

    pub fn by_name(&self, vlan: &str) -> Option<&VlanRecord> {
        self.records.get(vlan)
    }

    pub fn by_id(&self, id: &str) -> Option<&VlanRecord> {
        self.records.get(&format!("vlan{}", id))
    }

    /// `by_id` that fails on an unknown VLAN
    pub fn require(&self, id: &str) -> Result<&VlanRecord> {
        self.by_id(id)
            .ok_or_else(|| FabricError::invalid_topology(format!("VLAN {} is not declared under 'vlans'", id)))
    }

    pub fn l2(&self) -> impl Iterator<Item = &VlanRecord> {
        self.records.values().filter(|v| v.kind == VlanKind::L2)
    }

    pub fn l3(&self) -> impl Iterator<Item = &VlanRecord> {
        self.records.values().filter(|v| v.kind == VlanKind::L3)
    }

    /// L3-VNI VLAN of a tenant
    pub fn tenant_l3(&self, tenant: &str) -> Option<&VlanRecord> {
        self.l3().find(|v| v.tenant == tenant)
    }
}

fn l3vni_record(tenant: &str, id: u32) -> VlanRecord {
    VlanRecord {
        id: id.to_string(),
        name: "l3vni".to_string(),
        tenant: tenant.to_string(),
        kind: VlanKind::L3,
        vlan: format!("vlan{}", id),
        index: None,
        network_prefix: None,
        prefixlen: None,
        allow_nat: false,
    }
}

impl Pipeline<'_> {
    /// L2 VLANs of every tenant followed by the tenant's L3-VNI VLAN
    pub fn vlan_catalog(&self) -> Result<&VlanCatalog> {
        cached(&self.catalog, || {
            let l3vni = self.reconcile_l3vni()?;

            let mut records = IndexMap::new();
            for (tenant, vlans) in &self.topology.vlans {
                for (index, spec) in vlans.iter().enumerate() {
                    let vlan = format!("vlan{}", spec.id);
                    records.insert(
                        vlan.clone(),
                        VlanRecord {
                            id: spec.id.clone(),
                            name: spec.name.clone(),
                            tenant: tenant.clone(),
                            kind: VlanKind::L2,
                            vlan,
                            index: Some(index),
                            network_prefix: spec.network_prefix,
                            prefixlen: spec.prefixlen,
                            allow_nat: spec.allow_nat,
                        },
                    );
                }
                if let Some(rec) = l3vni.get(tenant) {
                    records.insert(rec.vlan.clone(), rec.clone());
                }
            }

            tracing::info!("VLAN catalog has {} entries ({} tenants)", records.len(), l3vni.len());
            Ok(VlanCatalog { records })
        })
    }

    /// One L3-VNI per tenant, never colliding with an L2 VLAN id
    fn reconcile_l3vni(&self) -> Result<BTreeMap<String, VlanRecord>> {
        let before: BTreeMap<String, VlanRecord> = PoolRepo::load(self.store, pool_name::L3VNI)?;

        let l2_ids: BTreeSet<u32> = self
            .topology
            .vlans
            .values()
            .flatten()
            .filter_map(|v| v.id.parse().ok())
            .collect();

        // an id taken over by a new L2 VLAN is dropped and assigned again
        let current: BTreeMap<String, u32> = before
            .iter()
            .filter_map(|(tenant, rec)| rec.id.parse::<u32>().ok().map(|id| (tenant.clone(), id)))
            .filter(|(_, id)| !l2_ids.contains(id))
            .collect();

        let tenants: Vec<&String> = self.topology.vlans.keys().filter(|t| t.as_str() != DEFAULT_TENANT).collect();
        let ids = reconcile_ids(&L3VNI_POOL, &tenants, &current, &l2_ids)?;

        let after: BTreeMap<String, VlanRecord> = ids.iter().map(|(t, id)| (t.clone(), l3vni_record(t, *id))).collect();
        PoolRepo::save_if_changed(self.store, pool_name::L3VNI, &before, &after)?;
        Ok(after)
    }
}

use indexmap::IndexMap;

use crate::errors::Result;
use crate::models::{group_role, HostVxlans, VlanKind, VlanRecord, VxlanInterface};
use crate::utils::range::{self, natural_sort};

use super::{cached, HostMap, Pipeline};

impl Pipeline<'_> {
    /// VLANs each host carries: its bond VLANs plus the L3-VNI of every
    /// tenant those bonds belong to. Border hosts carry every L3-VNI.
    pub fn host_vlans(&self) -> Result<&HostMap<Vec<VlanRecord>>> {
        cached(&self.host_vlans, || {
            let catalog = self.vlan_catalog()?;
            let mut out: HostMap<Vec<VlanRecord>> = HostMap::new();

            for (host, host_bonds) in self.mlag_bonds()? {
                let mut ids: Vec<String> = Vec::new();
                for bond in &host_bonds.bonds {
                    ids.extend(range::expand(&bond.vids)?);
                    if let Some(l3) = catalog.tenant_l3(&bond.tenant) {
                        ids.push(l3.id.clone());
                    }
                }
                natural_sort(&mut ids);
                ids.dedup();

                let vlans = ids
                    .iter()
                    .map(|id| catalog.require(id).cloned())
                    .collect::<Result<Vec<_>>>()?;
                out.insert(host.clone(), vlans);
            }

            for host in self.members(group_role::BORDER) {
                let vlans = out.entry(host).or_default();
                for l3 in catalog.l3() {
                    if !vlans.iter().any(|v| v.vlan == l3.vlan) {
                        vlans.push(l3.clone());
                    }
                }
            }

            Ok(out)
        })
    }

    /// `vni{id}` interface per carried VLAN, VNI equal to the VLAN id
    pub fn vxlans(&self) -> Result<&HostMap<HostVxlans>> {
        cached(&self.vxlans, || {
            let mut out = HostMap::new();
            for (host, vlans) in self.host_vlans()? {
                let vxlan_interfaces: Vec<VxlanInterface> = vlans
                    .iter()
                    .map(|v| VxlanInterface {
                        alias: format!("{}.{}.{}", v.tenant, v.id, v.name),
                        name: format!("vni{}", v.id),
                        vlan: v.vlan.clone(),
                        tenant: v.tenant.clone(),
                        kind: v.kind,
                        id: v.id.clone(),
                        vid: v.id.clone(),
                    })
                    .collect();

                let names: Vec<&str> = vxlan_interfaces.iter().map(|i| i.name.as_str()).collect();
                let summary = range::encode(&names, true)?.concat();

                out.insert(
                    host.clone(),
                    HostVxlans {
                        local_tunnelip: self.loopback_addr(host)?,
                        vxlan_interfaces,
                        summary,
                    },
                );
            }

            tracing::info!("Derived VXLAN interfaces for {} hosts", out.len());
            Ok(out)
        })
    }

    /// host -> tenant -> L3-VNI id
    pub fn l3vni(&self) -> Result<HostMap<IndexMap<String, String>>> {
        Ok(self
            .vxlans()?
            .iter()
            .map(|(host, v)| {
                let tenants = v
                    .vxlan_interfaces
                    .iter()
                    .filter(|i| i.kind == VlanKind::L3)
                    .map(|i| (i.tenant.clone(), i.id.clone()))
                    .collect();
                (host.clone(), tenants)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{fixture, Pipeline};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_leaf_vxlans() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let v = &p.vxlans().unwrap()["leaf01"];

        assert_eq!(v.local_tunnelip, "192.168.2.1");
        assert_eq!(v.summary, "vni100-101,4000");
        let names: Vec<&str> = v.vxlan_interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["vni100", "vni101", "vni4000"]);

        let view = p.render("vxlans").unwrap();
        assert_eq!(
            view["leaf01"]["vxlan_interfaces"][2],
            json!({"alias": "tenant01.4000.l3vni", "name": "vni4000", "vlan": "vlan4000", "tenant": "tenant01", "type": "l3", "id": "4000", "vid": "4000"})
        );
    }

    #[test]
    fn test_border_carries_every_l3vni() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let v = &p.vxlans().unwrap()["border02"];
        assert_eq!(v.summary, "vni4000-4001");
        assert_eq!(v.local_tunnelip, "192.168.1.2");
    }

    #[test]
    fn test_l3vni_view() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let view = p.render("l3vni").unwrap();
        assert_eq!(view["leaf03"], json!({"tenant02": "4001"}));
        assert_eq!(view["border01"], json!({"tenant01": "4000", "tenant02": "4001"}));
    }
}

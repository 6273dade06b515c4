use crate::errors::{FabricError, Result};
use crate::models::{group_role, Host, HostSvi, L2Svi, L3Svi, VlanKind};
use crate::utils::net::nth_host;
use crate::utils::{ROUTER_MAC_BASE, VRR_MAC_BASE};

use super::{cached, HostMap, Pipeline};

impl Pipeline<'_> {
    /// SVIs of every host carrying VLANs.
    ///
    /// The host address counts down from the top of the VLAN subnet by host
    /// id; the shared `vip` is the last usable address.
    pub fn vlans_interface(&self) -> Result<&HostMap<HostSvi>> {
        cached(&self.svi, || {
            let networks = self.vlans_network()?;
            let mut out = HostMap::new();

            for (name, vlans) in self.host_vlans()? {
                let host = Host::parse(name)?;
                let is_leaf = self.in_group(name, group_role::LEAF);
                let mut svi = HostSvi::default();

                for vlan in vlans {
                    svi.vids.push(vlan.id.clone());
                    let vid: u32 = vlan.id.parse().map_err(|_| {
                        FabricError::invalid_topology(format!("VLAN id '{}' is not a number", vlan.id))
                    })?;

                    match vlan.kind {
                        VlanKind::L2 => {
                            let net = networks.get(&vlan.vlan).map(|n| n.network_prefix).ok_or_else(|| {
                                FabricError::invalid_topology(format!("{} has no subnet", vlan.vlan))
                            })?;
                            let len = net.prefix_len();
                            svi.l2svi.push(L2Svi {
                                name: vlan.name.clone(),
                                ip: format!("{}/{}", nth_host(&net, -i64::from(host.id))?, len),
                                vip: format!("{}/{}", nth_host(&net, 0)?, len),
                                vhwaddr: (VRR_MAC_BASE + vid).to_string(),
                                vrf: vlan.tenant.clone(),
                                vlan: vlan.vlan.clone(),
                                vid: vlan.id.clone(),
                            });
                        }
                        VlanKind::L3 => svi.l3svi.push(L3Svi {
                            router_mac: is_leaf.then(|| (ROUTER_MAC_BASE - host.rack_id).to_string()),
                            vrf: vlan.tenant.clone(),
                            vlan: vlan.vlan.clone(),
                            vid: vlan.id.clone(),
                            vni: vlan.id.clone(),
                        }),
                    }
                }

                out.insert(name.clone(), svi);
            }

            tracing::info!("Derived SVIs for {} hosts", out.len());
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{fixture, Pipeline};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_leaf_svis() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let view = p.render("vlans_interface").unwrap();

        assert_eq!(
            view["leaf01"]["l2svi"][0],
            json!({
                "name": "vlan100",
                "ip": "172.16.0.253/24",
                "vip": "172.16.0.254/24",
                "vhwaddr": "44:38:39:ff:01:64",
                "vrf": "tenant01",
                "vlan": "vlan100",
                "vid": "100"
            })
        );
        assert_eq!(view["leaf02"]["l2svi"][0]["ip"], "172.16.0.252/24");
        assert_eq!(view["leaf02"]["l2svi"][0]["vip"], "172.16.0.254/24");
        assert_eq!(
            view["leaf01"]["l3svi"],
            json!([{"router_mac": "44:39:39:ff:ff:fe", "vrf": "tenant01", "vlan": "vlan4000", "vid": "4000", "vni": "4000"}])
        );
        assert_eq!(view["leaf01"]["vids"], json!(["100", "101", "4000"]));
    }

    #[test]
    fn test_rack_router_mac_and_border() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let svi = p.vlans_interface().unwrap();

        assert_eq!(svi["leaf03"].l3svi[0].router_mac.as_deref(), Some("44:39:39:ff:ff:fd"));
        assert_eq!(svi["leaf03"].l2svi[0].vhwaddr, "44:38:39:ff:02:f4");

        let border = &svi["border01"];
        assert!(border.l2svi.is_empty());
        assert_eq!(border.vids, vec!["4000", "4001"]);
        assert!(border.l3svi.iter().all(|l3| l3.router_mac.is_none()));
    }
}

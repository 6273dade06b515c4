use crate::errors::{FabricError, Result};
use crate::inventory::require_hosts;
use crate::models::{group_role, Host, LoopbackIps};
use crate::utils::net::nth_host;

use super::{cached, HostMap, Pipeline};

impl Pipeline<'_> {
    /// Loopback per host from its group's block; leaves also get the
    /// anycast VTEP address shared by their rack.
    pub fn loopback_ips(&self) -> Result<&HostMap<LoopbackIps>> {
        cached(&self.loopbacks, || {
            let base = &self.topology.base_networks;
            let leaves = self.members(group_role::LEAF);

            let mut out = HostMap::new();
            for (group, block) in &base.loopbacks {
                for name in require_hosts(&self.inventory, group)? {
                    let host = Host::parse(&name)?;
                    let lo = nth_host(block, i64::from(host.id))?;

                    let anycast = if leaves.contains(&name) {
                        let anycast_block = base.vxlan_anycast.as_ref().ok_or_else(|| {
                            FabricError::invalid_topology("base_networks.vxlan_anycast is required for leaf hosts")
                        })?;
                        Some(nth_host(anycast_block, i64::from(host.rack_id))?.to_string())
                    } else {
                        None
                    };

                    out.insert(
                        name,
                        LoopbackIps {
                            ip_addresses: vec![format!("{}/32", lo)],
                            clag_vxlan_anycast_ip: anycast,
                        },
                    );
                }
            }

            tracing::info!("Derived loopbacks for {} hosts", out.len());
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{fixture, Pipeline};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_leaf_loopbacks_and_anycast() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let lo = p.loopback_ips().unwrap();

        assert_eq!(lo["leaf01"].ip_addresses, vec!["192.168.2.1/32"]);
        assert_eq!(lo["leaf02"].ip_addresses, vec!["192.168.2.2/32"]);
        assert_eq!(lo["leaf01"].clag_vxlan_anycast_ip.as_deref(), Some("192.168.8.1"));
        assert_eq!(lo["leaf01"].clag_vxlan_anycast_ip, lo["leaf02"].clag_vxlan_anycast_ip);
        assert_eq!(lo["leaf03"].clag_vxlan_anycast_ip.as_deref(), Some("192.168.8.2"));

        assert_eq!(lo["spine02"].ip_addresses, vec!["192.168.0.2/32"]);
        assert_eq!(lo["edge01"].ip_addresses, vec!["192.168.0.129/32"]);
        assert_eq!(lo["spine01"].clag_vxlan_anycast_ip, None);
    }

    #[test]
    fn test_loopback_json_shape() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        let view = p.render("loopback_ips").unwrap();
        assert_eq!(
            view["spine01"],
            serde_json::json!({"ip_addresses": ["192.168.0.1/32"], "clag_vxlan_anycast_ip": null})
        );
    }
}

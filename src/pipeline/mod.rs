//! Dependency-ordered derivation of the per-host configuration views.
//!
//! Each stage is computed at most once per [`Pipeline`] and cached; stages
//! pull the stages they depend on through the same accessors. A stage that
//! owns an allocation pool writes the pool back as soon as it completes.

mod bgp;
mod interfaces;
mod loopbacks;
mod mlag;
mod nat;
mod subnets;
mod svi;
mod vlans;
mod vxlans;

use std::cell::OnceCell;
use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::db::AllocationStore;
use crate::errors::{FabricError, Result};
use crate::inventory::{group_members, Inventory, RackInventory};
use crate::links;
use crate::models::*;

pub use interfaces::PtpLink;
pub use vlans::VlanCatalog;

/// Names accepted by [`Pipeline::render`], in dependency order
pub const VIEWS: &[&str] = &[
    "loopback_ips",
    "vlans",
    "mlag_peerlink",
    "mlag_bonds",
    "vxlans",
    "l3vni",
    "vlans_network",
    "vlans_interface",
    "ip_interfaces",
    "unnumbered_interfaces",
    "bgp_neighbors",
    "nat_rules",
    "nat",
];

/// host -> view record
pub type HostMap<T> = IndexMap<String, T>;
/// host -> interface -> view record
pub type InterfaceMap<T> = IndexMap<String, IndexMap<String, T>>;

pub struct Pipeline<'a> {
    topology: &'a Topology,
    inventory: RackInventory<'a>,
    store: &'a dyn AllocationStore,

    loopbacks: OnceCell<HostMap<LoopbackIps>>,
    catalog: OnceCell<VlanCatalog>,
    clag_ids: OnceCell<BTreeMap<String, BTreeMap<String, u32>>>,
    bonds: OnceCell<HostMap<HostBonds>>,
    host_vlans: OnceCell<HostMap<Vec<VlanRecord>>>,
    vxlans: OnceCell<HostMap<HostVxlans>>,
    vlans_network: OnceCell<BTreeMap<String, VlanNetwork>>,
    svi: OnceCell<HostMap<HostSvi>>,
    ptp_links: OnceCell<Vec<PtpLink>>,
    link_networks: OnceCell<BTreeMap<String, ipnet::Ipv4Net>>,
    ip_interfaces: OnceCell<InterfaceMap<IpInterface>>,
    unnumbered: OnceCell<InterfaceMap<UnnumberedInterface>>,
    bgp: OnceCell<HostMap<IndexMap<String, BgpVrf>>>,
    nat_rules: OnceCell<BTreeMap<String, NatRule>>,
}

/// Return the cached value or compute, store and return it
fn cached<T>(cell: &OnceCell<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

fn to_json<T: Serialize>(view: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| FabricError::Render { view: view.to_string(), source })
}

impl<'a> Pipeline<'a> {
    /// Wire the collaborators and run the checks every view depends on
    pub fn new(topology: &'a Topology, inventory: &'a dyn Inventory, store: &'a dyn AllocationStore) -> Result<Self> {
        let racks: Vec<&String> = topology.mlag_bonds.keys().collect();
        let inventory = RackInventory::new(inventory, &racks)?;

        links::check_overlaps(&inventory, &topology.network_links)?;

        Ok(Self {
            topology,
            inventory,
            store,
            loopbacks: OnceCell::new(),
            catalog: OnceCell::new(),
            clag_ids: OnceCell::new(),
            bonds: OnceCell::new(),
            host_vlans: OnceCell::new(),
            vxlans: OnceCell::new(),
            vlans_network: OnceCell::new(),
            svi: OnceCell::new(),
            ptp_links: OnceCell::new(),
            link_networks: OnceCell::new(),
            ip_interfaces: OnceCell::new(),
            unnumbered: OnceCell::new(),
            bgp: OnceCell::new(),
            nat_rules: OnceCell::new(),
        })
    }

    /// Compute one view and return it as JSON
    pub fn render(&self, view: &str) -> Result<Value> {
        tracing::debug!("Rendering {}", view);
        match view {
            "loopback_ips" => to_json(view, self.loopback_ips()?),
            "vlans" => to_json(view, self.vlan_catalog()?.records()),
            "mlag_peerlink" => to_json(view, &self.mlag_peerlink()?),
            "mlag_bonds" => to_json(view, self.mlag_bonds()?),
            "vxlans" => to_json(view, self.vxlans()?),
            "l3vni" => to_json(view, &self.l3vni()?),
            "vlans_network" => to_json(view, self.vlans_network()?),
            "vlans_interface" => to_json(view, self.vlans_interface()?),
            "ip_interfaces" => to_json(view, self.ip_interfaces()?),
            "unnumbered_interfaces" => to_json(view, self.unnumbered_interfaces()?),
            "bgp_neighbors" => to_json(view, self.bgp_neighbors()?),
            "nat_rules" => to_json(view, &self.nat_rule_table()?),
            "nat" => to_json(view, &self.nat()?),
            other => Err(FabricError::UnknownView(other.to_string())),
        }
    }

    fn members(&self, group: &str) -> Vec<String> {
        group_members(&self.inventory, group)
    }

    fn in_group(&self, host: &str, group: &str) -> bool {
        self.members(group).iter().any(|h| h == host)
    }

    /// Loopback address of a host without the prefix length
    fn loopback_addr(&self, host: &str) -> Result<String> {
        self.loopback_ips()?
            .get(host)
            .and_then(|lo| lo.ip_addresses.first())
            .map(|ip| ip.split('/').next().unwrap_or(ip).to_string())
            .ok_or_else(|| FabricError::invalid_topology(format!("host '{}' has no loopback address", host)))
    }
}


#[cfg(test)]
mod tests {
    use super::fixture;
    use super::*;
    use crate::db::pool_name;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_view_renders() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        for view in VIEWS {
            let value = p.render(view).unwrap();
            assert!(value.is_object(), "{} is not an object", view);
        }
    }

    #[test]
    fn test_unknown_view() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());
        let p = Pipeline::new(&topo, &inv, &store).unwrap();
        assert!(matches!(p.render("nope"), Err(FabricError::UnknownView(v)) if v == "nope"));
    }

    #[test]
    fn test_full_runs_are_idempotent() {
        let (topo, inv, store) = (fixture::topology(), fixture::inventory(), fixture::store());

        let first: Vec<Value> = {
            let p = Pipeline::new(&topo, &inv, &store).unwrap();
            VIEWS.iter().map(|v| p.render(v).unwrap()).collect()
        };
        let writes: Vec<usize> = pool_name::ALL.iter().map(|p| store.writes(p)).collect();

        let second: Vec<Value> = {
            let p = Pipeline::new(&topo, &inv, &store).unwrap();
            VIEWS.iter().map(|v| p.render(v).unwrap()).collect()
        };

        assert_eq!(first, second);
        let after: Vec<usize> = pool_name::ALL.iter().map(|p| store.writes(p)).collect();
        assert_eq!(writes, after, "pools must not be rewritten when nothing changed");
        assert!(writes.iter().all(|w| *w == 1));
    }

    #[test]
    fn test_overlapping_links_abort_construction() {
        let mut topo = fixture::topology();
        topo.network_links[0].links.push("spine:swp3 -- edge:eth9".into());
        let (inv, store) = (fixture::inventory(), fixture::store());
        assert!(matches!(
            Pipeline::new(&topo, &inv, &store),
            Err(FabricError::OverlappingInterface { .. })
        ));
    }
}

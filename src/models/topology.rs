use indexmap::IndexMap;
use ipnet::Ipv4Net;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{FabricError, Result};
use crate::utils::net::overlaps;

/// Group names that change how a host is treated
pub mod group_role {
    pub const SPINE: &str = "spine";
    pub const LEAF: &str = "leaf";
    pub const BORDER: &str = "border";
    pub const EDGE: &str = "edge";
}

/// The topology document (usually `master.yml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub base_networks: BaseNetworks,
    #[serde(default)]
    pub vlans: IndexMap<String, Vec<VlanSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlag_peerlink_interfaces: Option<String>,
    #[serde(default)]
    pub mlag_bonds: IndexMap<String, Vec<BondSpec>>,
    #[serde(default)]
    pub network_links: Vec<LinkSpec>,
    #[serde(default)]
    pub ip_interfaces: IndexMap<String, IndexMap<String, StaticInterface>>,
    #[serde(default)]
    pub base_asn: IndexMap<String, u32>,
}

/// Address blocks every allocation is carved from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseNetworks {
    #[serde(default)]
    pub loopbacks: IndexMap<String, Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan_anycast: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlans: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oob_management: Option<Ipv4Net>,
    /// One block per IP link collection, keyed by the collection name
    #[serde(flatten)]
    pub links: IndexMap<String, Ipv4Net>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanSpec {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "prefix", skip_serializing_if = "Option::is_none")]
    pub network_prefix: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefixlen: Option<u8>,
    #[serde(default)]
    pub allow_nat: bool,
}

/// A server bond terminated on both leaves of a rack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondSpec {
    pub name: String,
    pub members: String,
    #[serde(deserialize_with = "string_or_number")]
    pub vids: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Ip,
    SubInterface,
    Unnumbered,
}

/// A named collection of link shorthands such as `spine:swp1 -- leaf:swp21`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub name: String,
    pub links: Vec<String>,
    pub interface_type: InterfaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vifs: Option<Vec<Vif>>,
}

/// Sub-interface declaration of a `sub_interface` link collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vif {
    #[serde(deserialize_with = "string_or_number")]
    pub vid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
}

/// Statically addressed interface copied into the `ip_interfaces` view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticInterface {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_nat: Option<String>,
}

impl StaticInterface {
    pub fn is_nat_outside(&self) -> bool {
        self.ip_nat.as_deref() == Some("outside")
    }
}

/// YAML lets ids be written as `100` or `'100'`; both mean the same VLAN.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

impl Topology {
    /// Parse and validate a topology document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let topology: Topology = serde_yaml::from_str(text)
            .map_err(|e| FabricError::invalid_topology(e.to_string()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Structural checks that do not need the inventory
    pub fn validate(&self) -> Result<()> {
        self.check_base_networks()?;
        self.check_vlan_ids()?;
        Ok(())
    }

    /// Every named base block, in document order
    pub fn named_blocks(&self) -> Vec<(String, Ipv4Net)> {
        let b = &self.base_networks;
        let mut blocks: Vec<(String, Ipv4Net)> = b
            .loopbacks
            .iter()
            .map(|(group, net)| (format!("loopbacks.{}", group), *net))
            .collect();
        let singles = [
            ("vxlan_anycast", b.vxlan_anycast),
            ("vlans", b.vlans),
            ("oob_management", b.oob_management),
        ];
        blocks.extend(singles.into_iter().filter_map(|(k, v)| v.map(|n| (k.to_string(), n))));
        blocks.extend(b.links.iter().map(|(k, v)| (k.clone(), *v)));
        blocks
    }

    fn check_base_networks(&self) -> Result<()> {
        let blocks = self.named_blocks();

        for (name, net) in &blocks {
            if net.addr() != net.network() {
                return Err(FabricError::invalid_topology(format!(
                    "base network '{}' is not a network address: {}",
                    name, net
                )));
            }
        }

        for (i, (name_a, a)) in blocks.iter().enumerate() {
            for (name_b, b) in &blocks[i + 1..] {
                if overlaps(a, b) {
                    return Err(FabricError::invalid_topology(format!(
                        "base networks '{}' ({}) and '{}' ({}) overlap",
                        name_a, a, name_b, b
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_vlan_ids(&self) -> Result<()> {
        let mut seen: IndexMap<&str, &str> = IndexMap::new();
        for (tenant, vlans) in &self.vlans {
            for vlan in vlans {
                if vlan.id.parse::<u16>().is_err() {
                    return Err(FabricError::invalid_topology(format!(
                        "VLAN id '{}' of tenant '{}' is not a number",
                        vlan.id, tenant
                    )));
                }
                if let Some(owner) = seen.insert(vlan.id.as_str(), tenant.as_str()) {
                    return Err(FabricError::invalid_topology(format!(
                        "VLAN id {} is declared by both '{}' and '{}'",
                        vlan.id, owner, tenant
                    )));
                }
            }
        }
        Ok(())
    }

    /// Base block of an IP link collection
    pub fn link_block(&self, name: &str) -> Result<Ipv4Net> {
        self.base_networks.links.get(name).copied().ok_or_else(|| {
            FabricError::invalid_topology(format!(
                "no base network declared for link collection '{}'",
                name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"
base_networks:
  loopbacks:
    spine: 192.168.0.0/25
    leaf: 192.168.2.0/23
  vxlan_anycast: 192.168.8.0/23
  vlans: 172.16.0.0/14
  external_connectivity: 192.168.254.0/23
vlans:
  tenant01:
    - { id: 100, name: vlan100, prefixlen: 24 }
    - { id: '101', name: web, prefix: 10.10.0.0/24, allow_nat: true }
mlag_bonds:
  rack01:
    - { name: server01, members: swp1, vids: 100 }
network_links:
  - name: fabric
    links: ['spine:swp1 -- leaf:swp21']
    interface_type: unnumbered
  - name: external_connectivity
    links: ['edge:eth0 -- border:swp1']
    interface_type: sub_interface
    vifs:
      - { vid: 4000, vrf: tenant01 }
ip_interfaces:
  edge01:
    eth3: { address: dhcp, ip_nat: outside }
base_asn:
  spine: 65000
"#;

    #[test]
    fn test_parse_document() {
        let t = Topology::from_yaml(DOC).unwrap();
        assert_eq!(t.base_networks.loopbacks.len(), 2);
        assert_eq!(
            t.link_block("external_connectivity").unwrap().to_string(),
            "192.168.254.0/23"
        );
        assert!(t.link_block("fabric").is_err());

        let vlans = &t.vlans["tenant01"];
        assert_eq!(vlans[0].id, "100");
        assert_eq!(vlans[0].prefixlen, Some(24));
        assert_eq!(vlans[1].network_prefix.unwrap().to_string(), "10.10.0.0/24");
        assert!(vlans[1].allow_nat);

        assert_eq!(t.mlag_bonds["rack01"][0].vids, "100");
        assert_eq!(t.network_links[0].interface_type, InterfaceType::Unnumbered);
        assert_eq!(t.network_links[1].vifs.as_ref().unwrap()[0].vid, "4000");
        assert!(t.ip_interfaces["edge01"]["eth3"].is_nat_outside());
    }

    #[test]
    fn test_rejects_host_bits_in_base_network() {
        let err = Topology::from_yaml("base_networks:\n  vlans: 172.16.0.1/14\n").unwrap_err();
        assert!(err.to_string().contains("not a network address"));
    }

    #[test]
    fn test_rejects_overlapping_base_networks() {
        let doc = "base_networks:\n  vlans: 10.0.0.0/8\n  oob_management: 10.1.0.0/24\n";
        let err = Topology::from_yaml(doc).unwrap_err();
        assert!(matches!(err, FabricError::InvalidTopology(m) if m.contains("overlap")));
    }

    #[test]
    fn test_rejects_duplicate_vlan_ids() {
        let doc = "vlans:\n  a:\n    - { id: 100, name: x }\n  b:\n    - { id: 100, name: y }\n";
        assert!(Topology::from_yaml(doc).is_err());
    }
}

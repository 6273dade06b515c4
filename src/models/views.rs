//! Output records of the derivation pipeline. Field names are the ones the
//! provisioning templates consume.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopbackIps {
    pub ip_addresses: Vec<String>,
    pub clag_vxlan_anycast_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlanKind {
    L2,
    L3,
}

/// Catalog entry of an L2 VLAN or a tenant's L3-VNI VLAN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanRecord {
    pub id: String,
    pub name: String,
    pub tenant: String,
    #[serde(rename = "type")]
    pub kind: VlanKind,
    pub vlan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_prefix: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefixlen: Option<u8>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_nat: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlagPeerlink {
    pub priority: String,
    pub system_mac: String,
    pub interfaces: String,
    pub backup_ip: String,
    pub peer_ip: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bond {
    pub name: String,
    pub vids: String,
    pub clag_id: u32,
    pub tenant: String,
    pub members: String,
    pub alias: String,
}

/// Bonds sharing one VLAN set on the bridge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeMembers {
    pub mode: String,
    pub vids: String,
    pub bonds: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostBonds {
    pub bonds: Vec<Bond>,
    pub bridge: Vec<BridgeMembers>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VxlanInterface {
    pub alias: String,
    pub name: String,
    pub vlan: String,
    pub tenant: String,
    #[serde(rename = "type")]
    pub kind: VlanKind,
    pub id: String,
    pub vid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostVxlans {
    pub local_tunnelip: String,
    pub vxlan_interfaces: Vec<VxlanInterface>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetAllocation {
    Manual,
    AutoPrefixlen,
    AutoNetworkPrefix,
}

/// Persisted subnet of one VLAN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanNetwork {
    pub allocation: SubnetAllocation,
    pub network_prefix: Ipv4Net,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct L2Svi {
    pub name: String,
    pub ip: String,
    pub vip: String,
    pub vhwaddr: String,
    pub vrf: String,
    pub vlan: String,
    pub vid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct L3Svi {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_mac: Option<String>,
    pub vrf: String,
    pub vlan: String,
    pub vid: String,
    pub vni: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostSvi {
    pub l2svi: Vec<L2Svi>,
    pub l3svi: Vec<L3Svi>,
    pub vids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpNeighbor {
    pub host: String,
    pub address: String,
    pub interface: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpInterface {
    pub ip: String,
    pub alias: Option<String>,
    pub vrf: String,
    pub neighbor: Option<IpNeighbor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnnumberedNeighbor {
    pub host: String,
    pub interface: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnnumberedInterface {
    pub alias: String,
    pub vrf: String,
    pub neighbor: UnnumberedNeighbor,
}

/// `remote-as` of a BGP session: a number, or `external` for unnumbered peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAs {
    Asn(u32),
    External,
}

impl Serialize for RemoteAs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemoteAs::Asn(asn) => serializer.serialize_u32(*asn),
            RemoteAs::External => serializer.serialize_str("external"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgpNeighbor {
    pub neighbor: String,
    pub remote_as: RemoteAs,
    pub remote_id: String,
    pub peer_group: String,
    pub remote_host: String,
    pub remote_interface: String,
    pub local_interface: String,
}

/// BGP instance of one VRF on one host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BgpVrf {
    pub router_id: String,
    #[serde(rename = "as")]
    pub asn: u32,
    pub neighbors: Vec<BgpNeighbor>,
    pub peer_groups: Vec<String>,
}

/// Persisted NAT rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatRule {
    pub name: String,
    pub tenant: String,
    pub source_address: Ipv4Net,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostNat {
    pub interface: String,
    pub name: String,
    pub rule: u32,
    pub tenant: String,
    pub src_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_remote_as_serializes_number_or_external() {
        assert_eq!(serde_json::to_value(RemoteAs::Asn(65001)).unwrap(), json!(65001));
        assert_eq!(serde_json::to_value(RemoteAs::External).unwrap(), json!("external"));
    }

    #[test]
    fn test_vlan_record_field_names() {
        let rec = VlanRecord {
            id: "4000".into(),
            name: "l3vni".into(),
            tenant: "tenant01".into(),
            kind: VlanKind::L3,
            vlan: "vlan4000".into(),
            index: None,
            network_prefix: None,
            prefixlen: None,
            allow_nat: false,
        };
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({"id": "4000", "name": "l3vni", "tenant": "tenant01", "type": "l3", "vlan": "vlan4000"})
        );
    }

    #[test]
    fn test_vlan_network_pool_format() {
        let v: VlanNetwork = serde_json::from_value(
            json!({"allocation": "auto_prefixlen", "network_prefix": "172.16.0.0/24"}),
        )
        .unwrap();
        assert_eq!(v.allocation, SubnetAllocation::AutoPrefixlen);
        assert_eq!(v.network_prefix.prefix_len(), 24);
    }
}

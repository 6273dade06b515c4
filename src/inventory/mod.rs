//! Host and group lookup.
//!
//! The engine only sees the [`Inventory`] trait. [`StaticInventory`] loads
//! YAML or Ansible INI files, [`RackInventory`] layers the synthetic rack
//! groups (`rack01`, ...) on top of any inventory.

mod ini;

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::errors::{FabricError, Result};
use crate::models::{group_role, Host};
use crate::utils::range::natural_sort;

pub const ALL_GROUP: &str = "all";
/// Control host of Ansible inventories, never part of the fabric
const LOCALHOST: &str = "localhost";

pub trait Inventory {
    /// Members of a group, or `[name]` when `name` is a single host.
    /// `None` when it is neither.
    fn hosts_of(&self, name: &str) -> Option<Vec<String>>;

    /// First group (in declaration order) that contains the host
    fn primary_group_of(&self, host: &str) -> Option<String>;
}

/// `hosts_of` that turns a miss into an error
pub fn require_hosts(inv: &dyn Inventory, name: &str) -> Result<Vec<String>> {
    inv.hosts_of(name)
        .ok_or_else(|| FabricError::invalid_topology(format!("'{}' is neither a group nor a host", name)))
}

/// `primary_group_of` that turns a miss into an error
pub fn require_group(inv: &dyn Inventory, host: &str) -> Result<String> {
    inv.primary_group_of(host)
        .ok_or_else(|| FabricError::invalid_topology(format!("host '{}' is not in any group", host)))
}

/// Members of a group, empty when the group does not exist
pub fn group_members(inv: &dyn Inventory, group: &str) -> Vec<String> {
    inv.hosts_of(group).unwrap_or_default()
}

/// The other host of the same primary group sharing the rack id
pub fn peer_of(inv: &dyn Inventory, host: &Host) -> Result<Option<String>> {
    let group = require_group(inv, &host.name)?;
    for candidate in group_members(inv, &group) {
        if candidate == host.name {
            continue;
        }
        if Host::parse(&candidate)?.rack_id == host.rack_id {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Inventory loaded from a file, immutable after construction
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    groups: IndexMap<String, Vec<String>>,
}

impl StaticInventory {
    /// Build from `group -> hosts`. Drops `localhost` and adds the
    /// synthetic `all` group.
    pub fn new(mut groups: IndexMap<String, Vec<String>>) -> Result<Self> {
        groups.shift_remove(ALL_GROUP);
        for hosts in groups.values_mut() {
            hosts.retain(|h| h != LOCALHOST);
        }

        let mut all: Vec<String> = Vec::new();
        for hosts in groups.values() {
            for host in hosts {
                if !all.contains(host) {
                    all.push(host.clone());
                }
            }
        }
        groups.insert(ALL_GROUP.to_string(), all);

        let inv = Self { groups };
        inv.validate()?;
        Ok(inv)
    }

    /// YAML inventory: `group: [host, ...]`
    pub fn from_yaml(text: &str) -> Result<Self> {
        let groups: IndexMap<String, Vec<String>> = serde_yaml::from_str(text)
            .map_err(|e| FabricError::invalid_topology(format!("inventory: {}", e)))?;
        Self::new(groups)
    }

    /// Ansible-style INI inventory
    pub fn from_ini(text: &str) -> Result<Self> {
        Self::new(ini::parse(text)?)
    }

    /// Pick the format from the file name: `.yml`/`.yaml` is YAML, anything
    /// else is INI.
    pub fn parse(file_name: &str, text: &str) -> Result<Self> {
        if file_name.ends_with(".yml") || file_name.ends_with(".yaml") {
            Self::from_yaml(text)
        } else {
            Self::from_ini(text)
        }
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Every host must carry a numeric id, unique among the hosts of its
    /// primary group. Parent groups mix roles and are not checked.
    fn validate(&self) -> Result<()> {
        for (group, hosts) in &self.groups {
            if group == ALL_GROUP {
                continue;
            }
            let mut ids: BTreeMap<u32, &str> = BTreeMap::new();
            for host in hosts {
                let parsed = Host::parse(host)?;
                if self.primary_group_of(host).as_deref() != Some(group.as_str()) {
                    continue;
                }
                if let Some(other) = ids.insert(parsed.id, host) {
                    return Err(FabricError::invalid_topology(format!(
                        "hosts '{}' and '{}' of group '{}' share id {}",
                        other, host, group, parsed.id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Inventory for StaticInventory {
    fn hosts_of(&self, name: &str) -> Option<Vec<String>> {
        if let Some(hosts) = self.groups.get(name) {
            return Some(hosts.clone());
        }
        let all = self.groups.get(ALL_GROUP)?;
        all.iter().any(|h| h == name).then(|| vec![name.to_string()])
    }

    fn primary_group_of(&self, host: &str) -> Option<String> {
        self.groups
            .iter()
            .filter(|(group, _)| group.as_str() != ALL_GROUP)
            .find(|(_, hosts)| hosts.iter().any(|h| h == host))
            .map(|(group, _)| group.clone())
    }
}

/// Adds `rackNN` groups holding the leaf hosts of each rack
pub struct RackInventory<'a> {
    inner: &'a dyn Inventory,
    racks: IndexMap<String, Vec<String>>,
}

impl<'a> RackInventory<'a> {
    pub fn new<S: AsRef<str>>(inner: &'a dyn Inventory, rack_names: &[S]) -> Result<Self> {
        let mut racks: IndexMap<String, Vec<String>> = rack_names
            .iter()
            .map(|r| (r.as_ref().to_string(), Vec::new()))
            .collect();

        for leaf in group_members(inner, group_role::LEAF) {
            let host = Host::parse(&leaf)?;
            if let Some(members) = racks.get_mut(&host.rack()) {
                members.push(leaf);
            }
        }
        for members in racks.values_mut() {
            natural_sort(members);
        }

        Ok(Self { inner, racks })
    }
}

impl Inventory for RackInventory<'_> {
    fn hosts_of(&self, name: &str) -> Option<Vec<String>> {
        self.racks.get(name).cloned().or_else(|| self.inner.hosts_of(name))
    }

    fn primary_group_of(&self, host: &str) -> Option<String> {
        self.inner.primary_group_of(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
spine: [spine01, spine02]
leaf: [leaf01, leaf02, leaf03, leaf04]
border: [border01, border02]
"#;

    #[test]
    fn test_group_then_host_lookup() {
        let inv = StaticInventory::from_yaml(YAML).unwrap();
        assert_eq!(inv.hosts_of("spine").unwrap(), vec!["spine01", "spine02"]);
        assert_eq!(inv.hosts_of("leaf03").unwrap(), vec!["leaf03"]);
        assert_eq!(inv.hosts_of("nothing"), None);
        assert_eq!(inv.hosts_of(ALL_GROUP).unwrap().len(), 8);
        assert_eq!(inv.primary_group_of("border02").unwrap(), "border");
        assert_eq!(inv.primary_group_of("ghost"), None);
        assert!(require_hosts(&inv, "nothing").is_err());
    }

    #[test]
    fn test_duplicate_id_in_group_is_rejected() {
        let err = StaticInventory::from_yaml("leaf: [leaf01, leaf1]\n").unwrap_err();
        assert!(err.to_string().contains("share id 1"));
    }

    #[test]
    fn test_ini_and_yaml_agree() {
        let ini = "[spine]\nspine01\nspine02\n[leaf]\nleaf01\nleaf02\n";
        let a = StaticInventory::parse("devices", ini).unwrap();
        let b = StaticInventory::parse("devices.yml", "spine: [spine01, spine02]\nleaf: [leaf01, leaf02]\n").unwrap();
        assert_eq!(a.group_names().collect::<Vec<_>>(), b.group_names().collect::<Vec<_>>());
        assert_eq!(a.hosts_of("leaf"), b.hosts_of("leaf"));
    }

    #[test]
    fn test_children_group_accepted() {
        let ini = "[spine]\nspine01\nspine02\n[leaf]\nleaf01\nleaf02\n[network:children]\nspine\nleaf\n";
        let inv = StaticInventory::parse("devices", ini).unwrap();
        assert_eq!(inv.hosts_of("network").unwrap(), vec!["spine01", "spine02", "leaf01", "leaf02"]);
        assert_eq!(inv.primary_group_of("leaf01").unwrap(), "leaf");

        let dup = "[leaf]\nleaf01\nleaf1\n[network:children]\nleaf\n";
        assert!(StaticInventory::parse("devices", dup).unwrap_err().to_string().contains("share id 1"));
    }

    #[test]
    fn test_localhost_is_ignored() {
        let inv = StaticInventory::parse("devices", "localhost ansible_connection=local\n[leaf]\nleaf01\nleaf02\n").unwrap();
        assert_eq!(inv.hosts_of(ALL_GROUP).unwrap(), vec!["leaf01", "leaf02"]);
        assert_eq!(inv.hosts_of("localhost"), None);
        assert_eq!(inv.primary_group_of("localhost"), None);
    }

    #[test]
    fn test_peer_host() {
        let inv = StaticInventory::from_yaml(YAML).unwrap();
        let leaf03 = Host::parse("leaf03").unwrap();
        assert_eq!(peer_of(&inv, &leaf03).unwrap().as_deref(), Some("leaf04"));
        let border01 = Host::parse("border01").unwrap();
        assert_eq!(peer_of(&inv, &border01).unwrap().as_deref(), Some("border02"));
    }

    #[test]
    fn test_rack_groups() {
        let inv = StaticInventory::from_yaml(YAML).unwrap();
        let racks = RackInventory::new(&inv, &["rack01", "rack02"]).unwrap();
        assert_eq!(racks.hosts_of("rack02").unwrap(), vec!["leaf03", "leaf04"]);
        assert_eq!(racks.hosts_of("spine").unwrap(), vec!["spine01", "spine02"]);
        assert_eq!(racks.primary_group_of("leaf01").unwrap(), "leaf");
    }
}

use regex_lite::Regex;
use serde::Serialize;

use crate::errors::{FabricError, Result};

/// Trailing number of a host name, plus anything non-numeric after it
const HOST_PATTERN: &str = r"^(.*?)(\d+)(\D*)$";

/// Identity derived from a host name such as `leaf03`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub name: String,
    /// Name prefix before the last number (`leaf`)
    pub group_name: String,
    pub id: u32,
    /// Two consecutive ids share a rack: 1,2 -> 1; 3,4 -> 2
    pub rack_id: u32,
}

impl Host {
    pub fn parse(name: &str) -> Result<Self> {
        let re = Regex::new(HOST_PATTERN).map_err(|e| FabricError::invalid_topology(e.to_string()))?;
        let caps = re.captures(name).ok_or_else(|| {
            FabricError::invalid_topology(format!("host '{}' has no numeric id", name))
        })?;

        let id: u32 = caps[2]
            .parse()
            .map_err(|_| FabricError::invalid_topology(format!("host '{}' id is out of range", name)))?;

        Ok(Self {
            name: name.to_string(),
            group_name: caps[1].to_string(),
            id,
            rack_id: id.div_ceil(2),
        })
    }

    /// Rack group name, e.g. `rack01`
    pub fn rack(&self) -> String {
        rack_name(self.rack_id)
    }

    pub fn is_odd(&self) -> bool {
        self.id % 2 == 1
    }
}

pub fn rack_name(rack_id: u32) -> String {
    format!("rack{:02}", rack_id)
}

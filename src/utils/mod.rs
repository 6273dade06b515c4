pub mod net;
pub mod range;

use std::fmt;
use std::str::FromStr;

use crate::errors::FabricError;

/// 48-bit MAC address held as an integer so offsets can be added or
/// subtracted (per-rack system MACs, per-VLAN virtual MACs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MacAddr(u64);

const MAC_MASK: u64 = 0xffff_ffff_ffff;

impl MacAddr {
    pub fn offset(self, delta: i64) -> Self {
        Self((self.0 as i64).wrapping_add(delta) as u64 & MAC_MASK)
    }
}

impl FromStr for MacAddr {
    type Err = FabricError;

    /// Accepts any separator style: "44:38:39:FF:01:00", "4438.39ff.0100"
    fn from_str(mac: &str) -> Result<Self, Self::Err> {
        let clean: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        if clean.len() != 12 {
            return Err(FabricError::invalid_topology(format!("invalid MAC address '{}'", mac)));
        }
        u64::from_str_radix(&clean, 16)
            .map(Self)
            .map_err(|_| FabricError::invalid_topology(format!("invalid MAC address '{}'", mac)))
    }
}

/// Lowercase with colons
impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl std::ops::Add<u32> for MacAddr {
    type Output = MacAddr;

    fn add(self, rhs: u32) -> MacAddr {
        self.offset(i64::from(rhs))
    }
}

impl std::ops::Sub<u32> for MacAddr {
    type Output = MacAddr;

    fn sub(self, rhs: u32) -> MacAddr {
        self.offset(-i64::from(rhs))
    }
}

/// Base for per-rack MLAG system MACs (minus rack id)
pub const CLAG_SYSTEM_MAC_BASE: MacAddr = MacAddr(0x4438_39ff_0100);
/// Base for SVI virtual MACs (plus VLAN id)
pub const VRR_MAC_BASE: MacAddr = MacAddr(0x4438_39ff_0100);
/// Base for per-rack L3 VNI router MACs (minus rack id)
pub const ROUTER_MAC_BASE: MacAddr = MacAddr(0x4439_39ff_ffff);

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::errors::{FabricError, Result};

/// Integer bounds (network, broadcast) of a prefix
pub fn bounds(net: &Ipv4Net) -> (u32, u32) {
    (u32::from(net.network()), u32::from(net.broadcast()))
}

/// True when the two prefixes share at least one address
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Usable host range (first, last) of a prefix.
/// /31 and /32 have no network or broadcast address to skip.
fn host_bounds(net: &Ipv4Net) -> (u32, u32) {
    let (first, last) = bounds(net);
    if net.prefix_len() >= 31 {
        (first, last)
    } else {
        (first + 1, last - 1)
    }
}

/// Number of usable hosts in a prefix
pub fn host_count(net: &Ipv4Net) -> u64 {
    let (first, last) = host_bounds(net);
    u64::from(last - first) + 1
}

/// Pick a host address by position.
///
/// Positions are 1-based from the bottom of the usable range. Zero and
/// negative positions count from the top: 0 is the last usable address,
/// -1 the one before it.
pub fn nth_host(net: &Ipv4Net, position: i64) -> Result<Ipv4Addr> {
    let (first, _) = host_bounds(net);
    let count = host_count(net) as i64;

    let mut idx = position - 1;
    if idx < 0 {
        idx += count;
    }
    if idx < 0 || idx >= count {
        return Err(FabricError::pool_exhausted(
            &net.to_string(),
            format!("no usable host at position {}", position),
        ));
    }

    Ok(Ipv4Addr::from(first + idx as u32))
}

/// Find the lowest aligned block of `prefix_len` inside
/// `[parent_net, parent_bcast]` that does not intersect any of the
/// `allocated` (network, broadcast) ranges.
pub fn next_available_prefix(
    parent_net: u32,
    parent_bcast: u32,
    prefix_len: u8,
    allocated: &[(u32, u32)],
) -> Option<(u32, u32)> {
    if prefix_len > 32 {
        return None;
    }

    let size: u64 = 1 << (32 - u32::from(prefix_len));
    let align = |v: u64| v.div_ceil(size) * size;
    let end = u64::from(parent_bcast);

    let mut candidate = align(u64::from(parent_net));
    while candidate + size - 1 <= end {
        let last = candidate + size - 1;
        let clash = allocated
            .iter()
            .filter(|(s, e)| u64::from(*s) <= last && u64::from(*e) >= candidate)
            .map(|(_, e)| u64::from(*e))
            .max();

        match clash {
            Some(e) => candidate = align(e + 1),
            None => return Some((candidate as u32, last as u32)),
        }
    }

    None
}

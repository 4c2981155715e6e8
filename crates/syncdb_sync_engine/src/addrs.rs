//! Local address enumeration.

use crate::error::{SyncError, SyncResult};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Returns this machine's non-loopback IPv4 addresses.
pub fn local_ipv4_addresses() -> SyncResult<Vec<String>> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| SyncError::Internal(format!("failed to list interfaces: {e}")))?;
    Ok(select_ipv4(interfaces.iter().map(|iface| iface.ip())))
}

fn select_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<String> {
    let mut seen: HashSet<Ipv4Addr> = HashSet::new();
    addrs
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .filter(|v4| seen.insert(*v4))
        .map(|v4| v4.to_string())
        .collect()
}

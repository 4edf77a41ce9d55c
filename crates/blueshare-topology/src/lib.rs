// BlueShare Topology Selector
// Star/bus/mesh/hybrid topology selection from an admitted device mix

//! # Topology Selector
//!
//! Chooses the logical wiring for a session from the admitted device
//! count and host count. Rules are evaluated in order; the first match
//! wins. A host count of zero is a fatal session error — STAR is never
//! used as a fallback for a hostless session (an earlier implementation
//! did this and it was a bug, not a feature).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    Star,
    Bus,
    Mesh,
    Hybrid,
}

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("no hosts available among {device_count} devices")]
    NoHostsAvailable { device_count: usize },
}

/// Select a topology for `device_count` devices of which `host_count` are hosts.
pub fn select_topology(device_count: usize, host_count: usize) -> Result<Topology, TopologyError> {
    if host_count == 0 {
        return Err(TopologyError::NoHostsAvailable { device_count });
    }

    if device_count <= 3 && host_count == 1 {
        Ok(Topology::Star)
    } else if device_count <= 5 && host_count <= 2 {
        Ok(Topology::Bus)
    } else if host_count >= 2 {
        Ok(Topology::Mesh)
    } else {
        Ok(Topology::Hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_star() {
        assert_eq!(select_topology(3, 1).unwrap(), Topology::Star);
    }

    #[test]
    fn four_devices_one_host_falls_to_bus() {
        assert_eq!(select_topology(4, 1).unwrap(), Topology::Bus);
    }

    #[test]
    fn mesh_threshold_at_two_hosts() {
        assert_eq!(select_topology(6, 2).unwrap(), Topology::Mesh);
    }

    #[test]
    fn hybrid_when_no_other_rule_matches() {
        // 6 devices, 1 host: fails STAR (count), fails BUS (count), fails
        // MESH (host_count < 2) -> HYBRID.
        assert_eq!(select_topology(6, 1).unwrap(), Topology::Hybrid);
    }

    #[test]
    fn no_hosts_is_fatal_not_star() {
        let err = select_topology(4, 0).unwrap_err();
        assert!(matches!(err, TopologyError::NoHostsAvailable { .. }));
    }

    #[test]
    fn selection_table_is_exhaustive_over_the_documented_range() {
        for device_count in 0..=50 {
            for host_count in 0..=10 {
                match select_topology(device_count, host_count) {
                    Ok(_) => assert!(host_count > 0),
                    Err(TopologyError::NoHostsAvailable { .. }) => assert_eq!(host_count, 0),
                }
            }
        }
    }
}

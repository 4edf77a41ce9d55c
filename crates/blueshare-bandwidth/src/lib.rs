// BlueShare Bandwidth Allocator
// Fair-share bandwidth allocation across a BlueShare session's devices

//! # Bandwidth Allocator
//!
//! Computes the per-device fair-share entitlement from the session's
//! total host bandwidth and device count, per the "double-space,
//! half-time" scheduling principle: a device schedules against both
//! halves of a symmetric frame, so its ceiling is twice the naive
//! per-device split. This value is an entitlement ceiling, not a
//! guarantee — the platform layer enforces it as a rate limit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BandwidthError {
    #[error("cannot allocate bandwidth across zero devices")]
    NoDevices,
}

/// `fair_share_mbps = (2 * total_host_bandwidth_mbps) / device_count`
pub fn fair_share_mbps(total_host_bandwidth_mbps: f64, device_count: usize) -> Result<f64, BandwidthError> {
    if device_count == 0 {
        return Err(BandwidthError::NoDevices);
    }
    Ok((2.0 * total_host_bandwidth_mbps) / device_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_fair_share() {
        // Scenario A: total host bandwidth 10.0 Mbps, 4 devices.
        let share = fair_share_mbps(10.0, 4).unwrap();
        assert_eq!(share, 5.0);
    }

    #[test]
    fn invariant_c2_holds() {
        let total_host_bandwidth = 12.5;
        let device_count = 5usize;
        let share = fair_share_mbps(total_host_bandwidth, device_count).unwrap();
        assert!((share * device_count as f64 - 2.0 * total_host_bandwidth).abs() < 1e-9);
    }

    #[test]
    fn zero_devices_is_rejected() {
        assert!(matches!(fair_share_mbps(10.0, 0), Err(BandwidthError::NoDevices)));
    }
}

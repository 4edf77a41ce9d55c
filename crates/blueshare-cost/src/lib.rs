// BlueShare Cost Engine
// Deterministic affine cost model converting measured usage bytes into USD balances

//! # Cost Engine
//!
//! A deterministic affine model: usage in megabytes times a fixed set of
//! policy constants yields a USD balance. The constants are policy, not
//! physical fundamentals, and are carried on [`CostModel`] so a caller can
//! override them; the values below are this mesh's defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub f_newtons: f64,
    pub d_meters: f64,
    pub cos_theta: f64,
    pub usd_per_joule: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            f_newtons: 1.25,
            d_meters: 15.0,
            cos_theta: 0.866,
            usd_per_joule: 1.0e-5,
        }
    }
}

impl CostModel {
    fn factor(&self) -> f64 {
        self.f_newtons * self.d_meters * self.cos_theta * self.usd_per_joule
    }

    /// `balance_usd = mb_used * f_newtons * d_meters * cos_theta * usd_per_joule`
    pub fn balance_for_bytes(&self, bytes_sent: u64, bytes_received: u64) -> f64 {
        let mb_used = (bytes_sent + bytes_received) as f64 / (1024.0 * 1024.0);
        mb_used * self.factor()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInput {
    pub device_id: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBalance {
    pub device_id: String,
    pub mb_used: f64,
    pub balance_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostResult {
    pub balances: Vec<DeviceBalance>,
    pub total_cost: f64,
}

/// Compute every device's balance and the session total in one pass, so
/// `total_cost` is exactly the running sum of the per-device balances in
/// the same accumulation order (invariant C3 — no recomputation drift).
pub fn compute_costs(model: &CostModel, usage: &[UsageInput]) -> CostResult {
    let mut balances = Vec::with_capacity(usage.len());
    let mut total_cost = 0.0;

    for entry in usage {
        let mb_used = (entry.bytes_sent + entry.bytes_received) as f64 / (1024.0 * 1024.0);
        let balance_usd = model.balance_for_bytes(entry.bytes_sent, entry.bytes_received);
        total_cost += balance_usd;
        balances.push(DeviceBalance {
            device_id: entry.device_id.clone(),
            mb_used,
            balance_usd,
        });
    }

    CostResult { balances, total_cost }
}

/// Render a USD balance to the display precision used throughout BlueShare.
pub fn format_usd(balance: f64) -> String {
    format!("{balance:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_alice_balance() {
        let model = CostModel::default();
        // Alice: 5MB up + 2MB down = 7MB.
        let balance = model.balance_for_bytes(5 * 1024 * 1024, 2 * 1024 * 1024);
        assert!((balance - 0.001137).abs() < 1e-6);
    }

    #[test]
    fn total_cost_equals_sum_of_balances_exactly() {
        let model = CostModel::default();
        let usage = vec![
            UsageInput { device_id: "a".into(), bytes_sent: 5 * 1024 * 1024, bytes_received: 2 * 1024 * 1024 },
            UsageInput { device_id: "b".into(), bytes_sent: 1 * 1024 * 1024, bytes_received: 10 * 1024 * 1024 },
            UsageInput { device_id: "c".into(), bytes_sent: 512 * 1024, bytes_received: 3 * 1024 * 1024 },
        ];
        let result = compute_costs(&model, &usage);

        let mut expected_total = 0.0;
        for b in &result.balances {
            expected_total += b.balance_usd;
        }
        assert_eq!(result.total_cost, expected_total);
    }

    #[test]
    fn zero_usage_is_zero_balance() {
        let model = CostModel::default();
        assert_eq!(model.balance_for_bytes(0, 0), 0.0);
    }

    #[test]
    fn display_formatting_is_six_decimals() {
        assert_eq!(format_usd(0.0011374999), "0.001137");
    }
}

//! External collaborators consumed by the core, specified only at their
//! interfaces (spec §6). The BLE radio, WiFi tethering driver and
//! Lightning payment gateway are all implemented by the platform layer;
//! this crate never assumes a concrete implementation.

use async_trait::async_trait;

use blueshare_consensus::TrinarySymbol;
pub use blueshare_payment::PaymentAdapter;

/// BLE GATT service UUID BlueShare advertises under, carried over from
/// the original platform header even though the BLE stack itself is out
/// of scope here.
pub const SERVICE_UUID: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";

#[derive(Debug, Clone)]
pub struct ScannedDevice {
    pub device_id: String,
    pub rssi: i16,
    pub name: String,
}

/// Consent request kind sent to a candidate device during a consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentRequestKind {
    JoinSession,
    ContinueSession,
}

#[async_trait]
pub trait BleAdapter: Send + Sync {
    async fn scan(&self) -> Result<Vec<ScannedDevice>, String>;
    async fn send_consent_request(
        &self,
        device_id: &str,
        kind: ConsentRequestKind,
    ) -> TrinarySymbol;
    async fn advertise(&self, service_uuid: &str, name: &str, bandwidth_hint_mbps: f64) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct ClientUsage {
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub duration_secs: u64,
}

#[async_trait]
pub trait WifiAdapter: Send + Sync {
    async fn create_access_point(&self, ssid: &str, password: &str) -> Result<(), String>;
    async fn list_clients(&self) -> Result<Vec<String>, String>;
    async fn set_rate_limit(&self, client_mac: &str, kbps: u64) -> Result<(), String>;
    async fn measure_usage(&self, client_mac: &str) -> Result<ClientUsage, String>;
}

/// Runs a closure on drop, regardless of which exit path is taken
/// (success, error propagation via `?`, or unwind). Used to guarantee
/// release of scoped resources — the WiFi AP's logical lease, a BLE
/// advertisement slot — on every path out of [`crate::session::run`].
pub struct ScopeGuard<F: FnMut()> {
    cleanup: Option<F>,
}

impl<F: FnMut()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Disarm the guard: its cleanup will not run on drop. Used once a
    /// resource has been handed off to a longer-lived owner.
    pub fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnMut()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(mut cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn scope_guard_runs_on_drop() {
        let ran = AtomicBool::new(false);
        {
            let _guard = ScopeGuard::new(|| ran.store(true, Ordering::SeqCst));
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn disarmed_guard_does_not_run() {
        let ran = AtomicBool::new(false);
        {
            let guard = ScopeGuard::new(|| ran.store(true, Ordering::SeqCst));
            guard.disarm();
        }
        assert!(!ran.load(Ordering::SeqCst));
    }
}

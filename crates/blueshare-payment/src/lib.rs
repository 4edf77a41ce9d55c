// BlueShare Payment Orchestrator
// Per-device micropayment state machine, driven through an external Lightning invoice adapter

//! # Payment Orchestrator
//!
//! Drives each device's invoice through `Pending -> Authorized ->
//! Processing -> Settled`, with a side exit to `Failed` from any
//! non-terminal state. Per-device failures are surfaced to the caller but
//! never abort a session's accounting (see `blueshare-core`'s summary).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use blueshare_crypto::sha256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Lightning invoices in this mesh expire 600 seconds after creation.
pub const DEFAULT_INVOICE_EXPIRY_SECS: u64 = 600;
/// Default USD/BTC conversion rate used when the caller does not override it.
pub const DEFAULT_RATE_USD_PER_BTC: f64 = 40_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    Pending,
    Authorized,
    Processing,
    Settled,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentState::Settled | PaymentState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub device_id: String,
    pub invoice_blob: Vec<u8>,
    pub amount_satoshi: u64,
    pub payment_hash: [u8; 32],
    pub expiry: u64,
    pub state: PaymentState,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("no payment record for device {0}")]
    DeviceNotFound(String),
    #[error("invoice creation failed for device {device_id}: {reason}")]
    InvoiceCreationFailed { device_id: String, reason: String },
    #[error("invalid transition for device {device_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        device_id: String,
        from: PaymentState,
        to: PaymentState,
    },
    #[error("settlement failed for device {device_id} while in {last_state:?}: {reason}")]
    SettlementFailed {
        device_id: String,
        last_state: PaymentState,
        reason: String,
    },
}

/// External Lightning gateway. BOLT11 encoding and actual network
/// submission are delegated entirely to the adapter; this crate never
/// constructs or parses invoice bytes itself.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn encode_invoice(&self, amount_satoshi: u64, expiry: u64) -> Result<Vec<u8>, String>;
    async fn submit(&self, invoice_blob: &[u8]) -> Result<PaymentState, String>;
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

/// Convert a USD amount to satoshi using banker's rounding on the
/// fractional satoshi, as chosen for this implementation (the source left
/// the rounding mode unspecified).
pub fn usd_to_satoshi(amount_usd: f64, rate_usd_per_btc: f64) -> u64 {
    let satoshi = (amount_usd / rate_usd_per_btc) * 1e8;
    satoshi.round_ties_even().max(0.0) as u64
}

/// Drives the per-device payment state machines for one session.
pub struct PaymentOrchestrator<A: PaymentAdapter> {
    adapter: A,
    rate_usd_per_btc: f64,
    invoice_expiry_secs: u64,
    payments: HashMap<String, Payment>,
}

impl<A: PaymentAdapter> PaymentOrchestrator<A> {
    pub fn new(adapter: A, rate_usd_per_btc: f64, invoice_expiry_secs: u64) -> Self {
        Self {
            adapter,
            rate_usd_per_btc,
            invoice_expiry_secs,
            payments: HashMap::new(),
        }
    }

    /// Create and encode an invoice for `device_id`, leaving it `Pending`.
    pub async fn create_invoice(
        &mut self,
        device_id: &str,
        amount_usd: f64,
    ) -> Result<&Payment, PaymentError> {
        let amount_satoshi = usd_to_satoshi(amount_usd, self.rate_usd_per_btc);
        let expiry = now_unix() + self.invoice_expiry_secs;

        let invoice_blob = self
            .adapter
            .encode_invoice(amount_satoshi, expiry)
            .await
            .map_err(|reason| PaymentError::InvoiceCreationFailed {
                device_id: device_id.to_string(),
                reason,
            })?;

        let mut hash_input = Vec::with_capacity(device_id.len() + 16);
        hash_input.extend_from_slice(device_id.as_bytes());
        hash_input.extend_from_slice(&amount_satoshi.to_le_bytes());
        hash_input.extend_from_slice(&expiry.to_le_bytes());
        let payment_hash = sha256(&hash_input);

        let payment = Payment {
            device_id: device_id.to_string(),
            invoice_blob,
            amount_satoshi,
            payment_hash,
            expiry,
            state: PaymentState::Pending,
        };
        info!(device_id, amount_satoshi, "invoice created, state=Pending");
        self.payments.insert(device_id.to_string(), payment);
        Ok(&self.payments[device_id])
    }

    fn transition(
        &mut self,
        device_id: &str,
        expected: PaymentState,
        next: PaymentState,
    ) -> Result<(), PaymentError> {
        let payment = self
            .payments
            .get_mut(device_id)
            .ok_or_else(|| PaymentError::DeviceNotFound(device_id.to_string()))?;
        if payment.state != expected {
            return Err(PaymentError::InvalidTransition {
                device_id: device_id.to_string(),
                from: payment.state,
                to: next,
            });
        }
        payment.state = next;
        Ok(())
    }

    /// Mark `device_id`'s invoice authorized by the client (Pending -> Authorized).
    pub fn authorize(&mut self, device_id: &str) -> Result<(), PaymentError> {
        self.transition(device_id, PaymentState::Pending, PaymentState::Authorized)
    }

    /// Drive `Authorized -> Processing -> Settled` through the adapter.
    /// Any failure along the way transitions the device to `Failed` and
    /// returns an error carrying the last state observed before failure.
    pub async fn settle(&mut self, device_id: &str) -> Result<(), PaymentError> {
        self.transition(device_id, PaymentState::Authorized, PaymentState::Processing)?;

        let invoice_blob = self
            .payments
            .get(device_id)
            .ok_or_else(|| PaymentError::DeviceNotFound(device_id.to_string()))?
            .invoice_blob
            .clone();

        match self.adapter.submit(&invoice_blob).await {
            Ok(PaymentState::Settled) => {
                let payment = self.payments.get_mut(device_id).unwrap();
                payment.state = PaymentState::Settled;
                info!(device_id, "settlement complete");
                Ok(())
            }
            Ok(other) => {
                let payment = self.payments.get_mut(device_id).unwrap();
                payment.state = PaymentState::Failed;
                warn!(device_id, ?other, "adapter returned non-terminal state, marking Failed");
                Err(PaymentError::SettlementFailed {
                    device_id: device_id.to_string(),
                    last_state: PaymentState::Processing,
                    reason: format!("adapter returned {other:?} instead of Settled"),
                })
            }
            Err(reason) => {
                let payment = self.payments.get_mut(device_id).unwrap();
                payment.state = PaymentState::Failed;
                warn!(device_id, %reason, "settlement submission failed, marking Failed");
                Err(PaymentError::SettlementFailed {
                    device_id: device_id.to_string(),
                    last_state: PaymentState::Processing,
                    reason,
                })
            }
        }
    }

    /// Force `device_id` to `Failed` from any non-terminal state (used on
    /// session cancellation or deadline expiry).
    pub fn fail(&mut self, device_id: &str, reason: &str) {
        if let Some(payment) = self.payments.get_mut(device_id) {
            if !payment.state.is_terminal() {
                warn!(device_id, reason, "forcing payment to Failed");
                payment.state = PaymentState::Failed;
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<&Payment> {
        self.payments.get(device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Payment> {
        self.payments.values()
    }

    pub fn failed_count(&self) -> usize {
        self.payments
            .values()
            .filter(|p| p.state == PaymentState::Failed)
            .count()
    }
}

//! Aggregated session error type. Every sub-crate's domain error folds
//! into one of the ten core-level kinds named in the external interface,
//! each carrying the numeric code surfaced to callers and a severity
//! classification used to decide whether a failure aborts the session,
//! is recorded against one device, or kills the process.

use thiserror::Error;

use blueshare_compliance::ComplianceError;
use blueshare_consensus::ConsensusResult;
use blueshare_crypto::CryptoError;
use blueshare_identity::IdentityError;
use blueshare_payment::PaymentError;
use blueshare_registry::RegistryError;
use blueshare_topology::TopologyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    FatalToProcess,
    FatalToSession,
    RecoverablePerDevice,
    Transient,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no admission slots available (limit {max})")]
    NoSlots { max: usize },
    #[error("privacy proof failed for device {0}")]
    PrivacyProofFailed(String),
    #[error("invoice operation failed for device {device_id}: {reason}")]
    InvoiceCreationFailed { device_id: String, reason: String },
    #[error("consensus rejected admission ({no_count} device(s) voted no)")]
    ConsensusRejected { no_count: usize },
    #[error("no hosts available among {device_count} devices")]
    NoHostsAvailable { device_count: usize },
    #[error("entropy source exhausted: {0}")]
    EntropyExhausted(String),
    #[error("refused to colocate ZeroId and ZeroKey at {0}")]
    KeyCollocation(String),
    #[error("corrupt artifact at {path}: {reason}")]
    CorruptArtifact { path: String, reason: String },
    #[error("compliance check failed (transparency={transparency} fairness={fairness} privacy={privacy})")]
    ComplianceFailed {
        transparency: bool,
        fairness: bool,
        privacy: bool,
    },
}

impl SessionError {
    /// The numeric error code surfaced to callers (spec §6).
    pub fn code(&self) -> i32 {
        match self {
            SessionError::DeviceNotFound(_) => -1,
            SessionError::NoSlots { .. } => -2,
            SessionError::PrivacyProofFailed(_) => -3,
            SessionError::InvoiceCreationFailed { .. } => -4,
            SessionError::ConsensusRejected { .. } => -5,
            SessionError::NoHostsAvailable { .. } => -6,
            SessionError::EntropyExhausted(_) => -7,
            SessionError::KeyCollocation(_) => -8,
            SessionError::CorruptArtifact { .. } => -9,
            SessionError::ComplianceFailed { .. } => -10,
        }
    }

    /// Severity classification (spec §7), used to decide whether the
    /// process, the session, or only one device must stop.
    pub fn severity(&self) -> Severity {
        match self {
            SessionError::EntropyExhausted(_) => Severity::FatalToProcess,
            SessionError::ConsensusRejected { .. }
            | SessionError::NoHostsAvailable { .. }
            | SessionError::ComplianceFailed { .. }
            | SessionError::KeyCollocation(_)
            | SessionError::CorruptArtifact { .. } => Severity::FatalToSession,
            SessionError::PrivacyProofFailed(_)
            | SessionError::InvoiceCreationFailed { .. }
            | SessionError::DeviceNotFound(_)
            | SessionError::NoSlots { .. } => Severity::RecoverablePerDevice,
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::EntropySourceExhausted(msg) => SessionError::EntropyExhausted(msg),
        }
    }
}

impl From<IdentityError> for SessionError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Entropy(inner) => inner.into(),
            IdentityError::KeyCollocation(path) => SessionError::KeyCollocation(path),
            IdentityError::CorruptArtifact { path, reason } => {
                SessionError::CorruptArtifact { path, reason }
            }
            IdentityError::Io(io_err) => SessionError::CorruptArtifact {
                path: "<identity-store>".to_string(),
                reason: io_err.to_string(),
            },
            IdentityError::KeyExpired { expires_at, now } => SessionError::PrivacyProofFailed(
                format!("zero-key expired at {expires_at} (now {now})"),
            ),
        }
    }
}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DeviceNotFound(id) => SessionError::DeviceNotFound(id),
            RegistryError::DuplicateDevice(id) => SessionError::DeviceNotFound(id),
        }
    }
}

impl From<TopologyError> for SessionError {
    fn from(e: TopologyError) -> Self {
        match e {
            TopologyError::NoHostsAvailable { device_count } => {
                SessionError::NoHostsAvailable { device_count }
            }
        }
    }
}

impl From<blueshare_bandwidth::BandwidthError> for SessionError {
    fn from(_: blueshare_bandwidth::BandwidthError) -> Self {
        SessionError::NoHostsAvailable { device_count: 0 }
    }
}

impl From<PaymentError> for SessionError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::DeviceNotFound(id) => SessionError::DeviceNotFound(id),
            PaymentError::InvoiceCreationFailed { device_id, reason } => {
                SessionError::InvoiceCreationFailed { device_id, reason }
            }
            PaymentError::InvalidTransition { device_id, from, to } => {
                SessionError::InvoiceCreationFailed {
                    device_id,
                    reason: format!("invalid payment transition {from:?} -> {to:?}"),
                }
            }
            PaymentError::SettlementFailed { device_id, last_state, reason } => {
                SessionError::InvoiceCreationFailed {
                    device_id,
                    reason: format!("settlement failed while {last_state:?}: {reason}"),
                }
            }
        }
    }
}

impl From<ComplianceError> for SessionError {
    fn from(e: ComplianceError) -> Self {
        match e {
            ComplianceError::Failed {
                transparency,
                fairness,
                privacy,
            } => SessionError::ComplianceFailed {
                transparency,
                fairness,
                privacy,
            },
        }
    }
}

/// Build the session-fatal error for a rejected consensus round.
pub fn consensus_rejected(result: ConsensusResult, no_count: usize) -> Option<SessionError> {
    match result {
        ConsensusResult::Rejected => Some(SessionError::ConsensusRejected { no_count }),
        _ => None,
    }
}

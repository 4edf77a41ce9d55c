//! BlueShare session orchestration.
//!
//! This crate is the seam that ties the independent subsystems —
//! identity, consensus, device registry, topology selection, bandwidth
//! allocation, cost accounting, payment settlement and compliance audit
//! — into the single ordered flow a platform layer drives per session.
//! It is a library: the BLE/WiFi/Lightning integrations and any process
//! entry point belong to the caller.

pub mod adapters;
pub mod config;
pub mod error;
pub mod session;

pub use config::BlueShareConfig;
pub use error::{Severity, SessionError};
pub use session::{run, DeviceJoinRequest, DeviceOutcome, SessionSummary};

pub use blueshare_bandwidth::{fair_share_mbps, BandwidthError};
pub use blueshare_compliance::{audit, ComplianceError, ComplianceFlags};
pub use blueshare_consensus::{
    aggregate, run_round as run_consensus_round, ConsensusError, ConsensusOutcome,
    ConsensusResult, ConsensusTransport, TrinaryState, TrinarySymbol,
};
pub use blueshare_cost::{compute_costs, format_usd, CostModel, CostResult, DeviceBalance, UsageInput};
pub use blueshare_crypto::CryptoError;
pub use blueshare_identity::{
    create_proof, create_zero_id, create_zero_key, create_zero_key_with_lifetime, derive_zero_id,
    load_zero_id, load_zero_key, save_zero_id, save_zero_key, verify_proof, Challenge,
    IdentityError, Proof, ZeroContext, ZeroId, ZeroKey,
};
pub use blueshare_payment::{
    usd_to_satoshi, Payment, PaymentAdapter, PaymentError, PaymentOrchestrator, PaymentState,
};
pub use blueshare_registry::{Device, DeviceRegistry, DeviceRole, RegistryError};
pub use blueshare_topology::{select_topology, Topology, TopologyError};

// BlueShare Consensus
// NSIGII trinary-state consensus: per-device participation voting and admission aggregation

//! # Consensus (NSIGII)
//!
//! A single request cycle solicits a trinary participation decision from
//! every candidate device and aggregates the replies into an admission
//! decision. The four-valued logic distinguishes "said maybe" from "did
//! not answer" — on a lossy BLE link, silence must never be read as
//! consent.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default per-device timeout for a vote reply.
pub const DEFAULT_VOTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrinaryState {
    No,
    Yes,
    Maybe,
    /// No response was received — distinct from `Maybe`.
    Epsilon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrinarySymbol {
    pub state: TrinaryState,
    pub entropy: f64,
    pub timestamp: u64,
}

impl TrinarySymbol {
    pub fn new(state: TrinaryState, entropy: f64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs();
        Self {
            state,
            entropy,
            timestamp,
        }
    }

    /// The symbol recorded for a device that did not reply within the
    /// deadline: absent, not undecided.
    pub fn absent() -> Self {
        Self::new(TrinaryState::Epsilon, 0.0)
    }
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("no candidate devices were supplied for this round")]
    NoCandidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusResult {
    Accepted,
    /// At least one device voted No. The objecting device's identity is
    /// not disclosed — only the aggregate counts are.
    Rejected,
    /// Neither accepted nor rejected; the caller may re-poll once.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub result: ConsensusResult,
    pub yes_count: usize,
    pub no_count: usize,
    pub maybe_count: usize,
    pub epsilon_count: usize,
    pub votes: HashMap<String, TrinarySymbol>,
}

/// Solicits a single device's participation vote. Implemented by the BLE
/// adapter layer outside this crate; `run_round` is responsible for the
/// timeout, not the transport.
#[async_trait]
pub trait ConsensusTransport: Send + Sync {
    async fn request_vote(&self, device_id: &str) -> TrinarySymbol;
}

/// Run one NSIGII request cycle against `device_ids`, waiting up to
/// `vote_timeout` for each device's reply.
pub async fn run_round(
    transport: &dyn ConsensusTransport,
    device_ids: &[String],
    vote_timeout: std::time::Duration,
) -> Result<ConsensusOutcome, ConsensusError> {
    if device_ids.is_empty() {
        return Err(ConsensusError::NoCandidates);
    }

    let mut votes = HashMap::with_capacity(device_ids.len());
    for device_id in device_ids {
        let symbol = match tokio::time::timeout(vote_timeout, transport.request_vote(device_id)).await
        {
            Ok(symbol) => symbol,
            Err(_) => {
                warn!(device_id = %device_id, "no vote reply within T_vote, recording EPSILON");
                TrinarySymbol::absent()
            }
        };
        debug!(device_id = %device_id, state = ?symbol.state, "recorded vote");
        votes.insert(device_id.clone(), symbol);
    }

    Ok(aggregate(votes))
}

/// Aggregate a completed set of votes into a [`ConsensusOutcome`].
/// Aggregation is commutative — the result does not depend on arrival order.
pub fn aggregate(votes: HashMap<String, TrinarySymbol>) -> ConsensusOutcome {
    let mut yes_count = 0;
    let mut no_count = 0;
    let mut maybe_count = 0;
    let mut epsilon_count = 0;

    for symbol in votes.values() {
        match symbol.state {
            TrinaryState::Yes => yes_count += 1,
            TrinaryState::No => no_count += 1,
            TrinaryState::Maybe => maybe_count += 1,
            TrinaryState::Epsilon => epsilon_count += 1,
        }
    }

    let device_count = votes.len();
    let quorum = device_count.div_ceil(2);

    // Ties break toward Pending, never Accepted.
    let result = if no_count > 0 {
        ConsensusResult::Rejected
    } else if yes_count >= quorum {
        ConsensusResult::Accepted
    } else {
        ConsensusResult::Pending
    };

    ConsensusOutcome {
        result,
        yes_count,
        no_count,
        maybe_count,
        epsilon_count,
        votes,
    }
}

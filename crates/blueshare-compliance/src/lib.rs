// BlueShare Compliance Auditor
// Pre-activation transparency/fairness/privacy compliance gate

//! # Compliance Auditor
//!
//! The last gate before a session activates. Requires all three flags —
//! transparency, fairness, privacy — to have been independently set by
//! the phases that produce them (CostEngine sets transparency and
//! fairness; PhantomIdentity sets privacy on successful proof
//! verification of every admitted device). Absence of any flag means the
//! session cannot activate and must be torn down cleanly.

use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplianceFlags {
    pub transparency_verified: bool,
    pub fairness_verified: bool,
    pub privacy_verified: bool,
}

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("compliance check failed: transparency={transparency} fairness={fairness} privacy={privacy}")]
    Failed {
        transparency: bool,
        fairness: bool,
        privacy: bool,
    },
}

/// Run the compliance audit. `Ok(())` means the session may activate.
pub fn audit(flags: ComplianceFlags) -> Result<(), ComplianceError> {
    if flags.transparency_verified && flags.fairness_verified && flags.privacy_verified {
        Ok(())
    } else {
        error!(
            transparency = flags.transparency_verified,
            fairness = flags.fairness_verified,
            privacy = flags.privacy_verified,
            "compliance audit failed, session cannot activate"
        );
        Err(ComplianceError::Failed {
            transparency: flags.transparency_verified,
            fairness: flags.fairness_verified,
            privacy: flags.privacy_verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_flags_set_passes() {
        let flags = ComplianceFlags {
            transparency_verified: true,
            fairness_verified: true,
            privacy_verified: true,
        };
        assert!(audit(flags).is_ok());
    }

    #[test]
    fn missing_any_flag_fails() {
        let flags = ComplianceFlags {
            transparency_verified: true,
            fairness_verified: true,
            privacy_verified: false,
        };
        assert!(matches!(audit(flags), Err(ComplianceError::Failed { .. })));
    }
}

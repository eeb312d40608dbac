//! Inheritance account lifecycle
//!
//! Two stages, one transition:
//!
//! ```text
//! Funding ──activate()──► Activated
//! ```
//!
//! The transition is manual, one-way and idempotent-guarded. While
//! funding, deposits accumulate without bound and new funding addresses
//! may be issued; activation closes issuance permanently and sweeps
//! everything into the user+heir output.

use serde::{Deserialize, Serialize};

use crate::conditions::{SpendEligibility, SpendingConditions};
use crate::InheritError;

/// Which side of the account this wallet holds keys for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalRole {
    User,
    Heir,
}

/// Custody stage of an inheritance account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritanceStage {
    /// Deposits accumulate on user+escrow funding outputs.
    Funding,
    /// Funds sit on the user+heir output; spend windows are counting.
    Activated,
}

/// The inheritance-specific slice of an account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceState {
    pub role: LocalRole,
    /// Extra derivation level on the escrow subtree separating this
    /// account instance from others sharing the same root identities.
    pub funding_branch: u32,
    pub conditions: SpendingConditions,
    /// Monotonic: set once by [`InheritanceState::mark_activated`] and
    /// never cleared.
    activated: bool,
}

impl InheritanceState {
    pub fn new(role: LocalRole, funding_branch: u32, conditions: SpendingConditions) -> Self {
        Self {
            role,
            funding_branch,
            conditions,
            activated: false,
        }
    }

    pub fn stage(&self) -> InheritanceStage {
        if self.activated {
            InheritanceStage::Activated
        } else {
            InheritanceStage::Funding
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Whether new funding addresses may still be issued.
    pub fn funding_open(&self) -> bool {
        !self.activated
    }

    /// Guard for starting the activation sweep. Fails on a second
    /// attempt; no partial state exists to roll back.
    pub fn ensure_can_activate(&self) -> Result<(), InheritError> {
        if self.activated {
            return Err(InheritError::AlreadyActivated);
        }
        Ok(())
    }

    /// Record a successfully broadcast activation sweep. One-way.
    pub fn mark_activated(&mut self) -> Result<(), InheritError> {
        self.ensure_can_activate()?;
        self.activated = true;
        Ok(())
    }

    /// Spend eligibility given the current tip and the earliest
    /// confirmed funding height. `None` funding height means nothing
    /// has confirmed yet, so no window is open.
    pub fn eligibility(
        &self,
        tip_height: u32,
        first_funding_height: Option<u32>,
    ) -> SpendEligibility {
        let blocks_since_funding = match first_funding_height {
            Some(height) if tip_height >= height => tip_height - height,
            _ => {
                return SpendEligibility {
                    requires_multisig: false,
                    can_user_spend: false,
                    can_heir_spend: false,
                }
            }
        };
        self.conditions.eligibility(blocks_since_funding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> InheritanceState {
        InheritanceState::new(
            LocalRole::User,
            3,
            SpendingConditions::new(0, 5, 10, 20).unwrap(),
        )
    }

    #[test]
    fn test_starts_in_funding() {
        let s = state();
        assert_eq!(s.stage(), InheritanceStage::Funding);
        assert!(s.funding_open());
        assert!(s.ensure_can_activate().is_ok());
    }

    #[test]
    fn test_activation_is_one_way() {
        let mut s = state();
        s.mark_activated().unwrap();
        assert_eq!(s.stage(), InheritanceStage::Activated);
        assert!(!s.funding_open());
    }

    #[test]
    fn test_second_activation_rejected() {
        let mut s = state();
        s.mark_activated().unwrap();
        assert_eq!(s.mark_activated().unwrap_err(), InheritError::AlreadyActivated);
        assert_eq!(s.ensure_can_activate().unwrap_err(), InheritError::AlreadyActivated);
        // Still activated, nothing was rolled back.
        assert!(s.is_activated());
    }

    #[test]
    fn test_eligibility_from_heights() {
        let s = state();
        // Tip 107, funded at 100 -> 7 blocks: co-sign window.
        let e = s.eligibility(107, Some(100));
        assert!(e.requires_multisig && !e.can_user_spend && !e.can_heir_spend);

        // 15 blocks: user alone.
        let e = s.eligibility(115, Some(100));
        assert!(!e.requires_multisig && e.can_user_spend && !e.can_heir_spend);
    }

    #[test]
    fn test_no_confirmed_funding_means_no_windows() {
        let s = state();
        assert!(!s.eligibility(1_000, None).any_path_open());
        // Funding height above tip (reorg edge): treated as unconfirmed.
        assert!(!s.eligibility(99, Some(100)).any_path_open());
    }

    #[test]
    fn test_serde_does_not_resurrect_funding() {
        let mut s = state();
        s.mark_activated().unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let restored: InheritanceState = serde_json::from_str(&json).unwrap();
        assert!(restored.is_activated());
    }
}

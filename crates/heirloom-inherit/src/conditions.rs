//! Time-gated spending conditions
//!
//! All four gates are block counts measured from the earliest confirmed
//! funding transaction. The ordering invariant (the 2-of-2 window opens
//! no later than either single-key window) is enforced when an account
//! is created, not at spend time.

use serde::{Deserialize, Serialize};

use crate::InheritError;

/// Block-count gates for an inheritance account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingConditions {
    /// Blocks during which nothing is spendable.
    pub no_spend_blocks: u32,
    /// Blocks after which 2-of-2 co-signed spending opens.
    pub multisig_after_blocks: u32,
    /// Blocks after which the user alone may spend.
    pub user_only_after_blocks: u32,
    /// Blocks after which the heir alone may spend.
    pub heir_only_after_blocks: u32,
}

/// What is currently spendable, and by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendEligibility {
    /// Spending is possible but still needs both signatures.
    pub requires_multisig: bool,
    /// The user's key alone suffices.
    pub can_user_spend: bool,
    /// The heir's key alone suffices.
    pub can_heir_spend: bool,
}

impl SpendEligibility {
    /// Whether anything can move at all.
    pub fn any_path_open(&self) -> bool {
        self.requires_multisig || self.can_user_spend || self.can_heir_spend
    }
}

impl SpendingConditions {
    /// Validate and build a set of conditions.
    ///
    /// Rejected shapes would let a single key spend before the co-signed
    /// window even opens, which contradicts the custody ordering.
    pub fn new(
        no_spend_blocks: u32,
        multisig_after_blocks: u32,
        user_only_after_blocks: u32,
        heir_only_after_blocks: u32,
    ) -> Result<Self, InheritError> {
        if multisig_after_blocks > user_only_after_blocks {
            return Err(InheritError::InvalidConditions(format!(
                "multisig window ({multisig_after_blocks}) opens after user-only window \
                 ({user_only_after_blocks})"
            )));
        }
        if multisig_after_blocks > heir_only_after_blocks {
            return Err(InheritError::InvalidConditions(format!(
                "multisig window ({multisig_after_blocks}) opens after heir-only window \
                 ({heir_only_after_blocks})"
            )));
        }
        Ok(Self {
            no_spend_blocks,
            multisig_after_blocks,
            user_only_after_blocks,
            heir_only_after_blocks,
        })
    }

    /// Eligibility at a given block distance from the earliest confirmed
    /// funding transaction. Pure and side-effect free; recomputed on
    /// every balance refresh rather than cached.
    pub fn eligibility(&self, blocks_since_funding: u32) -> SpendEligibility {
        let can_user_spend = blocks_since_funding >= self.user_only_after_blocks;
        let can_heir_spend = blocks_since_funding >= self.heir_only_after_blocks;
        let requires_multisig = blocks_since_funding >= self.multisig_after_blocks
            && !can_user_spend
            && !can_heir_spend;
        SpendEligibility {
            requires_multisig,
            can_user_spend,
            can_heir_spend,
        }
    }
}

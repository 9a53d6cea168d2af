use alloy_primitives::{B256, FixedBytes};
use serde::{Deserialize, Serialize};

pub type BlsPubKey = FixedBytes<48>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub pubkey: BlsPubKey,

    /// Commitment to the key used for withdrawals.
    pub withdrawal_credentials: B256,

    /// Balance at stake, capped and rounded down in 1 ETH increments.
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,

    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_eligibility_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub exit_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub withdrawable_epoch: u64,
}

impl Validator {
    pub fn is_active(&self, epoch: u64) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn status(&self, epoch: u64) -> ValidatorStatus {
        if self.exit_epoch <= epoch {
            return ValidatorStatus::Exited;
        }
        if self.slashed {
            return ValidatorStatus::Slashed;
        }
        if self.activation_epoch <= epoch {
            return ValidatorStatus::Active;
        }
        ValidatorStatus::Queued
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    Queued,
    Active,
    Exited,
    Slashed,
}

impl ValidatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorStatus::Queued => "queued",
            ValidatorStatus::Active => "active",
            ValidatorStatus::Exited => "exited",
            ValidatorStatus::Slashed => "slashed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(activation_epoch: u64, exit_epoch: u64, slashed: bool) -> Validator {
        Validator {
            pubkey: BlsPubKey::ZERO,
            withdrawal_credentials: B256::ZERO,
            effective_balance: 32_000_000_000,
            slashed,
            activation_eligibility_epoch: 0,
            activation_epoch,
            exit_epoch,
            withdrawable_epoch: u64::MAX,
        }
    }

    #[test]
    fn test_active_window() {
        let val = validator(10, 20, false);
        assert!(!val.is_active(9));
        assert!(val.is_active(10));
        assert!(val.is_active(19));
        assert!(!val.is_active(20));
    }

    #[test]
    fn test_status_ladder() {
        assert_eq!(validator(10, 20, false).status(5), ValidatorStatus::Queued);
        assert_eq!(validator(10, 20, false).status(15), ValidatorStatus::Active);
        assert_eq!(validator(10, 20, false).status(20), ValidatorStatus::Exited);
        // exit wins over the slashed bit once the validator has left
        assert_eq!(validator(10, 20, true).status(20), ValidatorStatus::Exited);
        assert_eq!(validator(10, 20, true).status(15), ValidatorStatus::Slashed);
    }
}

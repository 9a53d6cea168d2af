use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown beacon state fork version: {0}")]
pub struct UnknownForkError(pub String);

/// Hard forks whose states and blocks this engine understands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fork {
    #[default]
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
}

impl Fork {
    /// Participation is tracked with per-validator flag bytes from Altair onwards;
    /// Phase0 carries pending attestations instead.
    pub fn has_participation_flags(&self) -> bool {
        *self >= Fork::Altair
    }

    pub fn has_execution_payload(&self) -> bool {
        *self >= Fork::Bellatrix
    }

    pub fn has_withdrawals(&self) -> bool {
        *self >= Fork::Capella
    }

    pub fn has_blobs(&self) -> bool {
        *self >= Fork::Deneb
    }
}

impl FromStr for Fork {
    type Err = UnknownForkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "phase0" => Fork::Phase0,
            "altair" => Fork::Altair,
            "bellatrix" => Fork::Bellatrix,
            "capella" => Fork::Capella,
            "deneb" => Fork::Deneb,
            _ => return Err(UnknownForkError(s.to_string())),
        })
    }
}

impl Display for Fork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Fork::Phase0 => "phase0",
                Fork::Altair => "altair",
                Fork::Bellatrix => "bellatrix",
                Fork::Capella => "capella",
                Fork::Deneb => "deneb",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_round_trip() {
        for name in ["phase0", "altair", "bellatrix", "capella", "deneb"] {
            let fork = Fork::from_str(name).unwrap();
            assert_eq!(fork.to_string(), name);
        }
        assert!(Fork::from_str("electra-unknown").is_err());
    }

    #[test]
    fn test_fork_capabilities() {
        assert!(!Fork::Phase0.has_participation_flags());
        assert!(Fork::Altair.has_participation_flags());
        assert!(!Fork::Altair.has_execution_payload());
        assert!(Fork::Bellatrix.has_execution_payload());
        assert!(Fork::Capella.has_withdrawals());
        assert!(Fork::Deneb.has_blobs());
    }
}

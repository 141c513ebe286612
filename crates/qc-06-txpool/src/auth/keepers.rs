//! Builder keeper snapshot and threshold checks.

use crate::domain::AuthError;
use serde::{Deserialize, Serialize};
use shared_types::{Account, PublicKey};
use std::collections::HashSet;

/// Keys allowed to act for the builder account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderAuthorization {
    pub keys: Vec<PublicKey>,
    pub threshold: u16,
}

impl BuilderAuthorization {
    /// Snapshot of an account's keepers.
    ///
    /// An account without keepers, or with a zero threshold, cannot
    /// authorize anything and is refused.
    pub fn from_account(account: &Account) -> Result<Self, AuthError> {
        let threshold = account.threshold;
        if threshold == 0 || account.keepers.len() < threshold as usize {
            return Err(AuthError::InvalidKeepers {
                threshold,
                keys: account.keepers.len(),
            });
        }
        Ok(Self {
            keys: account.keepers.clone(),
            threshold,
        })
    }

    /// Checks that `candidates` satisfy the threshold.
    pub fn authorize(&self, candidates: &[PublicKey]) -> Result<(), AuthError> {
        if has_keys(candidates, &self.keys, self.threshold) {
            Ok(())
        } else {
            Err(AuthError::ThresholdUnmet {
                threshold: self.threshold,
            })
        }
    }
}

/// True iff at least `threshold` distinct candidates appear in `keepers`.
pub fn has_keys(candidates: &[PublicKey], keepers: &[PublicKey], threshold: u16) -> bool {
    let keepers: HashSet<&PublicKey> = keepers.iter().collect();
    let matched: HashSet<&PublicKey> = candidates
        .iter()
        .filter(|key| keepers.contains(key))
        .collect();
    matched.len() >= threshold as usize
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access tiers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access level derived from on-chain holdings.
///
/// ## Ordering
///
/// `Denied < Paid < Free`. When several sources grant access (direct
/// ownership, multiple delegated vaults) the highest tier wins, and `Free`
/// is the ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// No qualifying asset held.
    Denied,
    /// Access requires a confirmed on-chain payment session.
    Paid,
    /// Access granted without payment.
    Free,
}

impl AccessTier {
    /// Map the access-policy contract's `(access, free)` pair to a tier.
    pub fn from_policy(access: bool, free: bool) -> Self {
        match (access, free) {
            (true, true) => AccessTier::Free,
            (true, false) => AccessTier::Paid,
            (false, _) => AccessTier::Denied,
        }
    }

    /// Map free/paid token balances to a tier.
    pub fn from_balances(free_balance_nonzero: bool, paid_balance_nonzero: bool) -> Self {
        if free_balance_nonzero {
            AccessTier::Free
        } else if paid_balance_nonzero {
            AccessTier::Paid
        } else {
            AccessTier::Denied
        }
    }

    pub fn is_ceiling(&self) -> bool {
        *self == AccessTier::Free
    }

    pub fn grants_access(&self) -> bool {
        *self > AccessTier::Denied
    }
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessTier::Denied => write!(f, "denied"),
            AccessTier::Paid => write!(f, "paid"),
            AccessTier::Free => write!(f, "free"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_denied_paid_free() {
        assert!(AccessTier::Denied < AccessTier::Paid);
        assert!(AccessTier::Paid < AccessTier::Free);
        let best = [AccessTier::Paid, AccessTier::Free, AccessTier::Denied]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(best, AccessTier::Free);
    }

    #[test]
    fn policy_mapping() {
        assert_eq!(AccessTier::from_policy(true, true), AccessTier::Free);
        assert_eq!(AccessTier::from_policy(true, false), AccessTier::Paid);
        assert_eq!(AccessTier::from_policy(false, true), AccessTier::Denied);
        assert_eq!(AccessTier::from_policy(false, false), AccessTier::Denied);
    }

    #[test]
    fn balance_mapping_prefers_free() {
        assert_eq!(AccessTier::from_balances(true, true), AccessTier::Free);
        assert_eq!(AccessTier::from_balances(false, true), AccessTier::Paid);
        assert_eq!(AccessTier::from_balances(false, false), AccessTier::Denied);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&AccessTier::Denied).unwrap();
        assert_eq!(json, r#""denied""#);
        assert_eq!(AccessTier::Free.to_string(), "free");
    }
}

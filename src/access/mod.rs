// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Resolution
//!
//! Answers "is this wallet entitled, and to what?" from the ledger.
//!
//! - `tier` - the `Denied < Paid < Free` ordering
//! - `cache` - bounded TTL cache shared by both resolvers
//! - `delegation` - hot wallet → vault lookup across registries
//! - `resolver` - direct read with delegation fallback, cached

pub mod cache;
pub mod delegation;
pub mod resolver;
pub mod tier;

pub use delegation::{DelegationResolver, VaultLookup};
pub use resolver::{ResolvedTier, TierResolver};
pub use tier::AccessTier;

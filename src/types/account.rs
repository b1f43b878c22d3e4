//! Account-related types for the points ledger
//!
//! This module defines the two balance-holding documents: the recycling
//! company's spendable balance and the end-user's accumulated balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Company account identifier (opaque string)
pub type CompanyId = String;

/// User account identifier (opaque string)
pub type UserId = String;

/// Point amounts are whole, non-negative numbers
pub type Points = u64;

/// Company account state
///
/// Created out-of-band by provisioning and mutated only by the transfer
/// engine. The balance can never go below zero after a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAccount {
    /// The company ID
    pub company_id: CompanyId,

    /// Spendable points balance
    ///
    /// Debited when users are rewarded, credited by verified recharges.
    pub current_points: Points,
}

impl CompanyAccount {
    /// Create a company account with the given opening balance
    pub fn new(company_id: impl Into<CompanyId>, current_points: Points) -> Self {
        CompanyAccount {
            company_id: company_id.into(),
            current_points,
        }
    }
}

/// User account state
///
/// Created lazily by the first credit a user receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// The user ID
    pub user_id: UserId,

    /// Accumulated points balance
    pub points: Points,

    /// When the account was first credited
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Create a new user account with a zero balance
    ///
    /// # Arguments
    ///
    /// * `user_id` - The user ID for this account
    /// * `created_at` - Creation time, normally the time of the first credit
    pub fn new(user_id: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        UserAccount {
            user_id: user_id.into(),
            points: 0,
            created_at,
        }
    }
}

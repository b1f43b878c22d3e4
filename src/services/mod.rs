//! Policy services on top of the transfer engine
//!
//! - `deposit`: turns a weighed deposit into a company → user transfer
//! - `recharge`: turns a verified gateway payment into a company credit

pub mod deposit;
pub mod recharge;

pub use deposit::{points_for_weight, DepositReceipt, DepositRequest, DepositValidationService};
pub use recharge::{
    Acknowledgement, AttemptOutcome, ReconcileOutcome, RechargeReconciliationService,
    VerificationAttempt, VerificationAudit,
};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::Points;

/// `floor(quantity × rate)` as a points amount
///
/// Returns `None` when the product overflows or does not fit in `Points`.
/// Negative products floor to a negative value and are rejected the same way.
pub(crate) fn floor_points(quantity: Decimal, rate: Decimal) -> Option<Points> {
    quantity.checked_mul(rate)?.floor().to_u64()
}

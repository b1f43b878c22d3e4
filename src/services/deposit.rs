//! Deposit validation
//!
//! An agent weighs what a user brought in and the user is rewarded from the
//! agent's company balance. The weight-to-points conversion happens here and
//! nowhere else; the engine only ever sees a points amount.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::floor_points;
use crate::core::TransferEngine;
use crate::identity::IdentityProvider;
use crate::types::{Auxiliary, LedgerEntry, LedgerError, Points, TransferRequest, UserId};

/// A weighed deposit, as submitted by an agent
#[derive(Debug, Clone, PartialEq)]
pub struct DepositRequest {
    pub user_id: UserId,
    pub weight_kg: Decimal,

    /// Optional request id; resubmitting the same id credits once
    pub reference: Option<String>,
}

/// Result of a validated deposit
#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub entry: LedgerEntry,
    pub points_credited: Points,

    /// Human-readable confirmation for the agent
    pub message: String,

    /// True when the reference had already been posted and nothing moved
    pub replayed: bool,
}

/// Convert a weight in kilograms into points at `points_per_kg`
///
/// # Errors
///
/// * `InvalidArgument` - the weight is not positive, the result rounds down
///   to zero points, or the result does not fit in the points type
pub fn points_for_weight(weight_kg: Decimal, points_per_kg: Decimal) -> Result<Points, LedgerError> {
    if weight_kg <= Decimal::ZERO {
        return Err(LedgerError::invalid_argument(format!(
            "weight must be positive, got {} kg",
            weight_kg
        )));
    }

    match floor_points(weight_kg, points_per_kg) {
        Some(0) => Err(LedgerError::invalid_argument(format!(
            "{} kg is worth zero points at {} points/kg",
            weight_kg, points_per_kg
        ))),
        Some(points) => Ok(points),
        None => Err(LedgerError::invalid_argument(format!(
            "{} kg at {} points/kg exceeds the maximum transferable amount",
            weight_kg, points_per_kg
        ))),
    }
}

/// Validates agent deposits and rewards users
pub struct DepositValidationService {
    engine: TransferEngine,
    identity: Arc<dyn IdentityProvider>,
    points_per_kg: Decimal,
}

impl DepositValidationService {
    pub fn new(
        engine: TransferEngine,
        identity: Arc<dyn IdentityProvider>,
        points_per_kg: Decimal,
    ) -> Self {
        Self {
            engine,
            identity,
            points_per_kg,
        }
    }

    pub fn points_per_kg(&self) -> Decimal {
        self.points_per_kg
    }

    /// Validate a deposit on behalf of the agent holding `token`
    ///
    /// The agent's company is debited `floor(weight × points_per_kg)` points
    /// and the user credited the same amount, in one transaction.
    #[tracing::instrument(
        name = "validate_deposit",
        skip_all,
        fields(user_id = %request.user_id, weight_kg = %request.weight_kg)
    )]
    pub async fn validate_deposit(
        &self,
        token: &str,
        request: DepositRequest,
    ) -> Result<DepositReceipt, LedgerError> {
        let caller = self.identity.authenticate(token).await?;

        let company_id = match caller.company_id.as_deref() {
            Some(company_id) if !company_id.trim().is_empty() => company_id.to_string(),
            _ => {
                warn!(agent_id = %caller.agent_id, "agent is not bound to a company");
                return Err(LedgerError::precondition_failed(format!(
                    "agent {} is not associated with a company",
                    caller.agent_id
                )));
            }
        };

        if request.user_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("user id must not be empty"));
        }
        let points = points_for_weight(request.weight_kg, self.points_per_kg)?;

        let transfer = TransferRequest {
            company_id,
            user_id: request.user_id,
            amount: points,
            auxiliary: Auxiliary::Deposit {
                weight_kg: request.weight_kg,
                agent_id: caller.agent_id.clone(),
            },
            reference: request.reference,
        };

        let posting = self.engine.transfer_company_to_user(transfer, &caller).await?;
        let replayed = posting.is_replay();
        let entry = posting.into_entry();

        let message = if replayed {
            format!("Deposit already validated. {} points credited.", entry.amount)
        } else {
            format!("Deposit validated. {} points credited.", entry.amount)
        };
        info!(points = entry.amount, replayed, "{}", message);

        Ok(DepositReceipt {
            points_credited: entry.amount,
            entry,
            message,
            replayed,
        })
    }
}

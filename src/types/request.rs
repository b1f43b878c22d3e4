//! Request and identity types handed to the transfer engine

use super::account::{CompanyId, Points, UserId};
use super::ledger::Auxiliary;

/// Authenticated caller as established by the identity provider
///
/// The token is opaque. For agents, the provider also binds the company
/// the agent works for; the ledger trusts that binding as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Opaque token the caller authenticated with
    pub token: String,

    /// Agent user id
    pub agent_id: String,

    /// Company the agent is bound to
    pub company_id: Option<CompanyId>,
}

impl CallerIdentity {
    pub fn agent(
        token: impl Into<String>,
        agent_id: impl Into<String>,
        company_id: impl Into<CompanyId>,
    ) -> Self {
        CallerIdentity {
            token: token.into(),
            agent_id: agent_id.into(),
            company_id: Some(company_id.into()),
        }
    }

    /// Whether the identity carries a usable token
    pub fn is_authenticated(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// Company → user transfer request
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub amount: Points,
    pub auxiliary: Auxiliary,

    /// Optional idempotency key, recorded on the ledger entry
    pub reference: Option<String>,
}

/// External funds → company recharge request
#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRequest {
    pub company_id: CompanyId,
    pub amount: Points,
    pub auxiliary: Auxiliary,

    /// External payment reference (invoice token). A reference that is
    /// already in the log is credited at most once.
    pub reference: Option<String>,
}

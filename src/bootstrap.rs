//! Process start-up
//!
//! Everything with process lifetime is built here exactly once and handed
//! to the request handlers by reference. There is no global client.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LedgerConfig;
use crate::core::{AccountStore, TransferEngine};
use crate::gateway::PaymentGateway;
use crate::identity::IdentityProvider;
use crate::services::{DepositValidationService, RechargeReconciliationService};

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "POINTS_LEDGER_LOG";

/// Initialize tracing with the POINTS_LEDGER_LOG environment variable.
///
/// Defaults to "info" level if POINTS_LEDGER_LOG is not set. Logs go to
/// stderr so stdout stays free for CSV output.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// The ledger and its services, wired together
pub struct AppContext {
    pub store: Arc<AccountStore>,
    pub engine: TransferEngine,
    pub deposits: DepositValidationService,
    pub recharges: RechargeReconciliationService,
}

impl AppContext {
    /// Build an empty store and the services over it
    pub fn new(
        config: &LedgerConfig,
        identity: Arc<dyn IdentityProvider>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let store = Arc::new(AccountStore::new(config.retry.clone()));
        let engine = TransferEngine::new(store.clone());

        info!(
            points_per_kg = %config.points_per_kg,
            points_per_currency_unit = %config.points_per_currency_unit,
            provider = gateway.provider(),
            "ledger context ready"
        );

        Self {
            deposits: DepositValidationService::new(
                engine.clone(),
                identity,
                config.points_per_kg,
            ),
            recharges: RechargeReconciliationService::new(
                engine.clone(),
                gateway,
                config.points_per_currency_unit,
            ),
            store,
            engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InvoiceStatus, SimulatedGateway};
    use crate::identity::StaticIdentityProvider;
    use crate::services::DepositRequest;
    use crate::types::CallerIdentity;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_services_share_one_store() {
        let identity: StaticIdentityProvider =
            [CallerIdentity::agent("tok", "agent", "C1")].into_iter().collect();
        let gateway = Arc::new(SimulatedGateway::default());
        gateway.insert_invoice("inv", Some("C1"), Decimal::from(40), InvoiceStatus::Completed);

        let ctx = AppContext::new(&LedgerConfig::default(), Arc::new(identity), gateway);
        ctx.store.provision_company("C1", 0).unwrap();

        ctx.recharges.reconcile("inv").await.unwrap();
        ctx.deposits
            .validate_deposit(
                "tok",
                DepositRequest {
                    user_id: "U1".to_string(),
                    weight_kg: Decimal::from(4),
                    reference: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(ctx.store.company("C1").unwrap().current_points, 0);
        assert_eq!(ctx.store.user("U1").unwrap().points, 40);
        assert_eq!(ctx.engine.store().log().len(), 2);
    }
}

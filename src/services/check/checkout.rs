//! Auto-checkout hook.
//!
//! No purchase is made. The payment method is loaded and decrypted so that
//! misconfiguration shows up in the agent's history, and the attempt is
//! logged.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::crypto::{decrypt_card, Cipher, CipherError};
use crate::models::{Agent, CardData, CheckLogEntry, LogResult};
use crate::repository::{AgentRepository, PaymentMethodRepository, RepositoryError, Store};

#[derive(Debug, thiserror::Error)]
enum CheckoutError {
    #[error("Payment method not found")]
    PaymentMethodNotFound,
    #[error("{0}")]
    Cipher(#[from] CipherError),
    #[error("{0}")]
    Repository(#[from] RepositoryError),
}

async fn load_card(
    store: &dyn Store,
    cipher: &dyn Cipher,
    agent: &Agent,
    card_id: &str,
) -> Result<CardData, CheckoutError> {
    let record = store
        .get_payment_method(&agent.user_id, card_id)
        .await?
        .ok_or(CheckoutError::PaymentMethodNotFound)?;
    Ok(decrypt_card(cipher, &record)?)
}

/// Run the checkout stub for an in-stock agent.
///
/// Returns the attempt time when the payment method resolved. Failures are
/// written to the agent's log and never propagate.
pub(crate) async fn attempt_checkout(
    store: &dyn Store,
    cipher: &dyn Cipher,
    agent: &Agent,
    http_status: u16,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let card_id = agent
        .auto_checkout_card_id
        .as_deref()
        .filter(|id| !id.is_empty())?;
    info!("Attempting auto-checkout for agent {}", agent.id);

    let (entry, attempted) = match load_card(store, cipher, agent, card_id).await {
        Ok(card) => {
            info!("Would checkout using card ending in {}", card.last4);
            (
                CheckLogEntry {
                    timestamp: now,
                    result: LogResult::CheckoutAttempted,
                    message: format!(
                        "Auto-checkout attempted with card ending in {}",
                        card.last4
                    ),
                    http_status,
                },
                Some(now),
            )
        }
        Err(e) => {
            error!("Auto-checkout failed for {}: {}", agent.id, e);
            (
                CheckLogEntry {
                    timestamp: now,
                    result: LogResult::CheckoutFailed,
                    message: format!("Auto-checkout failed: {}", e),
                    http_status,
                },
                None,
            )
        }
    };

    if let Err(e) = store.append_log(&agent.user_id, &agent.id, &entry).await {
        warn!("Could not record checkout entry for {}: {}", agent.id, e);
    }
    attempted
}

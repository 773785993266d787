//! Payment method commands.

use console::style;

use crate::config::Settings;
use crate::crypto::{apply_card_update, encrypt_card, CardUpdate, NewCard};
use crate::repository::PaymentMethodRepository;

use super::super::helpers;

/// Encrypt and store a card for auto-checkout.
pub async fn cmd_payment_add(
    settings: &Settings,
    user_id: &str,
    card: NewCard,
) -> anyhow::Result<()> {
    let digits = card.card_number.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 4 {
        anyhow::bail!("Card number must contain at least 4 digits");
    }

    let store = helpers::open_store(settings)?;
    let cipher = helpers::load_cipher()?;
    let record = encrypt_card(cipher.as_ref(), uuid::Uuid::new_v4().to_string(), &card)?;
    store.add_payment_method(user_id, &record).await?;

    println!(
        "{} Payment method added successfully (card ending in {})",
        style("✓").green(),
        record.last4
    );
    println!("  Payment method ID: {}", record.id);
    Ok(())
}

/// Edit a stored card, re-encrypting it when a new number and CVC are given.
pub async fn cmd_payment_update(
    settings: &Settings,
    user_id: &str,
    method_id: &str,
    update: CardUpdate,
) -> anyhow::Result<()> {
    let store = helpers::open_store(settings)?;
    let Some(existing) = store.get_payment_method(user_id, method_id).await? else {
        anyhow::bail!("Payment method not found");
    };

    let cipher = helpers::load_cipher()?;
    let record = apply_card_update(cipher.as_ref(), &existing, &update)?;
    if !store.update_payment_method(user_id, &record).await? {
        anyhow::bail!("Payment method not found");
    }

    println!(
        "{} Payment method updated successfully (card ending in {})",
        style("✓").green(),
        record.last4
    );
    Ok(())
}

//! Stored payment methods used by the auto-checkout flow.

use serde::{Deserialize, Serialize};

/// A payment method as persisted: sensitive fields are ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodRecord {
    pub id: String,
    pub encrypted_number: String,
    pub encrypted_cvc: String,
    pub expiry: String,
    pub cardholder_name: String,
    pub last4: String,
    #[serde(default)]
    pub is_prepaid: bool,
    /// Remaining balance, only tracked for prepaid cards.
    #[serde(default)]
    pub balance: Option<f64>,
}

/// Decrypted card details.
#[derive(Clone, PartialEq)]
pub struct CardData {
    pub card_number: String,
    pub cvc: String,
    pub expiry: String,
    pub cardholder_name: String,
    pub last4: String,
    pub is_prepaid: bool,
    pub balance: Option<f64>,
}

impl std::fmt::Debug for CardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardData")
            .field("last4", &self.last4)
            .field("expiry", &self.expiry)
            .field("is_prepaid", &self.is_prepaid)
            .finish_non_exhaustive()
    }
}

/// Last four digits of a card number, ignoring spaces and dashes.
pub fn last_four(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_four_strips_separators() {
        assert_eq!(last_four("4111 1111 1111 1234"), "1234");
        assert_eq!(last_four("4111-1111-1111-9876"), "9876");
        assert_eq!(last_four("12"), "12");
    }

    #[test]
    fn test_card_debug_hides_number() {
        let card = CardData {
            card_number: "4111111111111234".to_string(),
            cvc: "123".to_string(),
            expiry: "12/30".to_string(),
            cardholder_name: "Ash".to_string(),
            last4: "1234".to_string(),
            is_prepaid: false,
            balance: None,
        };
        let debug = format!("{:?}", card);
        assert!(!debug.contains("4111111111111234"));
    }
}

//! Encryption of stored secrets (webhook URLs, card numbers).
//!
//! The rest of the crate only sees the [`Cipher`] trait; the default backing
//! is AES-256-GCM with a random nonce prefixed to the ciphertext, hex encoded.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use crate::models::{last_four, CardData, PaymentMethodRecord};

/// AES-GCM standard nonce size.
const NONCE_SIZE: usize = 12;

/// Environment variable holding the hex-encoded 256-bit key.
pub const ENCRYPTION_KEY_ENV: &str = "ROTOM_ENCRYPTION_KEY";

/// Errors from encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    #[error("Encryption failed")]
    Encrypt,
    #[error("Decryption failed")]
    Decrypt,
}

/// Opaque symmetric encryption capability.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plain_text: &str) -> Result<String, CipherError>;
    fn decrypt(&self, cipher_text: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM cipher keyed from a 64-character hex string.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let key_bytes = hex::decode(key_hex.trim())
            .map_err(|e| CipherError::InvalidKey(format!("invalid hex: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(CipherError::InvalidKey(
                "key must be 32 bytes (256 bits) long".to_string(),
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Load the key from [`ENCRYPTION_KEY_ENV`].
    pub fn from_env() -> Result<Self, CipherError> {
        let key = std::env::var(ENCRYPTION_KEY_ENV)
            .map_err(|_| CipherError::InvalidKey(format!("{} is not set", ENCRYPTION_KEY_ENV)))?;
        Self::from_hex(&key)
    }

    /// Generate a fresh random key, hex encoded.
    pub fn generate_key() -> String {
        hex::encode(Aes256Gcm::generate_key(&mut OsRng))
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmCipher")
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plain_text: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain_text.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(hex::encode(result))
    }

    fn decrypt(&self, cipher_text: &str) -> Result<String, CipherError> {
        let data = hex::decode(cipher_text)
            .map_err(|e| CipherError::InvalidCiphertext(format!("invalid hex: {}", e)))?;
        if data.len() < NONCE_SIZE {
            return Err(CipherError::InvalidCiphertext(
                "too short to contain a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plain).map_err(|e| CipherError::InvalidCiphertext(e.to_string()))
    }
}

/// Plain card details as entered by the user.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub card_number: String,
    pub cvc: String,
    pub expiry: String,
    pub cardholder_name: String,
    pub is_prepaid: bool,
    pub balance: Option<f64>,
}

/// Encrypt card details into a storable record.
pub fn encrypt_card(
    cipher: &dyn Cipher,
    id: impl Into<String>,
    card: &NewCard,
) -> Result<PaymentMethodRecord, CipherError> {
    Ok(PaymentMethodRecord {
        id: id.into(),
        encrypted_number: cipher.encrypt(&card.card_number)?,
        encrypted_cvc: cipher.encrypt(&card.cvc)?,
        expiry: card.expiry.clone(),
        cardholder_name: card.cardholder_name.clone(),
        last4: last_four(&card.card_number),
        is_prepaid: card.is_prepaid,
        balance: if card.is_prepaid { card.balance } else { None },
    })
}

/// Edited card details. Number and CVC are replaced only as a pair.
#[derive(Debug, Clone)]
pub struct CardUpdate {
    pub card_number: Option<String>,
    pub cvc: Option<String>,
    pub expiry: String,
    pub cardholder_name: String,
    pub is_prepaid: bool,
    pub balance: Option<f64>,
}

/// Apply `update` to a stored record, re-encrypting the card when both
/// number and CVC are supplied.
pub fn apply_card_update(
    cipher: &dyn Cipher,
    existing: &PaymentMethodRecord,
    update: &CardUpdate,
) -> Result<PaymentMethodRecord, CipherError> {
    let mut record = existing.clone();
    if let (Some(number), Some(cvc)) = (&update.card_number, &update.cvc) {
        record.encrypted_number = cipher.encrypt(number)?;
        record.encrypted_cvc = cipher.encrypt(cvc)?;
        record.last4 = last_four(number);
    }
    record.expiry = update.expiry.clone();
    record.cardholder_name = update.cardholder_name.clone();
    record.is_prepaid = update.is_prepaid;
    record.balance = if update.is_prepaid { update.balance } else { None };
    Ok(record)
}

/// Decrypt a stored payment method.
pub fn decrypt_card(
    cipher: &dyn Cipher,
    record: &PaymentMethodRecord,
) -> Result<CardData, CipherError> {
    Ok(CardData {
        card_number: cipher.decrypt(&record.encrypted_number)?,
        cvc: cipher.decrypt(&record.encrypted_cvc)?,
        expiry: record.expiry.clone(),
        cardholder_name: record.cardholder_name.clone(),
        last4: record.last4.clone(),
        is_prepaid: record.is_prepaid,
        balance: record.balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const OTHER_KEY: &str = "f1e1d1c1b1a191817161514131211101f0e0d0c0b0a090807060504030201000";

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        let url = "https://discord.com/api/webhooks/123/abc";

        let encrypted = cipher.encrypt(url).unwrap();
        assert_ne!(encrypted, url);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), url);
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = AesGcmCipher::from_hex(KEY).unwrap().encrypt("secret").unwrap();
        let other = AesGcmCipher::from_hex(OTHER_KEY).unwrap();
        assert!(matches!(other.decrypt(&encrypted), Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_invalid_keys_and_input() {
        assert!(matches!(
            AesGcmCipher::from_hex("1234"),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(matches!(
            AesGcmCipher::from_hex("not-a-hex-string"),
            Err(CipherError::InvalidKey(_))
        ));

        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        assert!(matches!(
            cipher.decrypt("zz"),
            Err(CipherError::InvalidCiphertext(_))
        ));
        assert!(matches!(
            cipher.decrypt("0011"),
            Err(CipherError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_generated_key_is_usable() {
        let key = AesGcmCipher::generate_key();
        assert_eq!(key.len(), 64);
        assert!(AesGcmCipher::from_hex(&key).is_ok());
    }

    #[test]
    fn test_card_encryption() {
        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        let card = NewCard {
            card_number: "4111 1111 1111 4242".to_string(),
            cvc: "321".to_string(),
            expiry: "09/29".to_string(),
            cardholder_name: "Ash Ketchum".to_string(),
            is_prepaid: false,
            balance: Some(50.0),
        };

        let record = encrypt_card(&cipher, "pm1", &card).unwrap();
        assert_eq!(record.last4, "4242");
        assert_eq!(record.balance, None);
        assert!(!record.encrypted_number.contains("4242"));

        let data = decrypt_card(&cipher, &record).unwrap();
        assert_eq!(data.card_number, "4111 1111 1111 4242");
        assert_eq!(data.cvc, "321");
        assert_eq!(data.last4, "4242");
    }

    fn prepaid_card() -> NewCard {
        NewCard {
            card_number: "4000 0000 0000 1111".to_string(),
            cvc: "123".to_string(),
            expiry: "01/28".to_string(),
            cardholder_name: "Misty".to_string(),
            is_prepaid: true,
            balance: Some(40.0),
        }
    }

    #[test]
    fn test_card_update_needs_number_and_cvc() {
        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        let existing = encrypt_card(&cipher, "pm1", &prepaid_card()).unwrap();

        let update = CardUpdate {
            card_number: Some("5555 5555 5555 4444".to_string()),
            cvc: None,
            expiry: "02/30".to_string(),
            cardholder_name: "Misty W".to_string(),
            is_prepaid: true,
            balance: Some(12.5),
        };
        let record = apply_card_update(&cipher, &existing, &update).unwrap();
        assert_eq!(record.id, "pm1");
        assert_eq!(record.last4, "1111");
        assert_eq!(record.encrypted_number, existing.encrypted_number);
        assert_eq!(record.expiry, "02/30");
        assert_eq!(record.cardholder_name, "Misty W");
        assert_eq!(record.balance, Some(12.5));

        let data = decrypt_card(&cipher, &record).unwrap();
        assert_eq!(data.card_number, "4000 0000 0000 1111");
        assert_eq!(data.cvc, "123");
    }

    #[test]
    fn test_card_update_replaces_card() {
        let cipher = AesGcmCipher::from_hex(KEY).unwrap();
        let existing = encrypt_card(&cipher, "pm1", &prepaid_card()).unwrap();

        let update = CardUpdate {
            card_number: Some("5555 5555 5555 4444".to_string()),
            cvc: Some("987".to_string()),
            expiry: "01/28".to_string(),
            cardholder_name: "Misty".to_string(),
            is_prepaid: false,
            balance: Some(40.0),
        };
        let record = apply_card_update(&cipher, &existing, &update).unwrap();
        assert_eq!(record.last4, "4444");
        assert!(!record.is_prepaid);
        assert_eq!(record.balance, None);

        let data = decrypt_card(&cipher, &record).unwrap();
        assert_eq!(data.card_number, "5555 5555 5555 4444");
        assert_eq!(data.cvc, "987");
    }
}

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use scrypt::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Params, Scrypt,
};
use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake128,
};

use crate::{errors::HandlerError, models::now_millis};

/// Deterministic user id derived from the normalised e-mail address, so a
/// second registration with the same address collides on insert.
pub fn create_userid(email: &str) -> String {
    let mut hasher = Shake128::default();
    hasher.update(normalize_email(email).as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut buf = [0u8; 12];
    reader.read(&mut buf);
    format!("usr_{}", BASE64_URL_SAFE_NO_PAD.encode(buf))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str, log_n: u8) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params::new(log_n, Params::RECOMMENDED_R, Params::RECOMMENDED_P, 32)?;
    let hash = Scrypt.hash_password_customized(password.as_bytes(), None, None, params, &salt)?;
    Ok(hash.to_string())
}

/// Parameters are read back from the stored PHC string, so hashes made with
/// a different cost still verify.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, HandlerError> {
    let parsed = PasswordHash::new(stored)?;
    match Scrypt.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(scrypt::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// "ORD" + epoch millis + 0..999. Only probabilistically unique; orders are
/// keyed by their ulid.
pub fn order_number() -> String {
    format!("ORD{}{}", now_millis(), OsRng.next_u32() % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn userid_ignores_case_and_whitespace() {
        let a = create_userid("Asha@Example.com ");
        let b = create_userid("asha@example.com");
        assert_eq!(a, b);
        assert!(a.starts_with("usr_"));
        assert_ne!(a, create_userid("ram@example.com"));
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("secret1", 4).unwrap();
        assert!(hash.starts_with("$scrypt$"));
        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("secret2", &hash).unwrap());
    }

    #[test]
    fn order_numbers_have_prefix() {
        let n = order_number();
        assert!(n.starts_with("ORD"));
        assert!(n[3..].chars().all(|c| c.is_ascii_digit()));
    }
}

use base64::Engine;
use base64::engine::general_purpose;
use hmac::Hmac;
use hmac::Mac;
use pbkdf2::pbkdf2_hmac;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "RB ";
const PBKDF2_ROUNDS: u32 = 50_000;

pub const ACCESS_TOKEN_TTL: u64 = 3600;
pub const REFRESH_TOKEN_TTL: u64 = 30 * 24 * 3600;

pub fn b64_encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(s)
}

pub fn generate_key(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.try_fill_bytes(&mut bytes).unwrap();
    b64_encode(&bytes)
}

fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.try_fill_bytes(&mut salt).unwrap();
    salt
}

fn hash_password(password: &str, salt: &[u8], rounds: u32) -> Vec<u8> {
    let mut hash = vec![0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut hash);
    hash
}

/// Stored as `pbkdf2$<rounds>$<salt hex>$<hash hex>` so the round count
/// can be raised without invalidating existing rows.
pub fn store_password(password: &str) -> String {
    let salt = generate_salt();
    let hashed = hash_password(password, &salt, PBKDF2_ROUNDS);
    format!(
        "pbkdf2${}${}${}",
        PBKDF2_ROUNDS,
        hex::encode(salt),
        hex::encode(hashed)
    )
}

pub fn check_password(stored: &str, password: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let ["pbkdf2", rounds, salt, stored_hash] = parts.as_slice() else {
        return false;
    };
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(stored_hash)) = (hex::decode(salt), hex::decode(stored_hash)) else {
        return false;
    };
    hash_password(password, &salt, rounds) == stored_hash
}

// PBKDF2 is deliberately slow; keep it off the runtime threads.

pub async fn store_password_async(password: String) -> String {
    tokio::task::spawn_blocking(move || store_password(&password))
        .await
        .expect("blocking task panicked")
}

pub async fn check_password_async(stored: String, password: String) -> bool {
    tokio::task::spawn_blocking(move || check_password(&stored, &password))
        .await
        .expect("blocking task panicked")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn from_str(value: &str) -> Option<TokenKind> {
        match value {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }

    pub fn ttl(&self) -> u64 {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL,
            TokenKind::Refresh => REFRESH_TOKEN_TTL,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("INVALID_TOKEN")]
    Invalid,
    #[error("INVALID_TOKEN_FORMAT")]
    Format,
    #[error("INVALID_SIGNATURE")]
    Signature,
    #[error("DECODE_ERROR")]
    Decode,
}

#[derive(Debug)]
pub struct DecodedToken {
    pub user_id: i64,
    pub session_id: i64,
    pub kind: TokenKind,
    pub secret: String,
    pub expires_at: u64,
    pub is_expired: bool,
}

fn hmac_sha256_b64(message: &str, signature_key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signature_key.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    let result = mac.finalize().into_bytes();
    general_purpose::STANDARD.encode(result)
}

fn verify_hmac_b64(message: &str, sig_b64: &str, signature_key: &str) -> bool {
    let expected = hmac_sha256_b64(message, signature_key);
    expected.eq(sig_b64)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Opaque signed token: `RB <b64(session\0user\0kind\0expires\0secret)>.<hmac>`.
pub fn generate_token(
    user_id: i64,
    session_id: i64,
    kind: TokenKind,
    secret: &str,
    signature_key: &str,
) -> String {
    let expiration = now_secs() + kind.ttl();

    let combined = format!(
        "{}\0{}\0{}\0{}\0{}",
        session_id,
        user_id,
        kind.as_str(),
        expiration,
        secret
    );
    let payload = b64_encode(combined.as_bytes());
    let signature = hmac_sha256_b64(&payload, signature_key);

    format!("{}{}.{}", TOKEN_PREFIX, payload, signature)
}

pub fn decode_token(
    token: &str,
    expect_kind: Option<TokenKind>,
    signature_key: &str,
) -> Result<DecodedToken, TokenError> {
    let t = token.strip_prefix(TOKEN_PREFIX).ok_or(TokenError::Invalid)?;

    // split on the last '.' for the signature
    let parts_rev: Vec<&str> = t.rsplitn(2, '.').collect();
    if parts_rev.len() != 2 {
        return Err(TokenError::Format);
    }
    let signature = parts_rev[0];
    let payload = parts_rev[1];

    if !verify_hmac_b64(payload, signature, signature_key) {
        return Err(TokenError::Signature);
    }

    let decoded = b64_decode(payload).map_err(|_| TokenError::Decode)?;
    let decoded_str = String::from_utf8(decoded).map_err(|_| TokenError::Decode)?;

    let parts: Vec<&str> = decoded_str.split('\0').collect();
    if parts.len() != 5 {
        return Err(TokenError::Decode);
    }

    let session_id: i64 = parts[0].parse().map_err(|_| TokenError::Decode)?;
    let user_id: i64 = parts[1].parse().map_err(|_| TokenError::Decode)?;
    let kind = TokenKind::from_str(parts[2]).ok_or(TokenError::Decode)?;
    let expires_at: u64 = parts[3].parse().map_err(|_| TokenError::Decode)?;
    let secret = parts[4].to_string();

    if let Some(expected) = expect_kind {
        if expected != kind {
            return Err(TokenError::Invalid);
        }
    }

    Ok(DecodedToken {
        user_id,
        session_id,
        kind,
        secret,
        expires_at,
        is_expired: now_secs() > expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signature-key";

    #[test]
    fn password_round_trip() {
        let stored = store_password("hunter2");
        assert!(check_password(&stored, "hunter2"));
        assert!(!check_password(&stored, "hunter3"));
        assert!(!check_password("garbage", "hunter2"));
    }

    #[test]
    fn token_round_trip() {
        let token = generate_token(42, 7, TokenKind::Access, "sekret", KEY);
        let decoded = decode_token(&token, Some(TokenKind::Access), KEY).unwrap();
        assert_eq!(decoded.user_id, 42);
        assert_eq!(decoded.session_id, 7);
        assert_eq!(decoded.secret, "sekret");
        assert!(!decoded.is_expired);
    }

    #[test]
    fn kind_mismatch_rejected() {
        let token = generate_token(42, 7, TokenKind::Refresh, "sekret", KEY);
        let err = decode_token(&token, Some(TokenKind::Access), KEY).unwrap_err();
        assert_eq!(err, TokenError::Invalid);
    }

    #[test]
    fn tampered_payload_rejected() {
        let token = generate_token(42, 7, TokenKind::Access, "sekret", KEY);
        let mut tampered = token.clone();
        tampered.replace_range(3..4, "A");
        assert!(matches!(
            decode_token(&tampered, None, KEY),
            Err(TokenError::Signature) | Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn wrong_key_rejected() {
        let token = generate_token(42, 7, TokenKind::Access, "sekret", KEY);
        let err = decode_token(&token, None, "other-key").unwrap_err();
        assert_eq!(err, TokenError::Signature);
    }
}

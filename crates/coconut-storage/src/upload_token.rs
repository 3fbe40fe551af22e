//! Signed tokens for upload proxy URLs.
//!
//! Token = hex(HMAC-SHA256(secret, volume || '\n' || path)). The token binds an
//! upload URL to the single location it was issued for.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, volume: &str, path: &str) -> StorageResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| StorageError::ConfigError(format!("Invalid upload secret: {}", e)))?;
    mac.update(volume.as_bytes());
    mac.update(b"\n");
    mac.update(path.as_bytes());
    Ok(mac)
}

/// Build the token for an upload of `path` to `volume`.
pub fn sign(secret: &str, volume: &str, path: &str) -> StorageResult<String> {
    let mac = mac_for(secret, volume, path)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `token` against `volume` and `path`. Malformed tokens never verify.
pub fn verify(secret: &str, volume: &str, path: &str, token: &str) -> bool {
    let Ok(tag) = hex::decode(token) else {
        return false;
    };
    match mac_for(secret, volume, path) {
        Ok(mac) => mac.verify_slice(&tag).is_ok(),
        Err(_) => false,
    }
}

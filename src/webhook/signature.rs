use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verify a `X-Hub-Signature-256` header (`sha256=<hex>`) against the raw payload.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> Result<()> {
    let signature_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| AppError::WebhookVerification("Missing sha256= prefix".to_string()))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::WebhookVerification(format!("Invalid hex in signature: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::WebhookVerification(format!("Invalid HMAC key: {e}")))?;

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::WebhookVerification("Signature mismatch".to_string()))
}

/// Compute the header value GitHub would send for `payload`.
#[cfg(test)]
pub fn sign(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::WebhookVerification(format!("Invalid HMAC key: {e}")))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_payload_verifies() {
        let header = sign("hush", b"{\"zen\":\"ok\"}").unwrap();
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("hush", b"{\"zen\":\"ok\"}", &header).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = sign("other", b"payload").unwrap();
        let err = verify_signature("hush", b"payload", &header).unwrap_err();
        assert!(matches!(err, AppError::WebhookVerification(_)));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign("hush", b"payload").unwrap();
        assert!(verify_signature("hush", b"payload!", &header).is_err());
    }

    #[test]
    fn test_missing_prefix() {
        assert!(verify_signature("hush", b"payload", "abcdef1234567890").is_err());
    }

    #[test]
    fn test_invalid_hex() {
        assert!(verify_signature("hush", b"payload", "sha256=zz").is_err());
    }
}

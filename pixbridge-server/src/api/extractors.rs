//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `SignedBody<T, S>` — verifies a hex HMAC-SHA256 of the raw request body
//!   against the secret selected by `S`, then deserializes the JSON body.
//! - `IdempotencyKey` — the optional `Idempotency-Key` header.
//!
//! All cryptographic operations are delegated to [`pixbridge_sdk::signature`].

use axum::{
    Json,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use pixbridge_sdk::signature::{
    IDEMPOTENCY_HEADER, PROVIDER_SIGNATURE_HEADER, SIGNATURE_HEADER, verify_body,
};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::runtime::Secrets;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

impl FromRef<AppState> for Arc<Secrets> {
    fn from_ref(state: &AppState) -> Self {
        state.secrets.clone()
    }
}

/// Selects which shared secret and header authenticate a body.
pub trait SecretSource {
    const HEADER: &'static str;

    fn secret(secrets: &Secrets) -> Option<&str>;
}

/// Internal deposit and payout notifications (`x-signature`).
pub struct NotificationSecret;

impl SecretSource for NotificationSecret {
    const HEADER: &'static str = SIGNATURE_HEADER;

    fn secret(secrets: &Secrets) -> Option<&str> {
        secrets.notification.as_deref()
    }
}

/// PIX provider callbacks (`x-pagbank-signature`).
pub struct ProviderSecret;

impl SecretSource for ProviderSecret {
    const HEADER: &'static str = PROVIDER_SIGNATURE_HEADER;

    fn secret(secrets: &Secrets) -> Option<&str> {
        secrets.provider_webhook.as_deref()
    }
}

/// A JSON body whose raw bytes carry a valid HMAC signature.
pub struct SignedBody<T, S>(pub T, pub PhantomData<S>);

/// Errors that can occur during signed-body verification.
#[derive(Debug, thiserror::Error)]
pub enum SignedBodyError {
    #[error("endpoint is not configured")]
    NotConfigured,
    #[error("missing signature header")]
    MissingHeader,
    #[error("invalid signature header")]
    InvalidHeader,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
    #[error("signature verification failed")]
    VerificationFailed,
}

#[derive(Serialize)]
struct RejectionBody {
    error: String,
}

impl IntoResponse for SignedBodyError {
    fn into_response(self) -> Response {
        let status = match self {
            SignedBodyError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            SignedBodyError::MissingHeader | SignedBodyError::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            SignedBodyError::InvalidHeader
            | SignedBodyError::BodyReadError
            | SignedBodyError::JsonError(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(RejectionBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl<T, S, St> FromRequest<St> for SignedBody<T, S>
where
    T: DeserializeOwned,
    S: SecretSource,
    Arc<Secrets>: FromRef<St>,
    St: Send + Sync,
{
    type Rejection = SignedBodyError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        let secrets = Arc::<Secrets>::from_ref(state);
        let secret = S::secret(&secrets).ok_or(SignedBodyError::NotConfigured)?;

        let signature = req
            .headers()
            .get(S::HEADER)
            .ok_or(SignedBodyError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedBodyError::InvalidHeader)?
            .to_owned();

        let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| SignedBodyError::BodyReadError)?;

        verify_body(secret.as_bytes(), &body, &signature)
            .map_err(|_| SignedBodyError::VerificationFailed)?;

        let value = serde_json::from_slice(&body).map_err(SignedBodyError::JsonError)?;
        Ok(SignedBody(value, PhantomData))
    }
}

/// The optional `Idempotency-Key` request header.
pub struct IdempotencyKey(pub Option<String>);

impl IdempotencyKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<St: Send + Sync> FromRequestParts<St> for IdempotencyKey {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_HEADER) else {
            return Ok(IdempotencyKey(None));
        };
        let key = value
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid Idempotency-Key header"))?
            .trim();
        if key.len() > 200 {
            return Err((StatusCode::BAD_REQUEST, "Idempotency-Key is too long"));
        }
        Ok(IdempotencyKey(
            (!key.is_empty()).then(|| key.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use pixbridge_sdk::objects::DepositNotification;
    use pixbridge_sdk::signature::sign_body;

    const BODY: &str = r#"{"txHash":"abc","amount":"18.5"}"#;

    fn secrets() -> Arc<Secrets> {
        Arc::new(Secrets {
            notification: Some("notify-secret".into()),
            provider_webhook: None,
        })
    }

    fn request(header: &str, signature: Option<String>) -> Request {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(signature) = signature {
            builder = builder.header(header, signature);
        }
        builder.body(Body::from(BODY)).unwrap()
    }

    async fn extract<S: SecretSource>(
        req: Request,
    ) -> Result<SignedBody<DepositNotification, S>, SignedBodyError> {
        SignedBody::from_request(req, &secrets()).await
    }

    #[tokio::test]
    async fn accepts_valid_signature() {
        let signature = sign_body(b"notify-secret", BODY.as_bytes());
        let SignedBody(body, _) = extract::<NotificationSecret>(request(SIGNATURE_HEADER, Some(signature)))
            .await
            .unwrap();
        assert_eq!(body.tx_hash, "abc");
    }

    #[tokio::test]
    async fn rejects_bad_or_missing_signature() {
        let wrong = sign_body(b"other-secret", BODY.as_bytes());
        let result = extract::<NotificationSecret>(request(SIGNATURE_HEADER, Some(wrong))).await;
        assert!(matches!(result, Err(SignedBodyError::VerificationFailed)));

        let result = extract::<NotificationSecret>(request(SIGNATURE_HEADER, None)).await;
        assert!(matches!(result, Err(SignedBodyError::MissingHeader)));
    }

    #[tokio::test]
    async fn missing_secret_is_unavailable() {
        let signature = sign_body(b"notify-secret", BODY.as_bytes());
        let result = extract::<ProviderSecret>(request(PROVIDER_SIGNATURE_HEADER, Some(signature))).await;
        let err = result.err().unwrap();
        assert!(matches!(err, SignedBodyError::NotConfigured));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

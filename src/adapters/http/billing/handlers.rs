//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command handlers.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    CreateCheckoutSessionCommand, CreateCheckoutSessionHandler, CreatePortalSessionCommand,
    CreatePortalSessionHandler, ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
use crate::domain::billing::{WebhookError, WebhookVerifier};
use crate::domain::foundation::{ProductId, UserId};
use crate::ports::{
    AuditLog, CheckoutProvider, LedgerStore, OperatorNotifier, PaymentError, PaymentErrorCode,
    WebhookEventStore,
};

use super::dto::{
    CheckoutResponse, CreateCheckoutRequestDto, CreatePortalRequestDto, ErrorResponse,
    PortalResponse, WebhookAck,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all billing dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct BillingAppState {
    pub events: Arc<dyn WebhookEventStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub audit: Arc<dyn AuditLog>,
    pub notifier: Arc<dyn OperatorNotifier>,
    pub checkout_provider: Arc<dyn CheckoutProvider>,
    pub webhook_secret: String,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            WebhookVerifier::new(self.webhook_secret.clone()),
            self.events.clone(),
            self.ledger.clone(),
            self.audit.clone(),
            self.notifier.clone(),
        )
    }

    pub fn checkout_handler(&self) -> CreateCheckoutSessionHandler {
        CreateCheckoutSessionHandler::new(self.checkout_provider.clone(), self.audit.clone())
    }

    pub fn portal_handler(&self) -> CreatePortalSessionHandler {
        CreatePortalSessionHandler::new(self.checkout_provider.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

/// HTTP-facing error wrapper for billing endpoints.
pub enum BillingApiError {
    Webhook(WebhookError),
    Payment(PaymentError),
    MissingSignatureHeader,
}

impl From<WebhookError> for BillingApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<PaymentError> for BillingApiError {
    fn from(err: PaymentError) -> Self {
        Self::Payment(err)
    }
}

fn webhook_error_code(err: &WebhookError) -> &'static str {
    match err {
        WebhookError::InvalidSignature => "INVALID_SIGNATURE",
        WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
        WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
        WebhookError::Parse(_) => "PARSE_ERROR",
        WebhookError::MissingMetadata(_) => "MISSING_METADATA",
        WebhookError::MissingField(_) => "MISSING_FIELD",
        WebhookError::Ignored(_) => "IGNORED",
        WebhookError::InvariantViolation(_) => "INVARIANT_VIOLATION",
        WebhookError::Database(_) => "DATABASE_ERROR",
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Webhook(err) => {
                let status = err.status_code();
                let body = ErrorResponse::new(webhook_error_code(&err), err.to_string());
                (status, Json(body)).into_response()
            }
            Self::Payment(err) => {
                let status = match err.code {
                    PaymentErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                    PaymentErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
                    PaymentErrorCode::NetworkError
                    | PaymentErrorCode::AuthenticationError
                    | PaymentErrorCode::ProviderError => StatusCode::BAD_GATEWAY,
                };
                let body = ErrorResponse::new(err.code.to_string().to_uppercase(), err.message);
                (status, Json(body)).into_response()
            }
            Self::MissingSignatureHeader => {
                let body = ErrorResponse::new(
                    "MISSING_SIGNATURE",
                    "Stripe-Signature header is required",
                );
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Endpoint Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe - Receive and process a provider webhook delivery.
///
/// The raw body bytes feed signature verification; any re-serialization
/// before verification would break the HMAC.
pub async fn handle_provider_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(BillingApiError::MissingSignatureHeader)?;

    let handler = state.webhook_handler();
    let result = handler
        .handle(ProcessWebhookCommand {
            payload: body.to_vec(),
            signature: signature.to_string(),
        })
        .await?;

    let ack = match result {
        ProcessWebhookResult::Processed { action } => WebhookAck {
            received: true,
            status: "processed",
            detail: Some(action.to_string()),
        },
        ProcessWebhookResult::AlreadyProcessed => WebhookAck {
            received: true,
            status: "already_processed",
            detail: None,
        },
        ProcessWebhookResult::Ignored { reason } => WebhookAck {
            received: true,
            status: "ignored",
            detail: Some(reason),
        },
    };
    Ok((StatusCode::OK, Json(ack)))
}

/// POST /api/billing/checkout - Start a provider checkout session.
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    Json(request): Json<CreateCheckoutRequestDto>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.checkout_handler();
    let session = handler
        .handle(CreateCheckoutSessionCommand {
            user_id: UserId::new(request.user_id),
            product_id: ProductId::new(request.product_id),
            mode: request.mode,
            price_id: request.price_id,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            customer_email: request.customer_email,
        })
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        checkout_url: session.url,
    }))
}

/// POST /api/billing/portal - Open the provider's billing portal.
pub async fn create_portal(
    State(state): State<BillingAppState>,
    Json(request): Json<CreatePortalRequestDto>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.portal_handler();
    let session = handler
        .handle(CreatePortalSessionCommand {
            customer_id: request.customer_id,
            return_url: request.return_url,
        })
        .await?;

    Ok(Json(PortalResponse {
        portal_url: session.url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_errors_map_to_their_http_status() {
        let unauthorized = BillingApiError::from(WebhookError::InvalidSignature).into_response();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let bad_request =
            BillingApiError::from(WebhookError::Parse("bad json".to_string())).into_response();
        assert_eq!(bad_request.status(), StatusCode::BAD_REQUEST);

        let acknowledged =
            BillingApiError::from(WebhookError::Ignored("not relevant".to_string()))
                .into_response();
        assert_eq!(acknowledged.status(), StatusCode::OK);

        let retryable =
            BillingApiError::from(WebhookError::Database("pool exhausted".to_string()))
                .into_response();
        assert_eq!(retryable.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn payment_errors_map_to_their_http_status() {
        let unavailable = BillingApiError::from(PaymentError::not_configured()).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let upstream = BillingApiError::from(PaymentError::provider("bad price")).into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_signature_header_is_a_bad_request() {
        let response = BillingApiError::MissingSignatureHeader.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

//! HTTP adapter for the payment provider.
//!
//! JSON over `reqwest`. Every mutating call carries an `Idempotency-Key`
//! header so the provider can deduplicate retries. Status codes map onto
//! [`PaymentGatewayError`]:
//!
//! | Status                  | Error                      |
//! |-------------------------|----------------------------|
//! | 402                     | `Declined`                 |
//! | 422                     | `CardInvalid`              |
//! | 404                     | `PaymentNotFound` / `None` |
//! | 401, 403                | `Unreachable`              |
//! | 5xx, 429, transport     | `Unreachable`              |

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use ticket_checkout_core::{
    CardDetails, CardRejection, ChargeRequest, GatewayFuture, GatewayResult, Money, Payment, PaymentGateway,
    PaymentGatewayError, PaymentId, PaymentMethod, PaymentMethodId, UserId,
};

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

#[derive(Serialize)]
struct VerifyCardBody<'a> {
    owner: UserId,
    card: &'a CardDetails,
}

#[derive(Serialize)]
struct RefundBody {
    amount_cents: u64,
}

#[derive(Deserialize)]
struct RefundResponse {
    refunded: bool,
}

struct Inner {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// [`PaymentGateway`] speaking JSON to a remote provider.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    inner: Arc<Inner>,
}

impl HttpPaymentGateway {
    /// Create a gateway client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).connect_timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url,
                api_key,
            }),
        })
    }
}

impl Inner {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        self.authorize(request).send().await.map_err(transport)
    }

    /// Decode a 2xx body, or map the failure status.
    async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> GatewayResult<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(transport);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }

    /// Like [`Inner::decode`], but a 404 is an absent resource.
    async fn decode_optional<T: for<'de> Deserialize<'de>>(response: Response) -> GatewayResult<Option<T>> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }
}

fn transport(err: reqwest::Error) -> PaymentGatewayError {
    PaymentGatewayError::Unreachable {
        message: err.to_string(),
    }
}

/// Map a non-success provider response onto a gateway error.
fn classify(status: StatusCode, body: &str) -> PaymentGatewayError {
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no detail").to_string()
    } else {
        body.trim().to_string()
    };

    match status {
        StatusCode::PAYMENT_REQUIRED => PaymentGatewayError::Declined { reason: detail },
        StatusCode::UNPROCESSABLE_ENTITY => PaymentGatewayError::CardInvalid(CardRejection::Provider { reason: detail }),
        // Credentials are deployment config, not a verdict on the card.
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentGatewayError::Unreachable {
            message: format!("provider refused our credentials ({status}): {detail}"),
        },
        status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            PaymentGatewayError::Unreachable {
                message: format!("provider returned {status}: {detail}"),
            }
        }
        status => PaymentGatewayError::Declined {
            reason: format!("provider rejected request ({status}): {detail}"),
        },
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn verify_and_store(&self, owner: UserId, card: CardDetails) -> GatewayFuture<PaymentMethod> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let request = inner
                .client
                .post(inner.url("/payment-methods"))
                .json(&VerifyCardBody { owner, card: &card });
            let response = inner.send(request).await?;
            Inner::decode(response).await
        })
    }

    fn charge_and_record(&self, request: ChargeRequest) -> GatewayFuture<Payment> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let http = inner
                .client
                .post(inner.url("/charges"))
                .header(IDEMPOTENCY_KEY, &request.idempotency_key)
                .json(&request);
            let response = inner.send(http).await?;
            let payment: Payment = Inner::decode(response).await?;
            tracing::debug!(
                payment_id = %payment.id,
                status = payment.status.as_str(),
                "Provider charge recorded"
            );
            Ok(payment)
        })
    }

    fn refund(&self, payment_id: PaymentId, amount: Money, idempotency_key: String) -> GatewayFuture<bool> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let request = inner
                .client
                .post(inner.url(&format!("/payments/{payment_id}/refunds")))
                .header(IDEMPOTENCY_KEY, idempotency_key)
                .json(&RefundBody {
                    amount_cents: amount.cents(),
                });
            let response = inner.send(request).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(PaymentGatewayError::PaymentNotFound(payment_id));
            }
            let refund: RefundResponse = Inner::decode(response).await?;
            Ok(refund.refunded)
        })
    }

    fn payment_method(&self, id: PaymentMethodId) -> GatewayFuture<Option<PaymentMethod>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let request = inner.client.get(inner.url(&format!("/payment-methods/{id}")));
            let response = inner.send(request).await?;
            Inner::decode_optional(response).await
        })
    }

    fn payment(&self, id: PaymentId) -> GatewayFuture<Option<Payment>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let request = inner.client.get(inner.url(&format!("/payments/{id}")));
            let response = inner.send(request).await?;
            Inner::decode_optional(response).await
        })
    }

    fn payment_by_idempotency_key(&self, idempotency_key: String) -> GatewayFuture<Option<Payment>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            // Keys are base64url, safe as a path segment.
            let request = inner.client.get(inner.url(&format!("/charges/by-key/{idempotency_key}")));
            let response = inner.send(request).await?;
            Inner::decode_optional(response).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payment_required_is_a_decline() {
        assert_eq!(
            classify(StatusCode::PAYMENT_REQUIRED, "insufficient funds"),
            PaymentGatewayError::Declined {
                reason: "insufficient funds".to_string()
            }
        );
    }

    #[test]
    fn unprocessable_card_is_card_invalid() {
        assert_eq!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, " stolen card \n"),
            PaymentGatewayError::CardInvalid(CardRejection::Provider {
                reason: "stolen card".to_string()
            })
        );
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(classify(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn rejected_credentials_are_not_a_decline() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = classify(status, "invalid api key");
            assert!(
                matches!(&err, PaymentGatewayError::Unreachable { message } if message.contains("credentials")),
                "{status}"
            );
        }
    }

    #[test]
    fn other_client_errors_are_terminal() {
        let err = classify(StatusCode::CONFLICT, "");
        assert!(!err.is_transient());
        assert!(matches!(err, PaymentGatewayError::Declined { reason } if reason.contains("Conflict")));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let gateway = HttpPaymentGateway::new("http://127.0.0.1:9/", None, Duration::from_millis(500)).unwrap();
        let result = gateway.payment(PaymentId::new()).await;
        assert!(matches!(result, Err(PaymentGatewayError::Unreachable { .. })));
    }
}

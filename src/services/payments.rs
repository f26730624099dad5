use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::order::{OrderStatus, PaymentMethod};
use crate::errors::ServiceError;
use crate::services::orders::{OrderResponse, OrderService};

/// Payment object fetched from the card provider. Confirmation always
/// re-reads this from the provider; a client-asserted "succeeded" flag is
/// never trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateIntentResponse {
    pub client_secret: String,
    pub order_id: Uuid,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// Set when no gateway is configured for the method: the order stays
    /// `awaiting_payment` pending human verification. Degraded mode, not
    /// an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_manual_verification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderResponse>,
}

/// Thin REST client for the card provider's payment-intent API.
#[derive(Clone)]
pub struct CardGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl CardGateway {
    pub fn new(http: reqwest::Client, secret_key: String, api_base: String) -> Self {
        Self {
            http,
            secret_key,
            api_base,
        }
    }

    /// Creates a payment intent sized in minor currency units and tagged
    /// with the order id in its metadata.
    pub async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ServiceError> {
        let params = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[order_id]", order_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment provider unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "payment provider returned {status}: {body}"
            )));
        }

        response.json::<PaymentIntent>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid payment provider response: {e}"))
        })
    }

    /// Re-fetches a payment intent from the provider. `Ok(None)` when the
    /// provider does not know the id.
    pub async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, ServiceError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/payment_intents/{}",
                self.api_base, payment_intent_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment provider unreachable: {e}"))
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::ExternalServiceError(format!(
                "payment provider returned {status}"
            )));
        }

        let intent = response.json::<PaymentIntent>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid payment provider response: {e}"))
        })?;
        Ok(Some(intent))
    }
}

#[derive(Debug, Deserialize)]
struct GatewayVerifyResponse {
    verified: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Actions extracted from a provider webhook payload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WebhookAction {
    SessionCompleted {
        session_id: String,
        order_id: Option<Uuid>,
        payment_intent: Option<String>,
    },
    IntentSucceeded {
        intent_id: String,
    },
    Ignored,
}

/// Bridges order status and external payment confirmation signals.
///
/// Both the card and mobile-money paths converge on one rule: an order
/// transitions to `paid` only on a provider-reported confirmation.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<OrderService>,
    http: reqwest::Client,
    config: AppConfig,
}

impl PaymentService {
    pub fn new(orders: Arc<OrderService>, http: reqwest::Client, config: AppConfig) -> Self {
        Self {
            orders,
            http,
            config,
        }
    }

    fn card_gateway(&self) -> Option<CardGateway> {
        self.config.stripe_secret_key.as_ref().map(|key| {
            CardGateway::new(
                self.http.clone(),
                key.clone(),
                self.config.stripe_api_base.clone(),
            )
        })
    }

    /// Creates a provider payment intent for an awaiting order and records
    /// the provider reference on it.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_intent(
        &self,
        order_id: Uuid,
    ) -> Result<CreateIntentResponse, ServiceError> {
        let order = self.orders.find_model(order_id).await?;

        if order.status != OrderStatus::AwaitingPayment {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not awaiting payment",
                order_id
            )));
        }

        let gateway = self
            .card_gateway()
            .ok_or(ServiceError::PaymentProviderUnconfigured)?;

        let amount_minor = to_minor_units(order.total)?;
        let intent = gateway
            .create_payment_intent(amount_minor, &order.currency, order_id)
            .await?;

        self.orders
            .attach_payment_reference(order_id, intent.id.clone())
            .await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::ExternalServiceError(
                "payment provider returned no client secret".to_string(),
            )
        })?;

        info!(order_id = %order_id, payment_intent_id = %intent.id, "Payment intent created");

        Ok(CreateIntentResponse {
            client_secret,
            order_id,
            payment_intent_id: intent.id,
        })
    }

    /// Confirms a card payment by re-fetching the intent from the provider
    /// and transitions the order to `paid` only on provider-reported
    /// success. No error path mutates order state.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm(
        &self,
        order_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        // Order existence first so callers get a 404 for bad ids rather
        // than a provider error.
        let _order = self.orders.find_model(order_id).await?;

        let gateway = self
            .card_gateway()
            .ok_or(ServiceError::PaymentProviderUnconfigured)?;

        let intent = gateway
            .retrieve_payment_intent(payment_intent_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Payment intent '{}' not found",
                    payment_intent_id
                ))
            })?;

        match intent.metadata.get("order_id") {
            Some(tagged) if *tagged == order_id.to_string() => {}
            _ => {
                return Err(ServiceError::PaymentNotConfirmed(format!(
                    "Payment intent '{}' does not belong to order {}",
                    payment_intent_id, order_id
                )));
            }
        }

        if intent.status != "succeeded" {
            return Err(ServiceError::PaymentNotConfirmed(format!(
                "Provider reports status '{}' for payment intent '{}'",
                intent.status, payment_intent_id
            )));
        }

        self.orders
            .mark_paid(order_id, Some(intent.id), None)
            .await
    }

    /// Verifies a mobile-money payment against the configured gateway.
    /// A missing gateway configuration yields the degraded
    /// `requires_manual_verification` outcome instead of an error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn verify(
        &self,
        order_id: Uuid,
        transaction_id: &str,
        method: PaymentMethod,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        if !method.is_mobile_money() {
            return Err(ServiceError::InvalidInput(format!(
                "'{}' is not a mobile-money payment method",
                method.as_str()
            )));
        }
        if transaction_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "Transaction id is required".to_string(),
            ));
        }

        let order = self.orders.find_model(order_id).await?;

        if order.payment_method != method {
            return Err(ServiceError::InvalidInput(format!(
                "Order {} was placed with '{}', not '{}'",
                order_id,
                order.payment_method.as_str(),
                method.as_str()
            )));
        }

        if order.status == OrderStatus::Paid {
            let paid = self.orders.get_order(order_id).await?;
            return Ok(VerifyPaymentResponse {
                success: true,
                requires_manual_verification: false,
                order: Some(paid),
            });
        }

        let Some(gateway) = self.config.mobile_gateway(method) else {
            info!(
                order_id = %order_id,
                method = method.as_str(),
                "No gateway configured; payment requires manual verification"
            );
            return Ok(VerifyPaymentResponse {
                success: false,
                requires_manual_verification: true,
                order: None,
            });
        };

        let response = self
            .http
            .post(format!("{}/verify", gateway.base_url))
            .header("x-app-key", gateway.app_key)
            .json(&serde_json::json!({
                "transaction_id": transaction_id,
                "amount": order.total,
            }))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("gateway unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway returned {status}"
            )));
        }

        let outcome = response.json::<GatewayVerifyResponse>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid gateway response: {e}"))
        })?;

        if !outcome.verified {
            return Err(ServiceError::PaymentNotConfirmed(format!(
                "Gateway did not verify transaction '{}'{}",
                transaction_id,
                outcome
                    .message
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            )));
        }

        let paid = self
            .orders
            .mark_paid(order_id, Some(transaction_id.to_string()), None)
            .await?;

        Ok(VerifyPaymentResponse {
            success: true,
            requires_manual_verification: false,
            order: Some(paid),
        })
    }

    /// Applies one provider webhook event. Idempotent under retries:
    /// confirmations for already-`paid` orders are no-ops, and unknown
    /// references are logged rather than erroring so the provider does
    /// not retry forever.
    #[instrument(skip(self, event))]
    pub async fn handle_webhook_event(&self, event: &Value) -> Result<(), ServiceError> {
        match parse_webhook(event) {
            WebhookAction::SessionCompleted {
                session_id,
                order_id,
                payment_intent,
            } => {
                let order = match order_id {
                    Some(id) => self.orders.find_model_opt(id).await?,
                    None => self.orders.find_by_provider_session(&session_id).await?,
                };

                let Some(order) = order else {
                    warn!(session_id = %session_id, "Webhook session matches no order");
                    return Ok(());
                };

                if order.status == OrderStatus::Paid {
                    info!(order_id = %order.id, "Webhook replay for paid order; no-op");
                    return Ok(());
                }
                if order.status.is_terminal() {
                    warn!(
                        order_id = %order.id,
                        status = order.status.as_str(),
                        "Webhook confirmation for terminal order ignored"
                    );
                    return Ok(());
                }

                self.orders
                    .mark_paid(order.id, payment_intent, Some(session_id))
                    .await?;
                Ok(())
            }
            WebhookAction::IntentSucceeded { intent_id } => {
                let Some(order) = self.orders.find_by_payment_reference(&intent_id).await? else {
                    warn!(intent_id = %intent_id, "Webhook intent matches no order");
                    return Ok(());
                };

                if order.status == OrderStatus::Paid {
                    info!(order_id = %order.id, "Webhook replay for paid order; no-op");
                    return Ok(());
                }
                if order.status.is_terminal() {
                    warn!(
                        order_id = %order.id,
                        status = order.status.as_str(),
                        "Webhook confirmation for terminal order ignored"
                    );
                    return Ok(());
                }

                self.orders.mark_paid(order.id, Some(intent_id), None).await?;
                Ok(())
            }
            WebhookAction::Ignored => {
                info!(
                    event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or(""),
                    "Unhandled payment webhook type"
                );
                Ok(())
            }
        }
    }
}

/// Converts a decimal amount to the provider's minor currency units.
pub(crate) fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round_dp(0)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount {amount} overflows minor units"))
        })
}

pub(crate) fn parse_webhook(event: &Value) -> WebhookAction {
    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" => {
            let Some(session_id) = object.get("id").and_then(|v| v.as_str()) else {
                return WebhookAction::Ignored;
            };
            let order_id = object["metadata"]["order_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok());
            let payment_intent = object
                .get("payment_intent")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            WebhookAction::SessionCompleted {
                session_id: session_id.to_string(),
                order_id,
                payment_intent,
            }
        }
        "payment_intent.succeeded" => match object.get("id").and_then(|v| v.as_str()) {
            Some(intent_id) => WebhookAction::IntentSucceeded {
                intent_id: intent_id.to_string(),
            },
            None => WebhookAction::Ignored,
        },
        _ => WebhookAction::Ignored,
    }
}

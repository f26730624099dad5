use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::entities::{order, order_item};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery error: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email delivery seam.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Outbound SMS delivery seam.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotificationError>;
}

/// HTTP-provider backed email sender.
pub struct HttpEmailSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(http: reqwest::Client, api_url: String, api_key: String, from: String) -> Self {
        Self {
            http,
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "text": message.body,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(format!("email provider unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "email provider returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// HTTP-provider backed SMS sender.
pub struct HttpSmsSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: Option<String>,
}

impl HttpSmsSender {
    pub fn new(
        http: reqwest::Client,
        api_url: String,
        api_key: String,
        from: Option<String>,
    ) -> Self {
        Self {
            http,
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    #[instrument(skip(self, body), fields(to = %to))]
    async fn send(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": to,
                "message": body,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(format!("sms provider unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "sms provider returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no provider is configured; deliveries become debug logs.
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        debug!(to = %message.to, subject = %message.subject, "Email delivery disabled; dropping message");
        Ok(())
    }
}

pub struct NoopSmsSender;

#[async_trait]
impl SmsSender for NoopSmsSender {
    async fn send(&self, to: &str, _body: &str) -> Result<(), NotificationError> {
        debug!(to = %to, "SMS delivery disabled; dropping message");
        Ok(())
    }
}

/// Best-effort side channel for order lifecycle notifications.
///
/// Callers treat the surrounding business transaction as complete
/// regardless of what happens here; the event loop logs failures and
/// moves on.
pub struct NotificationDispatcher {
    email: Box<dyn EmailSender>,
    sms: Box<dyn SmsSender>,
}

impl NotificationDispatcher {
    pub fn new(email: Box<dyn EmailSender>, sms: Box<dyn SmsSender>) -> Self {
        Self { email, sms }
    }

    /// Builds a dispatcher from configuration, falling back to no-op
    /// senders for unconfigured providers.
    pub fn from_config(cfg: &AppConfig, http: reqwest::Client) -> Self {
        let email: Box<dyn EmailSender> = match (&cfg.email_api_url, &cfg.email_api_key) {
            (Some(url), Some(key)) => Box::new(HttpEmailSender::new(
                http.clone(),
                url.clone(),
                key.clone(),
                cfg.email_from.clone(),
            )),
            _ => {
                info!("Email provider not configured; order emails disabled");
                Box::new(NoopEmailSender)
            }
        };

        let sms: Box<dyn SmsSender> = match (&cfg.sms_api_url, &cfg.sms_api_key) {
            (Some(url), Some(key)) => Box::new(HttpSmsSender::new(
                http,
                url.clone(),
                key.clone(),
                cfg.sms_from.clone(),
            )),
            _ => {
                info!("SMS provider not configured; order texts disabled");
                Box::new(NoopSmsSender)
            }
        };

        Self { email, sms }
    }

    /// Order confirmation email fired when a checkout completes.
    pub async fn order_confirmed(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), NotificationError> {
        let message = EmailMessage {
            to: order.customer_email.clone(),
            subject: format!("Order {} confirmed", order.order_number),
            body: confirmation_body(order, items),
        };
        self.email.send(message).await
    }

    /// Payment-received SMS fired when an awaiting order becomes paid.
    /// Customers without a phone number on file are skipped.
    pub async fn payment_received(&self, order: &order::Model) -> Result<(), NotificationError> {
        let Some(phone) = &order.customer_phone else {
            debug!(order_id = %order.id, "No phone on order; skipping payment SMS");
            return Ok(());
        };
        let body = format!(
            "Payment of {} {} received for order {}. Thank you!",
            order.total, order.currency, order.order_number
        );
        self.sms.send(phone, &body).await
    }

    /// Shipped email fired when a paid order is fulfilled.
    pub async fn order_shipped(&self, order: &order::Model) -> Result<(), NotificationError> {
        let message = EmailMessage {
            to: order.customer_email.clone(),
            subject: format!("Order {} has shipped", order.order_number),
            body: format!(
                "Hi {},\n\nYour order {} is on its way to {}.\n",
                order.customer_name, order.order_number, order.address
            ),
        };
        self.email.send(message).await
    }
}

fn confirmation_body(order: &order::Model, items: &[order_item::Model]) -> String {
    let mut body = format!(
        "Hi {},\n\nThanks for your order {}.\n\n",
        order.customer_name, order.order_number
    );
    for item in items {
        body.push_str(&format!(
            "  {} x{} — {} {}\n",
            item.title, item.quantity, item.line_total, order.currency
        ));
    }
    body.push_str(&format!(
        "\nSubtotal: {}\nShipping: {}\nTax: {}\nDiscount: -{}\nTotal: {} {}\n",
        order.subtotal, order.shipping, order.tax, order.discount_amount, order.total, order.currency
    ));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderStatus, PaymentMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct CountingEmail(Arc<AtomicUsize>);

    #[async_trait]
    impl EmailSender for CountingEmail {
        async fn send(&self, _message: EmailMessage) -> Result<(), NotificationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingSms(Arc<AtomicUsize>);

    #[async_trait]
    impl SmsSender for CountingSms {
        async fn send(&self, _to: &str, _body: &str) -> Result<(), NotificationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn order_fixture(phone: Option<&str>) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST0001".into(),
            status: OrderStatus::AwaitingPayment,
            payment_method: PaymentMethod::Bkash,
            currency: "USD".into(),
            subtotal: dec!(20.00),
            shipping: dec!(10.00),
            tax: dec!(1.60),
            discount_amount: dec!(0.00),
            total: dec!(31.60),
            coupon_code: None,
            customer_name: "Test".into(),
            customer_email: "test@example.com".into(),
            customer_phone: phone.map(str::to_string),
            address: "1 Main St".into(),
            city: None,
            state: None,
            zip_code: None,
            country: None,
            payment_reference: None,
            provider_session_id: None,
            is_archived: false,
            created_at: now,
            updated_at: Some(now),
        }
    }

    #[tokio::test]
    async fn payment_sms_skipped_without_phone() {
        let sms_count = Arc::new(AtomicUsize::new(0));
        let dispatcher = NotificationDispatcher::new(
            Box::new(NoopEmailSender),
            Box::new(CountingSms(sms_count.clone())),
        );

        dispatcher
            .payment_received(&order_fixture(None))
            .await
            .unwrap();
        assert_eq!(sms_count.load(Ordering::SeqCst), 0);

        dispatcher
            .payment_received(&order_fixture(Some("+8801700000000")))
            .await
            .unwrap();
        assert_eq!(sms_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn confirmation_email_goes_to_customer() {
        let email_count = Arc::new(AtomicUsize::new(0));
        let dispatcher = NotificationDispatcher::new(
            Box::new(CountingEmail(email_count.clone())),
            Box::new(NoopSmsSender),
        );

        dispatcher
            .order_confirmed(&order_fixture(None), &[])
            .await
            .unwrap();
        assert_eq!(email_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn confirmation_body_lists_items_and_totals() {
        let order = order_fixture(None);
        let items = vec![order_item::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Uuid::new_v4(),
            slug: "widget".into(),
            title: "Widget".into(),
            image: None,
            unit_price: dec!(10.00),
            quantity: 2,
            line_total: dec!(20.00),
            created_at: Utc::now(),
        }];

        let body = confirmation_body(&order, &items);
        assert!(body.contains("Widget x2"));
        assert!(body.contains("Total: 31.60 USD"));
    }
}

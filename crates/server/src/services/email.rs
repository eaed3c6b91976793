//! Transactional email for order confirmations.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use bazaar_core::Price;

use crate::config::EmailConfig;
use crate::models::order::OrderDetail;

/// One order line, formatted for display.
struct ConfirmationLine {
    name: String,
    quantity: i32,
    unit_price: String,
    line_total: String,
}

/// Formatted order fields shared by both renderings.
struct Confirmation<'a> {
    customer_name: &'a str,
    store_name: &'a str,
    order_id: String,
    lines: Vec<ConfirmationLine>,
    subtotal: String,
    has_discount: bool,
    discount: String,
    shipping: String,
    total: String,
    order_url: String,
}

impl<'a> Confirmation<'a> {
    fn new(detail: &'a OrderDetail, base_url: &str) -> Self {
        let order = &detail.order;
        let money = |amount| Price::new(amount, order.currency).to_string();
        Self {
            customer_name: &order.customer_name,
            store_name: &order.store_name,
            order_id: order.id.to_string(),
            lines: detail
                .items
                .iter()
                .map(|item| ConfirmationLine {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: money(item.unit_price),
                    line_total: money(item.line_total()),
                })
                .collect(),
            subtotal: money(order.subtotal),
            has_discount: !order.discount.is_zero(),
            discount: money(order.discount),
            shipping: money(order.shipping),
            total: money(order.total),
            order_url: format!("{}/account/orders/{}", base_url.trim_end_matches('/'), order.id),
        }
    }
}

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    c: &'a Confirmation<'a>,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    c: &'a Confirmation<'a>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url: base_url.to_owned(),
        })
    }

    /// Send the confirmation for a freshly paid order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, detail: &OrderDetail) -> Result<(), EmailError> {
        let (subject, text, html) = render_order_confirmation(detail, &self.base_url)?;
        self.send_multipart_email(detail.order.customer_email.as_str(), &subject, &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Render subject, text and HTML bodies of an order confirmation.
fn render_order_confirmation(
    detail: &OrderDetail,
    base_url: &str,
) -> Result<(String, String, String), EmailError> {
    let confirmation = Confirmation::new(detail, base_url);
    let subject = format!(
        "{}: order #{} confirmed",
        confirmation.store_name, confirmation.order_id
    );
    let html = OrderConfirmationHtml { c: &confirmation }.render()?;
    let text = OrderConfirmationText { c: &confirmation }.render()?;
    Ok((subject, text, html))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use bazaar_core::{
        CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, ProductId, StoreId, UserId,
    };

    use super::*;
    use crate::models::order::{Order, OrderItem, ShippingAddress};

    fn detail() -> OrderDetail {
        let order = Order {
            id: OrderId::new(42),
            store_id: StoreId::new(1),
            store_name: "Clay & Co".to_string(),
            currency: CurrencyCode::USD,
            user_id: UserId::new(3),
            customer_email: Email::parse("ada@example.com").unwrap(),
            customer_name: "Ada".to_string(),
            status: OrderStatus::Paid,
            subtotal: Decimal::new(3000, 2),
            discount: Decimal::ZERO,
            shipping: Decimal::new(500, 2),
            total: Decimal::new(3500, 2),
            promotion_code: None,
            shipping_address: ShippingAddress {
                name: "Ada".to_string(),
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
            phone: "555-0100".to_string(),
            note: None,
            payment_reference: "pay_1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        OrderDetail {
            order,
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(42),
                product_id: Some(ProductId::new(9)),
                product_name: "Speckled Mug".to_string(),
                unit_price: Decimal::new(1500, 2),
                quantity: 2,
            }],
            delivery: None,
        }
    }

    #[test]
    fn test_render_order_confirmation() {
        let (subject, text, html) =
            render_order_confirmation(&detail(), "https://bazaar.example/").unwrap();

        assert_eq!(subject, "Clay & Co: order #42 confirmed");
        assert!(text.contains("Speckled Mug"));
        assert!(text.contains("$35.00"));
        assert!(text.contains("https://bazaar.example/account/orders/42"));
        // HTML output escapes the store name.
        assert!(html.contains("Clay &#38; Co") || html.contains("Clay &amp; Co"));
        assert!(html.contains("$30.00"));
    }
}

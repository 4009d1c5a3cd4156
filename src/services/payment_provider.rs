//! Hosted-checkout payment provider: token requests, callback signatures and
//! the reference/basket encodings the provider expects.

use crate::{config::PaymentConfig, errors::ServiceError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

pub const REFERENCE_PREFIX: &str = "SP";
const REFERENCE_SEPARATOR: char = 'R';
const NO_INSTALLMENT: &str = "0";
const MAX_INSTALLMENT: &str = "0";

/// `SP<order number>R<last four digits of the epoch millis>`.
pub fn payment_reference(order_number: i32, epoch_millis: i64) -> String {
    format!(
        "{}{}{}{:04}",
        REFERENCE_PREFIX,
        order_number,
        REFERENCE_SEPARATOR,
        epoch_millis.rem_euclid(10_000)
    )
}

/// Order number embedded in a payment reference.
pub fn parse_reference(reference: &str) -> Option<i32> {
    let rest = reference.strip_prefix(REFERENCE_PREFIX)?;
    let (number, _) = rest.split_once(REFERENCE_SEPARATOR)?;
    number.parse().ok()
}

/// Amount in minor currency units, as the provider signs it.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::InternalError(format!("amount {} out of range", amount)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketLine {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Base64 of `[[name, "unit price", quantity], ...]`.
pub fn encode_basket(lines: &[BasketLine]) -> String {
    let rows: Vec<serde_json::Value> = lines
        .iter()
        .map(|l| {
            serde_json::json!([
                l.name,
                format!("{:.2}", l.unit_price.round_dp(2)),
                l.quantity
            ])
        })
        .collect();
    STANDARD.encode(serde_json::Value::Array(rows).to_string())
}

fn keyed_digest(key: &str, message: &str) -> Result<HmacSha256, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Everything the provider needs to open a hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub user_ip: String,
    pub merchant_oid: String,
    pub email: String,
    /// Minor units.
    pub payment_amount: i64,
    pub user_basket: String,
    pub user_name: String,
    pub user_address: String,
    pub user_phone: String,
}

/// Form body of the provider's payment callback. Missing fields deserialize
/// empty so the signature check, not the extractor, rejects them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CallbackForm {
    #[serde(default)]
    pub merchant_oid: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_amount: String,
    #[serde(default)]
    pub hash: String,
}

impl CallbackForm {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    status: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchanges an order for a hosted checkout token.
    async fn request_token(&self, request: &TokenRequest) -> Result<String, ServiceError>;

    /// Constant-time check of the callback signature.
    fn verify_callback(&self, callback: &CallbackForm) -> bool;
}

pub struct PaytrGateway {
    client: reqwest::Client,
    config: PaymentConfig,
}

impl PaytrGateway {
    pub fn new(config: PaymentConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn flag(value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Signature over the token request fields, in the provider's order.
    pub fn token_signature(&self, request: &TokenRequest) -> Result<String, ServiceError> {
        let cfg = &self.config;
        let message = format!(
            "{}{}{}{}{}{}{}{}{}{}{}",
            cfg.merchant_id,
            request.user_ip,
            request.merchant_oid,
            request.email,
            request.payment_amount,
            request.user_basket,
            NO_INSTALLMENT,
            MAX_INSTALLMENT,
            cfg.currency,
            Self::flag(cfg.test_mode),
            cfg.merchant_salt,
        );
        let mac = keyed_digest(&cfg.merchant_key, &message)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn callback_message(&self, callback: &CallbackForm) -> String {
        format!(
            "{}{}{}{}",
            callback.merchant_oid, self.config.merchant_salt, callback.status, callback.total_amount
        )
    }

    /// Signature the provider is expected to send with `callback`.
    pub fn callback_signature(&self, callback: &CallbackForm) -> Result<String, ServiceError> {
        let mac = keyed_digest(&self.config.merchant_key, &self.callback_message(callback))?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for PaytrGateway {
    #[instrument(skip(self, request), fields(merchant_oid = %request.merchant_oid))]
    async fn request_token(&self, request: &TokenRequest) -> Result<String, ServiceError> {
        let cfg = &self.config;
        if !cfg.is_configured() {
            return Err(ServiceError::ExternalServiceError(
                "payment provider is not configured".to_string(),
            ));
        }

        let signature = self.token_signature(request)?;
        let form: Vec<(&str, String)> = vec![
            ("merchant_id", cfg.merchant_id.clone()),
            ("user_ip", request.user_ip.clone()),
            ("merchant_oid", request.merchant_oid.clone()),
            ("email", request.email.clone()),
            ("payment_amount", request.payment_amount.to_string()),
            ("paytr_token", signature),
            ("user_basket", request.user_basket.clone()),
            ("debug_on", Self::flag(cfg.debug_on).to_string()),
            ("no_installment", NO_INSTALLMENT.to_string()),
            ("max_installment", MAX_INSTALLMENT.to_string()),
            ("user_name", request.user_name.clone()),
            ("user_address", request.user_address.clone()),
            ("user_phone", request.user_phone.clone()),
            ("merchant_ok_url", cfg.ok_url.clone()),
            ("merchant_fail_url", cfg.fail_url.clone()),
            ("timeout_limit", cfg.timeout_limit_minutes.to_string()),
            ("currency", cfg.currency.clone()),
            ("test_mode", Self::flag(cfg.test_mode).to_string()),
        ];

        let response = self
            .client
            .post(&cfg.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "payment provider unreachable");
                ServiceError::ExternalServiceError(format!("payment provider unreachable: {}", e))
            })?;

        let status = response.status();
        let reply: TokenReply = response.json().await.map_err(|e| {
            warn!(http_status = %status, error = %e, "unreadable payment provider reply");
            ServiceError::ExternalServiceError(format!("unreadable provider reply: {}", e))
        })?;

        match reply {
            TokenReply {
                ref status,
                token: Some(token),
                ..
            } if status == "success" => {
                debug!("payment token issued");
                Ok(token)
            }
            TokenReply { status, reason, .. } => {
                let reason = reason.unwrap_or(status);
                warn!(reason = %reason, "payment provider refused token");
                Err(ServiceError::ExternalServiceError(format!(
                    "payment provider refused: {}",
                    reason
                )))
            }
        }
    }

    fn verify_callback(&self, callback: &CallbackForm) -> bool {
        if self.config.merchant_key.is_empty() {
            return false;
        }
        let Ok(provided) = STANDARD.decode(callback.hash.trim()) else {
            return false;
        };
        match keyed_digest(&self.config.merchant_key, &self.callback_message(callback)) {
            Ok(mac) => mac.verify_slice(&provided).is_ok(),
            Err(_) => false,
        }
    }
}

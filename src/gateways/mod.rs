//! Payment gateway adapters.
//!
//! Each adapter knows one provider's field names and success sentinel, and
//! reduces everything to the same two operations: build the outbound redirect
//! for a pending payment, and classify a raw callback payload. The payment
//! state machine only ever talks to [`Gateway`] through [`PaymentGateway`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use crate::{
    config::GatewayConfig,
    entity::{payments, sea_orm_active_enums::GatewayKind},
    error::AppResult,
};

pub mod idpay;
pub mod payir;
pub mod zarinpal;

pub use idpay::IdpayGateway;
pub use payir::PayirGateway;
pub use zarinpal::ZarinpalGateway;

/// Where to send the customer to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Redirect {
    pub url: String,
    pub display_amount: String,
}

/// Raw key/value data a gateway delivered to its callback endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CallbackPayload(pub HashMap<String, String>);

impl CallbackPayload {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// The reference id we embedded in the callback URL, falling back to the
    /// provider's own echo field.
    pub fn reference_id(&self, provider_field: &str) -> Option<&str> {
        self.get("reference_id").or_else(|| self.get(provider_field))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Normalised result of a gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOutcome {
    pub reference_id: String,
    pub success: bool,
    pub transaction_id: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback carries no payment reference")]
    MissingReference,
}

pub trait PaymentGateway {
    fn kind(&self) -> GatewayKind;

    /// Build the provider redirect for a pending payment. Runs outside any
    /// database transaction.
    async fn build_redirect(
        &self,
        payment: &payments::Model,
        callback_url: &Url,
    ) -> AppResult<Redirect>;

    fn classify(&self, payload: &CallbackPayload) -> Result<CallbackOutcome, CallbackError>;
}

/// Closed set of adapters the registry can hold.
#[derive(Debug, Clone)]
pub enum Gateway {
    Zarinpal(ZarinpalGateway),
    Payir(PayirGateway),
    Idpay(IdpayGateway),
}

impl PaymentGateway for Gateway {
    fn kind(&self) -> GatewayKind {
        match self {
            Gateway::Zarinpal(gateway) => gateway.kind(),
            Gateway::Payir(gateway) => gateway.kind(),
            Gateway::Idpay(gateway) => gateway.kind(),
        }
    }

    async fn build_redirect(
        &self,
        payment: &payments::Model,
        callback_url: &Url,
    ) -> AppResult<Redirect> {
        match self {
            Gateway::Zarinpal(gateway) => gateway.build_redirect(payment, callback_url).await,
            Gateway::Payir(gateway) => gateway.build_redirect(payment, callback_url).await,
            Gateway::Idpay(gateway) => gateway.build_redirect(payment, callback_url).await,
        }
    }

    fn classify(&self, payload: &CallbackPayload) -> Result<CallbackOutcome, CallbackError> {
        match self {
            Gateway::Zarinpal(gateway) => gateway.classify(payload),
            Gateway::Payir(gateway) => gateway.classify(payload),
            Gateway::Idpay(gateway) => gateway.classify(payload),
        }
    }
}

/// Lookup table of configured gateways, built once at startup.
#[derive(Debug, Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Gateway>,
    callback_base: Url,
}

impl GatewayRegistry {
    pub fn from_config(public_base_url: &str, config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut callback_base = Url::parse(public_base_url)?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !callback_base.path().ends_with('/') {
            let path = format!("{}/", callback_base.path());
            callback_base.set_path(&path);
        }
        let gateways = [
            Gateway::Zarinpal(ZarinpalGateway::new(
                config.zarinpal_merchant_id.clone(),
                config.sandbox,
            )),
            Gateway::Payir(PayirGateway::new(config.payir_api_key.clone())),
            Gateway::Idpay(IdpayGateway::new(config.idpay_api_key.clone(), config.sandbox)),
        ]
        .into_iter()
        .map(|gateway| (gateway.kind(), gateway))
        .collect();

        Ok(Self {
            gateways,
            callback_base,
        })
    }

    pub fn get(&self, kind: GatewayKind) -> Option<&Gateway> {
        self.gateways.get(&kind)
    }

    pub fn supported(&self) -> Vec<GatewayKind> {
        let mut kinds: Vec<_> = self.gateways.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.to_string());
        kinds
    }

    /// `{base}/api/payments/callback/{gateway}?reference_id={reference}`
    pub fn callback_url(&self, kind: GatewayKind, reference_id: &str) -> AppResult<Url> {
        let mut url = self
            .callback_base
            .join(&format!("api/payments/callback/{kind}"))
            .map_err(anyhow::Error::from)?;
        url.query_pairs_mut()
            .append_pair("reference_id", reference_id);
        Ok(url)
    }
}

/// Minor units rendered with two decimals, e.g. `32000` -> `"320.00"`.
pub fn display_amount(amount: i64) -> String {
    Decimal::new(amount, 2).to_string()
}

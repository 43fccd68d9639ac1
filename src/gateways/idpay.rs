use serde_json::json;
use url::Url;

use super::{
    CallbackError, CallbackOutcome, CallbackPayload, PaymentGateway, Redirect, display_amount,
};
use crate::{
    entity::{payments, sea_orm_active_enums::GatewayKind},
    error::AppResult,
};

const PAYMENT_URL: &str = "https://idpay.ir/p/ws";
const SANDBOX_PAYMENT_URL: &str = "https://idpay.ir/p/ws-sandbox";

/// IDPay status code for a verified, settled payment.
const STATUS_PAID: &str = "100";

#[derive(Debug, Clone)]
pub struct IdpayGateway {
    api_key: String,
    sandbox: bool,
}

impl IdpayGateway {
    pub fn new(api_key: String, sandbox: bool) -> Self {
        Self { api_key, sandbox }
    }
}

impl PaymentGateway for IdpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Idpay
    }

    async fn build_redirect(
        &self,
        payment: &payments::Model,
        callback_url: &Url,
    ) -> AppResult<Redirect> {
        let base = if self.sandbox {
            SANDBOX_PAYMENT_URL
        } else {
            PAYMENT_URL
        };
        let amount = payment.amount.to_string();
        let mut url = Url::parse(base).map_err(anyhow::Error::from)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("idpay base url cannot carry a path"))?
            .push(&payment.reference_id);
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("order_id", &payment.reference_id)
            .append_pair("amount", &amount)
            .append_pair("callback", callback_url.as_str());

        tracing::info!(
            gateway = %self.kind(),
            payment_id = %payment.id,
            amount = payment.amount,
            "idpay payment request initiated"
        );

        Ok(Redirect {
            url: url.into(),
            display_amount: display_amount(payment.amount),
        })
    }

    fn classify(&self, payload: &CallbackPayload) -> Result<CallbackOutcome, CallbackError> {
        let reference_id = payload
            .reference_id("order_id")
            .ok_or(CallbackError::MissingReference)?
            .to_string();
        let track_id = payload.get("track_id");
        let status = payload.get("status");
        let success = status == Some(STATUS_PAID);

        let details = if success {
            json!({ "track_id": track_id, "card_no": payload.get("card_no") })
        } else {
            json!({
                "track_id": track_id,
                "status": status,
                "error": "payment failed",
            })
        };

        Ok(CallbackOutcome {
            reference_id,
            success,
            transaction_id: track_id.map(str::to_string),
            details,
        })
    }
}

use serde_json::json;
use url::Url;

use super::{
    CallbackError, CallbackOutcome, CallbackPayload, PaymentGateway, Redirect, display_amount,
};
use crate::{
    entity::{payments, sea_orm_active_enums::GatewayKind},
    error::AppResult,
};

const SEND_URL: &str = "https://pay.ir/pg/send";

#[derive(Debug, Clone)]
pub struct PayirGateway {
    api_key: String,
}

impl PayirGateway {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

impl PaymentGateway for PayirGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Payir
    }

    async fn build_redirect(
        &self,
        payment: &payments::Model,
        callback_url: &Url,
    ) -> AppResult<Redirect> {
        let amount = payment.amount.to_string();
        let url = Url::parse_with_params(
            SEND_URL,
            &[
                ("api", self.api_key.as_str()),
                ("amount", amount.as_str()),
                ("redirect", callback_url.as_str()),
                ("factorNumber", payment.reference_id.as_str()),
            ],
        )
        .map_err(anyhow::Error::from)?;

        tracing::info!(
            gateway = %self.kind(),
            payment_id = %payment.id,
            amount = payment.amount,
            "pay.ir payment request initiated"
        );

        Ok(Redirect {
            url: url.into(),
            display_amount: display_amount(payment.amount),
        })
    }

    /// Pay.ir reports `status=1` on success, with `transId` as the
    /// transaction id and `factorNumber` echoing our reference.
    fn classify(&self, payload: &CallbackPayload) -> Result<CallbackOutcome, CallbackError> {
        let reference_id = payload
            .reference_id("factorNumber")
            .ok_or(CallbackError::MissingReference)?
            .to_string();
        let trans_id = payload.get("transId");
        let status = payload.get("status");
        let success = status == Some("1");

        let details = if success {
            json!({ "trans_id": trans_id, "card_number": payload.get("cardNumber") })
        } else {
            json!({
                "trans_id": trans_id,
                "status": status,
                "error": "payment failed",
            })
        };

        Ok(CallbackOutcome {
            reference_id,
            success,
            transaction_id: trans_id.map(str::to_string),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_one_is_success() {
        let payload: CallbackPayload = [
            ("reference_id", "ref-9"),
            ("status", "1"),
            ("transId", "778899"),
            ("cardNumber", "6037****1234"),
        ]
        .into_iter()
        .collect();
        let outcome = PayirGateway::new("test".into())
            .classify(&payload)
            .expect("classified");
        assert!(outcome.success);
        assert_eq!(outcome.transaction_id.as_deref(), Some("778899"));
        assert_eq!(outcome.details["card_number"], "6037****1234");
    }

    #[test]
    fn factor_number_stands_in_for_reference() {
        let payload: CallbackPayload = [("factorNumber", "ref-5"), ("status", "0")]
            .into_iter()
            .collect();
        let outcome = PayirGateway::new("test".into())
            .classify(&payload)
            .expect("classified");
        assert_eq!(outcome.reference_id, "ref-5");
        assert!(!outcome.success);
    }
}

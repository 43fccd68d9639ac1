use serde_json::json;
use url::Url;

use super::{
    CallbackError, CallbackOutcome, CallbackPayload, PaymentGateway, Redirect, display_amount,
};
use crate::{
    entity::{payments, sea_orm_active_enums::GatewayKind},
    error::AppResult,
};

const LIVE_START_PAY: &str = "https://www.zarinpal.com/pg/StartPay";
const SANDBOX_START_PAY: &str = "https://sandbox.zarinpal.com/pg/StartPay";

/// Zarinpal reports `Status=OK` on success and identifies the transaction by
/// its `Authority`.
#[derive(Debug, Clone)]
pub struct ZarinpalGateway {
    merchant_id: String,
    sandbox: bool,
}

impl ZarinpalGateway {
    pub fn new(merchant_id: String, sandbox: bool) -> Self {
        Self {
            merchant_id,
            sandbox,
        }
    }
}

impl PaymentGateway for ZarinpalGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Zarinpal
    }

    async fn build_redirect(
        &self,
        payment: &payments::Model,
        callback_url: &Url,
    ) -> AppResult<Redirect> {
        let base = if self.sandbox {
            SANDBOX_START_PAY
        } else {
            LIVE_START_PAY
        };
        let amount = payment.amount.to_string();
        let url = Url::parse_with_params(
            base,
            &[
                ("merchant_id", self.merchant_id.as_str()),
                ("amount", amount.as_str()),
                ("callback_url", callback_url.as_str()),
                ("description", payment.reference_id.as_str()),
            ],
        )
        .map_err(anyhow::Error::from)?;

        tracing::info!(
            gateway = %self.kind(),
            payment_id = %payment.id,
            amount = payment.amount,
            "zarinpal payment request initiated"
        );

        Ok(Redirect {
            url: url.into(),
            display_amount: display_amount(payment.amount),
        })
    }

    fn classify(&self, payload: &CallbackPayload) -> Result<CallbackOutcome, CallbackError> {
        let reference_id = payload
            .reference_id("reference_id")
            .ok_or(CallbackError::MissingReference)?
            .to_string();
        let authority = payload.get("Authority");
        let status = payload.get("Status");
        let success = status == Some("OK");

        let details = if success {
            json!({ "authority": authority, "status": status })
        } else {
            json!({
                "authority": authority,
                "status": status,
                "error": "payment was cancelled by the customer or rejected by the gateway",
            })
        };

        Ok(CallbackOutcome {
            reference_id,
            success,
            transaction_id: authority.map(str::to_string),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> ZarinpalGateway {
        ZarinpalGateway::new("merchant".into(), true)
    }

    #[test]
    fn ok_status_is_success() {
        let payload: CallbackPayload = [
            ("reference_id", "ref-1"),
            ("Status", "OK"),
            ("Authority", "A000123"),
        ]
        .into_iter()
        .collect();
        let outcome = gateway().classify(&payload).expect("classified");
        assert!(outcome.success);
        assert_eq!(outcome.reference_id, "ref-1");
        assert_eq!(outcome.transaction_id.as_deref(), Some("A000123"));
        assert_eq!(outcome.details["authority"], "A000123");
    }

    #[test]
    fn nok_status_is_failure_with_context() {
        let payload: CallbackPayload = [("reference_id", "ref-1"), ("Status", "NOK")]
            .into_iter()
            .collect();
        let outcome = gateway().classify(&payload).expect("classified");
        assert!(!outcome.success);
        assert!(outcome.details.get("error").is_some());
    }

    #[test]
    fn lowercase_ok_is_not_success() {
        let payload: CallbackPayload = [("reference_id", "ref-1"), ("Status", "ok")]
            .into_iter()
            .collect();
        assert!(!gateway().classify(&payload).expect("classified").success);
    }

    #[test]
    fn missing_reference_is_rejected() {
        let payload: CallbackPayload = [("Status", "OK")].into_iter().collect();
        assert_eq!(
            gateway().classify(&payload),
            Err(CallbackError::MissingReference)
        );
    }
}

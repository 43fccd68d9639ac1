use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Fulfilment state of one vendor's share of an order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl VendorStatus {
    fn rank(self) -> u8 {
        match self {
            VendorStatus::Pending => 0,
            VendorStatus::Processing => 1,
            VendorStatus::Shipped => 2,
            VendorStatus::Completed => 3,
            VendorStatus::Cancelled => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VendorStatus::Completed | VendorStatus::Cancelled)
    }

    /// Forward moves along pending -> processing -> shipped -> completed, or a
    /// cancellation from any non-terminal state. Staying put is allowed until
    /// the status is terminal so notes can be amended.
    pub fn can_transition_to(self, next: VendorStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == VendorStatus::Cancelled || next == self {
            return true;
        }
        next.rank() > self.rank()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "successful")]
    Successful,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Payment providers this service can settle through.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    #[sea_orm(string_value = "zarinpal")]
    Zarinpal,
    #[sea_orm(string_value = "payir")]
    Payir,
    #[sea_orm(string_value = "idpay")]
    Idpay,
}

macro_rules! display_as_value {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.to_value())
                }
            }
        )*
    };
}

display_as_value!(OrderStatus, VendorStatus, PaymentStatus, DiscountKind, GatewayKind);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_status_moves_forward_only() {
        assert!(VendorStatus::Pending.can_transition_to(VendorStatus::Processing));
        assert!(VendorStatus::Pending.can_transition_to(VendorStatus::Shipped));
        assert!(VendorStatus::Shipped.can_transition_to(VendorStatus::Completed));
        assert!(!VendorStatus::Shipped.can_transition_to(VendorStatus::Processing));
        assert!(!VendorStatus::Processing.can_transition_to(VendorStatus::Pending));
    }

    #[test]
    fn vendor_status_cancel_from_any_open_state() {
        for status in [
            VendorStatus::Pending,
            VendorStatus::Processing,
            VendorStatus::Shipped,
        ] {
            assert!(status.can_transition_to(VendorStatus::Cancelled));
        }
    }

    #[test]
    fn terminal_vendor_status_is_final() {
        assert!(!VendorStatus::Completed.can_transition_to(VendorStatus::Cancelled));
        assert!(!VendorStatus::Cancelled.can_transition_to(VendorStatus::Cancelled));
        assert!(!VendorStatus::Cancelled.can_transition_to(VendorStatus::Pending));
    }

    #[test]
    fn gateway_kind_displays_its_column_value() {
        assert_eq!(GatewayKind::Payir.to_string(), "payir");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }
}

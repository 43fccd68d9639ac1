//! Subtotal, discount and total computation for carts and orders.
//!
//! All amounts are integer minor units. Nothing here touches storage: callers
//! read coupon or discount state once and hand an immutable [`DiscountTerms`]
//! snapshot in, so a checkout preview and the final order snapshot agree for
//! identical inputs.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::entity::{coupons, discounts, sea_orm_active_enums::DiscountKind};

/// The pricing-relevant part of a coupon or an automatic discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountTerms {
    pub kind: DiscountKind,
    /// Minor units for [`DiscountKind::Fixed`], hundredths of a percent for
    /// [`DiscountKind::Percentage`].
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DiscountTerms {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.starts_at.is_none_or(|starts_at| now >= starts_at);
        let not_expired = self.expires_at.is_none_or(|expires_at| now <= expires_at);
        started && not_expired
    }

    pub fn applies_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.is_within_window(now)
    }
}

impl From<&coupons::Model> for DiscountTerms {
    /// A coupon whose global usage limit is used up prices as inactive.
    fn from(coupon: &coupons::Model) -> Self {
        let exhausted = coupon
            .usage_limit
            .is_some_and(|limit| coupon.used_count >= limit);
        Self {
            kind: coupon.kind,
            value: coupon.value,
            min_order_amount: coupon.min_order_amount,
            max_discount_amount: coupon.max_discount_amount,
            is_active: coupon.is_active && !exhausted,
            starts_at: coupon.starts_at.map(|dt| dt.with_timezone(&Utc)),
            expires_at: coupon.expires_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<&discounts::Model> for DiscountTerms {
    fn from(discount: &discounts::Model) -> Self {
        Self {
            kind: discount.kind,
            value: discount.value,
            min_order_amount: discount.min_order_amount,
            max_discount_amount: discount.max_discount_amount,
            is_active: discount.is_active,
            starts_at: discount.starts_at.map(|dt| dt.with_timezone(&Utc)),
            expires_at: discount.expires_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLine {
    pub unit_price: i64,
    pub quantity: i32,
}

impl PriceLine {
    pub fn subtotal(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quote {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

/// Discount `terms` yield on `subtotal` at `now`. Always within `0..=subtotal`.
pub fn discount_amount(subtotal: i64, terms: &DiscountTerms, now: DateTime<Utc>) -> i64 {
    if subtotal <= 0 || !terms.applies_at(now) {
        return 0;
    }
    if terms.min_order_amount.is_some_and(|min| subtotal < min) {
        return 0;
    }

    let amount = match terms.kind {
        DiscountKind::Percentage => {
            let percent = Decimal::new(terms.value, 2);
            let raw = Decimal::from(subtotal) * percent / Decimal::ONE_HUNDRED;
            let rounded = raw
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(subtotal);
            match terms.max_discount_amount {
                Some(cap) => rounded.min(cap),
                None => rounded,
            }
        }
        DiscountKind::Fixed => terms.value.min(subtotal),
    };

    amount.clamp(0, subtotal)
}

pub fn quote(lines: &[PriceLine], terms: Option<&DiscountTerms>, now: DateTime<Utc>) -> Quote {
    let subtotal: i64 = lines.iter().map(PriceLine::subtotal).sum();
    let discount = terms.map_or(0, |terms| discount_amount(subtotal, terms, now));
    Quote {
        subtotal,
        discount,
        total: (subtotal - discount).max(0),
    }
}

/// Split `discount` across lines in proportion to their subtotals using the
/// largest-remainder method, so the shares add up to `discount` exactly.
pub fn allocate_discount(line_subtotals: &[i64], discount: i64) -> Vec<i64> {
    let total: i64 = line_subtotals.iter().sum();
    if total <= 0 || discount <= 0 {
        return vec![0; line_subtotals.len()];
    }
    let discount = discount.min(total);

    let mut shares = Vec::with_capacity(line_subtotals.len());
    let mut remainders = Vec::with_capacity(line_subtotals.len());
    for (index, &line) in line_subtotals.iter().enumerate() {
        let scaled = i128::from(line) * i128::from(discount);
        let share = scaled / i128::from(total);
        shares.push(share as i64);
        remainders.push((scaled % i128::from(total), index));
    }

    let mut leftover = discount - shares.iter().sum::<i64>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, index) in remainders {
        if leftover == 0 {
            break;
        }
        if let Some(share) = shares.get_mut(index) {
            *share += 1;
            leftover -= 1;
        }
    }

    shares
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap()
    }

    fn percentage(percent: i64) -> DiscountTerms {
        DiscountTerms {
            kind: DiscountKind::Percentage,
            value: percent * 100,
            min_order_amount: None,
            max_discount_amount: None,
            is_active: true,
            starts_at: None,
            expires_at: None,
        }
    }

    fn fixed(value: i64) -> DiscountTerms {
        DiscountTerms {
            kind: DiscountKind::Fixed,
            value,
            ..percentage(0)
        }
    }

    #[test]
    fn twenty_percent_off_mixed_cart() {
        let lines = [
            PriceLine {
                unit_price: 100,
                quantity: 2,
            },
            PriceLine {
                unit_price: 200,
                quantity: 1,
            },
        ];
        let quote = quote(&lines, Some(&percentage(20)), now());
        assert_eq!(
            quote,
            Quote {
                subtotal: 400,
                discount: 80,
                total: 320
            }
        );
    }

    #[test]
    fn percentage_respects_cap() {
        let mut terms = percentage(50);
        terms.max_discount_amount = Some(30);
        assert_eq!(discount_amount(400, &terms, now()), 30);
    }

    #[test]
    fn fractional_percentage_rounds_half_away_from_zero() {
        let terms = DiscountTerms {
            value: 1250,
            ..percentage(0)
        };
        // 12.5% of 1_003 = 125.375
        assert_eq!(discount_amount(1_003, &terms, now()), 125);
        // 12.5% of 1_004 = 125.5
        assert_eq!(discount_amount(1_004, &terms, now()), 126);
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        assert_eq!(discount_amount(150, &fixed(500), now()), 150);
        let quote = quote(
            &[PriceLine {
                unit_price: 150,
                quantity: 1,
            }],
            Some(&fixed(500)),
            now(),
        );
        assert_eq!(quote.total, 0);
    }

    #[test]
    fn below_min_order_amount_yields_nothing() {
        let mut terms = fixed(50);
        terms.min_order_amount = Some(1_000);
        assert_eq!(discount_amount(999, &terms, now()), 0);
        assert_eq!(discount_amount(1_000, &terms, now()), 50);
    }

    #[test]
    fn inactive_or_out_of_window_yields_nothing() {
        let mut inactive = percentage(10);
        inactive.is_active = false;
        assert_eq!(discount_amount(1_000, &inactive, now()), 0);

        let mut future = percentage(10);
        future.starts_at = Some(now() + Duration::days(1));
        assert_eq!(discount_amount(1_000, &future, now()), 0);

        let mut expired = percentage(10);
        expired.expires_at = Some(now() - Duration::seconds(1));
        assert_eq!(discount_amount(1_000, &expired, now()), 0);

        let mut open = percentage(10);
        open.starts_at = Some(now());
        open.expires_at = Some(now());
        assert_eq!(discount_amount(1_000, &open, now()), 100);
    }

    #[test]
    fn over_hundred_percent_is_clamped() {
        assert_eq!(discount_amount(400, &percentage(150), now()), 400);
    }

    #[test]
    fn no_terms_means_no_discount() {
        let quote = quote(
            &[PriceLine {
                unit_price: 999,
                quantity: 3,
            }],
            None,
            now(),
        );
        assert_eq!(quote.discount, 0);
        assert_eq!(quote.total, 2_997);
    }

    #[test]
    fn allocation_sums_exactly() {
        let shares = allocate_discount(&[200, 200], 80);
        assert_eq!(shares, vec![40, 40]);

        let shares = allocate_discount(&[100, 100, 100], 100);
        assert_eq!(shares.iter().sum::<i64>(), 100);
        assert_eq!(shares, vec![34, 33, 33]);

        let shares = allocate_discount(&[1, 998, 1], 7);
        assert_eq!(shares.iter().sum::<i64>(), 7);
        assert!(shares.iter().zip([1, 998, 1]).all(|(s, line)| *s <= line));
    }

    #[test]
    fn allocation_of_nothing_is_all_zero() {
        assert_eq!(allocate_discount(&[10, 20], 0), vec![0, 0]);
        assert!(allocate_discount(&[], 10).is_empty());
    }
}

//! Promotion codes and discount calculation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use bazaar_core::{PromotionId, PromotionKind, StoreId, round_cents};

/// Shortest accepted promotion code.
pub const MIN_CODE_LENGTH: usize = 3;
/// Longest accepted promotion code.
pub const MAX_CODE_LENGTH: usize = 32;

/// Why a promotion cannot be created or applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("promotion codes must be {MIN_CODE_LENGTH}-{MAX_CODE_LENGTH} characters of A-Z, 0-9, '_' or '-'")]
    InvalidCode,
    #[error("promotion code not found")]
    UnknownCode,
    #[error("promotion is not active")]
    Inactive,
    #[error("promotion has not started yet")]
    NotStarted,
    #[error("promotion has expired")]
    Expired,
    #[error("promotion usage limit reached")]
    UsageLimitReached,
    #[error("order subtotal must be at least {0} to use this promotion")]
    MinimumNotMet(Decimal),
    #[error("invalid promotion: {0}")]
    InvalidTerms(&'static str),
}

/// A store promotion.
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub store_id: StoreId,
    /// Upper-cased, unique within the store.
    pub code: String,
    pub kind: PromotionKind,
    /// Percent for `percentage`, currency amount for `fixed_amount`,
    /// unused for `free_shipping`.
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub times_used: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Discount produced by applying a promotion to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discount {
    /// Amount taken off the subtotal.
    pub amount: Decimal,
    /// Shipping fee after the promotion.
    pub shipping: Decimal,
}

/// The writable fields of a promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionTerms {
    pub code: String,
    pub kind: PromotionKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub active: bool,
}

impl PromotionTerms {
    /// Check the code format and the commercial terms together.
    ///
    /// # Errors
    ///
    /// Returns the first rule the terms break.
    pub fn validate(&self) -> Result<(), PromotionError> {
        normalize_code(&self.code)?;
        validate_terms(
            self.kind,
            self.value,
            self.min_subtotal,
            self.starts_at,
            self.ends_at,
            self.usage_limit,
        )
    }
}

impl From<&Promotion> for PromotionTerms {
    fn from(promotion: &Promotion) -> Self {
        Self {
            code: promotion.code.clone(),
            kind: promotion.kind,
            value: promotion.value,
            min_subtotal: promotion.min_subtotal,
            starts_at: promotion.starts_at,
            ends_at: promotion.ends_at,
            usage_limit: promotion.usage_limit,
            active: promotion.active,
        }
    }
}

impl Promotion {
    /// Check that the promotion can be used on a subtotal at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first rule the promotion fails.
    pub fn check_applicable(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<(), PromotionError> {
        if !self.active {
            return Err(PromotionError::Inactive);
        }
        if self.starts_at.is_some_and(|starts| now < starts) {
            return Err(PromotionError::NotStarted);
        }
        if self.ends_at.is_some_and(|ends| now >= ends) {
            return Err(PromotionError::Expired);
        }
        if self.usage_limit.is_some_and(|limit| self.times_used >= limit) {
            return Err(PromotionError::UsageLimitReached);
        }
        if let Some(minimum) = self.min_subtotal
            && subtotal < minimum
        {
            return Err(PromotionError::MinimumNotMet(minimum));
        }
        Ok(())
    }

    /// Discount for a subtotal and shipping fee. Never discounts below zero.
    #[must_use]
    pub fn discount(&self, subtotal: Decimal, shipping: Decimal) -> Discount {
        match self.kind {
            PromotionKind::Percentage => Discount {
                amount: round_cents(subtotal * self.value / Decimal::ONE_HUNDRED).min(subtotal),
                shipping,
            },
            PromotionKind::FixedAmount => Discount {
                amount: self.value.min(subtotal),
                shipping,
            },
            PromotionKind::FreeShipping => Discount {
                amount: Decimal::ZERO,
                shipping: Decimal::ZERO,
            },
        }
    }
}

/// Normalise a customer- or seller-entered code.
///
/// # Errors
///
/// Returns [`PromotionError::InvalidCode`] for empty, over-long or
/// malformed codes.
pub fn normalize_code(raw: &str) -> Result<String, PromotionError> {
    let code = raw.trim().to_ascii_uppercase();
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid_chars || !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len()) {
        return Err(PromotionError::InvalidCode);
    }
    Ok(code)
}

/// Validate the commercial terms of a promotion.
///
/// # Errors
///
/// Returns [`PromotionError::InvalidTerms`] naming the broken rule.
pub fn validate_terms(
    kind: PromotionKind,
    value: Decimal,
    min_subtotal: Option<Decimal>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
) -> Result<(), PromotionError> {
    match kind {
        PromotionKind::Percentage if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED => {
            return Err(PromotionError::InvalidTerms(
                "percentage must be greater than 0 and at most 100",
            ));
        }
        PromotionKind::FixedAmount if value <= Decimal::ZERO => {
            return Err(PromotionError::InvalidTerms("fixed amount must be greater than 0"));
        }
        _ => {}
    }
    if min_subtotal.is_some_and(|m| m < Decimal::ZERO) {
        return Err(PromotionError::InvalidTerms("minimum subtotal cannot be negative"));
    }
    if let (Some(starts), Some(ends)) = (starts_at, ends_at)
        && ends <= starts
    {
        return Err(PromotionError::InvalidTerms("end date must be after start date"));
    }
    if usage_limit.is_some_and(|limit| limit < 1) {
        return Err(PromotionError::InvalidTerms("usage limit must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn promotion(kind: PromotionKind, value: Decimal) -> Promotion {
        Promotion {
            id: PromotionId::new(1),
            store_id: StoreId::new(1),
            code: "SAVE".to_string(),
            kind,
            value,
            min_subtotal: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            times_used: 0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_discount_rounds_to_cents() {
        let promo = promotion(PromotionKind::Percentage, Decimal::new(15, 0));
        let discount = promo.discount(Decimal::new(3333, 2), Decimal::new(500, 2));
        // 15% of 33.33 = 4.9995
        assert_eq!(discount.amount, Decimal::new(500, 2));
        assert_eq!(discount.shipping, Decimal::new(500, 2));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let promo = promotion(PromotionKind::FixedAmount, Decimal::new(50, 0));
        let discount = promo.discount(Decimal::new(2000, 2), Decimal::ZERO);
        assert_eq!(discount.amount, Decimal::new(2000, 2));
    }

    #[test]
    fn test_free_shipping() {
        let promo = promotion(PromotionKind::FreeShipping, Decimal::ZERO);
        let discount = promo.discount(Decimal::new(2000, 2), Decimal::new(799, 2));
        assert_eq!(discount.amount, Decimal::ZERO);
        assert_eq!(discount.shipping, Decimal::ZERO);
    }

    #[test]
    fn test_applicability_rules() {
        let now = Utc::now();
        let subtotal = Decimal::new(100, 0);

        let mut promo = promotion(PromotionKind::Percentage, Decimal::TEN);
        assert!(promo.check_applicable(subtotal, now).is_ok());

        promo.active = false;
        assert_eq!(promo.check_applicable(subtotal, now), Err(PromotionError::Inactive));
        promo.active = true;

        promo.starts_at = Some(now + Duration::hours(1));
        assert_eq!(promo.check_applicable(subtotal, now), Err(PromotionError::NotStarted));
        promo.starts_at = None;

        promo.ends_at = Some(now);
        assert_eq!(promo.check_applicable(subtotal, now), Err(PromotionError::Expired));
        promo.ends_at = None;

        promo.usage_limit = Some(2);
        promo.times_used = 2;
        assert_eq!(
            promo.check_applicable(subtotal, now),
            Err(PromotionError::UsageLimitReached)
        );
        promo.usage_limit = None;

        promo.min_subtotal = Some(Decimal::new(150, 0));
        assert_eq!(
            promo.check_applicable(subtotal, now),
            Err(PromotionError::MinimumNotMet(Decimal::new(150, 0)))
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" summer-25 ").unwrap(), "SUMMER-25");
        assert_eq!(normalize_code("ab"), Err(PromotionError::InvalidCode));
        assert_eq!(normalize_code("NO SPACES"), Err(PromotionError::InvalidCode));
        assert_eq!(normalize_code(&"A".repeat(33)), Err(PromotionError::InvalidCode));
    }

    #[test]
    fn test_validate_terms() {
        let now = Utc::now();
        assert!(validate_terms(PromotionKind::Percentage, Decimal::ONE_HUNDRED, None, None, None, None).is_ok());
        assert!(validate_terms(PromotionKind::Percentage, Decimal::new(101, 0), None, None, None, None).is_err());
        assert!(validate_terms(PromotionKind::Percentage, Decimal::ZERO, None, None, None, None).is_err());
        assert!(validate_terms(PromotionKind::FixedAmount, Decimal::ZERO, None, None, None, None).is_err());
        assert!(validate_terms(PromotionKind::FreeShipping, Decimal::ZERO, None, None, None, None).is_ok());
        assert!(
            validate_terms(PromotionKind::FixedAmount, Decimal::TEN, None, Some(now), Some(now), None)
                .is_err()
        );
        assert!(validate_terms(PromotionKind::FixedAmount, Decimal::TEN, None, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_terms_round_trip_through_promotion() {
        let promo = promotion(PromotionKind::FixedAmount, Decimal::TEN);
        let mut terms = PromotionTerms::from(&promo);
        assert!(terms.validate().is_ok());

        terms.code = "x".to_string();
        assert_eq!(terms.validate(), Err(PromotionError::InvalidCode));
    }
}

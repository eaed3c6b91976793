//! Status and kind enums for marketplace entities.
//!
//! Order and delivery statuses carry their lifecycle rules: a status change
//! requested by a seller, an admin or the payment webhook is only applied if
//! [`OrderStatus::can_transition_to`] / [`DeliveryStatus::can_transition_to`]
//! allow it.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a status change is not allowed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot move {entity} from {from} to {to}")]
pub struct TransitionError {
    /// Entity kind ("order" or "delivery").
    pub entity: &'static str,
    /// Current status.
    pub from: &'static str,
    /// Requested status.
    pub to: &'static str,
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment confirmation.
    #[default]
    Pending,
    /// Payment confirmed.
    Paid,
    /// Seller is preparing the shipment.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Cancelled before shipping.
    Cancelled,
    /// Money returned to the customer.
    Refunded,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::Refunded,
    ];

    /// Snake-case name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Whether the order can move directly to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Processing | Self::Cancelled | Self::Refunded)
                | (
                    Self::Processing,
                    Self::Shipped | Self::Cancelled | Self::Refunded
                )
                | (Self::Shipped, Self::Delivered | Self::Refunded)
                | (Self::Delivered, Self::Refunded)
        )
    }

    /// Validate a transition, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed.
    pub const fn transition_to(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "order",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Orders in these statuses count towards revenue.
    #[must_use]
    pub const fn is_revenue(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Processing | Self::Shipped | Self::Delivered
        )
    }

    /// Cancelling from these statuses returns reserved stock.
    #[must_use]
    pub const fn holds_stock(self) -> bool {
        matches!(self, Self::Pending | Self::Paid | Self::Processing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery (shipment) status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.delivery_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
    Returned,
}

impl DeliveryStatus {
    /// All statuses.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::InTransit,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Failed,
        Self::Returned,
    ];

    /// Snake-case name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Returned => "returned",
        }
    }

    /// Whether the delivery can move directly to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InTransit | Self::Failed)
                | (
                    Self::InTransit,
                    Self::OutForDelivery | Self::Delivered | Self::Failed
                )
                | (Self::OutForDelivery, Self::Delivered | Self::Failed)
                | (Self::Failed, Self::Pending | Self::Returned)
        )
    }

    /// Validate a transition, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed.
    pub const fn transition_to(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "delivery",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// The order status implied by reaching this delivery status, if any.
    #[must_use]
    pub const fn implied_order_status(self) -> Option<OrderStatus> {
        match self {
            Self::InTransit | Self::OutForDelivery => Some(OrderStatus::Shipped),
            Self::Delivered => Some(OrderStatus::Delivered),
            Self::Pending | Self::Failed | Self::Returned => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Promotion discount kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.promotion_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    /// `value` percent off the subtotal.
    Percentage,
    /// `value` off the subtotal, never below zero.
    FixedAmount,
    /// Shipping fee waived.
    FreeShipping,
}

/// Store ledger entry kind.
///
/// Amounts are signed: sales are positive, refunds, fees and payouts negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.transaction_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Refund,
    Fee,
    Payout,
}

/// Platform role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Shops on storefronts.
    #[default]
    Customer,
    /// Owns at least one store.
    Seller,
    /// Platform administrator; may act on every store.
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Seller => write!(f, "seller"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

/// Kind of content attached to a course chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bazaar.section_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Blog,
    Video,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_happy_path() {
        let status = OrderStatus::Pending
            .transition_to(OrderStatus::Paid)
            .and_then(|s| s.transition_to(OrderStatus::Processing))
            .and_then(|s| s.transition_to(OrderStatus::Shipped))
            .and_then(|s| s.transition_to(OrderStatus::Delivered))
            .unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn test_order_terminal_states() {
        for next in OrderStatus::ALL {
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
            assert!(!OrderStatus::Refunded.can_transition_to(next));
        }
    }

    #[test]
    fn test_order_cannot_skip_payment() {
        let err = OrderStatus::Pending
            .transition_to(OrderStatus::Shipped)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move order from pending to shipped");
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_order_no_self_transition() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_delivery_redispatch_after_failure() {
        let status = DeliveryStatus::Pending
            .transition_to(DeliveryStatus::InTransit)
            .and_then(|s| s.transition_to(DeliveryStatus::Failed))
            .and_then(|s| s.transition_to(DeliveryStatus::Pending))
            .unwrap();
        assert_eq!(status, DeliveryStatus::Pending);
        assert!(!DeliveryStatus::Delivered.can_transition_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Returned.can_transition_to(DeliveryStatus::Pending));
    }

    #[test]
    fn test_delivery_implied_order_status() {
        assert_eq!(
            DeliveryStatus::InTransit.implied_order_status(),
            Some(OrderStatus::Shipped)
        );
        assert_eq!(
            DeliveryStatus::Delivered.implied_order_status(),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(DeliveryStatus::Failed.implied_order_status(), None);
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::OutForDelivery).unwrap(),
            "\"out_for_delivery\""
        );
        let kind: PromotionKind = serde_json::from_str("\"free_shipping\"").unwrap();
        assert_eq!(kind, PromotionKind::FreeShipping);
    }

    #[test]
    fn test_user_role_roundtrip() {
        for role in [UserRole::Customer, UserRole::Seller, UserRole::Admin] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("owner".parse::<UserRole>().is_err());
    }
}

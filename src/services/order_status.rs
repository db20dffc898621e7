//! Order status state machine.
//!
//! ```text
//! pending ──► confirmed ──► processing ──► shipped ──► delivered ──► refunded
//!    │            │              ▲
//!    │            └──► cancelled │
//!    ├──────────────► cancelled  │
//!    └───────────────────────────┘
//! ```
//!
//! `cancelled` and `refunded` are terminal. Refunds additionally need a
//! paid order.

use chrono::Utc;
use sea_orm::ActiveValue::Set;

use crate::{
    entities::order::{ActiveModel as OrderActiveModel, Model as OrderModel},
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
};

pub fn can_be_cancelled(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Pending | OrderStatus::Confirmed)
}

pub fn can_be_refunded(status: OrderStatus, payment_status: PaymentStatus) -> bool {
    status == OrderStatus::Delivered && payment_status == PaymentStatus::Paid
}

pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Confirmed, Processing, Cancelled],
        Confirmed => &[Processing, Cancelled],
        Processing => &[Shipped],
        Shipped => &[Delivered],
        Delivered => &[Refunded],
        Cancelled | Refunded => &[],
    }
}

/// Rejects anything the transition table does not allow with `Conflict`.
pub fn check_transition(
    from: OrderStatus,
    to: OrderStatus,
    payment_status: PaymentStatus,
) -> Result<(), ServiceError> {
    if from == to {
        return Err(ServiceError::Conflict(format!(
            "Order is already {}",
            from.as_ref()
        )));
    }
    if !allowed_transitions(from).contains(&to) {
        return Err(ServiceError::Conflict(format!(
            "Cannot change order status from {} to {}",
            from.as_ref(),
            to.as_ref()
        )));
    }
    if to == OrderStatus::Refunded && !can_be_refunded(from, payment_status) {
        return Err(ServiceError::Conflict(
            "Only delivered and paid orders can be refunded".to_string(),
        ));
    }
    Ok(())
}

/// Builds the update for an already-checked transition, stamping the
/// lifecycle fields that belong to the target status.
pub fn apply_transition(
    order: OrderModel,
    new_status: OrderStatus,
    reason: Option<String>,
) -> OrderActiveModel {
    let now = Utc::now();
    let mut active: OrderActiveModel = order.into();
    active.status = Set(new_status);

    match new_status {
        OrderStatus::Cancelled => {
            active.cancelled_at = Set(Some(now));
            active.cancellation_reason = Set(reason);
        }
        OrderStatus::Delivered => {
            active.delivered_at = Set(Some(now));
        }
        OrderStatus::Refunded => {
            active.payment_status = Set(PaymentStatus::Refunded);
        }
        _ => {}
    }

    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use OrderStatus::*;

    #[rstest]
    #[case(Pending, Confirmed)]
    #[case(Pending, Processing)]
    #[case(Pending, Cancelled)]
    #[case(Confirmed, Processing)]
    #[case(Confirmed, Cancelled)]
    #[case(Processing, Shipped)]
    #[case(Shipped, Delivered)]
    fn permitted_transitions(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert!(check_transition(from, to, PaymentStatus::Pending).is_ok());
    }

    #[rstest]
    #[case(Pending, Shipped)]
    #[case(Pending, Delivered)]
    #[case(Confirmed, Pending)]
    #[case(Processing, Cancelled)]
    #[case(Shipped, Cancelled)]
    #[case(Shipped, Processing)]
    #[case(Delivered, Cancelled)]
    #[case(Cancelled, Pending)]
    #[case(Cancelled, Confirmed)]
    #[case(Refunded, Delivered)]
    fn rejected_transitions(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert_matches!(
            check_transition(from, to, PaymentStatus::Paid),
            Err(ServiceError::Conflict(_))
        );
    }

    #[rstest]
    #[case(Pending)]
    #[case(Delivered)]
    #[case(Cancelled)]
    fn same_status_is_a_conflict(#[case] status: OrderStatus) {
        assert_matches!(
            check_transition(status, status, PaymentStatus::Paid),
            Err(ServiceError::Conflict(_))
        );
    }

    #[rstest]
    #[case(PaymentStatus::Paid, true)]
    #[case(PaymentStatus::Pending, false)]
    #[case(PaymentStatus::Failed, false)]
    fn refund_requires_payment(#[case] payment: PaymentStatus, #[case] allowed: bool) {
        assert_eq!(check_transition(Delivered, Refunded, payment).is_ok(), allowed);
    }

    #[rstest]
    #[case(Pending, true)]
    #[case(Confirmed, true)]
    #[case(Processing, false)]
    #[case(Shipped, false)]
    #[case(Delivered, false)]
    #[case(Cancelled, false)]
    #[case(Refunded, false)]
    fn cancellable_states(#[case] status: OrderStatus, #[case] expected: bool) {
        assert_eq!(can_be_cancelled(status), expected);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_transitions(Cancelled).is_empty());
        assert!(allowed_transitions(Refunded).is_empty());
    }
}

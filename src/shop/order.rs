use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::tariff::PremiumPeriod;

pub type OrderId = i64;
pub type FileId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProductType {
    Stars,
    Premium,
    Exchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Crypto,
}

impl ProductType {
    pub fn accepts(&self, method: PaymentMethod) -> bool {
        !matches!((self, method), (ProductType::Exchange, PaymentMethod::Crypto))
    }
}

/// Product specific part of an order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductDetails {
    Stars { stars: u32 },
    Premium { period: PremiumPeriod },
    Exchange { amount_rub: Decimal, amount_usd: Decimal, exchange_rate: Decimal },
}

impl ProductDetails {
    pub fn product_type(&self) -> ProductType {
        match self {
            Self::Stars { .. } => ProductType::Stars,
            Self::Premium { .. } => ProductType::Premium,
            Self::Exchange { .. } => ProductType::Exchange,
        }
    }
}

/// Document stored in the `details` column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub product: ProductDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proof: Option<FileId>,
}

impl From<ProductDetails> for OrderDetails {
    fn from(product: ProductDetails) -> Self {
        Self { product, payment_proof: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    WaitingPayment,
    WaitingCrypto,
    WaitingConfirmation,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    ChooseCard,
    InvoiceIssued,
    ProofSubmitted,
    Confirm,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event:?} to an order in status {from}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub event: OrderEvent,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Status after `event`. Reaching the current status again is allowed and means "no change".
    pub fn apply(self, event: OrderEvent) -> Result<OrderStatus, TransitionError> {
        use OrderEvent::*;
        use OrderStatus::*;
        let next = match (self, event) {
            (Pending | WaitingPayment | WaitingCrypto, ChooseCard) => WaitingPayment,
            (Pending | WaitingPayment | WaitingCrypto, InvoiceIssued) => WaitingCrypto,
            (WaitingPayment | WaitingConfirmation, ProofSubmitted) => WaitingConfirmation,
            (WaitingPayment | WaitingCrypto | WaitingConfirmation | Confirmed, Confirm) => Confirmed,
            (WaitingConfirmation | Confirmed | Completed, Complete) => Completed,
            (Cancelled, Cancel) => Cancelled,
            (status, Cancel) if !status.is_terminal() => Cancelled,
            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: i64,
    pub recipient: Option<String>,
    pub details: OrderDetails,
    pub amount_rub: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn product_type(&self) -> ProductType {
        self.details.product.product_type()
    }
}

/// Order parameters collected by the dialogue, before pricing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub recipient: Option<String>,
    pub product: ProductDetails,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub recipient: Option<String>,
    pub details: OrderDetails,
    pub amount_rub: Decimal,
    pub payment_method: PaymentMethod,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use OrderEvent::*;
    use OrderStatus::*;

    #[test]
    fn status_is_stored_in_snake_case() {
        assert_eq!(WaitingConfirmation.as_ref(), "waiting_confirmation");
        assert_eq!(OrderStatus::from_str("waiting_crypto").unwrap(), WaitingCrypto);
        assert!(OrderStatus::from_str("paid").is_err());
        assert_eq!(ProductType::Exchange.to_string(), "exchange");
    }

    #[test]
    fn card_flow() {
        let status = Pending.apply(ChooseCard).unwrap();
        assert_eq!(status, WaitingPayment);
        let status = status.apply(ProofSubmitted).unwrap();
        assert_eq!(status, WaitingConfirmation);
        let status = status.apply(Confirm).unwrap();
        assert_eq!(status, Confirmed);
        assert_eq!(status.apply(Complete).unwrap(), Completed);
    }

    #[test]
    fn crypto_flow_needs_confirmation_before_completion() {
        let status = Pending.apply(InvoiceIssued).unwrap();
        assert_eq!(status, WaitingCrypto);
        assert_eq!(status.apply(Complete), Err(TransitionError { from: WaitingCrypto, event: Complete }));
        assert_eq!(status.apply(Confirm).unwrap(), Confirmed);
    }

    #[test]
    fn repeated_events_are_idempotent() {
        assert_eq!(Confirmed.apply(Confirm).unwrap(), Confirmed);
        assert_eq!(Completed.apply(Complete).unwrap(), Completed);
        assert_eq!(Cancelled.apply(Cancel).unwrap(), Cancelled);
        assert_eq!(WaitingConfirmation.apply(ProofSubmitted).unwrap(), WaitingConfirmation);
    }

    #[test]
    fn terminal_statuses_stay_terminal() {
        assert!(Completed.apply(Cancel).is_err());
        assert!(Cancelled.apply(Confirm).is_err());
        assert!(Cancelled.apply(ChooseCard).is_err());
        assert!(Pending.apply(ProofSubmitted).is_err());
        assert_eq!(WaitingCrypto.apply(Cancel).unwrap(), Cancelled);
    }

    #[test]
    fn exchange_is_card_only() {
        assert!(!ProductType::Exchange.accepts(PaymentMethod::Crypto));
        assert!(ProductType::Exchange.accepts(PaymentMethod::Card));
        assert!(ProductType::Stars.accepts(PaymentMethod::Crypto));
    }

    #[test]
    fn details_document_is_tagged() {
        let details = OrderDetails {
            product: ProductDetails::Premium { period: PremiumPeriod::Year },
            payment_proof: Some("file".into()),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["product"]["kind"], "premium");
        assert_eq!(json["product"]["period"], "1y");
        assert_eq!(json["payment_proof"], "file");
        let back: OrderDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back, details);
    }
}

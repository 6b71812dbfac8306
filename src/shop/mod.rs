use std::sync::Arc;

use crate::payment::{GatewayError, Invoice, InvoiceRequest, InvoiceStatus, PaymentGateway};
use crate::persistent::{NewUser, Statistics, Storage};

mod order;
mod session;
pub(crate) mod tariff;

pub use order::*;
pub use session::{SessionError, SessionStore};
pub use tariff::{PremiumPeriod, Tariff};

#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("order #{0} not found")]
    NotFound(OrderId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("order #{0} was changed concurrently")]
    Conflict(OrderId),
    #[error("order #{0} cannot be paid by {1}")]
    MethodNotAllowed(OrderId, PaymentMethod),
    #[error("crypto payments are not configured")]
    GatewayDisabled,
    #[error("order #{0} has no invoice")]
    NoInvoice(OrderId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ShopResult<T> = Result<T, ShopError>;

/// Result of applying an [`OrderEvent`].
#[derive(Debug, Clone)]
pub struct Applied {
    pub order: Order,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub enum CryptoCheck {
    /// Settlement seen just now, the order moved to `confirmed`.
    Paid(Order),
    AlreadyConfirmed(Order),
    NotPaid,
    Expired,
}

/// Order ledger operations shared by the dialogue and admin handlers.
pub struct Shop {
    storage: Arc<Storage>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    tariff: Tariff,
}

impl Shop {
    pub fn new(storage: Arc<Storage>, gateway: Option<Arc<dyn PaymentGateway>>, tariff: Tariff) -> Self {
        Self { storage, gateway, tariff }
    }
    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }
    pub fn crypto_enabled(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn register_user(&self, user: &NewUser) -> ShopResult<bool> {
        Ok(self.storage.add_user(user).await?)
    }

    pub async fn place_order(&self, user_id: i64, draft: OrderDraft) -> ShopResult<Order> {
        let amount_rub = self.tariff.price(&draft.product);
        let order = self.storage.add_order(&NewOrder {
            user_id,
            recipient: draft.recipient,
            details: draft.product.into(),
            amount_rub,
            payment_method: PaymentMethod::Card,
        }).await?;
        log::info!("order #{} placed by {}: {} for {} RUB", order.id, user_id, order.product_type(), amount_rub);
        Ok(order)
    }

    /// Loads an order on behalf of its owner. Foreign orders look missing.
    pub async fn order_of(&self, order_id: OrderId, user_id: i64) -> ShopResult<Order> {
        match self.storage.get_order(order_id).await? {
            Some(order) if order.user_id == user_id => Ok(order),
            _ => Err(ShopError::NotFound(order_id)),
        }
    }
    pub async fn order(&self, order_id: OrderId) -> ShopResult<Order> {
        self.storage.get_order(order_id).await?.ok_or(ShopError::NotFound(order_id))
    }

    pub async fn pay_by_card(&self, order_id: OrderId, user_id: i64) -> ShopResult<Order> {
        let order = self.order_of(order_id, user_id).await?;
        let applied = self.transition(order, OrderEvent::ChooseCard, |o| o.payment_method = PaymentMethod::Card).await?;
        Ok(applied.order)
    }

    pub async fn pay_by_crypto(&self, order_id: OrderId, user_id: i64) -> ShopResult<(Order, Invoice)> {
        let gateway = self.gateway.as_ref().ok_or(ShopError::GatewayDisabled)?;
        let order = self.order_of(order_id, user_id).await?;
        if !order.product_type().accepts(PaymentMethod::Crypto) {
            return Err(ShopError::MethodNotAllowed(order_id, PaymentMethod::Crypto))
        }
        // rejects terminal orders before anything is billed
        order.status.apply(OrderEvent::InvoiceIssued)?;
        let amount = self.tariff.to_usdt(order.amount_rub)
            .ok_or_else(|| anyhow::anyhow!("order #{}: {} RUB does not fit in USDT", order.id, order.amount_rub))?;
        let invoice = gateway.create_invoice(InvoiceRequest {
            amount,
            description: format!("Заказ #{} | {}", order.id, order.product_type()),
            payload: format!("order_{}", order.id),
        }).await?;
        log::info!("order #{}: {} invoice {} issued", order.id, gateway.name(), invoice.invoice_id);
        let invoice_id = invoice.invoice_id.clone();
        let applied = self.transition(order, OrderEvent::InvoiceIssued, move |o| {
            o.payment_method = PaymentMethod::Crypto;
            o.invoice_id = Some(invoice_id);
        }).await?;
        Ok((applied.order, invoice))
    }

    /// Asks the gateway whether the order's invoice is settled.
    pub async fn check_crypto(&self, order_id: OrderId, user_id: i64) -> ShopResult<CryptoCheck> {
        let gateway = self.gateway.as_ref().ok_or(ShopError::GatewayDisabled)?;
        let order = self.order_of(order_id, user_id).await?;
        let status = order.status;
        match status {
            OrderStatus::Confirmed | OrderStatus::Completed => return Ok(CryptoCheck::AlreadyConfirmed(order)),
            OrderStatus::WaitingCrypto => {}
            from => return Err(TransitionError { from, event: OrderEvent::Confirm }.into()),
        }
        let invoice_id = order.invoice_id.clone().ok_or(ShopError::NoInvoice(order_id))?;
        let check = match gateway.invoice_status(&invoice_id).await? {
            InvoiceStatus::Active => CryptoCheck::NotPaid,
            InvoiceStatus::Expired => CryptoCheck::Expired,
            InvoiceStatus::Paid => {
                let applied = self.transition(order, OrderEvent::Confirm, |_| {}).await?;
                if applied.changed {
                    CryptoCheck::Paid(applied.order)
                } else {
                    CryptoCheck::AlreadyConfirmed(applied.order)
                }
            }
        };
        Ok(check)
    }

    /// Checks that the caller may attach a payment proof to the order.
    pub async fn proof_expected(&self, order_id: OrderId, user_id: i64) -> ShopResult<Order> {
        let order = self.order_of(order_id, user_id).await?;
        order.status.apply(OrderEvent::ProofSubmitted)?;
        Ok(order)
    }

    pub async fn submit_proof(&self, order_id: OrderId, user_id: i64, file_id: FileId) -> ShopResult<Order> {
        let order = self.order_of(order_id, user_id).await?;
        let applied = self.transition(order, OrderEvent::ProofSubmitted, |o| o.details.payment_proof = Some(file_id)).await?;
        Ok(applied.order)
    }

    /// Applies an admin decision. Repeating a decision reports `changed: false`.
    pub async fn decide(&self, order_id: OrderId, event: OrderEvent) -> ShopResult<Applied> {
        let order = self.order(order_id).await?;
        if order.status.apply(event)? == order.status {
            return Ok(Applied { order, changed: false })
        }
        self.transition(order, event, |_| {}).await
    }

    pub async fn statistics(&self) -> ShopResult<Statistics> {
        Ok(self.storage.statistics().await?)
    }
    pub async fn awaiting_review(&self, limit: i64) -> ShopResult<Vec<Order>> {
        Ok(self.storage.orders_by_status(OrderStatus::WaitingConfirmation, limit).await?)
    }
    pub async fn recently_completed(&self, limit: i64) -> ShopResult<Vec<Order>> {
        Ok(self.storage.orders_by_status(OrderStatus::Completed, limit).await?)
    }

    async fn transition(&self, mut order: Order, event: OrderEvent, edit: impl FnOnce(&mut Order)) -> ShopResult<Applied> {
        let previous = order.status;
        let next = previous.apply(event)?;
        edit(&mut order);
        order.status = next;
        if !self.storage.update_order(&order, previous).await? {
            return Err(ShopError::Conflict(order.id))
        }
        if previous != next {
            log::info!("order #{}: {} -> {}", order.id, previous, next);
        }
        Ok(Applied { changed: previous != next, order })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persistent::sqlite::tests::temp_storage;
    use crate::shop::tariff::tests::{dec, tariff};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    pub struct FakeGateway {
        pub status: Mutex<Option<InvoiceStatus>>,
        pub requests: Mutex<Vec<InvoiceRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            Ok(Invoice {
                invoice_id: format!("inv{}", requests.len()),
                pay_url: "https://t.me/CryptoBot?start=test".into(),
                amount: request.amount,
                asset: "USDT".into(),
            })
        }
        async fn invoice_status(&self, _invoice_id: &str) -> Result<InvoiceStatus, GatewayError> {
            self.status.lock().unwrap()
                .ok_or_else(|| GatewayError::Api { code: 404, name: "INVOICE_NOT_FOUND".into() })
        }
        fn name(&self) -> &str {
            "fake"
        }
    }

    pub async fn shop(gateway: Option<Arc<FakeGateway>>) -> (TempDir, Shop) {
        let (dir, storage) = temp_storage().await;
        let gateway = gateway.map(|g| g as Arc<dyn PaymentGateway>);
        (dir, Shop::new(storage, gateway, tariff()))
    }

    fn stars(recipient: &str, stars: u32) -> OrderDraft {
        OrderDraft { recipient: Some(recipient.into()), product: ProductDetails::Stars { stars } }
    }

    #[tokio::test]
    async fn card_order_goes_to_review_with_proof() {
        let (_dir, shop) = shop(None).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        assert_eq!(order.amount_rub, dec("150"));
        assert_eq!(order.status, OrderStatus::Pending);

        let order = shop.pay_by_card(order.id, 1).await.unwrap();
        assert_eq!(order.status, OrderStatus::WaitingPayment);
        let order = shop.submit_proof(order.id, 1, "photo-1".into()).await.unwrap();
        assert_eq!(order.status, OrderStatus::WaitingConfirmation);

        let stored = shop.order(order.id).await.unwrap();
        assert_eq!(stored.details.payment_proof.as_deref(), Some("photo-1"));
        assert_eq!(stored.details.product, ProductDetails::Stars { stars: 100 });
        assert_eq!(shop.awaiting_review(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_orders_are_invisible() {
        let (_dir, shop) = shop(None).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        assert!(matches!(shop.pay_by_card(order.id, 2).await, Err(ShopError::NotFound(_))));
        assert!(matches!(shop.submit_proof(order.id, 2, "x".into()).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn proof_needs_card_payment_first() {
        let (_dir, shop) = shop(None).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        assert!(matches!(shop.proof_expected(order.id, 1).await, Err(ShopError::Transition(_))));
        assert!(matches!(shop.submit_proof(order.id, 1, "x".into()).await, Err(ShopError::Transition(_))));
        shop.pay_by_card(order.id, 1).await.unwrap();
        assert_eq!(shop.proof_expected(order.id, 1).await.unwrap().id, order.id);
        assert!(matches!(shop.proof_expected(order.id, 2).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn crypto_is_unavailable_without_gateway() {
        let (_dir, shop) = shop(None).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        assert!(matches!(shop.pay_by_crypto(order.id, 1).await, Err(ShopError::GatewayDisabled)));
    }

    #[tokio::test]
    async fn exchange_cannot_be_paid_in_crypto() {
        let gateway = Arc::new(FakeGateway::default());
        let (_dir, shop) = shop(Some(gateway.clone())).await;
        let product = shop.tariff().exchange(dec("1000")).unwrap();
        let order = shop.place_order(1, OrderDraft { recipient: None, product }).await.unwrap();
        assert!(matches!(shop.pay_by_crypto(order.id, 1).await, Err(ShopError::MethodNotAllowed(..))));
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn crypto_payment_is_verified_with_the_gateway() {
        let gateway = Arc::new(FakeGateway::default());
        let (_dir, shop) = shop(Some(gateway.clone())).await;
        let draft = OrderDraft { recipient: Some("friend".into()), product: ProductDetails::Premium { period: PremiumPeriod::ThreeMonths } };
        let order = shop.place_order(1, draft).await.unwrap();

        let (order, invoice) = shop.pay_by_crypto(order.id, 1).await.unwrap();
        assert_eq!(order.status, OrderStatus::WaitingCrypto);
        assert_eq!(order.payment_method, PaymentMethod::Crypto);
        assert_eq!(order.invoice_id.as_deref(), Some(invoice.invoice_id.as_str()));
        assert_eq!(gateway.requests.lock().unwrap()[0].amount, dec("13.22"));
        assert_eq!(gateway.requests.lock().unwrap()[0].payload, format!("order_{}", order.id));

        *gateway.status.lock().unwrap() = Some(InvoiceStatus::Active);
        assert!(matches!(shop.check_crypto(order.id, 1).await.unwrap(), CryptoCheck::NotPaid));
        assert_eq!(shop.order(order.id).await.unwrap().status, OrderStatus::WaitingCrypto);

        *gateway.status.lock().unwrap() = Some(InvoiceStatus::Paid);
        match shop.check_crypto(order.id, 1).await.unwrap() {
            CryptoCheck::Paid(order) => assert_eq!(order.status, OrderStatus::Confirmed),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(shop.check_crypto(order.id, 1).await.unwrap(), CryptoCheck::AlreadyConfirmed(_)));
    }

    #[tokio::test]
    async fn gateway_failure_keeps_the_order_waiting() {
        let gateway = Arc::new(FakeGateway::default());
        let (_dir, shop) = shop(Some(gateway.clone())).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        let (order, _) = shop.pay_by_crypto(order.id, 1).await.unwrap();
        assert!(matches!(shop.check_crypto(order.id, 1).await, Err(ShopError::Gateway(_))));
        assert_eq!(shop.order(order.id).await.unwrap().status, OrderStatus::WaitingCrypto);
    }

    #[tokio::test]
    async fn admin_decisions_are_idempotent() {
        let (_dir, shop) = shop(None).await;
        let order = shop.place_order(1, stars("friend", 100)).await.unwrap();
        shop.pay_by_card(order.id, 1).await.unwrap();
        shop.submit_proof(order.id, 1, "p".into()).await.unwrap();

        let first = shop.decide(order.id, OrderEvent::Confirm).await.unwrap();
        assert!(first.changed);
        let second = shop.decide(order.id, OrderEvent::Confirm).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.order.status, OrderStatus::Confirmed);

        let done = shop.decide(order.id, OrderEvent::Complete).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert!(matches!(shop.decide(order.id, OrderEvent::Cancel).await, Err(ShopError::Transition(_))));
        assert!(matches!(shop.decide(order.id + 100, OrderEvent::Cancel).await, Err(ShopError::NotFound(_))));

        let stats = shop.statistics().await.unwrap();
        assert_eq!(stats.completed_orders, 1);
        assert_eq!(stats.revenue, dec("150"));
        assert_eq!(shop.recently_completed(5).await.unwrap()[0].id, order.id);
    }
}

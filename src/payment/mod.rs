use async_trait::async_trait;
use rust_decimal::Decimal;

mod cryptobot;

pub use cryptobot::CryptoBot;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway is unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected the request: {name} ({code})")]
    Api { code: i64, name: String },
    #[error("unexpected gateway response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    /// Amount in the gateway asset
    pub amount: Decimal,
    pub description: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub invoice_id: String,
    pub pay_url: String,
    pub amount: Decimal,
    pub asset: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Active,
    Paid,
    Expired,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError>;
    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus, GatewayError>;
    fn name(&self) -> &str;
}

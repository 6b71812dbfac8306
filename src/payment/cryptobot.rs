use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{GatewayError, Invoice, InvoiceRequest, InvoiceStatus, PaymentGateway};

const MAINNET: &str = "https://pay.crypt.bot/api";
const TESTNET: &str = "https://testnet-pay.crypt.bot/api";
const ASSET: &str = "USDT";
const MAX_DESCRIPTION: usize = 1024;

/// Crypto Pay API client (@CryptoBot).
pub struct CryptoBot {
    client: reqwest::Client,
    token: String,
    base_url: String,
    return_url: String,
}

#[derive(Serialize, Debug)]
struct CreateInvoice<'a> {
    asset: &'a str,
    amount: String,
    description: String,
    payload: &'a str,
    paid_btn_name: &'a str,
    paid_btn_url: &'a str,
    allow_anonymous: bool,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    code: i64,
    name: String,
}

#[derive(Deserialize, Debug)]
struct RawInvoice {
    invoice_id: i64,
    status: String,
    asset: Option<String>,
    amount: String,
    pay_url: Option<String>,
    bot_invoice_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct InvoiceList {
    items: Vec<RawInvoice>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, GatewayError> {
        match (self.ok, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (_, _, Some(ApiError { code, name })) => Err(GatewayError::Api { code, name }),
            _ => Err(GatewayError::Malformed("neither result nor error".into())),
        }
    }
}

impl TryFrom<RawInvoice> for Invoice {
    type Error = GatewayError;

    fn try_from(raw: RawInvoice) -> Result<Self, Self::Error> {
        let pay_url = raw.bot_invoice_url.or(raw.pay_url)
            .ok_or_else(|| GatewayError::Malformed(format!("invoice {} has no payment url", raw.invoice_id)))?;
        let amount = Decimal::from_str(&raw.amount)
            .map_err(|e| GatewayError::Malformed(format!("amount {:?}: {}", raw.amount, e)))?;
        Ok(Invoice {
            invoice_id: raw.invoice_id.to_string(),
            pay_url,
            amount,
            asset: raw.asset.unwrap_or_else(|| ASSET.to_owned()),
        })
    }
}

fn parse_status(status: &str) -> Result<InvoiceStatus, GatewayError> {
    match status {
        "active" => Ok(InvoiceStatus::Active),
        "paid" => Ok(InvoiceStatus::Paid),
        "expired" => Ok(InvoiceStatus::Expired),
        other => Err(GatewayError::Malformed(format!("unknown invoice status {:?}", other))),
    }
}

impl CryptoBot {
    pub fn new(token: String, testnet: bool, return_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = if testnet { TESTNET } else { MAINNET }.to_owned();
        Ok(Self { client, token, base_url, return_url })
    }
}

#[async_trait]
impl PaymentGateway for CryptoBot {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        log::info!("creating {} invoice for {} {}", ASSET, request.amount, request.payload);
        let body = CreateInvoice {
            asset: ASSET,
            amount: request.amount.round_dp(2).to_string(),
            description: request.description.chars().take(MAX_DESCRIPTION).collect(),
            payload: &request.payload,
            paid_btn_name: "openBot",
            paid_btn_url: &self.return_url,
            allow_anonymous: false,
        };
        let response: ApiResponse<RawInvoice> = self.client
            .post(format!("{}/createInvoice", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .json(&body)
            .send().await?
            .json().await?;
        response.into_result()?.try_into()
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus, GatewayError> {
        let response: ApiResponse<InvoiceList> = self.client
            .get(format!("{}/getInvoices", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .query(&[("invoice_ids", invoice_id)])
            .send().await?
            .json().await?;
        let invoice = response.into_result()?
            .items.into_iter()
            .find(|i| i.invoice_id.to_string() == invoice_id)
            .ok_or_else(|| GatewayError::Malformed(format!("invoice {} not found", invoice_id)))?;
        parse_status(&invoice.status)
    }

    fn name(&self) -> &str {
        "cryptobot"
    }
}

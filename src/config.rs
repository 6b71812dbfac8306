use clap::Parser;
use log::LevelFilter;
use rust_decimal::Decimal;

use crate::shop::{PremiumPeriod, Tariff};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Telegram storefront for stars, premium and currency exchange")]
pub struct Conf {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN")]
    pub token: String,
    /// Comma separated telegram ids of shop admins
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    pub admins: Vec<u64>,
    /// CryptoBot (Crypto Pay API) token, crypto payments are disabled without it
    #[arg(long, env = "CRYPTOBOT_TOKEN")]
    pub cryptobot_token: Option<String>,
    #[arg(long, env = "CRYPTOBOT_TESTNET", default_value_t = false)]
    pub cryptobot_testnet: bool,
    #[arg(long, env = "DB_URL", default_value = "sqlite://digistore.db")]
    pub db_url: String,
    /// Card number shown for bank transfers
    #[arg(long, env = "CARD_NUMBER")]
    pub card_number: String,

    /// RUB per star
    #[arg(long, env = "STAR_RATE", default_value = "1.5")]
    pub star_rate: Decimal,
    /// RUB per USD for the exchange product
    #[arg(long, env = "USD_RATE", default_value = "85")]
    pub usd_rate: Decimal,
    /// RUB per USDT for crypto invoices
    #[arg(long, env = "USDT_RATE", default_value = "85")]
    pub usdt_rate: Decimal,
    #[arg(long, env = "MIN_STARS", default_value_t = 50)]
    pub min_stars: u32,
    #[arg(long, env = "MAX_STARS", default_value_t = 1_000_000)]
    pub max_stars: u32,
    /// Minimal exchange amount, RUB
    #[arg(long, env = "MIN_EXCHANGE", default_value = "100")]
    pub min_exchange: Decimal,
    /// Maximal exchange amount, RUB
    #[arg(long, env = "MAX_EXCHANGE", default_value = "500000")]
    pub max_exchange: Decimal,
    #[arg(long, env = "PREMIUM_3M", default_value = "1124.11")]
    pub premium_3m: Decimal,
    #[arg(long, env = "PREMIUM_6M", default_value = "1498.81")]
    pub premium_6m: Decimal,
    #[arg(long, env = "PREMIUM_1Y", default_value = "2716.59")]
    pub premium_1y: Decimal,

    /// Minutes of inactivity after which a conversation is forgotten
    #[arg(
        long = "session-ttl", env = "SESSION_TTL_MINUTES", default_value_t = 60,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub session_ttl_minutes: u32,

    #[arg(long, env = "SUPPORT_USER", default_value = "swordSar")]
    pub support_user: String,
    #[arg(long, env = "NEWS_CHANNEL", default_value = "https://t.me/NewsDigistars")]
    pub news_channel: String,
    #[arg(long, env = "REPUTATION_CHANNEL", default_value = "https://t.me/+3pbAABRgo1ljOTJi")]
    pub reputation_channel: String,
    /// Where the gateway sends the payer back after paying
    #[arg(long, env = "SHOP_URL", default_value = "https://t.me/DigiStoreBot")]
    pub shop_url: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Conf {
    pub fn tariff(&self) -> Tariff {
        Tariff {
            star_rate: self.star_rate,
            usd_rate: self.usd_rate,
            usdt_rate: self.usdt_rate,
            min_stars: self.min_stars,
            max_stars: self.max_stars,
            min_exchange: self.min_exchange,
            max_exchange: self.max_exchange,
            premium: [
                (PremiumPeriod::ThreeMonths, self.premium_3m),
                (PremiumPeriod::SixMonths, self.premium_6m),
                (PremiumPeriod::Year, self.premium_1y),
            ],
        }
    }
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_ttl_minutes))
    }
}

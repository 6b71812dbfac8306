mod bots;
mod config;
mod impls;
mod payment;
mod persistent;
mod shop;

use std::sync::Arc;

use clap::Parser;

use bots::store::StoreConfig;
use config::Conf;
use payment::{CryptoBot, PaymentGateway};
use persistent::Storage;
use shop::Shop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let conf = Conf::parse();
    init_logger(conf.log_level)?;

    let tariff = conf.tariff();
    tariff.validate()?;

    let storage = Storage::new(&conf.db_url).await?;
    let (sender, saved) = persistent::worker(storage.clone(), conf.session_ttl()).await?;

    let gateway = match &conf.cryptobot_token {
        Some(token) => {
            let client = CryptoBot::new(token.clone(), conf.cryptobot_testnet, conf.shop_url.clone())?;
            Some(Arc::new(client) as Arc<dyn PaymentGateway>)
        },
        None => None,
    };

    log::info!("admins: {}", conf.admins.len());
    log::info!("cryptobot: {}", match (&gateway, conf.cryptobot_testnet) {
        (Some(_), true) => "testnet",
        (Some(_), false) => "enabled",
        (None, _) => "disabled",
    });
    log::info!(
        "rates: 1 star = {} RUB, 1 USD = {} RUB, 1 USDT = {} RUB",
        tariff.star_rate, tariff.usd_rate, tariff.usdt_rate,
    );

    let shop = Arc::new(Shop::new(storage.clone(), gateway, tariff));
    let bot = bots::store::bot::start(StoreConfig::from(&conf), shop, conf.session_ttl(), sender, saved);
    if let Err(e) = bot.await {
        log::error!("bot task failed: {}", e);
    }
    storage.close().await;
    Ok(())
}

fn init_logger(level: log::LevelFilter) -> anyhow::Result<()> {
    use simplelog::*;
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;
    Ok(())
}

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::order::ProductDetails;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::EnumIter)]
pub enum PremiumPeriod {
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    Year,
}

impl PremiumPeriod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ThreeMonths => "3 месяца",
            Self::SixMonths => "6 месяцев",
            Self::Year => "1 год",
        }
    }
}

/// Prices, exchange rates and input limits of the shop.
#[derive(Debug, Clone)]
pub struct Tariff {
    pub star_rate: Decimal,
    pub usd_rate: Decimal,
    pub usdt_rate: Decimal,
    pub min_stars: u32,
    pub max_stars: u32,
    pub min_exchange: Decimal,
    pub max_exchange: Decimal,
    pub premium: [(PremiumPeriod, Decimal); 3],
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Tariff {
    /// Rejects tariffs that would divide by zero or accept no star amount at all.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.star_rate > Decimal::ZERO, "star rate must be positive");
        anyhow::ensure!(self.usd_rate > Decimal::ZERO, "usd rate must be positive");
        anyhow::ensure!(self.usdt_rate > Decimal::ZERO, "usdt rate must be positive");
        anyhow::ensure!(self.min_stars <= self.max_stars, "min stars exceeds max stars");
        anyhow::ensure!(self.min_exchange <= self.max_exchange, "min exchange exceeds max exchange");
        for period in PremiumPeriod::iter() {
            anyhow::ensure!(self.premium_price(period) > Decimal::ZERO, "premium for {} has no price", period.name());
        }
        Ok(())
    }
    pub fn premium_price(&self, period: PremiumPeriod) -> Decimal {
        self.premium.iter()
            .find(|(p, _)| *p == period)
            .map(|(_, price)| *price)
            .unwrap_or_default()
    }
    pub fn stars_in_range(&self, stars: u32) -> bool {
        (self.min_stars..=self.max_stars).contains(&stars)
    }
    pub fn stars_price(&self, stars: u32) -> Decimal {
        money(Decimal::from(stars) * self.star_rate)
    }
    /// Builds the exchange payload for `amount_rub`, `None` outside the allowed range.
    pub fn exchange(&self, amount_rub: Decimal) -> Option<ProductDetails> {
        if amount_rub < self.min_exchange || amount_rub > self.max_exchange {
            return None
        }
        let amount_rub = money(amount_rub);
        Some(ProductDetails::Exchange {
            amount_rub,
            amount_usd: money(amount_rub.checked_div(self.usd_rate)?),
            exchange_rate: self.usd_rate,
        })
    }
    pub fn price(&self, product: &ProductDetails) -> Decimal {
        match product {
            ProductDetails::Stars { stars } => self.stars_price(*stars),
            ProductDetails::Premium { period } => self.premium_price(*period),
            ProductDetails::Exchange { amount_rub, .. } => *amount_rub,
        }
    }
    pub fn to_usdt(&self, amount_rub: Decimal) -> Option<Decimal> {
        amount_rub.checked_div(self.usdt_rate).map(money)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    pub fn tariff() -> Tariff {
        Tariff {
            star_rate: dec("1.5"),
            usd_rate: dec("85"),
            usdt_rate: dec("85"),
            min_stars: 50,
            max_stars: 1_000_000,
            min_exchange: dec("100"),
            max_exchange: dec("500000"),
            premium: [
                (PremiumPeriod::ThreeMonths, dec("1124.11")),
                (PremiumPeriod::SixMonths, dec("1498.81")),
                (PremiumPeriod::Year, dec("2716.59")),
            ],
        }
    }

    #[test]
    fn stars_are_priced_by_rate() {
        let t = tariff();
        assert_eq!(t.stars_price(50), dec("75"));
        assert_eq!(t.stars_price(333), dec("499.5"));
        assert!(t.stars_in_range(50));
        assert!(t.stars_in_range(1_000_000));
        assert!(!t.stars_in_range(49));
        assert!(!t.stars_in_range(1_000_001));
    }

    #[test]
    fn exchange_converts_and_keeps_rate() {
        let t = tariff();
        assert!(t.exchange(dec("99.99")).is_none());
        assert!(t.exchange(dec("500000.01")).is_none());
        match t.exchange(dec("1000")) {
            Some(ProductDetails::Exchange { amount_rub, amount_usd, exchange_rate }) => {
                assert_eq!(amount_rub, dec("1000"));
                assert_eq!(amount_usd, dec("11.76"));
                assert_eq!(exchange_rate, dec("85"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn usdt_amount_is_rounded_to_cents() {
        let t = tariff();
        assert_eq!(t.to_usdt(dec("1124.11")), Some(dec("13.22")));
        assert_eq!(t.to_usdt(dec("85")), Some(dec("1")));
    }

    #[test]
    fn huge_amounts_do_not_overflow() {
        let mut t = tariff();
        t.usd_rate = dec("0.5");
        t.usdt_rate = dec("0.5");
        t.max_exchange = Decimal::MAX;
        assert!(t.validate().is_ok());
        assert!(t.exchange(Decimal::MAX).is_none());
        assert_eq!(t.to_usdt(Decimal::MAX), None);
    }

    #[test]
    fn price_follows_product() {
        let t = tariff();
        assert_eq!(t.price(&ProductDetails::Premium { period: PremiumPeriod::SixMonths }), dec("1498.81"));
        assert_eq!(t.price(&ProductDetails::Stars { stars: 100 }), dec("150"));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut t = tariff();
        assert!(t.validate().is_ok());
        t.usd_rate = Decimal::ZERO;
        assert!(t.validate().is_err());

        let mut t = tariff();
        t.premium[2].1 = Decimal::ZERO;
        assert!(t.validate().is_err());

        let mut t = tariff();
        t.max_exchange = dec("99");
        assert!(t.validate().is_err());
    }
}

use num_format::{Locale, ToFormattedString};
use rust_decimal::Decimal;
use teloxide::payloads::{AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters, SendPhotoSetters};
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, UserId};
use teloxide::utils::markdown::{bold, code_inline, escape};
use teloxide::{ApiError, RequestError};

use super::*;
use crate::bots::CallbackMessage;
use crate::impls::LoggableErrorResult;
use crate::payment::Invoice;
use crate::persistent::Statistics;
use crate::shop::{Order, OrderEvent, OrderId, OrderStatus, PaymentMethod, PremiumPeriod, ProductDetails, Tariff};

/// A rendered bot message: MarkdownV2 text plus optional inline keyboard.
pub struct Screen {
    pub text: String,
    pub markup: Option<InlineKeyboardMarkup>,
}

impl Screen {
    fn new(text: String) -> Self {
        Self { text, markup: None }
    }
    /// Plain text, escaped for MarkdownV2.
    pub fn plain(text: &str) -> Self {
        Self::new(escape(text))
    }
    fn with_rows(mut self, rows: Vec<Vec<InlineKeyboardButton>>) -> Self {
        self.markup = Some(InlineKeyboardMarkup::new(rows));
        self
    }
}

fn button(text: &str, response: CallbackResponse) -> anyhow::Result<InlineKeyboardButton> {
    Ok(InlineKeyboardButton::callback(text.to_owned(), response.to_string()?))
}

fn url_button(text: &str, url: &str) -> anyhow::Result<InlineKeyboardButton> {
    Ok(InlineKeyboardButton::url(text.to_owned(), url.parse::<reqwest::Url>()?))
}

fn menu_row() -> anyhow::Result<Vec<InlineKeyboardButton>> {
    Ok(vec![button("🏠 Главное меню", CallbackResponse::MainMenu)?])
}

pub fn rub(amount: Decimal) -> String {
    format!("{:.2} ₽", amount)
}

pub fn stars(count: u32) -> String {
    count.to_formatted_string(&Locale::ru)
}

pub fn describe(product: &ProductDetails) -> String {
    match product {
        ProductDetails::Stars { stars: count } => format!("⭐ {} звёзд", stars(*count)),
        ProductDetails::Premium { period } => format!("💎 Telegram Premium на {}", period.name()),
        ProductDetails::Exchange { amount_rub, amount_usd, exchange_rate } =>
            format!("💱 Обмен {} → {:.2} $ (курс {})", rub(*amount_rub), amount_usd, exchange_rate),
    }
}

fn status_name(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "создан",
        OrderStatus::WaitingPayment => "ожидает оплаты картой",
        OrderStatus::WaitingCrypto => "ожидает оплаты в CryptoBot",
        OrderStatus::WaitingConfirmation => "ожидает проверки",
        OrderStatus::Confirmed => "оплата подтверждена",
        OrderStatus::Completed => "выполнен",
        OrderStatus::Cancelled => "отменён",
    }
}

fn order_lines(order: &Order) -> String {
    let mut text = format!("{}\n", bold(&escape(&format!("Заказ #{}", order.id))));
    text += &escape(&describe(&order.details.product));
    text += "\n";
    if let Some(recipient) = &order.recipient {
        text += &escape(&format!("Получатель: @{}\n", recipient));
    }
    text += &escape(&format!("Сумма: {}\n", rub(order.amount_rub)));
    text
}

pub fn main_menu(conf: &StoreConfig) -> anyhow::Result<Screen> {
    let text = format!(
        "{}\n\n{}",
        bold("DigiStore"),
        escape("Звёзды и Telegram Premium для вас и ваших друзей, обмен рублей на доллары. Выберите, что вас интересует:"),
    );
    Ok(Screen::new(text).with_rows(vec![
        vec![button("⭐ Купить звёзды", CallbackResponse::BuyStars)?],
        vec![button("💎 Telegram Premium", CallbackResponse::BuyPremium)?],
        vec![button("💱 Обмен RUB → USD", CallbackResponse::Exchange)?],
        vec![
            button("ℹ️ Информация", CallbackResponse::Info)?,
            url_button("🆘 Поддержка", &conf.support_url())?,
        ],
    ]))
}

pub fn info(conf: &StoreConfig) -> anyhow::Result<Screen> {
    let text = escape(&format!(
        "DigiStore работает с 2023 года.\n\nОтзывы покупателей: {}\nНовости магазина: {}\nПоддержка: @{}",
        conf.reputation_channel, conf.news_channel, conf.support_user.trim_start_matches('@'),
    ));
    Ok(Screen::new(text).with_rows(vec![
        vec![url_button("⭐ Отзывы", &conf.reputation_channel)?, url_button("📰 Новости", &conf.news_channel)?],
        menu_row()?,
    ]))
}

pub fn my_id(user_id: UserId) -> Screen {
    Screen::new(format!("{} {}", escape("Ваш Telegram ID:"), code_inline(&user_id.0.to_string())))
}

pub fn stars_prompt(tariff: &Tariff) -> anyhow::Result<Screen> {
    let text = escape(&format!(
        "⭐ Покупка звёзд\n\nКурс: 1 звезда = {}\nМожно купить от {} до {} звёзд.\n\nВведите username получателя (можно с @):",
        rub(tariff.star_rate), stars(tariff.min_stars), stars(tariff.max_stars),
    ));
    Ok(Screen::new(text).with_rows(vec![menu_row()?]))
}

pub fn stars_amount_prompt(recipient: &str, tariff: &Tariff) -> anyhow::Result<Screen> {
    let text = escape(&format!(
        "Получатель: @{}\n\nСколько звёзд купить? Введите число от {} до {}.",
        recipient, stars(tariff.min_stars), stars(tariff.max_stars),
    ));
    Ok(Screen::new(text).with_rows(vec![menu_row()?]))
}

pub fn premium_menu(tariff: &Tariff) -> anyhow::Result<Screen> {
    let mut rows = Vec::with_capacity(tariff.premium.len() + 1);
    for (period, price) in tariff.premium.iter() {
        let label = format!("{} — {}", period.name(), rub(*price));
        rows.push(vec![button(&label, CallbackResponse::Premium(*period))?]);
    }
    rows.push(menu_row()?);
    Ok(Screen::plain("💎 Telegram Premium\n\nВыберите срок подписки:").with_rows(rows))
}

pub fn premium_prompt(period: PremiumPeriod, tariff: &Tariff) -> anyhow::Result<Screen> {
    let text = escape(&format!(
        "💎 Telegram Premium на {} за {}\n\nВведите username получателя (можно с @):",
        period.name(), rub(tariff.premium_price(period)),
    ));
    Ok(Screen::new(text).with_rows(vec![
        vec![button("⬅️ Другой срок", CallbackResponse::BuyPremium)?],
        menu_row()?,
    ]))
}

pub fn exchange_prompt(tariff: &Tariff) -> anyhow::Result<Screen> {
    let text = escape(&format!(
        "💱 Обмен RUB → USD\n\nКурс: 1 $ = {}\nСумма: от {} до {}\n\nВведите сумму в рублях:",
        rub(tariff.usd_rate), rub(tariff.min_exchange), rub(tariff.max_exchange),
    ));
    Ok(Screen::new(text).with_rows(vec![menu_row()?]))
}

pub fn payment_choice(order: &Order, crypto_enabled: bool) -> anyhow::Result<Screen> {
    let text = format!("{}\n{}", order_lines(order), escape("Выберите способ оплаты:"));
    let mut rows = vec![vec![button("💳 Банковская карта", CallbackResponse::CardPay(order.id))?]];
    if crypto_enabled && order.product_type().accepts(PaymentMethod::Crypto) {
        rows.push(vec![button("🪙 CryptoBot (USDT)", CallbackResponse::CryptoPay(order.id))?]);
    }
    rows.push(menu_row()?);
    Ok(Screen::new(text).with_rows(rows))
}

pub fn card_payment(order: &Order, card_number: &str) -> anyhow::Result<Screen> {
    let text = format!(
        "{}\n{} {}\n{}\n\n{}",
        order_lines(order),
        escape("Переведите"),
        bold(&escape(&rub(order.amount_rub))),
        escape("на карту:"),
        code_inline(card_number),
    ) + &escape("\n\nПосле перевода нажмите «Я оплатил» и пришлите скриншот чека.");
    Ok(Screen::new(text).with_rows(vec![
        vec![button("✅ Я оплатил", CallbackResponse::ConfirmPaid(order.id))?],
        menu_row()?,
    ]))
}

pub fn proof_prompt(order_id: OrderId) -> anyhow::Result<Screen> {
    let text = escape(&format!("Пришлите фото или скриншот чека об оплате заказа #{} одним изображением.", order_id));
    Ok(Screen::new(text).with_rows(vec![
        vec![button("❌ Отмена", CallbackResponse::CancelPhoto(order_id))?],
    ]))
}

pub fn proof_received(order: &Order) -> Screen {
    let mut text = format!("Спасибо! Чек по заказу #{} получен и передан администратору.", order.id);
    if let ProductDetails::Exchange { amount_usd, .. } = &order.details.product {
        text += &format!(" После проверки вы получите {:.2} $.", amount_usd);
    }
    text += " Мы сообщим, когда заказ будет выполнен.";
    Screen::plain(&text)
}

pub fn crypto_invoice(order: &Order, invoice: &Invoice) -> anyhow::Result<Screen> {
    let text = format!(
        "{}\n{}",
        order_lines(order),
        escape(&format!("К оплате: {:.2} {}\n\nОплатите счёт в CryptoBot, затем нажмите «Проверить оплату».", invoice.amount, invoice.asset)),
    );
    Ok(Screen::new(text).with_rows(vec![
        vec![url_button("🪙 Оплатить", &invoice.pay_url)?],
        vec![button("🔄 Проверить оплату", CallbackResponse::CheckCrypto(order.id))?],
        menu_row()?,
    ]))
}

pub fn crypto_paid(order: &Order) -> anyhow::Result<Screen> {
    let text = escape(&format!("✅ Оплата заказа #{} получена. Заказ будет выполнен в ближайшее время.", order.id));
    Ok(Screen::new(text).with_rows(vec![menu_row()?]))
}

pub fn crypto_expired(order_id: OrderId) -> anyhow::Result<Screen> {
    Ok(Screen::plain("Срок действия счёта истёк. Выберите способ оплаты заново.").with_rows(vec![
        vec![button("💳 Банковская карта", CallbackResponse::CardPay(order_id))?],
        vec![button("🪙 CryptoBot (USDT)", CallbackResponse::CryptoPay(order_id))?],
        menu_row()?,
    ]))
}

/// Summary an admin sees for an order, with the commands that act on it.
pub fn admin_order(order: &Order) -> Screen {
    let mut text = order_lines(order);
    text += &escape(&format!(
        "Покупатель: {}\nОплата: {}\nСтатус: {}\nСоздан: {}\n",
        order.user_id,
        match order.payment_method {
            PaymentMethod::Card => "карта",
            PaymentMethod::Crypto => "CryptoBot",
        },
        status_name(order.status),
        order.created_at.format("%d.%m.%Y %H:%M UTC"),
    ));
    if let Some(invoice_id) = &order.invoice_id {
        text += &escape(&format!("Счёт: {}\n", invoice_id));
    }
    let commands: Vec<String> = [
        (OrderEvent::Confirm, "confirm", "подтвердить оплату"),
        (OrderEvent::Complete, "complete", "выполнен"),
        (OrderEvent::Cancel, "cancel", "отменить"),
    ].into_iter()
        .filter(|(event, ..)| order.status.apply(*event).map_or(false, |next| next != order.status))
        .map(|(_, command, hint)| format!("/{}_{} {}", command, order.id, hint))
        .collect();
    if !commands.is_empty() {
        text += &escape(&format!("\n{}", commands.join("\n")));
    }
    Screen::new(text)
}

pub fn admin_new_order(order: &Order, customer: &str) -> Screen {
    let header = match order.payment_method {
        PaymentMethod::Card => "🧾 Новый чек на проверку",
        PaymentMethod::Crypto => "🪙 Оплата через CryptoBot получена",
    };
    let text = format!(
        "{}\n{}{}",
        bold(&escape(header)),
        order_lines(order),
        escape(&format!("Покупатель: {}\n\n/check_{}", customer, order.id)),
    );
    Screen::new(text)
}

pub fn admin_panel(stats: &Statistics) -> anyhow::Result<Screen> {
    let text = format!(
        "{}\n\n{}",
        bold(&escape("Админ-панель")),
        escape(&format!(
            "Пользователей: {}\nВыполнено заказов: {}\nВыручка: {}\nОжидают проверки: {}",
            stats.users, stats.completed_orders, rub(stats.revenue), stats.awaiting_review,
        )),
    );
    Ok(Screen::new(text).with_rows(vec![
        vec![button("📊 Статистика", CallbackResponse::AdminStats)?],
        vec![button("🧾 Ожидают проверки", CallbackResponse::AdminPending)?],
        vec![button("✅ Выполненные", CallbackResponse::AdminCompleted)?],
        vec![button("🏠 Главное меню", CallbackResponse::MainMenu)?],
    ]))
}

pub fn admin_orders(title: &str, orders: &[Order]) -> anyhow::Result<Screen> {
    let mut text = bold(&escape(title));
    text += "\n\n";
    if orders.is_empty() {
        text += &escape("Заказов нет.");
    }
    for order in orders {
        text += &escape(&format!(
            "#{} {} {} {}\n/check_{}\n\n",
            order.id,
            order.created_at.format("%d.%m %H:%M"),
            describe(&order.details.product),
            rub(order.amount_rub),
            order.id,
        ));
    }
    Ok(Screen::new(text).with_rows(vec![
        vec![button("⬅️ Назад", CallbackResponse::AdminBack)?],
    ]))
}

/// Edits the message under a pressed button, or sends a new one.
pub async fn show(bot: &WBot, chat_id: ChatId, origin: &Origin, screen: Screen) -> Result<(), RequestError> {
    if let Origin::Callback { message_id: Some(message_id), .. } = origin {
        let mut request = bot.edit_message_text(chat_id, *message_id, screen.text.as_str())
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(markup) = screen.markup.clone() {
            request = request.reply_markup(markup);
        }
        match request.await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return Ok(()),
            // photo messages have no text to edit
            Err(e) => log::warn!("cannot edit message {} in {}: {}", message_id.0, chat_id.0, e),
        }
    }
    send(bot, chat_id, screen).await
}

pub async fn send(bot: &WBot, chat_id: ChatId, screen: Screen) -> Result<(), RequestError> {
    let mut request = bot.send_message(chat_id, screen.text).parse_mode(ParseMode::MarkdownV2);
    if let Some(markup) = screen.markup {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}

pub async fn send_photo(bot: &WBot, chat_id: ChatId, file_id: &str, caption: Screen) -> Result<(), RequestError> {
    bot.send_photo(chat_id, InputFile::file_id(file_id))
        .caption(caption.text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

/// What a handler answers with: a screen, or a short notice that keeps the current screen.
pub enum Reply {
    Show(Screen),
    Alert(String),
}

/// Stops the spinner on a pressed button. A notice becomes a popup there,
/// or a plain message when there is no button.
pub async fn acknowledge(bot: &WBot, chat_id: ChatId, origin: &Origin, alert: Option<&str>) -> Result<(), RequestError> {
    match (origin, alert) {
        (Origin::Callback { query_id, .. }, None) => {
            bot.answer_callback_query(query_id.clone()).await.ok_or_log();
        },
        (Origin::Callback { query_id, .. }, Some(text)) => {
            bot.answer_callback_query(query_id.clone()).text(text).show_alert(true).await.ok_or_log();
        },
        (Origin::Message, Some(text)) => send(bot, chat_id, Screen::plain(text)).await?,
        (Origin::Message, None) => {},
    }
    Ok(())
}

pub async fn reply(bot: &WBot, chat_id: ChatId, origin: &Origin, reply: Reply) -> Result<(), RequestError> {
    match reply {
        Reply::Show(screen) => {
            acknowledge(bot, chat_id, origin, None).await?;
            show(bot, chat_id, origin, screen).await
        },
        Reply::Alert(text) => acknowledge(bot, chat_id, origin, Some(&text)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::OrderDetails;
    use crate::shop::tariff::tests::{dec, tariff};
    use chrono::{TimeZone, Utc};

    fn order(product: ProductDetails, status: OrderStatus) -> Order {
        Order {
            id: 17,
            user_id: 1001,
            recipient: Some("durov".into()),
            amount_rub: tariff().price(&product),
            details: OrderDetails::from(product),
            payment_method: PaymentMethod::Card,
            status,
            invoice_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap(),
        }
    }

    fn callbacks(screen: &Screen) -> Vec<CallbackResponse> {
        screen.markup.iter()
            .flat_map(|m| m.inline_keyboard.iter().flatten())
            .filter_map(|b| match &b.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => CallbackResponse::parse(data).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn products_are_described() {
        assert_eq!(describe(&ProductDetails::Stars { stars: 50 }), "⭐ 50 звёзд");
        assert_eq!(rub(dec("1124.11")), "1124.11 ₽");
        assert_eq!(rub(dec("75")), "75.00 ₽");
        let exchange = tariff().exchange(dec("1000")).unwrap();
        assert_eq!(describe(&exchange), "💱 Обмен 1000.00 ₽ → 11.76 $ (курс 85)");
    }

    #[test]
    fn exchange_is_offered_card_only() {
        let exchange = order(tariff().exchange(dec("1000")).unwrap(), OrderStatus::Pending);
        assert_eq!(callbacks(&payment_choice(&exchange, true).unwrap()), vec![
            CallbackResponse::CardPay(17),
            CallbackResponse::MainMenu,
        ]);
        let stars = order(ProductDetails::Stars { stars: 100 }, OrderStatus::Pending);
        assert!(callbacks(&payment_choice(&stars, true).unwrap()).contains(&CallbackResponse::CryptoPay(17)));
        assert!(!callbacks(&payment_choice(&stars, false).unwrap()).contains(&CallbackResponse::CryptoPay(17)));
    }

    #[test]
    fn admin_summary_lists_commands_until_terminal() {
        let open = admin_order(&order(ProductDetails::Stars { stars: 100 }, OrderStatus::WaitingConfirmation));
        assert!(open.text.contains("/confirm\\_17"));
        assert!(open.text.contains("/cancel\\_17"));
        let done = admin_order(&order(ProductDetails::Stars { stars: 100 }, OrderStatus::Completed));
        assert!(!done.text.contains("/confirm"));
        assert!(!done.text.contains("/cancel"));
    }

    #[test]
    fn admin_summary_offers_only_applicable_commands() {
        for status in [OrderStatus::Pending, OrderStatus::WaitingPayment, OrderStatus::WaitingCrypto] {
            let screen = admin_order(&order(ProductDetails::Stars { stars: 100 }, status));
            assert!(!screen.text.contains("/complete"), "{:?}", status);
            assert!(screen.text.contains("/cancel\\_17"), "{:?}", status);
        }
        let pending = admin_order(&order(ProductDetails::Stars { stars: 100 }, OrderStatus::Pending));
        assert!(!pending.text.contains("/confirm"));

        let review = admin_order(&order(ProductDetails::Stars { stars: 100 }, OrderStatus::WaitingConfirmation));
        assert!(review.text.contains("/complete\\_17"));

        let confirmed = admin_order(&order(ProductDetails::Stars { stars: 100 }, OrderStatus::Confirmed));
        assert!(!confirmed.text.contains("/confirm"));
        assert!(confirmed.text.contains("/complete\\_17"));
    }

    #[test]
    fn exchange_acknowledgement_names_the_payout() {
        let exchange = order(tariff().exchange(dec("850.5")).unwrap(), OrderStatus::WaitingConfirmation);
        assert!(proof_received(&exchange).text.contains("10\\.01 $"));
        let stars = order(ProductDetails::Stars { stars: 100 }, OrderStatus::WaitingConfirmation);
        assert!(!proof_received(&stars).text.contains('$'));
    }

    #[test]
    fn premium_menu_has_every_period() {
        let screen = premium_menu(&tariff()).unwrap();
        assert_eq!(callbacks(&screen), vec![
            CallbackResponse::Premium(PremiumPeriod::ThreeMonths),
            CallbackResponse::Premium(PremiumPeriod::SixMonths),
            CallbackResponse::Premium(PremiumPeriod::Year),
            CallbackResponse::MainMenu,
        ]);
    }
}

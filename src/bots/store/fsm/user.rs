use teloxide::types::ChatId;

use super::*;
use super::super::impls::{self as screens, Reply, Screen};
use crate::bots::make_username;
use crate::persistent::NewUser;
use crate::shop::{CryptoCheck, Order, ShopError};

pub fn process_user(handler: FSMHandler) -> FSMHandler {
    handler.branch(
        dptree::filter_map(Signal::filter_content)
        .endpoint(on_content)
    ).branch(
        dptree::filter_map(Signal::filter_user_action)
        .endpoint(on_user_action)
    )
}

/// User facing text for errors the user can do something about.
fn explain(e: ShopError) -> Result<Reply, ShopError> {
    let text = match &e {
        ShopError::NotFound(_) => "Заказ не найден.",
        ShopError::Transition(_) => "Этот заказ уже нельзя изменить. Оформите новый через главное меню.",
        ShopError::Conflict(_) => "Заказ только что изменился, попробуйте ещё раз.",
        ShopError::MethodNotAllowed(..) => "Этот заказ оплачивается только банковской картой.",
        ShopError::GatewayDisabled => "Оплата через CryptoBot временно недоступна. Выберите оплату картой.",
        ShopError::NoInvoice(_) => "Счёт не найден, выберите способ оплаты заново.",
        ShopError::Gateway(err) => {
            log::error!("payment gateway failed: {}", err);
            "Платёжный сервис не отвечает, попробуйте чуть позже."
        },
        ShopError::Storage(_) => return Err(e),
    };
    log::warn!("{}", e);
    Ok(Reply::Alert(text.to_owned()))
}

fn shown<T>(result: Result<T, ShopError>, render: impl FnOnce(T) -> anyhow::Result<Screen>) -> Result<Reply, Box<dyn std::error::Error + Send + Sync>> {
    match result {
        Ok(value) => Ok(Reply::Show(render(value)?)),
        Err(e) => Ok(explain(e)?),
    }
}

async fn notify_admins(bot: &WBot, conf: &StoreConfig, order: &Order, customer: &str) {
    for admin in conf.admins() {
        let chat_id = ChatId(admin.0 as i64);
        let summary = screens::admin_new_order(order, customer);
        let sent = match &order.details.payment_proof {
            Some(file_id) => screens::send_photo(bot, chat_id, file_id, summary).await,
            None => screens::send(bot, chat_id, summary).await,
        };
        if let Err(e) = sent {
            log::warn!("admin {} was not notified about order #{}: {}", admin.0, order.id, e);
        }
    }
}

async fn on_content(
    bot: WBot,
    dialogue: MyDialogue,
    state: State,
    content: Content,
    signal: Signal,
    shop: ShopRef,
    conf: Conf,
) -> FSMResult {
    let chat_id = dialogue.chat_id();
    let user = signal.user();
    let user_id = user.id.0 as i64;
    let tariff = shop.tariff();
    let (next, response) = state.process(content, tariff);
    let screen = match response {
        Response::UseMenu => {
            screens::send(&bot, chat_id, Screen::plain("Воспользуйтесь кнопками меню 👇")).await?;
            screens::main_menu(&conf)?
        },
        Response::ExpectText => Screen::plain("Отправьте ответ текстом."),
        Response::SendPhoto => Screen::plain("Пришлите, пожалуйста, фото или скриншот чека."),
        Response::BadRecipient => Screen::plain("Некорректный username. Введите его одним словом, например @durov."),
        Response::AskStarsAmount(recipient) => screens::stars_amount_prompt(&recipient, tariff)?,
        Response::NotANumber => Screen::plain("Не похоже на число, попробуйте ещё раз."),
        Response::StarsOutOfRange => Screen::plain(&format!(
            "Количество звёзд должно быть от {} до {}.",
            screens::stars(tariff.min_stars), screens::stars(tariff.max_stars),
        )),
        Response::ExchangeOutOfRange => Screen::plain(&format!(
            "Сумма обмена должна быть от {} до {}.",
            screens::rub(tariff.min_exchange), screens::rub(tariff.max_exchange),
        )),
        Response::PlaceOrder(draft) => {
            let order = shop.place_order(user_id, draft).await?;
            screens::payment_choice(&order, shop.crypto_enabled())?
        },
        Response::ProofReceived(order_id, file_id) => {
            set_state(&dialogue, next).await?;
            match shop.submit_proof(order_id, user_id, file_id).await {
                Ok(order) => {
                    notify_admins(&bot, &conf, &order, &make_username(user)).await;
                    screens::send(&bot, chat_id, screens::proof_received(&order)).await?;
                    screens::send(&bot, chat_id, screens::main_menu(&conf)?).await?;
                },
                Err(e) => {
                    let reply = explain(e)?;
                    screens::reply(&bot, chat_id, signal.origin(), reply).await?;
                },
            }
            return Ok(())
        },
    };
    screens::send(&bot, chat_id, screen).await?;
    set_state(&dialogue, next).await
}

async fn on_user_action(
    bot: WBot,
    dialogue: MyDialogue,
    action: UserAction,
    signal: Signal,
    shop: ShopRef,
    conf: Conf,
) -> FSMResult {
    let chat_id = dialogue.chat_id();
    let user = signal.user();
    let user_id = user.id.0 as i64;
    let reply = match action {
        UserAction::Start => {
            let new = shop.register_user(&NewUser {
                id: user_id,
                username: user.username.clone(),
                full_name: user.full_name(),
            }).await?;
            if new {
                log::info!("new user {}", make_username(user));
            }
            dialogue.exit().await?;
            Reply::Show(screens::main_menu(&conf)?)
        },
        UserAction::MyId => Reply::Show(screens::my_id(user.id)),
        UserAction::MainMenu => {
            dialogue.exit().await?;
            Reply::Show(screens::main_menu(&conf)?)
        },
        UserAction::BuyStars => {
            dialogue.update(State::WaitStarsRecipient).await?;
            Reply::Show(screens::stars_prompt(shop.tariff())?)
        },
        UserAction::BuyPremium => {
            dialogue.exit().await?;
            Reply::Show(screens::premium_menu(shop.tariff())?)
        },
        UserAction::Premium(period) => {
            dialogue.update(State::WaitPremiumRecipient(period)).await?;
            Reply::Show(screens::premium_prompt(period, shop.tariff())?)
        },
        UserAction::Exchange => {
            dialogue.update(State::WaitExchangeAmount).await?;
            Reply::Show(screens::exchange_prompt(shop.tariff())?)
        },
        UserAction::Info => Reply::Show(screens::info(&conf)?),
        UserAction::CardPay(order_id) => shown(
            shop.pay_by_card(order_id, user_id).await,
            |order| screens::card_payment(&order, &conf.card_number),
        )?,
        UserAction::CryptoPay(order_id) => shown(
            shop.pay_by_crypto(order_id, user_id).await,
            |(order, invoice)| screens::crypto_invoice(&order, &invoice),
        )?,
        UserAction::CheckCrypto(order_id) => match shop.check_crypto(order_id, user_id).await {
            Ok(CryptoCheck::Paid(order)) => {
                notify_admins(&bot, &conf, &order, &make_username(user)).await;
                Reply::Show(screens::crypto_paid(&order)?)
            },
            Ok(CryptoCheck::AlreadyConfirmed(order)) => Reply::Show(screens::crypto_paid(&order)?),
            Ok(CryptoCheck::NotPaid) => Reply::Alert("Оплата ещё не поступила. Если вы уже оплатили, подождите минуту и проверьте снова.".into()),
            Ok(CryptoCheck::Expired) => Reply::Show(screens::crypto_expired(order_id)?),
            Err(e) => explain(e)?,
        },
        UserAction::ConfirmPaid(order_id) => match shop.proof_expected(order_id, user_id).await {
            Ok(order) => {
                dialogue.update(State::WaitPaymentProof(order.id)).await?;
                Reply::Show(screens::proof_prompt(order.id)?)
            },
            Err(e) => explain(e)?,
        },
        UserAction::CancelPhoto(order_id) => {
            dialogue.exit().await?;
            shown(
                shop.order_of(order_id, user_id).await,
                |order| screens::card_payment(&order, &conf.card_number),
            )?
        },
    };
    screens::reply(&bot, chat_id, signal.origin(), reply).await?;
    Ok(())
}

use super::*;
use super::super::impls::{self as screens, Reply, Screen};
use crate::shop::{OrderEvent, OrderId, ShopError};

const LIST_LIMIT: i64 = 20;

pub fn process_admin(handler: FSMHandler) -> FSMHandler {
    handler.branch(
        dptree::filter_map(Signal::filter_admin_action)
        .branch(dptree::filter(filter_admin).endpoint(on_admin_action))
        .endpoint(on_stranger)
    )
}

fn filter_admin(signal: Signal, conf: Conf) -> bool {
    conf.is_admin(&signal.user().id)
}

async fn on_stranger(
    bot: WBot,
    dialogue: MyDialogue,
    action: AdminAction,
    signal: Signal,
) -> FSMResult {
    if action.is_order_command() {
        log::warn!("{:?} from non-admin {}", action, signal.user().id.0);
        return Ok(())
    }
    screens::reply(&bot, dialogue.chat_id(), signal.origin(), Reply::Alert("⛔ Доступ запрещён".into())).await?;
    Ok(())
}

async fn decide(shop: &ShopRef, order_id: OrderId, event: OrderEvent) -> Result<Reply, ShopError> {
    let verb = match event {
        OrderEvent::Confirm => "подтверждён",
        OrderEvent::Complete => "выполнен",
        _ => "отменён",
    };
    let text = match shop.decide(order_id, event).await {
        Ok(applied) if applied.changed => format!("✅ Заказ #{} {}", order_id, verb),
        Ok(_) => format!("Заказ #{} уже {}, ничего не изменилось", order_id, verb),
        Err(ShopError::NotFound(_)) => format!("❌ Заказ #{} не найден", order_id),
        Err(ShopError::Transition(e)) => format!("❌ Заказ #{}: {}", order_id, e),
        Err(ShopError::Conflict(_)) => format!("❌ Заказ #{} только что изменился, повторите команду", order_id),
        Err(e) => return Err(e),
    };
    Ok(Reply::Show(Screen::plain(&text)))
}

async fn on_admin_action(
    bot: WBot,
    dialogue: MyDialogue,
    action: AdminAction,
    signal: Signal,
    shop: ShopRef,
) -> FSMResult {
    let chat_id = dialogue.chat_id();
    let origin = signal.origin();
    let reply = match action {
        AdminAction::Panel | AdminAction::Stats => {
            Reply::Show(screens::admin_panel(&shop.statistics().await?)?)
        },
        AdminAction::Pending => {
            let orders = shop.awaiting_review(LIST_LIMIT).await?;
            Reply::Show(screens::admin_orders("🧾 Ожидают проверки", &orders)?)
        },
        AdminAction::Completed => {
            let orders = shop.recently_completed(LIST_LIMIT).await?;
            Reply::Show(screens::admin_orders("✅ Последние выполненные", &orders)?)
        },
        AdminAction::Check(order_id) => match shop.order(order_id).await {
            Ok(order) => {
                if let Some(file_id) = &order.details.payment_proof {
                    let caption = Screen::plain(&format!("📸 Чек по заказу #{}", order.id));
                    screens::send_photo(&bot, chat_id, file_id, caption).await?;
                }
                Reply::Show(screens::admin_order(&order))
            },
            Err(ShopError::NotFound(_)) => Reply::Show(Screen::plain(&format!("❌ Заказ #{} не найден", order_id))),
            Err(e) => return Err(e.into()),
        },
        AdminAction::Confirm(order_id) => decide(&shop, order_id, OrderEvent::Confirm).await?,
        AdminAction::Complete(order_id) => decide(&shop, order_id, OrderEvent::Complete).await?,
        AdminAction::Cancel(order_id) => decide(&shop, order_id, OrderEvent::Cancel).await?,
        AdminAction::Usage(format) => Reply::Show(Screen::plain(&format!("❌ Формат: {}", format))),
    };
    screens::reply(&bot, chat_id, origin, reply).await?;
    Ok(())
}

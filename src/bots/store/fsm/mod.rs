use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use self::admin::process_admin;
use self::user::process_user;

use super::*;
use crate::shop::{FileId, OrderDraft, OrderId, PremiumPeriod, ProductDetails, Tariff};

type MyDialogue = Dialogue<State, MyStorage>;
type Conf = std::sync::Arc<StoreConfig>;
type ShopRef = std::sync::Arc<crate::shop::Shop>;

mod user;
mod admin;

pub type FSMResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type FSMHandler = Handler<'static, DependencyMap, FSMResult, teloxide::dispatching::DpHandlerDescription>;

/// Input the bot expects next from a chat.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub enum State {
    #[default]
    Ready,
    WaitStarsRecipient,
    WaitStarsAmount(String),
    WaitPremiumRecipient(PremiumPeriod),
    WaitExchangeAmount,
    WaitPaymentProof(OrderId),
}

#[derive(Debug, PartialEq)]
pub enum Response {
    UseMenu,
    ExpectText,
    SendPhoto,
    BadRecipient,
    AskStarsAmount(String),
    NotANumber,
    StarsOutOfRange,
    ExchangeOutOfRange,
    PlaceOrder(OrderDraft),
    ProofReceived(OrderId, FileId),
}

impl State {
    pub fn process(self, content: Content, tariff: &Tariff) -> (State, Response) {
        use State::*;
        use Response as R;
        let text = match content {
            Content::Photo(file_id) => return match self {
                Ready => (Ready, R::UseMenu),
                WaitPaymentProof(order_id) => (Ready, R::ProofReceived(order_id, file_id)),
                state => (state, R::ExpectText),
            },
            Content::Text(text) => text,
        };
        match self {
            Ready => (Ready, R::UseMenu),
            WaitPaymentProof(_) => (self, R::SendPhoto),
            WaitStarsRecipient => match parse_recipient(&text) {
                Some(recipient) => (WaitStarsAmount(recipient.clone()), R::AskStarsAmount(recipient)),
                None => (self, R::BadRecipient),
            },
            WaitStarsAmount(recipient) => {
                let Some(stars) = parse_integer(&text) else {
                    return (WaitStarsAmount(recipient), R::NotANumber)
                };
                match u32::try_from(stars) {
                    Ok(stars) if tariff.stars_in_range(stars) => {
                        let draft = OrderDraft { recipient: Some(recipient), product: ProductDetails::Stars { stars } };
                        (Ready, R::PlaceOrder(draft))
                    },
                    _ => (WaitStarsAmount(recipient), R::StarsOutOfRange),
                }
            },
            WaitPremiumRecipient(period) => match parse_recipient(&text) {
                Some(recipient) => {
                    let draft = OrderDraft { recipient: Some(recipient), product: ProductDetails::Premium { period } };
                    (Ready, R::PlaceOrder(draft))
                },
                None => (self, R::BadRecipient),
            },
            WaitExchangeAmount => {
                let Some(amount) = parse_amount(&text) else {
                    return (self, R::NotANumber)
                };
                match tariff.exchange(amount) {
                    Some(product) => (Ready, R::PlaceOrder(OrderDraft { recipient: None, product })),
                    None => (self, R::ExchangeOutOfRange),
                }
            },
        }
    }
}

/// Telegram username without the leading `@`.
fn parse_recipient(text: &str) -> Option<String> {
    let name = text.trim();
    let name = name.strip_prefix('@').unwrap_or(name);
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None
    }
    Some(name.to_owned())
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    digits.parse().ok()
}

fn parse_amount(text: &str) -> Option<Decimal> {
    let amount: String = text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&amount).ok()
}

/// `Ready` is stored as no session at all.
async fn set_state(dialogue: &MyDialogue, state: State) -> FSMResult {
    match state {
        State::Ready => dialogue.exit().await?,
        state => dialogue.update(state).await?,
    }
    Ok(())
}

pub fn make_dialogue_handler() -> FSMHandler {
    dptree::filter_map(Signal::from_update)
    .enter_dialogue::<Signal, MyStorage, State>()
    .branch(process_user(dptree::entry()))
    .branch(process_admin(dptree::entry()))
}

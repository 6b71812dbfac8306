use std::str::FromStr;

use serde::{Serialize, Deserialize};

use teloxide::dispatching::dialogue::GetChatId;
use teloxide::types::{ChatId, MediaKind, MessageId, MessageKind, Update, UpdateKind, User};

use crate::bots::CallbackMessage;
use crate::shop::{FileId, OrderId, PremiumPeriod};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackResponse {
    MainMenu,
    BuyStars,
    BuyPremium,
    Premium(PremiumPeriod),
    Exchange,
    Info,
    CardPay(OrderId),
    CryptoPay(OrderId),
    CheckCrypto(OrderId),
    ConfirmPaid(OrderId),
    CancelPhoto(OrderId),
    AdminStats,
    AdminPending,
    AdminCompleted,
    AdminBack,
}

impl CallbackMessage for CallbackResponse {}

#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text(String),
    Photo(FileId),
}

#[derive(Clone, Debug, PartialEq)]
enum Command {
    Start,
    MyId,
    Admin,
    Check(OrderId),
    Confirm(OrderId),
    Complete(OrderId),
    Cancel(OrderId),
    Usage(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub enum UserAction {
    Start,
    MyId,
    MainMenu,
    BuyStars,
    BuyPremium,
    Premium(PremiumPeriod),
    Exchange,
    Info,
    CardPay(OrderId),
    CryptoPay(OrderId),
    CheckCrypto(OrderId),
    ConfirmPaid(OrderId),
    CancelPhoto(OrderId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AdminAction {
    Panel,
    Stats,
    Pending,
    Completed,
    Check(OrderId),
    Confirm(OrderId),
    Complete(OrderId),
    Cancel(OrderId),
    Usage(&'static str),
}

impl AdminAction {
    /// Order commands are typed by hand, strangers get no hint they exist.
    pub fn is_order_command(&self) -> bool {
        matches!(self, Self::Check(_) | Self::Confirm(_) | Self::Complete(_) | Self::Cancel(_) | Self::Usage(_))
    }
}

#[derive(Clone, Debug)]
pub enum SignalKind {
    UserAction(UserAction),
    AdminAction(AdminAction),
    Content(Content),
}

/// Where the update came from: a plain message or a button under a bot message.
#[derive(Clone, Debug)]
pub enum Origin {
    Message,
    Callback { query_id: String, message_id: Option<MessageId> },
}

#[derive(Clone)]
pub struct Signal {
    chat_id: ChatId,
    user: User,
    kind: SignalKind,
    origin: Origin,
}

impl Signal {
    pub fn from_update(u: Update) -> Option<Self> {
        match u.kind {
            UpdateKind::Message(msg) => {
                if !msg.chat.is_private() {
                    return None
                }
                let chat_id = msg.chat.id;
                let MessageKind::Common(msg) = msg.kind else { return None };
                let user = msg.from?;
                let content = media_to_content(msg.media_kind)?;
                let kind = match content {
                    Content::Text(text) if text.starts_with('/') => Command::from_str(&text).ok()?.into(),
                    content => SignalKind::Content(content),
                };
                Some(Signal { chat_id, user, kind, origin: Origin::Message })
            },
            UpdateKind::CallbackQuery(q) => {
                let user = q.from;
                let message_id = q.message.as_ref().map(|m| m.id);
                let chat_id = q.message.as_ref().map(|m| m.chat.id).unwrap_or(ChatId(user.id.0 as i64));
                let data = q.data?;
                match CallbackResponse::parse(data.as_str()) {
                    Ok(response) => Some(Signal {
                        chat_id,
                        user,
                        kind: response.into(),
                        origin: Origin::Callback { query_id: q.id, message_id },
                    }),
                    Err(e) => {
                        log::error!("cannot parse callback data: {:?}", e);
                        None
                    },
                }
            },
            UpdateKind::Error(e) => {
                log::error!("Received error: {:?}", e);
                None
            },
            _ => None,
        }
    }
    pub fn filter_user_action(self) -> Option<UserAction> {
        match self.kind {
            SignalKind::UserAction(action) => Some(action),
            _ => None,
        }
    }
    pub fn filter_admin_action(self) -> Option<AdminAction> {
        match self.kind {
            SignalKind::AdminAction(action) => Some(action),
            _ => None
        }
    }
    pub fn filter_content(self) -> Option<Content> {
        match self.kind {
            SignalKind::Content(c) => Some(c),
            _ => None,
        }
    }
    pub fn user(&self) -> &User {
        &self.user
    }
    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

impl GetChatId for Signal {
    fn chat_id(&self) -> Option<ChatId> {
        Some(self.chat_id)
    }
}

fn parse_order_command(cmd: &str) -> Option<Command> {
    let (name, id) = cmd.strip_prefix('/')?.split_once('_')?;
    let make: fn(OrderId) -> Command = match name {
        "check" => Command::Check,
        "confirm" => Command::Confirm,
        "complete" => Command::Complete,
        "cancel" => Command::Cancel,
        _ => return None,
    };
    match id.parse::<OrderId>() {
        Ok(id) if id > 0 => Some(make(id)),
        _ => Some(Command::Usage(match name {
            "check" => "/check_123",
            "confirm" => "/confirm_123",
            "complete" => "/complete_123",
            _ => "/cancel_123",
        })),
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = s.split_whitespace().next().ok_or(())?;
        // "/check_5@DigiStoreBot" is what group style clients send
        let cmd = cmd.split('@').next().unwrap_or(cmd);
        match cmd {
            "/start" | "/help" => Ok(Self::Start),
            "/myid" => Ok(Self::MyId),
            "/admin" => Ok(Self::Admin),
            _ => parse_order_command(cmd).ok_or(()),
        }
    }
}

impl From<Command> for SignalKind {
    fn from(cmd: Command) -> Self {
        use SignalKind as SK;
        match cmd {
            Command::Start => SK::UserAction(UserAction::Start),
            Command::MyId => SK::UserAction(UserAction::MyId),
            Command::Admin => SK::AdminAction(AdminAction::Panel),
            Command::Check(id) => SK::AdminAction(AdminAction::Check(id)),
            Command::Confirm(id) => SK::AdminAction(AdminAction::Confirm(id)),
            Command::Complete(id) => SK::AdminAction(AdminAction::Complete(id)),
            Command::Cancel(id) => SK::AdminAction(AdminAction::Cancel(id)),
            Command::Usage(format) => SK::AdminAction(AdminAction::Usage(format)),
        }
    }
}

impl From<CallbackResponse> for SignalKind {
    fn from(response: CallbackResponse) -> Self {
        use SignalKind as SK;
        use CallbackResponse as CR;
        match response {
            CR::MainMenu => SK::UserAction(UserAction::MainMenu),
            CR::BuyStars => SK::UserAction(UserAction::BuyStars),
            CR::BuyPremium => SK::UserAction(UserAction::BuyPremium),
            CR::Premium(period) => SK::UserAction(UserAction::Premium(period)),
            CR::Exchange => SK::UserAction(UserAction::Exchange),
            CR::Info => SK::UserAction(UserAction::Info),
            CR::CardPay(id) => SK::UserAction(UserAction::CardPay(id)),
            CR::CryptoPay(id) => SK::UserAction(UserAction::CryptoPay(id)),
            CR::CheckCrypto(id) => SK::UserAction(UserAction::CheckCrypto(id)),
            CR::ConfirmPaid(id) => SK::UserAction(UserAction::ConfirmPaid(id)),
            CR::CancelPhoto(id) => SK::UserAction(UserAction::CancelPhoto(id)),
            CR::AdminStats => SK::AdminAction(AdminAction::Stats),
            CR::AdminPending => SK::AdminAction(AdminAction::Pending),
            CR::AdminCompleted => SK::AdminAction(AdminAction::Completed),
            CR::AdminBack => SK::AdminAction(AdminAction::Panel),
        }
    }
}

pub fn media_to_content(media: MediaKind) -> Option<Content> {
    let content = match media {
        MediaKind::Photo(mut photo) => {
            photo.photo.sort_unstable_by_key(|size| size.width * size.height);
            Content::Photo(photo.photo.last()?.file.id.clone())
        },
        MediaKind::Text(m) => Content::Text(m.text),
        _ => return None
    };
    Some(content)
}

use std::sync::Arc;

use crossbeam::channel::Sender;
use teloxide::dispatching::update_listeners::UpdateListener;
use teloxide::error_handlers::ErrorHandler;
use teloxide::stop::StopToken;
use teloxide::types::BotCommand;
use teloxide::RequestError;

use super::*;
use crate::impls::LoggableErrorResult;
use crate::persistent::{DBAction, SavedSession};
use crate::shop::Shop;

pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Главное меню"),
        BotCommand::new("help", "Помощь"),
        BotCommand::new("myid", "Мой Telegram ID"),
        BotCommand::new("admin", "Админ-панель"),
    ]
}

/// Runs the storefront until ctrl-c or until telegram rejects the token.
pub fn start(
    config: StoreConfig,
    shop: Arc<Shop>,
    ttl: chrono::Duration,
    sender: Sender<DBAction>,
    saved: Vec<SavedSession>,
) -> tokio::task::JoinHandle<()> {
    let config = Arc::new(config);
    let bot = Bot::new(config.token.as_str()).throttle(Default::default());
    let storage = MyStorage::recover(ttl, sender, saved);
    let mut dispatcher = Dispatcher::builder(bot.clone(), fsm::make_dialogue_handler())
        .dependencies(dptree::deps![storage, config, shop])
        .enable_ctrlc_handler()
        .build();
    tokio::spawn(async move {
        let bot_username = bot.get_me().await.ok_or_log()
            .map(|me| me.username().to_owned())
            .unwrap_or_else(|| "unknown".to_owned());
        if let Err(e) = bot.set_my_commands(bot_commands()).await {
            log::error!("Error on bot starting: {:?}", e);
            return
        }
        let mut listener = teloxide::dispatching::update_listeners::polling_default(bot.clone()).await;
        let stop_token = listener.stop_token();
        log::info!("Bot @{} started!", bot_username);
        dispatcher.dispatch_with_listener(
            listener,
            Arc::new(StoppableErrorHandler(stop_token))
        ).await;
        log::info!("Bot @{} stopped", bot_username);
    })
}

struct StoppableErrorHandler(StopToken);

impl ErrorHandler<RequestError> for StoppableErrorHandler {
    fn handle_error(self: Arc<Self>, error: RequestError) -> futures_util::future::BoxFuture<'static, ()> {
        log::error!("{}", error);
        if let RequestError::Api(teloxide::ApiError::NotFound) = error {
            self.0.stop();
            log::info!("Bot stopped");
        }
        Box::pin(async {})
    }
}

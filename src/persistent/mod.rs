use std::sync::Arc;
use crossbeam::channel::{Sender, TryRecvError};

pub(crate) mod sqlite;

pub use sqlite::{Statistics, Storage};

const IDLE_SLEEP: std::time::Duration = std::time::Duration::from_secs(1);
const PURGE_EVERY: u32 = 600;

pub enum DBAction {
    SaveSession(SavedSession),
    DropSession(i64),
}

#[derive(Debug, Clone)]
pub struct SavedSession {
    pub chat_id: i64,
    pub state: Vec<u8>,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

/// Spawns the write-behind worker for conversation sessions and returns its
/// channel together with the sessions that are still alive.
pub async fn worker(storage: Arc<Storage>, ttl: chrono::Duration) -> anyhow::Result<(Sender<DBAction>, Vec<SavedSession>)> {
    let since = (chrono::Utc::now() - ttl).timestamp();
    storage.purge_sessions(since).await?;
    let sessions = storage.load_sessions(since).await?;
    let (s, r) = crossbeam::channel::unbounded();

    tokio::spawn(async move {
        let mut idle_ticks = 0u32;
        loop {
            let action = match r.try_recv() {
                Ok(action) => action,
                Err(TryRecvError::Disconnected) => {
                    log::info!("db worker stopped");
                    break;
                }
                Err(TryRecvError::Empty) => {
                    idle_ticks += 1;
                    if idle_ticks >= PURGE_EVERY {
                        idle_ticks = 0;
                        let since = (chrono::Utc::now() - ttl).timestamp();
                        if let Err(e) = storage.purge_sessions(since).await {
                            log::error!("error on purging sessions: {}", e);
                        }
                    }
                    tokio::time::sleep(IDLE_SLEEP).await;
                    continue;
                }
            };
            let result = match action {
                DBAction::SaveSession(session) => storage.save_session(&session).await,
                DBAction::DropSession(chat_id) => storage.drop_session(chat_id).await,
            };
            if let Err(e) = result {
                // the conversation itself lives in memory, only its restart copy is lost
                log::error!("error on update db: {}", e);
            }
        }
    });
    Ok((s, sessions))
}

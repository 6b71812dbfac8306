use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbeam::channel::Sender;
use futures_util::future::{ready, BoxFuture};
use serde::{de::DeserializeOwned, Serialize};
use teloxide::dispatching::dialogue::Storage;
use teloxide::types::ChatId;

use crate::impls::LoggableErrorResult;
use crate::persistent::{DBAction, SavedSession};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot encode session state: {0}")]
    Encode(#[from] postcard::Error),
}

struct Session<D> {
    state: D,
    touched: DateTime<Utc>,
}

/// Dialogue storage with an inactivity TTL. Every change is mirrored to the
/// database worker so conversations survive a restart.
pub struct SessionStore<D> {
    sessions: Mutex<HashMap<ChatId, Session<D>>>,
    ttl: Duration,
    sender: Sender<DBAction>,
}

impl<D> SessionStore<D>
where
    D: Serialize + DeserializeOwned + Clone,
{
    #[cfg(test)]
    pub fn new(ttl: Duration, sender: Sender<DBAction>) -> Arc<Self> {
        Self::recover(ttl, sender, Vec::new())
    }

    /// Restores sessions saved by a previous run, skipping expired or unreadable ones.
    pub fn recover(ttl: Duration, sender: Sender<DBAction>, saved: Vec<SavedSession>) -> Arc<Self> {
        let now = Utc::now();
        let mut sessions = HashMap::with_capacity(saved.len());
        for SavedSession { chat_id, state, updated_at } in saved {
            let touched = match Utc.timestamp_opt(updated_at, 0).single() {
                Some(touched) if now - touched <= ttl => touched,
                _ => continue,
            };
            match postcard::from_bytes::<D>(&state) {
                Ok(state) => {
                    sessions.insert(ChatId(chat_id), Session { state, touched });
                }
                Err(e) => log::warn!("dropping unreadable session of chat {}: {}", chat_id, e),
            }
        }
        log::info!("{} conversations recovered", sessions.len());
        Arc::new(Self { sessions: Mutex::new(sessions), ttl, sender })
    }

    fn get_at(&self, chat_id: ChatId, now: DateTime<Utc>) -> Option<D> {
        let mut sessions = self.lock();
        let expired = match sessions.get(&chat_id) {
            Some(session) if now - session.touched > self.ttl => true,
            Some(session) => return Some(session.state.clone()),
            None => return None,
        };
        if expired {
            sessions.remove(&chat_id);
            self.sender.send(DBAction::DropSession(chat_id.0)).ok_or_log();
        }
        None
    }

    fn update_at(&self, chat_id: ChatId, state: D, now: DateTime<Utc>) -> Result<(), SessionError> {
        let encoded = postcard::to_stdvec(&state)?;
        let mut sessions = self.lock();
        // database rows of abandoned chats are purged by the worker
        sessions.retain(|_, session| now - session.touched <= self.ttl);
        sessions.insert(chat_id, Session { state, touched: now });
        drop(sessions);
        self.sender.send(DBAction::SaveSession(SavedSession {
            chat_id: chat_id.0,
            state: encoded,
            updated_at: now.timestamp(),
        })).ok_or_log();
        Ok(())
    }

    fn remove(&self, chat_id: ChatId) {
        if self.lock().remove(&chat_id).is_some() {
            self.sender.send(DBAction::DropSession(chat_id.0)).ok_or_log();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, Session<D>>> {
        // map writes are single inserts/removes, a poisoned map is still consistent
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<D> Storage<D> for SessionStore<D>
where
    D: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    type Error = SessionError;

    fn remove_dialogue(self: Arc<Self>, chat_id: ChatId) -> BoxFuture<'static, Result<(), Self::Error>>
    where
        D: Send + 'static,
    {
        self.remove(chat_id);
        Box::pin(ready(Ok(())))
    }

    fn update_dialogue(self: Arc<Self>, chat_id: ChatId, dialogue: D) -> BoxFuture<'static, Result<(), Self::Error>>
    where
        D: Send + 'static,
    {
        Box::pin(ready(self.update_at(chat_id, dialogue, Utc::now())))
    }

    fn get_dialogue(self: Arc<Self>, chat_id: ChatId) -> BoxFuture<'static, Result<Option<D>, Self::Error>> {
        Box::pin(ready(Ok(self.get_at(chat_id, Utc::now()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{unbounded, Receiver};
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    enum Step {
        Asking(String),
        Counting(u32),
    }

    fn store(ttl_minutes: i64) -> (Arc<SessionStore<Step>>, Receiver<DBAction>) {
        let (s, r) = unbounded();
        (SessionStore::new(Duration::minutes(ttl_minutes), s), r)
    }

    #[tokio::test]
    async fn update_is_visible_and_persisted() {
        let (store, r) = store(10);
        store.clone().update_dialogue(ChatId(7), Step::Counting(3)).await.unwrap();
        assert_eq!(store.clone().get_dialogue(ChatId(7)).await.unwrap(), Some(Step::Counting(3)));
        match r.try_recv().unwrap() {
            DBAction::SaveSession(saved) => {
                assert_eq!(saved.chat_id, 7);
                assert_eq!(postcard::from_bytes::<Step>(&saved.state).unwrap(), Step::Counting(3));
            }
            _ => panic!("expected a save"),
        }
    }

    #[tokio::test]
    async fn remove_is_forwarded_once() {
        let (store, r) = store(10);
        store.clone().update_dialogue(ChatId(1), Step::Asking("x".into())).await.unwrap();
        store.clone().remove_dialogue(ChatId(1)).await.unwrap();
        store.clone().remove_dialogue(ChatId(1)).await.unwrap();
        assert!(store.clone().get_dialogue(ChatId(1)).await.unwrap().is_none());
        let actions: Vec<_> = r.try_iter().collect();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], DBAction::DropSession(1)));
    }

    #[test]
    fn expired_session_is_forgotten() {
        let (store, r) = store(5);
        let then = Utc::now() - Duration::minutes(6);
        store.update_at(ChatId(2), Step::Counting(1), then).unwrap();
        assert_eq!(store.get_at(ChatId(2), then + Duration::minutes(4)), Some(Step::Counting(1)));
        assert_eq!(store.get_at(ChatId(2), Utc::now()), None);
        assert!(matches!(r.try_iter().last(), Some(DBAction::DropSession(2))));
    }

    #[test]
    fn abandoned_sessions_are_swept_on_update() {
        let (store, _r) = store(1);
        let then = Utc::now() - Duration::days(30);
        for chat in 0..100 {
            store.update_at(ChatId(chat), Step::Counting(1), then).unwrap();
        }
        assert_eq!(store.lock().len(), 100);
        store.update_at(ChatId(500), Step::Asking("fresh".into()), Utc::now()).unwrap();
        assert_eq!(store.lock().len(), 1);
        assert_eq!(store.get_at(ChatId(500), Utc::now()), Some(Step::Asking("fresh".into())));
    }

    #[test]
    fn recover_skips_stale_and_broken_rows() {
        let (s, _r) = unbounded();
        let now = Utc::now().timestamp();
        let saved = vec![
            SavedSession { chat_id: 1, state: postcard::to_stdvec(&Step::Counting(9)).unwrap(), updated_at: now },
            SavedSession { chat_id: 2, state: postcard::to_stdvec(&Step::Counting(9)).unwrap(), updated_at: now - 3600 },
            SavedSession { chat_id: 3, state: vec![0xff, 0xff, 0xff], updated_at: now },
        ];
        let store: Arc<SessionStore<Step>> = SessionStore::recover(Duration::minutes(30), s, saved);
        assert_eq!(store.get_at(ChatId(1), Utc::now()), Some(Step::Counting(9)));
        assert_eq!(store.get_at(ChatId(2), Utc::now()), None);
        assert_eq!(store.get_at(ChatId(3), Utc::now()), None);
    }
}

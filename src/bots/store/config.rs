use std::collections::HashSet;

use teloxide::types::UserId;

use crate::config::Conf;

/// Shop settings the dialogue handlers need at hand.
pub struct StoreConfig {
    pub token: String,
    admins: HashSet<UserId>,
    pub card_number: String,
    pub support_user: String,
    pub news_channel: String,
    pub reputation_channel: String,
}

impl StoreConfig {
    pub fn is_admin(&self, user_id: &UserId) -> bool {
        self.admins.contains(user_id)
    }
    pub fn admins(&self) -> impl Iterator<Item = UserId> + '_ {
        self.admins.iter().copied()
    }
    pub fn support_url(&self) -> String {
        format!("https://t.me/{}", self.support_user.trim_start_matches('@'))
    }
}

impl From<&Conf> for StoreConfig {
    fn from(conf: &Conf) -> Self {
        Self {
            token: conf.token.clone(),
            admins: conf.admins.iter().copied().map(UserId).collect(),
            card_number: conf.card_number.clone(),
            support_user: conf.support_user.clone(),
            news_channel: conf.news_channel.clone(),
            reputation_channel: conf.reputation_channel.clone(),
        }
    }
}

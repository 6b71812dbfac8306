use serde::{de::DeserializeOwned, Serialize};
use teloxide::{adaptors::Throttle, prelude::*};

pub mod store;

type WrappedBot = Throttle<Bot>;

fn make_username(user: &teloxide::types::User) -> String {
    let name = user.first_name.as_str();
    let last_name = user.last_name.as_ref().map(|s|format!(" {}", s)).unwrap_or_default();
    let nick = user.username.as_ref().map(|s|format!(" [@{}]", s)).unwrap_or_default();
    format!("{name}{last_name}{nick}")
}

/// Compact encoding for inline button payloads (telegram allows 64 bytes).
pub trait CallbackMessage: Serialize + DeserializeOwned {
    fn to_string(&self) -> anyhow::Result<String> {
        let bytes = postcard::to_stdvec(self)?;
        Ok(String::from_utf8(base91::slice_encode(&bytes))?)
    }
    fn parse(data: &str) -> anyhow::Result<Self> {
        let bytes = base91::slice_decode(data.as_bytes());
        Ok(postcard::from_bytes(&bytes)?)
    }
}

use teloxide::prelude::*;
use super::WrappedBot as WBot;
use entity::*;

pub use config::StoreConfig;

type MyStorage = crate::shop::SessionStore<fsm::State>;

pub mod bot;

mod config;
mod entity;
mod fsm;
mod impls;

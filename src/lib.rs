pub mod clock;
pub mod commands;
pub mod complaints;
pub mod config;
pub mod data;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod market;
pub mod moderation;
pub mod notify;
pub mod session;
pub mod store;

pub const BOT_NAME: &str = "market_warden";
pub const COMMAND_TARGET: &str = "market_warden::command";
pub const ERROR_TARGET: &str = "market_warden::error";
pub const EVENT_TARGET: &str = "market_warden::handlers";
pub const MODERATION_TARGET: &str = "market_warden::moderation";
pub const CONSOLE_TARGET: &str = "market_warden";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

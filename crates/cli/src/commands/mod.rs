pub mod chat;
pub mod config_cmd;
pub mod custom;
pub mod hooks;
pub mod sessions;

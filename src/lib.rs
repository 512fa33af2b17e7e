//! JEE Buddy 客户端库
//! 认证 HTTP 客户端：加密令牌存储、Bearer 凭证附加、单飞令牌刷新

pub mod client;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod events;
pub mod gate;
pub mod loading;
pub mod models;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod token_store;

pub use client::JeeClient;
pub use error::{ClientError, Result};

pub mod api;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod homework;
pub mod models;
pub mod notification;
pub mod query;
pub mod session;
pub mod storage;
pub mod user;

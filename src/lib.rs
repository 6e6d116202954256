pub mod api;
pub mod app;
pub mod booking;
pub mod checkout;
pub mod config;
pub mod conversation;
pub mod error;
pub mod hooks;
pub mod lenient;
pub mod location;
pub mod login;
pub mod message;
pub mod nav;
pub mod payment;
pub mod state;
pub mod storage;

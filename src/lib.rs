// Library root for the GameSpace member platform

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod loader;
pub mod metrics;
pub mod services;
pub mod state;
pub mod store;

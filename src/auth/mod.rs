// Authentication & authorization module

pub mod audit_logger;
pub mod auth_middleware;
pub mod jwt;
pub mod password;
pub mod tokens;

// Service-level tests over the in-memory store

#[path = "../common/mod.rs"]
mod common;

pub mod accounts;
pub mod admin;
pub mod forum;
pub mod pet_and_games;
pub mod seed;
pub mod shop;
pub mod signin;
pub mod wallet;

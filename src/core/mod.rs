// Core domain types: errors, models, time and tuning values

pub mod clock;
pub mod codes;
pub mod constants;
pub mod errors;
pub mod models;

// Process-local state

pub mod cache;

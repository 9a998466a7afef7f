// HTTP-level tests through the full router and middleware stack

#[path = "../common/mod.rs"]
mod common;

pub mod test_admin_api;
pub mod test_auth_middleware;
pub mod test_full_request_flow;
pub mod test_router;

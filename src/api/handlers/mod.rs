// HTTP request handlers
//
// Handlers only translate between JSON and service calls. Member routes
// receive the caller as `Extension<AuthUser>` from the auth middleware.

pub mod admin;
pub mod auth;
pub mod forum;
pub mod games;
pub mod notifications;
pub mod pet;
pub mod shop;
pub mod signin;
pub mod system;
pub mod wallet;

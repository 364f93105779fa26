pub mod clob_auth;
pub mod clob_client;
pub mod live;
pub mod order_builder;
pub mod paper;
pub mod rate_limiter;

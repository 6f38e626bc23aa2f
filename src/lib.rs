pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod util;

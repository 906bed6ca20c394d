pub mod accounts;
pub mod config;
pub mod projection;
pub mod sync;

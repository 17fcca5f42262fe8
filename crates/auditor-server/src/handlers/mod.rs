pub mod ask;
pub mod auth;
pub mod health;
pub mod metrics;
pub mod retrieve;
pub mod schemas;

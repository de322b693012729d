pub mod app;
pub mod config;
pub mod coordinator;
pub mod observability;
pub mod server;
pub mod storage;
pub mod worker;

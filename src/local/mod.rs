pub mod client;
pub mod export;
pub mod server;

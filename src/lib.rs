pub mod ark;
pub mod config;
pub mod douyin;
pub mod logger;
pub mod server;
pub mod volc;

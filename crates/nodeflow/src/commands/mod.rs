pub mod avset;
pub mod config;
pub mod lock;

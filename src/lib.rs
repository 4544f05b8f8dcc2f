pub mod buffer;
pub mod client;
pub mod common;
pub mod concurrency;
pub mod config;
pub mod disk;
pub mod error;
pub mod instance;
pub mod lock;
pub mod page;
pub mod record;
pub mod table;

#[cfg(test)]
pub mod test_helpers;

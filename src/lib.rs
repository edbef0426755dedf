pub mod config;
pub mod error;
pub mod events;
pub mod inject;
pub mod intake;
pub mod locator;
pub mod metrics;
pub mod notify;
pub mod os;
pub mod pool;
pub mod registry;
pub mod router;
pub mod sidefile;
pub mod spawner;
pub mod store;
pub mod testing;
pub mod types;

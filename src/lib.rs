pub mod analysis;
pub mod candidate;
pub mod constants;
pub mod converter;
pub mod dataprod;
pub mod dataprod_errors;
pub mod env_state;
pub mod menu;
pub mod options;
pub mod request;
pub mod services;
pub mod store;
pub mod table;
pub mod watcher;

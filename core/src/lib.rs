pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod service;
pub mod store;

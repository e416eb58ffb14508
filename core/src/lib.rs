pub mod db;
pub mod models;
pub mod service;
pub mod taxonomy;
pub mod thresholds;

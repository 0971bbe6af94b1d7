pub mod analytics;
pub mod cache;
pub mod generator;
pub mod model;
pub mod service;
pub mod store;

pub mod command;
pub mod config;
pub mod engine;
pub mod layout;
pub mod limits;
pub mod model;
pub mod observability;
pub mod repository;
pub mod reservation;
pub mod store;

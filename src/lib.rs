pub mod auth;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod seed;
pub mod wire;

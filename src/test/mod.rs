mod bootstrap;
mod config;
mod migrations;
mod queries;
pub mod utils;

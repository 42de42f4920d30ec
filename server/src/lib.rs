pub extern crate actix_web;

pub mod config;
pub mod connection;
mod connection_tx_storage;
pub mod handlers;
mod registry;
pub mod server;
mod server_state;
mod session;
mod transport;

// Petfeeder - LAN control daemon for a Tuya pet feeder
// Library exports

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod store;

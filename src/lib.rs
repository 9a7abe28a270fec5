//! EV charging station fleet simulator: speaks OCPP 1.6J and 2.0.1 over
//! WebSocket to one or more Central System backends, driving each station
//! through its own single-threaded message loop.

pub mod atg;
pub mod auth;
pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod ocpp16;
pub mod ocpp201;
pub mod pool;
pub mod profiles;
pub mod protocol;
pub mod station;
pub mod stats;
pub mod support;
pub mod tags;

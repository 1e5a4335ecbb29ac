pub mod accumulator;
pub mod arbitrage;
pub mod calibration;
pub mod config;
pub mod diversify;
pub mod form;
pub mod market;
pub mod odds;
pub mod probability;
pub mod slate;
pub mod ttl_cache;
pub mod value;

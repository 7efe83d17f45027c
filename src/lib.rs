// Library for tests to access modules

pub mod bus;
pub mod config;
pub mod models;
pub mod poll;
pub mod registry;
pub mod routes;
pub mod store;
pub mod timeseries;
pub mod version;
pub mod worker;

pub mod aggregate;
pub mod app;
pub mod config;
pub mod dissolve;
pub mod domain;
pub mod error;
pub mod histogram;
pub mod metadata;
pub mod output;
pub mod record;
pub mod search;
pub mod stream;
pub mod tags;
pub mod throttle;
pub mod world;

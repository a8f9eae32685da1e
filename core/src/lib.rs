pub mod db;
pub mod error;
pub mod exchange;
pub mod models;
pub mod plan;
pub mod service;

pub use error::{Error, Result};

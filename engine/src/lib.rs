// src/lib.rs

pub mod adp;
pub mod error;
pub mod training_log;

pub use error::{AdpError, Result};

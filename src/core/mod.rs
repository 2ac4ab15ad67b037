//! Core business logic abstractions

pub mod balance;
pub mod config;
pub mod error;
pub mod log;
pub mod rate;

// Re-export main types for cleaner imports
pub use balance::{AssetBalance, BalanceSource};
pub use error::ProviderError;
pub use rate::{FailurePolicy, RateRecord, RateSource};

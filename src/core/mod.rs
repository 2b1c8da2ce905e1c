//! Pipeline stages and their shared types

pub mod aggregate;
pub mod broker;
pub mod cache;
pub mod config;
pub mod currency;
pub mod equivalence;
pub mod error;
pub mod log;
pub mod normalize;
pub mod records;
pub mod table;

// Re-export main types for cleaner imports
pub use aggregate::{CombinedData, aggregate_accounts};
pub use broker::{BrokerClient, fetch_accounts};
pub use currency::{CurrencyCode, HistoricalRateProvider};
pub use error::PipelineError;
pub use table::{Cell, Table};

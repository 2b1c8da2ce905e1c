pub mod aggregate;
pub mod setup;

pub mod caching;
pub mod cbr;
pub mod tinkoff;

pub use caching::CachingRateProvider;
pub use cbr::CbrRateProvider;
pub use tinkoff::TinkoffClient;

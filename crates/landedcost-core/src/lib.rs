pub mod cache;
pub mod calculator;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod money;
pub mod providers;
pub mod repository;
pub mod taric;

// Re-export commonly used types
pub use calculator::{CalculationResult, CalculationStatus, CalculatorService, ENGINE_VERSION};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{CircuitBreaker, HttpFetcher};
pub use models::{Direction, Incoterm, ProviderType, ShipmentStatus};
pub use providers::{
    DutyRateResult, DutySource, EuTaricProvider, FxProvider, FxRateResult, FxSource,
    UkTariffProvider, VatProvider, VatRateResult, VatSource,
};
pub use repository::{create_pool, Database};
pub use taric::{ResolvedTaric, TaricResolver};

/// Current version of the landed-cost engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Database repositories following the repository pattern: a database-
//! agnostic trait per aggregate plus a PostgreSQL implementation.

pub mod calculation_repository;
pub mod fallback_repository;
pub mod rate_snapshot_repository;
pub mod shipment_repository;
pub mod taric_repository;
pub mod user_repository;

pub use calculation_repository::{CalculationRepository, PostgresCalculationRepository};
pub use fallback_repository::{
    EuTaricRateRepository, FxRateRepository, PostgresEuTaricRateRepository,
    PostgresFxRateRepository, PostgresTariffOverrideRepository, PostgresVatRateRepository,
    TariffOverrideRepository, VatRateRepository,
};
pub use rate_snapshot_repository::{PostgresRateSnapshotRepository, RateSnapshotRepository};
pub use shipment_repository::{PostgresShipmentRepository, ShipmentRepository};
pub use taric_repository::{PostgresTaricRepository, TaricRepository};
pub use user_repository::{PostgresUserRepository, UserRepository};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::Result;

/// Database handle shared by repositories
pub type Database = PgPool;

/// Create a PostgreSQL connection pool
pub async fn create_pool(url: &str, pool_size: u32) -> Result<Database> {
    let pool = PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(url)
        .await?;
    Ok(pool)
}

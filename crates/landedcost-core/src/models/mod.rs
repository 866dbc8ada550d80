//! Domain entities for shipments, calculations, rate snapshots, fallback
//! rate tables, and the TARIC reference data set.

pub mod calculation;
pub mod enums;
pub mod fallback;
pub mod rate_snapshot;
pub mod shipment;
pub mod taric;
pub mod user;

pub use calculation::Calculation;
pub use enums::{Direction, Incoterm, ProviderType, ShipmentStatus};
pub use fallback::{EuTaricRate, FxRateDaily, TariffRateOverride, VatRate};
pub use rate_snapshot::RateSnapshot;
pub use shipment::{
    normalize_country_code, normalize_hs_code, require_non_negative, Shipment, ShipmentCosts,
    ShipmentItem,
};
pub use taric::{
    valid_on, AdditionalCode, DutyExpression, GeoArea, GeoAreaMember, GoodsDescription,
    GoodsNomenclature, Measure, MeasureAdditionalCode, MeasureCondition, MeasureDutyExpression,
    Regulation, TaricResolvedCache, TaricSnapshot,
};
pub use user::User;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use landedcost_core::cache::{FastCache, MemoryCache, RedisCache};
use landedcost_core::calculator::CalculatorService;
use landedcost_core::db::Migrator;
use landedcost_core::models::shipment::{
    normalize_country_code, normalize_hs_code, require_non_negative,
};
use landedcost_core::models::{
    Direction, Incoterm, Shipment, ShipmentCosts, ShipmentItem, ShipmentStatus, User,
};
use landedcost_core::money::normalize_currency;
use landedcost_core::providers::{DutySource, FxSource, VatSource};
use landedcost_core::repository::{
    create_pool, Database, PostgresCalculationRepository, PostgresEuTaricRateRepository,
    PostgresFxRateRepository, PostgresRateSnapshotRepository, PostgresShipmentRepository,
    PostgresTariffOverrideRepository, PostgresTaricRepository, PostgresUserRepository,
    PostgresVatRateRepository, ShipmentRepository, TaricRepository, UserRepository,
};
use landedcost_core::taric::TaricResolver;
use landedcost_core::{
    Config, EuTaricProvider, FxProvider, HttpFetcher, UkTariffProvider, VatProvider,
};

#[derive(Parser)]
#[command(name = "landedcost")]
#[command(about = "Landed-cost calculation engine for UK/EU imports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<String>,

    #[arg(short, long, global = true, help = "Set log level")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate,

    /// Shipment management
    Shipment {
        #[command(subcommand)]
        command: ShipmentCommands,
    },

    /// TARIC lookups
    Taric {
        #[command(subcommand)]
        command: TaricCommands,
    },

    /// Direct rate provider lookups
    Rates {
        #[command(subcommand)]
        command: RateCommands,
    },

    /// Compute the landed cost for a shipment
    Calculate {
        shipment_id: Uuid,

        #[arg(long, help = "Owner email")]
        user: String,
    },
}

#[derive(Subcommand)]
enum ShipmentCommands {
    /// Create a shipment
    Create {
        #[arg(long, help = "Owner email (created if unknown)")]
        user: String,

        #[arg(long, help = "IMPORT_UK | IMPORT_EU | EXPORT_UK | EXPORT_EU")]
        direction: String,

        #[arg(long, help = "Trade term, e.g. CIF")]
        incoterm: String,

        #[arg(long, help = "Shipment currency, ISO-4217 or £/€/$")]
        currency: String,

        #[arg(long, help = "Default origin country (ISO-2)")]
        origin: String,

        #[arg(long, help = "Destination country (ISO-2)")]
        destination: Option<String>,

        #[arg(long, help = "Import date, YYYY-MM-DD")]
        import_date: Option<NaiveDate>,
    },

    /// Add an item to a shipment
    AddItem {
        shipment_id: Uuid,

        #[arg(long, help = "Owner email")]
        user: String,

        #[arg(long, default_value = "item")]
        description: String,

        #[arg(long, help = "HS code, normalized to digits")]
        hs_code: String,

        #[arg(long, help = "Origin country (ISO-2)")]
        origin: String,

        #[arg(long)]
        quantity: Decimal,

        #[arg(long)]
        unit_price: Decimal,

        #[arg(long)]
        weight_kg: Option<Decimal>,

        #[arg(long)]
        additional_code: Option<String>,
    },

    /// Set freight, insurance, and incidental costs
    SetCosts {
        shipment_id: Uuid,

        #[arg(long, help = "Owner email")]
        user: String,

        #[arg(long)]
        freight: Option<Decimal>,

        #[arg(long)]
        insurance: Option<Decimal>,

        #[arg(long)]
        brokerage: Option<Decimal>,

        #[arg(long)]
        port_fees: Option<Decimal>,

        #[arg(long)]
        inland_transport: Option<Decimal>,

        #[arg(long)]
        other_incidental: Option<Decimal>,
    },

    /// Show a shipment with items and costs
    Show {
        shipment_id: Uuid,

        #[arg(long, help = "Owner email")]
        user: String,
    },
}

#[derive(Subcommand)]
enum TaricCommands {
    /// Resolve duties for a goods code and origin
    Resolve {
        #[arg(long)]
        goods_code: String,

        #[arg(long, help = "Origin country (ISO-2)")]
        origin: String,

        #[arg(long, help = "Resolution date, YYYY-MM-DD (default today)")]
        as_of: Option<NaiveDate>,

        #[arg(long)]
        additional_code: Option<String>,
    },

    /// Look up a goods code and its description
    Goods {
        goods_code: String,

        #[arg(long, help = "Lookup date, YYYY-MM-DD (default today)")]
        as_of: Option<NaiveDate>,

        #[arg(long, default_value = "EN")]
        lang: String,
    },
}

#[derive(Subcommand)]
enum RateCommands {
    /// FX rate via cache → database → ECB
    Fx {
        #[arg(long)]
        base: String,

        #[arg(long)]
        quote: String,
    },

    /// Standard VAT rate for a country
    Vat {
        #[arg(long, help = "Country (ISO-2)")]
        country: String,
    },

    /// UK tariff ad-valorem duty for a commodity code
    UkTariff {
        #[arg(long)]
        code: String,

        #[arg(long, help = "Print the raw commodity payload instead of the rate")]
        details: bool,
    },

    /// EU TARIC flat duty rate (fallback provider)
    EuTaric {
        #[arg(long)]
        hs_code: String,

        #[arg(long)]
        origin: Option<String>,
    },
}

/// All engine services, constructed once at startup
struct App {
    db: Database,
    shipments: Arc<dyn ShipmentRepository>,
    users: Arc<dyn UserRepository>,
    taric_repo: Arc<dyn TaricRepository>,
    uk_tariff: Arc<UkTariffProvider>,
    eu_taric: Arc<EuTaricProvider>,
    vat: Arc<VatProvider>,
    fx: Arc<FxProvider>,
    resolver: Arc<TaricResolver>,
    calculator: CalculatorService,
}

impl App {
    async fn build(config: &Config) -> anyhow::Result<Self> {
        let db = create_pool(&config.database.url, config.database.pool_size)
            .await
            .context("connecting to database")?;

        let cache: Arc<dyn FastCache> = match &config.cache.redis_url {
            Some(url) => Arc::new(RedisCache::connect(url).await.context("connecting to redis")?),
            None => {
                info!("No redis URL configured, using in-memory cache");
                Arc::new(MemoryCache::new())
            }
        };

        let fetcher = HttpFetcher::new(Duration::from_secs(config.providers.http_timeout_secs))?;

        let snapshots = Arc::new(PostgresRateSnapshotRepository::new(db.clone()));
        let shipments: Arc<dyn ShipmentRepository> =
            Arc::new(PostgresShipmentRepository::new(db.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(db.clone()));
        let taric_repo: Arc<dyn TaricRepository> =
            Arc::new(PostgresTaricRepository::new(db.clone()));

        let uk_tariff = Arc::new(UkTariffProvider::new(
            cache.clone(),
            fetcher.clone(),
            snapshots.clone(),
            Arc::new(PostgresTariffOverrideRepository::new(db.clone())),
            config.providers.uk_tariff_api_base.clone(),
        ));
        let eu_taric = Arc::new(EuTaricProvider::new(
            cache.clone(),
            fetcher.clone(),
            Arc::new(PostgresEuTaricRateRepository::new(db.clone())),
            snapshots.clone(),
            config.providers.eu_taric_api_base.clone(),
            config.providers.eu_taric_api_key.clone(),
        ));
        let vat = Arc::new(VatProvider::new(
            cache.clone(),
            fetcher.clone(),
            Arc::new(PostgresVatRateRepository::new(db.clone())),
            snapshots.clone(),
            config.providers.vat_api_base.clone(),
            config.providers.vat_api_key.clone(),
        ));
        let fx = Arc::new(FxProvider::new(
            cache,
            fetcher,
            Arc::new(PostgresFxRateRepository::new(db.clone())),
            snapshots,
            config.providers.ecb_api_base.clone(),
        ));

        let resolver = Arc::new(TaricResolver::new(taric_repo.clone()));
        let calculator = CalculatorService::new(
            shipments.clone(),
            Arc::new(PostgresCalculationRepository::new(db.clone())),
            uk_tariff.clone(),
            vat.clone(),
            fx.clone(),
            resolver.clone(),
        );

        Ok(Self {
            db,
            shipments,
            users,
            taric_repo,
            uk_tariff,
            eu_taric,
            vat,
            fx,
            resolver,
            calculator,
        })
    }

    /// Resolve a user by email, creating one on first use
    async fn user(&self, email: &str) -> anyhow::Result<User> {
        if let Some(user) = self.users.get_by_email(email).await? {
            return Ok(user);
        }
        Ok(self.users.create(email).await?)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let app = App::build(&config).await?;

    match cli.command {
        Commands::Migrate => {
            Migrator::new(app.db.clone()).migrate().await?;
        }

        Commands::Shipment { command } => run_shipment(&app, command).await?,

        Commands::Taric { command } => run_taric(&app, command).await?,

        Commands::Rates { command } => run_rates(&app, command).await?,

        Commands::Calculate { shipment_id, user } => {
            let user = app.user(&user).await?;
            let result = app.calculator.calculate(shipment_id, user.id).await?;
            print_json(&result)?;
        }
    }

    Ok(())
}

async fn run_shipment(app: &App, command: ShipmentCommands) -> anyhow::Result<()> {
    match command {
        ShipmentCommands::Create {
            user,
            direction,
            incoterm,
            currency,
            origin,
            destination,
            import_date,
        } => {
            let user = app.user(&user).await?;
            let now = Utc::now();
            let shipment = Shipment {
                id: Uuid::new_v4(),
                user_id: user.id,
                direction: Direction::from_str(&direction)?,
                destination_country: destination
                    .map(|c| normalize_country_code(&c))
                    .transpose()?,
                origin_country_default: normalize_country_code(&origin)?,
                incoterm: Incoterm::from_str(&incoterm)?,
                currency: normalize_currency(&currency)?,
                import_date,
                fx_rate_to_gbp: None,
                fx_rate_to_eur: None,
                status: ShipmentStatus::Draft,
                created_at: now,
                updated_at: now,
            };
            let created = app.shipments.create(&shipment).await?;
            print_json(&created)?;
        }

        ShipmentCommands::AddItem {
            shipment_id,
            user,
            description,
            hs_code,
            origin,
            quantity,
            unit_price,
            weight_kg,
            additional_code,
        } => {
            let user = app.user(&user).await?;
            let detail = app
                .shipments
                .get(shipment_id, user.id)
                .await?
                .context("Shipment not found")?;
            require_non_negative("quantity", Some(quantity))?;
            require_non_negative("unit_price", Some(unit_price))?;
            require_non_negative("weight_kg", weight_kg)?;
            let now = Utc::now();
            let item = ShipmentItem {
                id: Uuid::new_v4(),
                shipment_id: detail.shipment.id,
                description,
                hs_code: normalize_hs_code(&hs_code),
                origin_country: normalize_country_code(&origin)?,
                additional_code,
                quantity,
                unit_price,
                goods_value: None,
                weight_net_kg: weight_kg,
                created_at: now,
                updated_at: now,
            };
            let created = app.shipments.add_item(&item).await?;
            print_json(&created)?;
        }

        ShipmentCommands::SetCosts {
            shipment_id,
            user,
            freight,
            insurance,
            brokerage,
            port_fees,
            inland_transport,
            other_incidental,
        } => {
            let user = app.user(&user).await?;
            let detail = app
                .shipments
                .get(shipment_id, user.id)
                .await?
                .context("Shipment not found")?;
            require_non_negative("freight_amount", freight)?;
            require_non_negative("insurance_amount", insurance)?;
            require_non_negative("brokerage_amount", brokerage)?;
            require_non_negative("port_fees_amount", port_fees)?;
            require_non_negative("inland_transport_amount", inland_transport)?;
            require_non_negative("other_incidental_amount", other_incidental)?;

            // Merge into the existing row: only supplied flags overwrite
            let existing = detail
                .costs
                .unwrap_or_else(|| ShipmentCosts::empty(detail.shipment.id));
            let insurance_supplied = insurance.is_some();
            let costs = ShipmentCosts {
                freight_amount: freight.or(existing.freight_amount),
                insurance_amount: insurance.or(existing.insurance_amount),
                // An operator-supplied insurance amount is not an estimate
                insurance_is_estimated: if insurance_supplied {
                    false
                } else {
                    existing.insurance_is_estimated
                },
                brokerage_amount: brokerage.or(existing.brokerage_amount),
                port_fees_amount: port_fees.or(existing.port_fees_amount),
                inland_transport_amount: inland_transport.or(existing.inland_transport_amount),
                other_incidental_amount: other_incidental.or(existing.other_incidental_amount),
                ..existing
            };
            let saved = app.shipments.upsert_costs(&costs).await?;
            print_json(&saved)?;
        }

        ShipmentCommands::Show { shipment_id, user } => {
            let user = app.user(&user).await?;
            let detail = app
                .shipments
                .get(shipment_id, user.id)
                .await?
                .context("Shipment not found")?;
            print_json(&serde_json::json!({
                "shipment": detail.shipment,
                "items": detail.items,
                "costs": detail.costs,
            }))?;
        }
    }
    Ok(())
}

async fn run_taric(app: &App, command: TaricCommands) -> anyhow::Result<()> {
    match command {
        TaricCommands::Resolve {
            goods_code,
            origin,
            as_of,
            additional_code,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let result = app
                .resolver
                .resolve(
                    &goods_code,
                    &origin.to_uppercase(),
                    as_of,
                    additional_code.as_deref(),
                    None,
                )
                .await?;
            print_json(&result)?;
        }

        TaricCommands::Goods {
            goods_code,
            as_of,
            lang,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let candidates = app
                .taric_repo
                .get_goods_candidates(&[goods_code.clone()], as_of)
                .await?;
            let description = app
                .taric_repo
                .get_goods_description(&goods_code, as_of, &lang)
                .await?;
            print_json(&serde_json::json!({
                "goods_code": goods_code,
                "valid": !candidates.is_empty(),
                "description": description.as_ref().map(|d| d.description.clone()),
                "valid_from": description.as_ref().and_then(|d| d.valid_from),
                "valid_to": description.as_ref().and_then(|d| d.valid_to),
            }))?;
        }
    }
    Ok(())
}

async fn run_rates(app: &App, command: RateCommands) -> anyhow::Result<()> {
    match command {
        RateCommands::Fx { base, quote } => {
            let result = app
                .fx
                .get_rate(&base.to_uppercase(), &quote.to_uppercase(), None)
                .await?;
            print_json(&result)?;
        }

        RateCommands::Vat { country } => {
            let result = app
                .vat
                .get_standard_rate(&country.to_uppercase(), None)
                .await?;
            print_json(&result)?;
        }

        RateCommands::UkTariff { code, details } => {
            let code = normalize_hs_code(&code);
            if details {
                let payload = app.uk_tariff.get_commodity_details(&code).await?;
                print_json(&payload)?;
            } else {
                let result = app.uk_tariff.get_duty_rate(None, &code, None, false).await?;
                print_json(&result)?;
            }
        }

        RateCommands::EuTaric { hs_code, origin } => {
            let result = app
                .eu_taric
                .get_duty_rate(
                    None,
                    &normalize_hs_code(&hs_code),
                    origin.map(|o| o.to_uppercase()).as_deref(),
                    false,
                )
                .await?;
            print_json(&result)?;
        }
    }
    Ok(())
}

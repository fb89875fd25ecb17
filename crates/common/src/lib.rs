use clap::Parser;
use movements::store::{MovementStore, PaymentDatePolicy, STORAGE_KEY};
use movements::views::TotalSpentPolicy;
use tokio::sync::Mutex;

/// Shared state for every handler.
///
/// The store sits behind a single mutex: a request holds it from the
/// mutation through the save and the rebuilt views, so mutations never
/// interleave.
pub struct AppState {
    pub store: Mutex<MovementStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: MovementStore, config: Config) -> Self {
        Self {
            store: Mutex::new(store),
            config,
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:gastos.db")]
    pub database_url: String,

    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Key the movement list is stored under.
    #[arg(long, env = "STORAGE_KEY", default_value = STORAGE_KEY)]
    pub storage_key: String,

    /// `paid-only` or `committed` (paid + pending).
    #[arg(long, env = "TOTAL_SPENT", default_value = "paid-only")]
    pub total_spent: TotalSpentPolicy,

    /// `preserve-due-date` or `overwrite-due-date`.
    #[arg(long, env = "PAYMENT_DATE", default_value = "preserve-due-date")]
    pub payment_date: PaymentDatePolicy,
}

//! CLI subcommands.

pub mod migrate;
pub mod seller;

use secrecy::SecretString;

/// Read `DATABASE_URL`, loading `.env` first if present.
fn database_url() -> Result<SecretString, &'static str> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| "DATABASE_URL")
}

mod repository;

pub use repository::*;

/// SQL migration for the wallet table
pub const MIGRATION_001_WALLETS: &str = include_str!("migrations/001_wallets.sql");

//! refnet PostgreSQL adapter.
//!
//! Implements the refnet-core port traits over `refnet.*` tables — see
//! `migrations/0001_refnet.sql` for the schema. Monetary columns are
//! NUMERIC(38,18); referral-code uniqueness and atomic balance increments
//! are enforced by the database.

mod store;

pub use store::{PgClaimStore, PgCommissionStore, PgTradeStore, PgUserStore};

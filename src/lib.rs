//! refnet — referral network and commission distribution engine.
//!
//! Wires the core services over a chosen storage backend. The transport
//! layer (HTTP or otherwise) is an external caller: it invokes the services
//! on [`Engine`] and maps [`RefnetError::http_status`] onto its own wire.

pub mod config;

use std::sync::Arc;

pub use refnet_core::{
    claims::{ClaimRequest, ClaimService},
    directory::{AncestorRef, NetworkList, NetworkMember, NetworkNode, ReferralDirectory},
    distribution::{CommissionShare, FeeDistribution},
    earnings::{ClaimableBalance, EarningsAggregator, EarningsReport, LevelEarnings, SourceEarnings},
    error::{RefnetError, Result},
    ledger::{TradeLedger, TradeOutcome, TradeRequest},
    memory::MemoryStore,
    money::{Money, MONEY_SCALE},
    ports::{BalanceDelta, ClaimStore, CommissionStore, DateWindow, TradeStore, UserStore},
    types::{
        Claim, ClaimStatus, ClaimType, Commission, CommissionStructureKind,
        CustomCommissionStructure, FeeTier, Trade, TradeSide, User, MAX_REFERRAL_DEPTH,
    },
};

/// The assembled engine: one service handle per core component, all sharing
/// the same storage.
#[derive(Clone)]
pub struct Engine {
    pub directory: ReferralDirectory,
    pub ledger: TradeLedger,
    pub earnings: EarningsAggregator,
    pub claims: ClaimService,
}

impl Engine {
    pub fn new(
        users: Arc<dyn UserStore>,
        trades: Arc<dyn TradeStore>,
        commissions: Arc<dyn CommissionStore>,
        claims: Arc<dyn ClaimStore>,
    ) -> Self {
        let directory = ReferralDirectory::new(users.clone());
        let earnings = EarningsAggregator::new(users.clone(), commissions.clone());
        let ledger = TradeLedger::new(users, trades, commissions.clone(), directory.clone());
        let claims = ClaimService::new(commissions, claims, earnings.clone());
        Self {
            directory,
            ledger,
            earnings,
            claims,
        }
    }

    /// Engine over the in-memory store (tests, in-process use).
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    /// Engine over Postgres.
    #[cfg(feature = "database")]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        use refnet_postgres::{PgClaimStore, PgCommissionStore, PgTradeStore, PgUserStore};
        Self::new(
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgTradeStore::new(pool.clone())),
            Arc::new(PgCommissionStore::new(pool.clone())),
            Arc::new(PgClaimStore::new(pool)),
        )
    }
}

/// Install the default tracing subscriber (reads `RUST_LOG`).
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

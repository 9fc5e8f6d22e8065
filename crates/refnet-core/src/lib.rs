//! refnet core — referral tree, fee distribution, earnings.
//!
//! Pure domain logic over storage port traits; no sqlx in this crate. The
//! Postgres adapter lives in `refnet-postgres`, and [`memory::MemoryStore`]
//! implements the same ports for tests and in-process use.

pub mod claims;
pub mod code;
pub mod directory;
pub mod distribution;
pub mod earnings;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod money;
pub mod ports;
pub mod rates;
pub mod types;

pub use claims::{ClaimRequest, ClaimService};
pub use directory::{AncestorRef, NetworkList, NetworkMember, NetworkNode, ReferralDirectory};
pub use distribution::{compute_distribution, CommissionShare, FeeDistribution};
pub use earnings::{ClaimableBalance, EarningsAggregator, EarningsReport, LevelEarnings, SourceEarnings};
pub use error::{RefnetError, Result};
pub use ledger::{TradeLedger, TradeOutcome, TradeRequest};
pub use memory::MemoryStore;
pub use money::{Money, MONEY_SCALE};
pub use ports::{BalanceDelta, ClaimStore, CommissionStore, DateWindow, TradeStore, UserStore};
pub use rates::rate_for_level;
pub use types::{
    Ancestor, Claim, ClaimStatus, ClaimType, Commission, CommissionStructureKind,
    CustomCommissionStructure, FeeTier, Trade, TradeSide, User, MAX_REFERRAL_DEPTH,
};

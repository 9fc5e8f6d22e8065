//! Core entities: users, trades, commissions, claims.
//!
//! Ownership rules: the referral directory owns structural user fields
//! (code, parent, children, depth); the trade ledger owns trade and
//! commission creation; the running balance totals change only through the
//! store's atomic increment, never read-modify-write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RefnetError;
use crate::money::Money;

/// Maximum number of ancestors above any user.
pub const MAX_REFERRAL_DEPTH: u8 = 3;

/// Fee classification applied to trade volume.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeTier {
    Base,
    Reduced,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Per-level commission override, discriminated by `type` on the wire.
///
/// `KOL_CUSTOM` carries optional per-level rates; a missing level falls
/// through to the standard tier for that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStructureKind {
    KolDirect,
    KolCustom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level1_rate: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level2_rate: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level3_rate: Option<Decimal>,
    },
    Waived,
}

/// A user's commission override plus the two waiver flags. The flags are
/// independent of the kind: `fees_waived` suppresses the user's own trade
/// fees, `commissions_waived` suppresses commissions paid TO the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommissionStructure {
    #[serde(flatten)]
    pub kind: CommissionStructureKind,
    #[serde(default)]
    pub fees_waived: bool,
    #[serde(default)]
    pub commissions_waived: bool,
}

impl CustomCommissionStructure {
    pub fn new(kind: CommissionStructureKind) -> Self {
        Self {
            kind,
            fees_waived: false,
            commissions_waived: false,
        }
    }
}

/// A member of the referral network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub referral_code: String,
    #[serde(default)]
    pub referrer_id: Option<Uuid>,
    /// Ordered direct children, appended after each registration. Network
    /// queries derive membership from `referrer_id` instead, so a crash
    /// between child insert and this append never hides a user.
    #[serde(default)]
    pub children: Vec<Uuid>,
    pub referral_depth: u8,
    pub fee_tier: FeeTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_commission_structure: Option<CustomCommissionStructure>,
    pub total_xp_earned: Money,
    pub total_commission_earned: Money,
    pub total_cashback_earned: Money,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A root user: no parent, depth 0.
    pub fn root(referral_code: String, fee_tier: FeeTier) -> Self {
        Self::create(referral_code, None, 0, fee_tier)
    }

    /// A user registered under `referrer_id` at the given depth.
    pub fn under(referral_code: String, referrer_id: Uuid, referral_depth: u8) -> Self {
        Self::create(referral_code, Some(referrer_id), referral_depth, FeeTier::Base)
    }

    fn create(
        referral_code: String,
        referrer_id: Option<Uuid>,
        referral_depth: u8,
        fee_tier: FeeTier,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            referral_code,
            referrer_id,
            children: Vec::new(),
            referral_depth,
            fee_tier,
            custom_commission_structure: None,
            total_xp_earned: Money::ZERO,
            total_commission_earned: Money::ZERO,
            total_cashback_earned: Money::ZERO,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether this user's own trades generate no fee at all.
    pub fn fees_waived(&self) -> bool {
        self.custom_commission_structure
            .map_or(false, |s| s.fees_waived)
    }
}

/// A recorded trade with its fee split snapshot.
///
/// Created with `commissions_distributed = false`; the flag flips only
/// after every commission row and balance increment has been applied. The
/// two-phase write is deliberate: a crash in between leaves a row that a
/// reconciliation pass can find by the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub user_id: Uuid,
    pub volume: Money,
    /// The fee rate actually applied (0 when the trader's fees are waived).
    pub fee_rate: Decimal,
    pub total_fee: Money,
    pub cashback_amount: Money,
    pub treasury_amount: Money,
    pub total_commissions: Money,
    pub token: String,
    pub chain: String,
    pub side: TradeSide,
    pub commissions_distributed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One commission entry, created once per (trade, beneficiary) pair at
/// distribution time. Immutable afterwards except the claim fields, which
/// only move forward (unclaimed → claimed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub commission_id: Uuid,
    /// Beneficiary.
    pub user_id: Uuid,
    /// The trader whose trade generated this entry.
    pub source_user_id: Uuid,
    pub trade_id: Uuid,
    pub level: u8,
    pub amount: Money,
    pub rate: Decimal,
    pub trade_volume: Money,
    pub trade_fee: Money,
    pub token: String,
    pub chain: String,
    pub is_claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ClaimStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    Commission,
    Cashback,
}

/// A withdrawal request handed off to the (external) claim executor.
/// Settlement never happens in this engine; only the state shape lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: Uuid,
    pub user_id: Uuid,
    pub amount: Money,
    pub token: String,
    pub chain: String,
    pub status: ClaimStatus,
    pub claim_type: ClaimType,
    /// Unclaimed commission entries covered by this claim (empty for
    /// cashback claims — cashback has no per-entry ledger).
    #[serde(default)]
    pub commission_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// Move the claim forward in its lifecycle. A claim never regresses and
    /// terminal states are final.
    pub fn advance(&mut self, next: ClaimStatus) -> Result<(), RefnetError> {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return Err(RefnetError::InvalidInput(format!(
                "claim {} cannot move from {} to {next}",
                self.claim_id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// An ancestor of a user together with its level (1 = direct referrer).
#[derive(Debug, Clone, PartialEq)]
pub struct Ancestor {
    pub level: u8,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_tier_wire_names() {
        assert_eq!(serde_json::to_value(FeeTier::Base).unwrap(), "BASE");
        assert_eq!(serde_json::to_value(FeeTier::Reduced).unwrap(), "REDUCED");
        assert_eq!(FeeTier::Base.as_ref(), "BASE");
    }

    #[test]
    fn structure_is_type_tagged() {
        let s = CustomCommissionStructure::new(CommissionStructureKind::KolCustom {
            level1_rate: Some(Decimal::new(40, 2)),
            level2_rate: None,
            level3_rate: None,
        });
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["type"], "KOL_CUSTOM");
        assert_eq!(json["level1_rate"], "0.40");
        assert_eq!(json["fees_waived"], false);
        let back: CustomCommissionStructure = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn structure_flags_default_to_false() {
        let s: CustomCommissionStructure =
            serde_json::from_value(serde_json::json!({ "type": "WAIVED" })).unwrap();
        assert_eq!(s.kind, CommissionStructureKind::Waived);
        assert!(!s.fees_waived);
        assert!(!s.commissions_waived);
    }

    #[test]
    fn root_user_has_depth_zero() {
        let u = User::root("AAAAAAAA".into(), FeeTier::Base);
        assert_eq!(u.referral_depth, 0);
        assert!(u.referrer_id.is_none());
        assert!(u.children.is_empty());
        assert!(u.is_active);
        assert!(u.total_commission_earned.is_zero());
    }

    #[test]
    fn fees_waived_reads_the_flag() {
        let mut u = User::root("AAAAAAAA".into(), FeeTier::Base);
        assert!(!u.fees_waived());
        u.custom_commission_structure = Some(CustomCommissionStructure {
            kind: CommissionStructureKind::Waived,
            fees_waived: true,
            commissions_waived: false,
        });
        assert!(u.fees_waived());
    }

    #[test]
    fn claim_advances_forward_only() {
        let mut claim = sample_claim();
        claim.advance(ClaimStatus::Processing).unwrap();
        claim.advance(ClaimStatus::Completed).unwrap();
        let err = claim.advance(ClaimStatus::Failed).unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)));
    }

    #[test]
    fn claim_may_skip_processing() {
        let mut claim = sample_claim();
        claim.advance(ClaimStatus::Completed).unwrap();
        assert_eq!(claim.status, ClaimStatus::Completed);
    }

    #[test]
    fn claim_never_regresses_to_pending() {
        let mut claim = sample_claim();
        claim.advance(ClaimStatus::Processing).unwrap();
        assert!(claim.advance(ClaimStatus::Pending).is_err());
    }

    #[test]
    fn failed_is_terminal() {
        let mut claim = sample_claim();
        claim.advance(ClaimStatus::Failed).unwrap();
        assert!(claim.advance(ClaimStatus::Completed).is_err());
    }

    fn sample_claim() -> Claim {
        Claim {
            claim_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: Money::from_int(5),
            token: "USDC".into(),
            chain: "ARBITRUM".into(),
            status: ClaimStatus::Pending,
            claim_type: ClaimType::Commission,
            commission_ids: vec![],
            tx_hash: None,
            merkle_root: None,
            failure_reason: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

//! Shared primitive types used across the entire generator.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for any entity in the generator.
pub type EntityId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Calendar day granularity used for lifecycles and observation dates.
pub type Day = NaiveDate;

/// Wall-clock instant of a transaction (no timezone; all dates are bank-local).
pub type Timestamp = NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

/// Booked transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnKind {
    Wire,
    Ach,
    CashDeposit,
    CashWithdrawal,
    Check,
    Card,
    InternalTransfer,
    Fx,
}

impl TxnKind {
    pub fn is_cash(self) -> bool {
        matches!(self, Self::CashDeposit | Self::CashWithdrawal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wire => "wire",
            Self::Ach => "ach",
            Self::CashDeposit => "cash_deposit",
            Self::CashWithdrawal => "cash_withdrawal",
            Self::Check => "check",
            Self::Card => "card",
            Self::InternalTransfer => "internal_transfer",
            Self::Fx => "fx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Online,
    Mobile,
    Branch,
    Atm,
    Api,
    Swift,
    PrivateBanking,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Mobile => "mobile",
            Self::Branch => "branch",
            Self::Atm => "atm",
            Self::Api => "api",
            Self::Swift => "swift",
            Self::PrivateBanking => "private_banking",
        }
    }
}

/// Alert / case severity bucket. Ordering is meaningful: Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Score anchor an alert of this tier starts from.
    pub fn base_score(self) -> f64 {
        match self {
            Self::Low => 25.0,
            Self::Medium => 50.0,
            Self::High => 75.0,
            Self::Critical => 90.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named money-laundering pattern the injector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Typology {
    Structuring,
    RapidMovement,
    FanIn,
    FanOut,
    Cycle,
    Mule,
    HighRiskCorridor,
    CashIntensive,
}

impl Typology {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structuring => "structuring",
            Self::RapidMovement => "rapid_movement",
            Self::FanIn => "fan_in",
            Self::FanOut => "fan_out",
            Self::Cycle => "cycle",
            Self::Mule => "mule",
            Self::HighRiskCorridor => "high_risk_corridor",
            Self::CashIntensive => "cash_intensive",
        }
    }
}

impl fmt::Display for Typology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal analyst outcome of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Disposition {
    #[serde(rename = "closed_no_issue")]
    ClosedNoIssue,
    #[serde(rename = "monitored")]
    Monitored,
    #[serde(rename = "escalated")]
    Escalated,
    #[serde(rename = "filed_SAR")]
    FiledSar,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClosedNoIssue => "closed_no_issue",
            Self::Monitored => "monitored",
            Self::Escalated => "escalated",
            Self::FiledSar => "filed_SAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Closed,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Severity of an adverse-media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSeverity {
    Negative,
    Critical,
}

impl MediaSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Critical => "critical",
        }
    }
}

/// Round a monetary amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Truncate a monetary amount to cents (never rounds up).
pub fn floor_cents(amount: f64) -> f64 {
    (amount * 100.0).floor() / 100.0
}

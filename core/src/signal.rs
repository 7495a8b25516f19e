//! Signal catalog and the per-account signal record.
//!
//! Signals are derived features. They are computed only from visible data
//! and are never persisted as raw input.

use crate::types::{Day, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Value shape of a signal. Rules are type-checked against it at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Numeric,
    Flag,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalName {
    // ── Behavioral ─────────────────────────────────
    #[serde(rename = "velocity_30d")]
    Velocity30d,
    #[serde(rename = "volume_30d")]
    Volume30d,
    #[serde(rename = "volume_90d")]
    Volume90d,
    #[serde(rename = "volume_zscore")]
    VolumeZscore,
    #[serde(rename = "in_out_ratio")]
    InOutRatio,
    #[serde(rename = "rapid_movement_score")]
    RapidMovementScore,
    #[serde(rename = "structuring_score")]
    StructuringScore,
    #[serde(rename = "counterparty_concentration")]
    CounterpartyConcentration,
    #[serde(rename = "new_counterparty_rate")]
    NewCounterpartyRate,
    #[serde(rename = "corridor_risk_score")]
    CorridorRiskScore,
    #[serde(rename = "cash_intensity")]
    CashIntensity,
    #[serde(rename = "round_amount_ratio")]
    RoundAmountRatio,

    // ── Network ────────────────────────────────────
    #[serde(rename = "degree_centrality")]
    DegreeCentrality,
    #[serde(rename = "risk_flow_in")]
    RiskFlowIn,
    #[serde(rename = "risk_flow_out")]
    RiskFlowOut,
    #[serde(rename = "pep_distance")]
    PepDistance,
    #[serde(rename = "sanctions_distance")]
    SanctionsDistance,

    // ── Entity ─────────────────────────────────────
    #[serde(rename = "pep_flag")]
    PepFlag,
    #[serde(rename = "sanctions_flag")]
    SanctionsFlag,
    #[serde(rename = "adverse_media_flag")]
    AdverseMediaFlag,
    #[serde(rename = "adverse_media_count")]
    AdverseMediaCount,
    #[serde(rename = "adverse_media_severity")]
    AdverseMediaSeverity,
    #[serde(rename = "jurisdiction_risk")]
    JurisdictionRisk,
    #[serde(rename = "kyc_age_days")]
    KycAgeDays,
    #[serde(rename = "account_age_days")]
    AccountAgeDays,
    #[serde(rename = "declared_vs_actual_volume")]
    DeclaredVsActualVolume,
    #[serde(rename = "dormancy_days")]
    DormancyDays,
}

impl SignalName {
    pub const ALL: [SignalName; 27] = [
        Self::Velocity30d,
        Self::Volume30d,
        Self::Volume90d,
        Self::VolumeZscore,
        Self::InOutRatio,
        Self::RapidMovementScore,
        Self::StructuringScore,
        Self::CounterpartyConcentration,
        Self::NewCounterpartyRate,
        Self::CorridorRiskScore,
        Self::CashIntensity,
        Self::RoundAmountRatio,
        Self::DegreeCentrality,
        Self::RiskFlowIn,
        Self::RiskFlowOut,
        Self::PepDistance,
        Self::SanctionsDistance,
        Self::PepFlag,
        Self::SanctionsFlag,
        Self::AdverseMediaFlag,
        Self::AdverseMediaCount,
        Self::AdverseMediaSeverity,
        Self::JurisdictionRisk,
        Self::KycAgeDays,
        Self::AccountAgeDays,
        Self::DeclaredVsActualVolume,
        Self::DormancyDays,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Velocity30d => "velocity_30d",
            Self::Volume30d => "volume_30d",
            Self::Volume90d => "volume_90d",
            Self::VolumeZscore => "volume_zscore",
            Self::InOutRatio => "in_out_ratio",
            Self::RapidMovementScore => "rapid_movement_score",
            Self::StructuringScore => "structuring_score",
            Self::CounterpartyConcentration => "counterparty_concentration",
            Self::NewCounterpartyRate => "new_counterparty_rate",
            Self::CorridorRiskScore => "corridor_risk_score",
            Self::CashIntensity => "cash_intensity",
            Self::RoundAmountRatio => "round_amount_ratio",
            Self::DegreeCentrality => "degree_centrality",
            Self::RiskFlowIn => "risk_flow_in",
            Self::RiskFlowOut => "risk_flow_out",
            Self::PepDistance => "pep_distance",
            Self::SanctionsDistance => "sanctions_distance",
            Self::PepFlag => "pep_flag",
            Self::SanctionsFlag => "sanctions_flag",
            Self::AdverseMediaFlag => "adverse_media_flag",
            Self::AdverseMediaCount => "adverse_media_count",
            Self::AdverseMediaSeverity => "adverse_media_severity",
            Self::JurisdictionRisk => "jurisdiction_risk",
            Self::KycAgeDays => "kyc_age_days",
            Self::AccountAgeDays => "account_age_days",
            Self::DeclaredVsActualVolume => "declared_vs_actual_volume",
            Self::DormancyDays => "dormancy_days",
        }
    }

    pub fn kind(self) -> SignalKind {
        match self {
            Self::PepFlag | Self::SanctionsFlag | Self::AdverseMediaFlag => SignalKind::Flag,
            Self::AdverseMediaSeverity => SignalKind::Category,
            _ => SignalKind::Numeric,
        }
    }

    /// Human-readable risk factor used on alerts.
    pub fn risk_factor(self) -> &'static str {
        match self {
            Self::StructuringScore => "Transactions near reporting threshold",
            Self::RapidMovementScore => "Rapid in-out fund movement",
            Self::VolumeZscore => "Unusual transaction volume",
            Self::CorridorRiskScore => "High-risk jurisdiction activity",
            Self::RiskFlowIn => "Inflow from risky network neighbours",
            Self::PepDistance => "Proximity to politically exposed persons",
            Self::SanctionsDistance => "Proximity to sanctioned parties",
            Self::AdverseMediaFlag | Self::AdverseMediaCount | Self::AdverseMediaSeverity => {
                "Adverse media coverage"
            }
            Self::KycAgeDays => "Outdated KYC information",
            Self::DeclaredVsActualVolume => "Activity inconsistent with declared profile",
            Self::CashIntensity => "High cash usage",
            Self::DormancyDays => "Reactivated dormant account",
            Self::RoundAmountRatio => "Round amount transactions",
            Self::NewCounterpartyRate => "Many new counterparties",
            Self::PepFlag => "Politically exposed person",
            _ => "Elevated risk indicator",
        }
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("undefined signal '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Numeric(f64),
    Flag(bool),
    Category(String),
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// One account's signals as of one observation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub account_id: EntityId,
    pub customer_id: EntityId,
    pub as_of: Day,
    pub values: BTreeMap<SignalName, SignalValue>,
    /// Visible transaction ids behind each transaction-derived signal.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contributing: BTreeMap<SignalName, Vec<EntityId>>,
}

impl SignalRecord {
    pub fn get(&self, name: SignalName) -> Option<&SignalValue> {
        self.values.get(&name)
    }

    /// Numeric value, or 0.0 when absent or not numeric.
    pub fn numeric(&self, name: SignalName) -> f64 {
        self.get(name).and_then(SignalValue::as_f64).unwrap_or(0.0)
    }

    pub fn flag(&self, name: SignalName) -> bool {
        self.get(name).and_then(SignalValue::as_bool).unwrap_or(false)
    }

    pub fn contributing(&self, name: SignalName) -> &[EntityId] {
        self.contributing
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_strings() {
        for name in SignalName::ALL {
            assert_eq!(name.as_str().parse::<SignalName>(), Ok(name));
            let json = serde_json::to_string(&name).expect("serialize");
            assert_eq!(json, format!("\"{}\"", name.as_str()));
        }
        assert!("volume_31d".parse::<SignalName>().is_err());
    }

    #[test]
    fn kinds_match_value_shapes() {
        assert_eq!(SignalName::PepFlag.kind(), SignalKind::Flag);
        assert_eq!(SignalName::AdverseMediaSeverity.kind(), SignalKind::Category);
        assert_eq!(SignalName::StructuringScore.kind(), SignalKind::Numeric);
    }
}

//! Declarative alert rules.
//!
//! Rules arrive as `RuleDef` (plain serde, signal names as strings) and are
//! compiled once into `AlertRule`, where every condition names a known
//! `SignalName` of the right kind. An undefined signal or a kind mismatch is
//! a configuration error raised here, never during evaluation.

use crate::{
    error::{SimError, SimResult},
    signal::{SignalKind, SignalName, SignalRecord, SignalValue},
    types::RiskTier,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Definitions (as loaded) ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionDef {
    Threshold { signal: String, op: CompareOp, value: f64 },
    Range { signal: String, min: f64, max: f64 },
    Equals { signal: String, value: String },
    Flag { signal: String, value: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationDef {
    pub when: ConditionDef,
    pub tier: RiskTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub rule_id: String,
    pub name: String,
    pub alert_type: String,
    pub description: String,
    pub base_tier: RiskTier,
    pub conditions: Vec<ConditionDef>,
    #[serde(default)]
    pub escalations: Vec<EscalationDef>,
}

// ── Compiled form ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Threshold { signal: SignalName, op: CompareOp, value: f64 },
    /// Inclusive lower bound, exclusive upper bound.
    Range { signal: SignalName, min: f64, max: f64 },
    Equals { signal: SignalName, value: String },
    Flag { signal: SignalName, expected: bool },
}

impl Condition {
    fn compile(def: &ConditionDef, rule_id: &str) -> SimResult<Self> {
        let (name, wanted) = match def {
            ConditionDef::Threshold { signal, .. } | ConditionDef::Range { signal, .. } => {
                (signal, SignalKind::Numeric)
            }
            ConditionDef::Equals { signal, .. } => (signal, SignalKind::Category),
            ConditionDef::Flag { signal, .. } => (signal, SignalKind::Flag),
        };
        let signal: SignalName = name
            .parse()
            .map_err(|e| SimError::config(format!("rule {rule_id}: {e}")))?;
        if signal.kind() != wanted {
            return Err(SimError::config(format!(
                "rule {rule_id}: signal '{signal}' is {:?}, condition expects {:?}",
                signal.kind(),
                wanted
            )));
        }
        Ok(match def {
            ConditionDef::Threshold { op, value, .. } => {
                if !value.is_finite() {
                    return Err(SimError::config(format!(
                        "rule {rule_id}: non-finite threshold on '{signal}'"
                    )));
                }
                Self::Threshold { signal, op: *op, value: *value }
            }
            ConditionDef::Range { min, max, .. } => {
                if !(min < max) {
                    return Err(SimError::config(format!(
                        "rule {rule_id}: empty range [{min}, {max}) on '{signal}'"
                    )));
                }
                Self::Range { signal, min: *min, max: *max }
            }
            ConditionDef::Equals { value, .. } => Self::Equals {
                signal,
                value: value.clone(),
            },
            ConditionDef::Flag { value, .. } => Self::Flag {
                signal,
                expected: *value,
            },
        })
    }

    pub fn signal(&self) -> SignalName {
        match self {
            Self::Threshold { signal, .. }
            | Self::Range { signal, .. }
            | Self::Equals { signal, .. }
            | Self::Flag { signal, .. } => *signal,
        }
    }

    /// An absent signal never satisfies a condition.
    pub fn holds(&self, record: &SignalRecord) -> bool {
        let Some(value) = record.get(self.signal()) else {
            return false;
        };
        match (self, value) {
            (Self::Threshold { op, value: rhs, .. }, SignalValue::Numeric(v)) => op.apply(*v, *rhs),
            (Self::Range { min, max, .. }, SignalValue::Numeric(v)) => *min <= *v && *v < *max,
            (Self::Equals { value: expected, .. }, SignalValue::Category(c)) => c == expected,
            (Self::Flag { expected, .. }, SignalValue::Flag(b)) => b == expected,
            _ => false,
        }
    }

    /// How close the record comes to satisfying this condition, in [0, 1].
    /// 1.0 means it holds.
    pub fn closeness(&self, record: &SignalRecord) -> f64 {
        if self.holds(record) {
            return 1.0;
        }
        match self {
            Self::Threshold { signal, op, value } => {
                let v = record.numeric(*signal);
                let ratio = match op {
                    CompareOp::Gt | CompareOp::Gte if *value > 0.0 => v / value,
                    CompareOp::Lt | CompareOp::Lte if v > 0.0 => value / v,
                    _ => 0.0,
                };
                ratio.clamp(0.0, 0.999)
            }
            _ => 0.0,
        }
    }

    /// Score contribution of a satisfied lower-bound threshold:
    /// `min(10, (value / threshold - 1) * 5)`.
    pub fn strength(&self, record: &SignalRecord) -> f64 {
        match self {
            Self::Threshold { signal, op: CompareOp::Gt | CompareOp::Gte, value } if *value > 0.0 => {
                let ratio = record.numeric(*signal) / value;
                ((ratio - 1.0) * 5.0).min(10.0)
            }
            _ => 0.0,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Threshold { signal, op, value } => format!("{signal} {} {value}", op.symbol()),
            Self::Range { signal, min, max } => format!("{min} <= {signal} < {max}"),
            Self::Equals { signal, value } => format!("{signal} == {value}"),
            Self::Flag { signal, expected } => format!("{signal} is {expected}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub when: Condition,
    pub tier: RiskTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub rule_id: String,
    pub name: String,
    pub alert_type: String,
    pub description: String,
    pub base_tier: RiskTier,
    pub conditions: Vec<Condition>,
    pub escalations: Vec<Escalation>,
}

impl AlertRule {
    /// All base conditions must hold.
    pub fn matches(&self, record: &SignalRecord) -> bool {
        self.conditions.iter().all(|c| c.holds(record))
    }

    /// Highest tier reached by any satisfied escalation, else the base tier.
    pub fn tier_for(&self, record: &SignalRecord) -> RiskTier {
        self.escalations
            .iter()
            .filter(|e| e.when.holds(record))
            .map(|e| e.tier)
            .fold(self.base_tier, RiskTier::max)
    }

    /// Weakest closeness among the base conditions.
    pub fn near_miss(&self, record: &SignalRecord) -> f64 {
        self.conditions
            .iter()
            .map(|c| c.closeness(record))
            .fold(1.0, f64::min)
    }

    pub fn strength(&self, record: &SignalRecord) -> f64 {
        self.conditions.iter().map(|c| c.strength(record)).sum()
    }

    /// Every signal the rule looks at, in declaration order, without repeats.
    pub fn signals(&self) -> Vec<SignalName> {
        let mut seen = Vec::new();
        let all = self
            .conditions
            .iter()
            .chain(self.escalations.iter().map(|e| &e.when))
            .map(Condition::signal);
        for name in all {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

/// The compiled, ordered rule catalog.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AlertRule>,
}

impl RuleSet {
    pub fn compile(defs: &[RuleDef]) -> SimResult<Self> {
        let mut ids = HashSet::new();
        let mut rules = Vec::with_capacity(defs.len());
        for def in defs {
            if !ids.insert(def.rule_id.as_str()) {
                return Err(SimError::config(format!("duplicate rule id {}", def.rule_id)));
            }
            if def.conditions.is_empty() {
                return Err(SimError::config(format!(
                    "rule {}: no base conditions",
                    def.rule_id
                )));
            }
            let conditions = def
                .conditions
                .iter()
                .map(|c| Condition::compile(c, &def.rule_id))
                .collect::<SimResult<Vec<_>>>()?;
            let mut escalations = Vec::with_capacity(def.escalations.len());
            for esc in &def.escalations {
                if esc.tier <= def.base_tier {
                    return Err(SimError::config(format!(
                        "rule {}: escalation to {} does not exceed base tier {}",
                        def.rule_id, esc.tier, def.base_tier
                    )));
                }
                escalations.push(Escalation {
                    when: Condition::compile(&esc.when, &def.rule_id)?,
                    tier: esc.tier,
                });
            }
            rules.push(AlertRule {
                rule_id: def.rule_id.clone(),
                name: def.name.clone(),
                alert_type: def.alert_type.clone(),
                description: def.description.clone(),
                base_tier: def.base_tier,
                conditions,
                escalations,
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn get(&self, rule_id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(values: &[(SignalName, SignalValue)]) -> SignalRecord {
        SignalRecord {
            account_id: "ACCT_00000001".into(),
            customer_id: "CUST_00000001".into(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 30).expect("date"),
            values: values.iter().cloned().collect::<BTreeMap<_, _>>(),
            contributing: BTreeMap::new(),
        }
    }

    fn structuring_rule() -> RuleDef {
        RuleDef {
            rule_id: "STRUCT_001".into(),
            name: "Potential Structuring".into(),
            alert_type: "structuring".into(),
            description: "near threshold".into(),
            base_tier: RiskTier::Medium,
            conditions: vec![ConditionDef::Threshold {
                signal: "structuring_score".into(),
                op: CompareOp::Gt,
                value: 3.0,
            }],
            escalations: vec![
                EscalationDef {
                    when: ConditionDef::Threshold {
                        signal: "volume_30d".into(),
                        op: CompareOp::Gt,
                        value: 50_000.0,
                    },
                    tier: RiskTier::High,
                },
                EscalationDef {
                    when: ConditionDef::Flag {
                        signal: "adverse_media_flag".into(),
                        value: true,
                    },
                    tier: RiskTier::Critical,
                },
            ],
        }
    }

    #[test]
    fn undefined_signal_fails_at_compile_time() {
        let mut def = structuring_rule();
        def.conditions = vec![ConditionDef::Threshold {
            signal: "smurf_index".into(),
            op: CompareOp::Gt,
            value: 1.0,
        }];
        let err = RuleSet::compile(&[def]).expect_err("undefined signal must be rejected");
        assert!(err.is_configuration(), "unexpected error kind: {err}");
        assert!(err.to_string().contains("smurf_index"));
    }

    #[test]
    fn kind_mismatch_fails_at_compile_time() {
        let mut def = structuring_rule();
        def.conditions = vec![ConditionDef::Threshold {
            signal: "pep_flag".into(),
            op: CompareOp::Gt,
            value: 0.5,
        }];
        assert!(RuleSet::compile(&[def]).is_err());
    }

    #[test]
    fn highest_satisfied_escalation_wins() {
        let rules = RuleSet::compile(&[structuring_rule()]).expect("compile");
        let rule = &rules.rules()[0];

        let quiet = record(&[(SignalName::StructuringScore, SignalValue::Numeric(5.0))]);
        assert!(rule.matches(&quiet));
        assert_eq!(rule.tier_for(&quiet), RiskTier::Medium);

        let loud = record(&[
            (SignalName::StructuringScore, SignalValue::Numeric(5.0)),
            (SignalName::Volume30d, SignalValue::Numeric(80_000.0)),
            (SignalName::AdverseMediaFlag, SignalValue::Flag(true)),
        ]);
        assert_eq!(rule.tier_for(&loud), RiskTier::Critical);
    }

    #[test]
    fn missing_signal_never_matches() {
        let rules = RuleSet::compile(&[structuring_rule()]).expect("compile");
        assert!(!rules.rules()[0].matches(&record(&[])));
    }

    #[test]
    fn near_miss_is_below_one_until_the_rule_fires() {
        let rules = RuleSet::compile(&[structuring_rule()]).expect("compile");
        let rule = &rules.rules()[0];
        let close = record(&[(SignalName::StructuringScore, SignalValue::Numeric(2.4))]);
        let score = rule.near_miss(&close);
        assert!((0.79..0.81).contains(&score), "near miss was {score}");
    }
}

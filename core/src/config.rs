//! Rule configuration: the gate's view of the external rule store.
//!
//! RULE: configuration is a value. Callers load a GateConfig, hand a
//! reference to each component per call, and reload by loading a fresh
//! value. Nothing in the gate caches rules in a global.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

// ── Fraud rules ────────────────────────────────────────────────────

/// Broad rule family, used for display and audit grouping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FraudRuleKind {
    Velocity,
    Amount,
    Behavioural,
    TimeBased,
    Geographic,
    Device,
}

/// One case per rule kind, each with its own typed parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FraudCondition {
    Velocity {
        #[serde(default = "default_velocity_window")]
        window_minutes: u32,
        max_transactions: u32,
    },
    AmountThreshold {
        threshold: f64,
    },
    AmountMultiplier {
        multiplier: f64,
        #[serde(default = "default_average_sample")]
        sample_size: u32,
    },
    Behavioural {
        threshold: f64,
    },
    /// Unusual window `[start_hour, end_hour)` in UTC; wraps past midnight
    /// when start_hour > end_hour.
    TimeBased {
        start_hour: u32,
        end_hour: u32,
    },
    Geographic {
        high_risk_countries: Vec<String>,
    },
    Device,
}

fn default_velocity_window() -> u32 {
    60
}

fn default_average_sample() -> u32 {
    50
}

impl FraudCondition {
    pub fn kind(&self) -> FraudRuleKind {
        match self {
            Self::Velocity { .. } => FraudRuleKind::Velocity,
            Self::AmountThreshold { .. } | Self::AmountMultiplier { .. } => FraudRuleKind::Amount,
            Self::Behavioural { .. } => FraudRuleKind::Behavioural,
            Self::TimeBased { .. } => FraudRuleKind::TimeBased,
            Self::Geographic { .. } => FraudRuleKind::Geographic,
            Self::Device => FraudRuleKind::Device,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudRule {
    pub rule_id: String,
    pub name: String,
    /// Points added when the rule triggers. Unsigned so that a triggered
    /// rule can never lower a score.
    pub weight: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    pub condition: FraudCondition,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct FraudRulesFile {
    rules: Vec<FraudRule>,
}

// ── Transaction limits ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionLimit {
    pub kyc_tier: String,
    pub daily_limit: f64,
    pub monthly_limit: f64,
    pub single_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LimitsFile {
    limits: Vec<TransactionLimit>,
}

// ── SCA ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaConfig {
    pub enabled: bool,
    /// Step-up is required strictly above this amount.
    pub amount_threshold: f64,
    pub max_attempts: u32,
    pub expiry_seconds: i64,
    #[serde(default)]
    pub sensitive_actions: Vec<String>,
}

impl Default for ScaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amount_threshold: 25.0,
            max_attempts: 3,
            expiry_seconds: 300,
            sensitive_actions: Vec::new(),
        }
    }
}

impl ScaConfig {
    pub fn is_sensitive(&self, action: &str) -> bool {
        self.sensitive_actions.iter().any(|a| a == action)
    }
}

// ── AML ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AmlConfig {
    pub large_transaction_threshold: f64,
    pub critical_transaction_threshold: f64,
    pub velocity_window_seconds: i64,
    /// Velocity triggers when the trailing count is strictly above this.
    pub velocity_max_transactions: i64,
    pub structuring_lower_bound: f64,
    pub structuring_upper_bound: f64,
    pub structuring_window_seconds: i64,
    pub structuring_min_prior: i64,
    /// Counterparty names that raise a critical alert on an exact
    /// (case- and whitespace-insensitive) match.
    pub watchlist: Vec<String>,
}

impl Default for AmlConfig {
    fn default() -> Self {
        Self {
            large_transaction_threshold: 10_000.0,
            critical_transaction_threshold: 50_000.0,
            velocity_window_seconds: 3_600,
            velocity_max_transactions: 5,
            structuring_lower_bound: 8_000.0,
            structuring_upper_bound: 10_000.0,
            structuring_window_seconds: 86_400,
            structuring_min_prior: 2,
            watchlist: Vec::new(),
        }
    }
}

// ── PIN ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub pbkdf2_iterations: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self { pbkdf2_iterations: 100_000 }
    }
}

// ── Missing configuration ──────────────────────────────────────────

/// What the gate does when a rule set or tier limit is absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingConfigPolicy {
    /// No fraud rules → allow; no tier limit → unlimited.
    #[default]
    FailOpen,
    /// No fraud rules → review; no tier limit → reject.
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PolicyFile {
    #[serde(default)]
    missing_config_policy: MissingConfigPolicy,
}

// ── Root config ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub fraud_rules: Vec<FraudRule>,
    pub limits: HashMap<String, TransactionLimit>,
    pub sca: ScaConfig,
    pub aml: AmlConfig,
    pub pin: PinConfig,
    pub missing_config_policy: MissingConfigPolicy,
}

impl GateConfig {
    /// Load from the data/ directory.
    /// In tests, use GateConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let fraud_file: FraudRulesFile = read_json(&format!("{data_dir}/fraud/fraud_rules.json"))?;
        let limits_file: LimitsFile =
            read_json(&format!("{data_dir}/limits/transaction_limits.json"))?;
        let sca: ScaConfig = read_json(&format!("{data_dir}/sca/sca_config.json"))?;
        let aml: AmlConfig = read_json_or_default(&format!("{data_dir}/aml/aml_config.json"))?;
        let pin: PinConfig = read_json_or_default(&format!("{data_dir}/pin/pin_config.json"))?;
        let policy: PolicyFile =
            read_json_or_default(&format!("{data_dir}/policy/missing_config.json"))?;

        let config = Self {
            fraud_rules: fraud_file.rules,
            limits: limits_file
                .limits
                .into_iter()
                .map(|l| (l.kyc_tier.clone(), l))
                .collect(),
            sca,
            aml,
            pin,
            missing_config_policy: policy.missing_config_policy,
        };
        config.validate()?;
        log::info!(
            "config: loaded {} fraud rules, {} limit tiers from {data_dir}",
            config.fraud_rules.len(),
            config.limits.len()
        );
        Ok(config)
    }

    /// Reject configuration shapes that would make a rule meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        for rule in &self.fraud_rules {
            match &rule.condition {
                FraudCondition::Velocity { window_minutes, .. } if *window_minutes == 0 => {
                    anyhow::bail!("fraud rule {}: window_minutes must be > 0", rule.rule_id)
                }
                FraudCondition::AmountThreshold { threshold }
                | FraudCondition::Behavioural { threshold }
                    if !threshold.is_finite() || *threshold < 0.0 =>
                {
                    anyhow::bail!("fraud rule {}: threshold must be >= 0", rule.rule_id)
                }
                FraudCondition::AmountMultiplier { multiplier, sample_size }
                    if !multiplier.is_finite() || *multiplier <= 0.0 || *sample_size == 0 =>
                {
                    anyhow::bail!(
                        "fraud rule {}: multiplier and sample_size must be > 0",
                        rule.rule_id
                    )
                }
                FraudCondition::TimeBased { start_hour, end_hour }
                    if *start_hour > 23 || *end_hour > 24 =>
                {
                    anyhow::bail!("fraud rule {}: hours must be within a day", rule.rule_id)
                }
                _ => {}
            }
        }
        for limit in self.limits.values() {
            let caps = [limit.daily_limit, limit.monthly_limit, limit.single_limit];
            if caps.iter().any(|c| !c.is_finite() || *c < 0.0) {
                anyhow::bail!("limit tier {}: caps must be finite and >= 0", limit.kyc_tier);
            }
        }
        if self.sca.max_attempts == 0 {
            anyhow::bail!("sca: max_attempts must be >= 1");
        }
        if self.sca.expiry_seconds <= 0 {
            anyhow::bail!("sca: expiry_seconds must be > 0");
        }
        if self.pin.pbkdf2_iterations == 0 {
            anyhow::bail!("pin: pbkdf2_iterations must be > 0");
        }
        Ok(())
    }

    pub fn active_fraud_rules(&self) -> impl Iterator<Item = &FraudRule> {
        self.fraud_rules.iter().filter(|r| r.active)
    }

    pub fn limit_for_tier(&self, kyc_tier: &str) -> Option<&TransactionLimit> {
        self.limits.get(kyc_tier)
    }

    /// Config with hardcoded defaults for use in tests.
    /// PBKDF2 iterations are lowered so hashing stays fast in debug builds.
    pub fn default_test() -> Self {
        let fraud_rules = vec![
            FraudRule {
                rule_id: "FR-VEL-60".into(),
                name: "High velocity".into(),
                weight: 30,
                active: true,
                condition: FraudCondition::Velocity {
                    window_minutes: 60,
                    max_transactions: 5,
                },
            },
            FraudRule {
                rule_id: "FR-AMT-5K".into(),
                name: "Large amount".into(),
                weight: 25,
                active: true,
                condition: FraudCondition::AmountThreshold { threshold: 5_000.0 },
            },
            FraudRule {
                rule_id: "FR-AMT-AVG".into(),
                name: "Amount far above average".into(),
                weight: 20,
                active: true,
                condition: FraudCondition::AmountMultiplier {
                    multiplier: 5.0,
                    sample_size: 50,
                },
            },
            FraudRule {
                rule_id: "FR-NEW-PAYEE".into(),
                name: "New payee".into(),
                weight: 20,
                active: true,
                condition: FraudCondition::Behavioural { threshold: 1_000.0 },
            },
            FraudRule {
                rule_id: "FR-NIGHT".into(),
                name: "Unusual hour".into(),
                weight: 10,
                active: true,
                condition: FraudCondition::TimeBased {
                    start_hour: 0,
                    end_hour: 5,
                },
            },
        ];

        let limits = [
            ("basic", 1_000.0, 5_000.0, 500.0),
            ("standard", 10_000.0, 50_000.0, 5_000.0),
            ("enhanced", 50_000.0, 250_000.0, 25_000.0),
        ]
        .into_iter()
        .map(|(tier, daily, monthly, single)| {
            (
                tier.to_string(),
                TransactionLimit {
                    kyc_tier: tier.to_string(),
                    daily_limit: daily,
                    monthly_limit: monthly,
                    single_limit: single,
                },
            )
        })
        .collect();

        Self {
            fraud_rules,
            limits,
            sca: ScaConfig {
                sensitive_actions: vec!["add_payee".into(), "change_pin".into()],
                ..ScaConfig::default()
            },
            aml: AmlConfig::default(),
            pin: PinConfig { pbkdf2_iterations: 1_000 },
            missing_config_policy: MissingConfigPolicy::FailOpen,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    if std::path::Path::new(path).exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

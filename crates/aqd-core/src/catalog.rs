use std::collections::HashSet;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRIAL_DAYS: i64 = 14;
/// Upper bound for `trial_days` and `period_days` (one hundred years).
pub const MAX_PERIOD_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub period_days: i64,
    pub features: Vec<String>,
}

impl Plan {
    pub fn includes(&self, feature: &str) -> bool {
        self.features.iter().any(|included| included == feature)
    }
}

/// Process-wide constants: plans, trial length and accepted payment methods.
/// Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub trial_days: i64,
    pub default_plan: String,
    pub plans: Vec<Plan>,
    pub payment_methods: Vec<String>,
}

impl Catalog {
    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(raw).context("catalog is not valid JSON")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PERIOD_DAYS).contains(&self.trial_days) {
            anyhow::bail!("trial_days must be between 1 and {MAX_PERIOD_DAYS}");
        }
        if self.plans.is_empty() {
            anyhow::bail!("catalog must define at least one plan");
        }

        let mut seen = HashSet::new();
        for plan in &self.plans {
            if !seen.insert(plan.id.as_str()) {
                anyhow::bail!("duplicate plan id {}", plan.id);
            }
            if !(1..=MAX_PERIOD_DAYS).contains(&plan.period_days) {
                anyhow::bail!(
                    "plan {} must have period_days between 1 and {MAX_PERIOD_DAYS}",
                    plan.id
                );
            }
            if plan.price < Decimal::ZERO {
                anyhow::bail!("plan {} has a negative price", plan.id);
            }
        }

        if self.plan(&self.default_plan).is_none() {
            anyhow::bail!("default_plan {} is not in the catalog", self.default_plan);
        }
        if self.payment_methods.is_empty() {
            anyhow::bail!("catalog must accept at least one payment method");
        }

        Ok(())
    }

    pub fn plan(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == id)
    }

    pub fn accepts_payment_method(&self, method: &str) -> bool {
        self.payment_methods.iter().any(|accepted| accepted == method)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let features = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();

        Self {
            trial_days: DEFAULT_TRIAL_DAYS,
            default_plan: "basic".to_string(),
            plans: vec![
                Plan {
                    id: "basic".to_string(),
                    name: "الباقة الأساسية".to_string(),
                    price: Decimal::new(99, 0),
                    currency: "SAR".to_string(),
                    period_days: 30,
                    features: features(&["contracts", "clients", "notifications"]),
                },
                Plan {
                    id: "pro".to_string(),
                    name: "الباقة الاحترافية".to_string(),
                    price: Decimal::new(249, 0),
                    currency: "SAR".to_string(),
                    period_days: 30,
                    features: features(&[
                        "contracts",
                        "clients",
                        "notifications",
                        "messages",
                        "reports",
                    ]),
                },
                Plan {
                    id: "enterprise".to_string(),
                    name: "باقة المؤسسات".to_string(),
                    price: Decimal::new(2490, 0),
                    currency: "SAR".to_string(),
                    period_days: 365,
                    features: features(&[
                        "contracts",
                        "clients",
                        "notifications",
                        "messages",
                        "reports",
                        "affiliates",
                    ]),
                },
            ],
            payment_methods: vec![
                "bank_transfer".to_string(),
                "stc_pay".to_string(),
                "cash".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_valid() {
        let catalog = Catalog::default();
        catalog.validate().unwrap();
        assert_eq!(catalog.trial_days, 14);
        assert!(catalog.plan("pro").unwrap().includes("reports"));
        assert!(!catalog.plan("basic").unwrap().includes("reports"));
    }

    #[test]
    fn rejects_unknown_default_plan() {
        let mut catalog = Catalog::default();
        catalog.default_plan = "gold".to_string();
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("gold"));
    }

    #[test]
    fn loads_from_json() {
        let raw = serde_json::to_string(&Catalog::default()).unwrap();
        let catalog = Catalog::from_json(&raw).unwrap();
        assert!(catalog.accepts_payment_method("bank_transfer"));
        assert!(!catalog.accepts_payment_method("bitcoin"));
    }

    #[test]
    fn rejects_out_of_range_durations() {
        let mut raw = serde_json::to_value(Catalog::default()).unwrap();
        raw["trial_days"] = serde_json::json!(1_000_000_000_000_i64);
        let err = Catalog::from_json(&raw.to_string()).unwrap_err();
        assert!(format!("{err:#}").contains("trial_days"));

        let mut catalog = Catalog::default();
        catalog.trial_days = MAX_PERIOD_DAYS;
        catalog.validate().unwrap();

        catalog.plans[0].period_days = MAX_PERIOD_DAYS + 1;
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("period_days"));
    }
}

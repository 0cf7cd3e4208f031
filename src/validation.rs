//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy maps violations to actions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::LayerCatalog;
use crate::config::{CollectionConfig, FailureMode};
use crate::obstruction::ObstructionRules;
use crate::rarity::RaritySchedule;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub collection: String,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }
}

/// Everything a rule may inspect.
pub struct CollectionContext<'a> {
    pub config: &'a CollectionConfig,
    pub catalog: &'a LayerCatalog,
    pub schedule: &'a RaritySchedule,
    pub obstructions: &'a ObstructionRules,
}

/// Validation rule trait - produces violations
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

/// Every edition in the run must resolve to a rarity slot.
pub struct ScheduleCoverageRule;

impl ValidationRule for ScheduleCoverageRule {
    fn name(&self) -> &'static str { "schedule_coverage" }

    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        let uncovered: Vec<u32> = ctx
            .config
            .editions()
            .filter(|e| ctx.schedule.rarity_for_edition(*e).is_err())
            .collect();
        if !uncovered.is_empty() {
            violations.push(ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Editions without a rarity slot".to_string(),
                expected: Some(format!("slots for editions {:?}", ctx.config.editions())),
                actual: Some(format!("uncovered {:?}", uncovered)),
                remediation: vec!["Extend rarity ranges to cover 1..=editionSize".to_string()],
            });
        }

        let slots = ctx.schedule.slot_count();
        if slots != ctx.config.edition_size as usize {
            violations.push(ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: "Rarity ranges overlap or leave gaps".to_string(),
                expected: Some(format!("{} slots", ctx.config.edition_size)),
                actual: Some(format!("{} slots", slots)),
                remediation: vec!["Make rarity ranges partition 1..=editionSize".to_string()],
            });
        }

        violations
    }
}

/// Every pool a scheduled edition can draw from must hold at least one element.
pub struct ElementPoolRule;

impl ValidationRule for ElementPoolRule {
    fn name(&self) -> &'static str { "element_pool" }

    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation> {
        let scheduled: BTreeSet<&str> = ctx
            .config
            .editions()
            .filter_map(|e| ctx.schedule.rarity_for_edition(e).ok())
            .map(String::as_str)
            .collect();

        let mut violations = vec![];
        for layer in ctx.catalog.layers() {
            for rarity in scheduled.iter().copied() {
                let reachable: Vec<&str> = match layer.override_for(rarity) {
                    Some(dist) => dist
                        .iter()
                        .enumerate()
                        // the first entry doubles as the fallback and is always reachable
                        .filter(|(i, w)| *i == 0 || w.percent > 0.0)
                        .map(|(_, w)| w.rarity.as_str())
                        .collect(),
                    None => vec![rarity],
                };

                for pool in reachable {
                    if layer.elements_for(pool).is_empty() {
                        violations.push(ValidationViolation {
                            rule: self.name().to_string(),
                            severity: ViolationSeverity::Error,
                            message: format!("Layer {} has no elements for rarity {}", layer.id, pool),
                            expected: Some("at least 1 element".to_string()),
                            actual: Some("0 elements".to_string()),
                            remediation: vec![format!(
                                "Add images under <layersDir>/{}/{}",
                                layer.id, pool
                            )],
                        });
                    }
                }
            }
        }
        violations
    }
}

/// A tier cannot hold more unique editions than it has element combinations.
pub struct CapacityRule;

impl ValidationRule for CapacityRule {
    fn name(&self) -> &'static str { "capacity" }

    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation> {
        let mut demand: BTreeMap<&str, u64> = BTreeMap::new();
        for edition in ctx.config.editions() {
            if let Ok(rarity) = ctx.schedule.rarity_for_edition(edition) {
                *demand.entry(rarity.as_str()).or_default() += 1;
            }
        }

        demand
            .into_iter()
            .filter_map(|(rarity, needed)| {
                // upper bound: obstructions and id concatenation can only lower it
                let combinations = ctx.catalog.layers().iter().fold(1u128, |acc, layer| {
                    let mut tiers: Vec<&str> = match layer.override_for(rarity) {
                        Some(dist) => dist.iter().map(|w| w.rarity.as_str()).collect(),
                        None => vec![rarity],
                    };
                    tiers.sort_unstable();
                    tiers.dedup();
                    let pool: usize = tiers.iter().map(|t| layer.elements_for(t).len()).sum();
                    acc.saturating_mul(pool as u128)
                });

                (u128::from(needed) > combinations).then(|| ValidationViolation {
                    rule: self.name().to_string(),
                    severity: ViolationSeverity::Error,
                    message: format!("Rarity {} cannot yield {} unique editions", rarity, needed),
                    expected: Some(format!("at least {} combinations", needed)),
                    actual: Some(format!("{} combinations", combinations)),
                    remediation: vec![
                        "Add elements or layers for this rarity".to_string(),
                        "Shrink the rarity range".to_string(),
                    ],
                })
            })
            .collect()
    }
}

/// Groups naming unknown elements never trigger; surface them.
pub struct ObstructionGroupRule;

impl ValidationRule for ObstructionGroupRule {
    fn name(&self) -> &'static str { "obstruction_groups" }

    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation> {
        ctx.obstructions
            .groups()
            .iter()
            .filter(|g| !g.is_active())
            .map(|g| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: "Obstruction group references unknown elements and will never trigger".to_string(),
                expected: Some("element names present in the catalog".to_string()),
                actual: Some(g.names().collect::<Vec<_>>().join(", ")),
                remediation: vec!["Fix the element names or drop the group".to_string()],
            })
            .collect()
    }
}

/// Override percentages that do not add up to 100.
pub struct DistributionRule;

impl ValidationRule for DistributionRule {
    fn name(&self) -> &'static str { "distribution" }

    fn validate(&self, ctx: &CollectionContext<'_>) -> Vec<ValidationViolation> {
        ctx.config
            .layer_rarity_overrides
            .iter()
            .filter_map(|o| {
                let total: f64 = o.percentages.iter().map(|w| w.percent).sum();
                if (total - 100.0).abs() < 1e-9 {
                    return None;
                }
                Some(ValidationViolation {
                    rule: self.name().to_string(),
                    severity: ViolationSeverity::Warning,
                    message: format!("Override {}/{} does not sum to 100", o.rarity, o.layer),
                    expected: Some("100".to_string()),
                    actual: Some(format!("{}", total)),
                    remediation: vec![format!(
                        "Below 100 the remainder falls back to {}",
                        o.percentages.first().map_or("the first entry", |w| w.rarity.as_str())
                    )],
                })
            })
            .collect()
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ScheduleCoverageRule),
                Box::new(ElementPoolRule),
                Box::new(CapacityRule),
                Box::new(ObstructionGroupRule),
                Box::new(DistributionRule),
            ],
        }
    }

    pub fn validate(&self, ctx: &CollectionContext<'_>) -> ValidationResult {
        let mut all_violations = vec![];

        for rule in &self.rules {
            all_violations.extend(rule.validate(ctx));
        }

        let has_errors = all_violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        let collection = ctx.config.name.clone();

        match ctx.config.validation.failure_mode {
            FailureMode::Block => ValidationResult {
                valid: !has_errors,
                violations: all_violations,
                collection,
            },
            FailureMode::Warn | FailureMode::Log => {
                // Never block, just record
                ValidationResult {
                    valid: true,
                    violations: all_violations,
                    collection,
                }
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

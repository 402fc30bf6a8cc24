//! Near-bound detection over fitted parameter rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Distance from a bound at or below which a fitted value counts as "on" it.
pub const DEFAULT_BOUND_TOLERANCE: f64 = 1e-10;

/// Fitted value of a parameter: one scalar, or one value per motif.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Motifs(BTreeMap<String, f64>),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            ParamValue::Motifs(_) => None,
        }
    }
}

/// One fitted parameter and the bounds it was optimized within.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRule {
    pub par_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
    pub init: ParamValue,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
}

/// A parameter whose fitted value sits on one of its bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub par_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsViolation {
    pub source: String,
    pub violations: Vec<Violation>,
}

impl BoundsViolation {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BoundaryChecker {
    tolerance: f64,
    exclude: Vec<String>,
}

impl Default for BoundaryChecker {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_BOUND_TOLERANCE,
            exclude: vec!["length".to_string(), "mprobs".to_string()],
        }
    }
}

impl BoundaryChecker {
    pub fn new(tolerance: f64, exclude: Vec<String>) -> Self {
        Self { tolerance, exclude }
    }

    fn near(&self, value: f64, bound: Option<f64>) -> bool {
        bound.is_some_and(|b| (value - b).abs() <= self.tolerance)
    }

    /// Rate parameters lying within tolerance of a bound, in input order.
    ///
    /// Excluded names and motif-valued parameters are skipped.
    #[instrument(level = "debug", skip(self, rules))]
    pub fn check(&self, source: &str, rules: &[ParamRule]) -> BoundsViolation {
        let violations: Vec<Violation> = rules
            .iter()
            .filter(|rule| !self.exclude.iter().any(|e| e == &rule.par_name))
            .filter_map(|rule| {
                let value = rule.init.as_scalar()?;
                (self.near(value, rule.lower) || self.near(value, rule.upper)).then(|| Violation {
                    par_name: rule.par_name.clone(),
                    edge: rule.edge.clone(),
                    value,
                })
            })
            .collect();
        debug!("{} of {} parameters on a bound", violations.len(), rules.len());
        BoundsViolation {
            source: source.to_string(),
            violations,
        }
    }
}

/// Checks with the default tolerance and exclusions.
pub fn check_boundary(source: &str, rules: &[ParamRule]) -> BoundsViolation {
    BoundaryChecker::default().check(source, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rule(name: &str, init: f64, lower: f64, upper: f64) -> ParamRule {
        ParamRule {
            par_name: name.to_string(),
            edge: None,
            init: ParamValue::Scalar(init),
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    #[rstest]
    #[case(1e-6, true)]
    #[case(1e-6 + 5e-11, true)]
    #[case(1.0000000991577895e-06, true)]
    #[case(200.0, true)]
    #[case(199.9999968, false)]
    #[case(3.5, false)]
    fn given_value_when_checking_then_flagged_only_on_bound(#[case] init: f64, #[case] expected: bool) {
        let result = check_boundary("fit", &[rule("A/G", init, 1e-6, 200.0)]);
        assert_eq!(!result.is_empty(), expected);
    }

    #[test]
    fn given_excluded_names_when_checking_then_skipped() {
        let rules = vec![rule("length", 1e-6, 1e-6, 50.0), rule("mprobs", 0.0, 0.0, 1.0)];
        assert!(check_boundary("fit", &rules).is_empty());
    }

    #[test]
    fn given_motif_values_when_checking_then_skipped() {
        let rules = vec![ParamRule {
            par_name: "psubs".to_string(),
            edge: None,
            init: ParamValue::Motifs([("A".to_string(), 0.0)].into_iter().collect()),
            lower: Some(0.0),
            upper: None,
        }];
        assert!(check_boundary("fit", &rules).is_empty());
    }

    #[test]
    fn given_violation_when_checking_then_edge_and_source_kept() {
        let mut r = rule("C/T", 200.0, 1e-6, 200.0);
        r.edge = Some("Human".to_string());
        let result = check_boundary("brca1", &[r]);
        assert_eq!(result.source, "brca1");
        assert_eq!(
            result.violations,
            vec![Violation {
                par_name: "C/T".to_string(),
                edge: Some("Human".to_string()),
                value: 200.0
            }]
        );
    }

    #[test]
    fn given_missing_bounds_when_checking_then_not_flagged() {
        let rules = vec![ParamRule {
            par_name: "kappa".to_string(),
            edge: None,
            init: ParamValue::Scalar(1.0),
            lower: None,
            upper: None,
        }];
        assert!(check_boundary("fit", &rules).is_empty());
    }

    #[test]
    fn given_custom_tolerance_when_checking_then_wider_band() {
        let checker = BoundaryChecker::new(1e-3, vec![]);
        let result = checker.check("fit", &[rule("length", 1e-6 + 1e-4, 1e-6, 10.0)]);
        assert_eq!(result.violations.len(), 1);
    }
}

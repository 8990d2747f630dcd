//! Risk analysis
//!
//! Analysis is advisory. [`RiskAnalyzer::analyze`] is a pure function of the
//! simulation and the intent; [`RiskAnalyzer::on_breach`] only notifies.
//! Whether an alert blocks a transaction is the caller's policy.

mod audit_log;
mod rules;

pub use audit_log::JsonlBreachLog;
pub use rules::RuleBasedAnalyzer;

use crate::intent::TransactionIntent;
use crate::wallet::SimulationResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious an alert is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding about a prepared transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub severity: Severity,
    /// Stable machine-readable identifier of the rule that fired
    pub code: String,
    pub description: String,
}

impl RiskAlert {
    pub fn new(severity: Severity, code: &str, description: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            description: description.into(),
        }
    }
}

/// Inspects simulated intents
pub trait RiskAnalyzer: Send + Sync {
    /// Alerts for `intent` given its simulation. No side effects.
    fn analyze(&self, simulation: &SimulationResult, intent: &TransactionIntent) -> Vec<RiskAlert>;

    /// Notification that `alert` crossed the breach threshold
    fn on_breach(&self, alert: &RiskAlert);
}

/// Receiver of breach notifications
pub trait BreachHook: Send + Sync {
    fn notify(&self, alert: &RiskAlert);
}

/// Reports breaches as `warn` level tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBreachHook;

impl BreachHook for TracingBreachHook {
    fn notify(&self, alert: &RiskAlert) {
        tracing::warn!(
            severity = %alert.severity,
            code = %alert.code,
            description = %alert.description,
            "Risk threshold breached"
        );
    }
}

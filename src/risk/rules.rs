//! Rule-based risk analysis
//!
//! Each rule looks at one property of the intent or its simulation and emits
//! at most one alert. Rules run in a fixed order; the resulting list is not
//! sorted by severity.

use super::{BreachHook, RiskAlert, RiskAnalyzer, Severity};
use crate::amount::{format_units, parse_units};
use crate::chain::Chain;
use crate::config::RiskConfig;
use crate::intent::TransactionIntent;
use crate::wallet::SimulationResult;
use crate::{Error, Result};
use alloy::primitives::U256;
use std::collections::HashMap;
use std::sync::Arc;

/// `approve(address,uint256)`
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

const EVM_BURN_ADDRESSES: &[&str] = &[
    "0x0000000000000000000000000000000000000000",
    "0x000000000000000000000000000000000000dead",
];

const SOLANA_BURN_ADDRESSES: &[&str] = &[
    // 32 zero bytes
    "11111111111111111111111111111111",
    "1nc1nerator11111111111111111111111111111111",
];

/// Fixed rule set with per-chain thresholds
pub struct RuleBasedAnalyzer {
    large_transfer: HashMap<Chain, U256>,
    high_gas_limit: U256,
    hooks: Vec<Arc<dyn BreachHook>>,
}

impl RuleBasedAnalyzer {
    /// Build from config, converting display-unit thresholds to base units
    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        let mut large_transfer = HashMap::new();
        for (chain, amount) in &config.large_transfer {
            let threshold = parse_units(amount, chain.decimals()).map_err(|e| {
                Error::Config(format!("large transfer threshold for {}: {}", chain, e))
            })?;
            large_transfer.insert(*chain, threshold);
        }

        Ok(Self {
            large_transfer,
            high_gas_limit: U256::from(config.high_gas_limit),
            hooks: Vec::new(),
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn BreachHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    fn is_burn_address(chain: Chain, address: &str) -> bool {
        match chain {
            Chain::Ethereum => EVM_BURN_ADDRESSES
                .iter()
                .any(|burn| burn.eq_ignore_ascii_case(address)),
            Chain::Solana => SOLANA_BURN_ADDRESSES.contains(&address),
            // provably unspendable outputs are scripts, not addresses
            Chain::Bitcoin => false,
        }
    }

    fn is_self_transfer(intent: &TransactionIntent) -> bool {
        match intent.chain {
            Chain::Ethereum => intent.from.eq_ignore_ascii_case(&intent.to),
            Chain::Bitcoin | Chain::Solana => intent.from == intent.to,
        }
    }
}

impl Default for RuleBasedAnalyzer {
    fn default() -> Self {
        let defaults = RiskConfig::default();
        let large_transfer = Chain::ALL
            .iter()
            .filter_map(|chain| {
                let amount = defaults.large_transfer.get(chain)?;
                let threshold = parse_units(amount, chain.decimals()).ok()?;
                Some((*chain, threshold))
            })
            .collect();

        Self {
            large_transfer,
            high_gas_limit: U256::from(defaults.high_gas_limit),
            hooks: Vec::new(),
        }
    }
}

impl std::fmt::Debug for RuleBasedAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedAnalyzer")
            .field("large_transfer", &self.large_transfer)
            .field("high_gas_limit", &self.high_gas_limit)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Spender and amount of an ERC-20 `approve` call, if `data` is one
fn decode_approve(data: &[u8]) -> Option<(&[u8], U256)> {
    if data.len() < 4 + 64 || data[..4] != APPROVE_SELECTOR {
        return None;
    }
    let spender = &data[4 + 12..4 + 32];
    let amount = U256::from_be_slice(&data[36..68]);
    Some((spender, amount))
}

impl RiskAnalyzer for RuleBasedAnalyzer {
    fn analyze(&self, simulation: &SimulationResult, intent: &TransactionIntent) -> Vec<RiskAlert> {
        let mut alerts = Vec::new();
        let call_data = intent.call_data().filter(|d| !d.is_empty());

        if !simulation.success {
            let reason = simulation.error.as_deref().unwrap_or("unknown reason");
            alerts.push(RiskAlert::new(
                Severity::Critical,
                "simulation_failed",
                format!("Simulation failed: {}", reason),
            ));
        }

        if let Some((spender, amount)) = call_data.and_then(|d| decode_approve(d)) {
            if amount == U256::MAX {
                alerts.push(RiskAlert::new(
                    Severity::Critical,
                    "unlimited_approval",
                    format!(
                        "Grants 0x{} an unlimited allowance on {}",
                        alloy::hex::encode(spender),
                        intent.to
                    ),
                ));
            }
        }

        if Self::is_burn_address(intent.chain, &intent.to) {
            alerts.push(RiskAlert::new(
                Severity::High,
                "burn_address",
                format!("Destination {} is a burn address; funds are unrecoverable", intent.to),
            ));
        }

        if let Some(threshold) = self.large_transfer.get(&intent.chain) {
            if intent.value > *threshold {
                let decimals = intent.chain.decimals();
                alerts.push(RiskAlert::new(
                    Severity::High,
                    "large_transfer",
                    format!(
                        "Transfers {} {}, above the {} {} threshold",
                        format_units(intent.value, decimals),
                        intent.chain.symbol(),
                        format_units(*threshold, decimals),
                        intent.chain.symbol()
                    ),
                ));
            }
        }

        if Self::is_self_transfer(intent) {
            alerts.push(RiskAlert::new(
                Severity::Low,
                "self_transfer",
                "Sender and destination are the same account",
            ));
        }

        if call_data.is_some() {
            alerts.push(RiskAlert::new(
                Severity::Medium,
                "contract_interaction",
                format!("Calls contract code at {}", intent.to),
            ));
        }

        let gas = intent
            .fee_override
            .as_ref()
            .and_then(|o| o.gas_limit)
            .map_or(simulation.estimated_gas_used, |limit| {
                limit.max(simulation.estimated_gas_used)
            });
        if intent.chain == Chain::Ethereum && gas > self.high_gas_limit {
            alerts.push(RiskAlert::new(
                Severity::Low,
                "high_gas",
                format!("Uses {} gas, above {}", gas, self.high_gas_limit),
            ));
        }

        if intent.value.is_zero() && call_data.is_none() {
            alerts.push(RiskAlert::new(
                Severity::Low,
                "zero_value",
                "Moves no value and calls no code",
            ));
        }

        tracing::debug!(chain = %intent.chain, alerts = alerts.len(), "Risk analysis complete");
        alerts
    }

    fn on_breach(&self, alert: &RiskAlert) {
        for hook in &self.hooks {
            hook.notify(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{ChainData, FeeOverride, TransferRequest};
    use alloy::primitives::Bytes;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const FROM: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
    const TO: &str = "0x1111111111111111111111111111111111111111";

    fn ok_simulation(gas: u64) -> SimulationResult {
        SimulationResult::success(U256::from(gas), BTreeMap::new())
    }

    fn eth_intent(request: TransferRequest) -> TransactionIntent {
        TransactionIntent::new(Chain::Ethereum, FROM, &request)
    }

    fn codes(alerts: &[RiskAlert]) -> Vec<&str> {
        alerts.iter().map(|a| a.code.as_str()).collect()
    }

    fn approve_data(amount: U256) -> Bytes {
        let mut data = APPROVE_SELECTOR.to_vec();
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(&[0xab; 20]);
        data.extend_from_slice(&amount.to_be_bytes::<32>());
        Bytes::from(data)
    }

    #[test]
    fn plain_transfer_raises_nothing() {
        let analyzer = RuleBasedAnalyzer::default();
        let intent = eth_intent(TransferRequest::new(TO, U256::from(1_000u64)));
        assert!(analyzer.analyze(&ok_simulation(21_000), &intent).is_empty());
    }

    #[test]
    fn failed_simulation_is_critical() {
        let analyzer = RuleBasedAnalyzer::default();
        let intent = eth_intent(TransferRequest::new(TO, U256::from(1u64)));
        let alerts = analyzer.analyze(&SimulationResult::failed("execution reverted"), &intent);

        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].code, "simulation_failed");
        assert!(alerts[0].description.contains("execution reverted"));
    }

    #[test]
    fn unlimited_approval_is_critical() {
        let analyzer = RuleBasedAnalyzer::default();
        let intent = eth_intent(
            TransferRequest::new(TO, U256::ZERO).with_data(ChainData::Call(approve_data(U256::MAX))),
        );
        let alerts = analyzer.analyze(&ok_simulation(46_000), &intent);
        assert_eq!(codes(&alerts), vec!["unlimited_approval", "contract_interaction"]);
        assert!(alerts[0].description.contains(&"ab".repeat(20)));

        let bounded = eth_intent(
            TransferRequest::new(TO, U256::ZERO)
                .with_data(ChainData::Call(approve_data(U256::from(100u64)))),
        );
        let alerts = analyzer.analyze(&ok_simulation(46_000), &bounded);
        assert_eq!(codes(&alerts), vec!["contract_interaction"]);
    }

    #[test]
    fn burn_addresses_are_high() {
        let analyzer = RuleBasedAnalyzer::default();
        let intent = eth_intent(TransferRequest::new(
            "0x000000000000000000000000000000000000dEaD",
            U256::from(1u64),
        ));
        let alerts = analyzer.analyze(&ok_simulation(21_000), &intent);
        assert_eq!(codes(&alerts), vec!["burn_address"]);
        assert_eq!(alerts[0].severity, Severity::High);

        let request = TransferRequest::new("11111111111111111111111111111111", U256::from(1u64));
        let intent = TransactionIntent::new(Chain::Solana, "src", &request);
        assert_eq!(codes(&analyzer.analyze(&ok_simulation(0), &intent)), vec!["burn_address"]);
    }

    #[test]
    fn large_transfer_uses_per_chain_threshold() {
        let mut config = RiskConfig::default();
        config.large_transfer.insert(Chain::Bitcoin, "0.1".to_string());
        let analyzer = RuleBasedAnalyzer::from_config(&config).unwrap();

        let at_threshold = TransferRequest::new("bc1qdest", U256::from(10_000_000u64));
        let intent = TransactionIntent::new(Chain::Bitcoin, "bc1qsrc", &at_threshold);
        assert!(analyzer.analyze(&ok_simulation(0), &intent).is_empty());

        let above = TransferRequest::new("bc1qdest", U256::from(10_000_001u64));
        let intent = TransactionIntent::new(Chain::Bitcoin, "bc1qsrc", &above);
        let alerts = analyzer.analyze(&ok_simulation(0), &intent);
        assert_eq!(codes(&alerts), vec!["large_transfer"]);
        assert!(alerts[0].description.contains("0.10000001 BTC"));
    }

    #[test]
    fn bad_threshold_is_config_error() {
        let mut config = RiskConfig::default();
        config.large_transfer.insert(Chain::Ethereum, "ten".to_string());
        assert!(matches!(
            RuleBasedAnalyzer::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn low_severity_rules() {
        let analyzer = RuleBasedAnalyzer::default();

        let to_self = eth_intent(TransferRequest::new(FROM.to_lowercase(), U256::from(1u64)));
        assert_eq!(
            codes(&analyzer.analyze(&ok_simulation(21_000), &to_self)),
            vec!["self_transfer"]
        );

        let empty = eth_intent(TransferRequest::new(TO, U256::ZERO));
        assert_eq!(
            codes(&analyzer.analyze(&ok_simulation(21_000), &empty)),
            vec!["zero_value"]
        );

        let heavy = eth_intent(TransferRequest::new(TO, U256::from(1u64)).with_fee_override(
            FeeOverride {
                gas_limit: Some(U256::from(900_000u64)),
                ..Default::default()
            },
        ));
        let alerts = analyzer.analyze(&ok_simulation(21_000), &heavy);
        assert_eq!(codes(&alerts), vec!["high_gas"]);
        assert_eq!(alerts[0].severity, Severity::Low);
    }

    struct Recorder(Mutex<Vec<String>>);

    impl BreachHook for Recorder {
        fn notify(&self, alert: &RiskAlert) {
            self.0.lock().unwrap().push(alert.code.clone());
        }
    }

    #[test]
    fn on_breach_reaches_every_hook() {
        let first = Arc::new(Recorder(Mutex::new(Vec::new())));
        let second = Arc::new(Recorder(Mutex::new(Vec::new())));
        let analyzer = RuleBasedAnalyzer::default()
            .with_hook(first.clone())
            .with_hook(second.clone());

        analyzer.on_breach(&RiskAlert::new(Severity::High, "burn_address", "zero"));
        assert_eq!(*first.0.lock().unwrap(), vec!["burn_address"]);
        assert_eq!(*second.0.lock().unwrap(), vec!["burn_address"]);
    }
}

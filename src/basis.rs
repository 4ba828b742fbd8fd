//! Basis/funding capture overlay (§4.9): observes the spread between a
//! perp's mark and its spot mid, maintains a bounded history of that basis,
//! and combines it with the funding rate into a target notional.
//!
//! `BasisFunding` does not place orders itself: it publishes a target
//! notional for an external reconciler/hedger to act on (see `DESIGN.md`,
//! Open Question #2).

use std::collections::{HashMap, VecDeque};

use crate::types::FundingInfo;

const HISTORY_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct FundingPolicy {
    pub enabled: bool,
    pub max_notional: f64,
    pub target_notional: f64,
    pub threshold: f64,
}

#[derive(Default)]
struct BaseState {
    basis_history: VecDeque<f64>,
    accrual: f64,
}

#[derive(Default)]
pub struct BasisFunding {
    policy_by_symbol: HashMap<String, FundingPolicy>,
    state: HashMap<String, BaseState>,
}

impl BasisFunding {
    pub fn new() -> Self {
        BasisFunding::default()
    }

    pub fn configure(&mut self, symbol: &str, policy: FundingPolicy) {
        self.policy_by_symbol.insert(symbol.to_string(), policy);
    }

    /// Records a (spot, perp) mid pair, pushing `perp - spot` onto the
    /// bounded basis history for `symbol`.
    pub fn observe(&mut self, symbol: &str, spot_mid: f64, perp_mid: f64) {
        let state = self.state.entry(symbol.to_string()).or_default();
        state.basis_history.push_back(perp_mid - spot_mid);
        while state.basis_history.len() > HISTORY_LEN {
            state.basis_history.pop_front();
        }
    }

    fn predicted_basis(&self, symbol: &str) -> f64 {
        match self.state.get(symbol) {
            Some(state) if !state.basis_history.is_empty() => {
                state.basis_history.iter().sum::<f64>() / state.basis_history.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Accrues realized funding (`position * funding_rate`) and, if the
    /// policy is enabled and the combined basis+funding signal clears
    /// `threshold`, returns a signed target notional to capture.
    pub fn on_funding(
        &mut self,
        symbol: &str,
        spot_mid: f64,
        info: &FundingInfo,
        position: f64,
    ) -> Option<f64> {
        let accrued = position * info.next_rate;
        self.state.entry(symbol.to_string()).or_default().accrual += accrued;

        let policy = self.policy_by_symbol.get(symbol)?;
        if !policy.enabled {
            return None;
        }
        let signal = self.predicted_basis(symbol) + info.next_rate * spot_mid;
        if signal.abs() < policy.threshold {
            return None;
        }
        let capped = policy.target_notional.min(policy.max_notional);
        Some(signal.signum() * capped)
    }

    pub fn accrual(&self, symbol: &str) -> f64 {
        self.state.get(symbol).map(|s| s.accrual).unwrap_or(0.0)
    }

    pub fn total_accrual(&self) -> f64 {
        self.state.values().map(|s| s.accrual).sum()
    }
}

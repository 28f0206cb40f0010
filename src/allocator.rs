//! Capital allocator: splits committed capital across zones per the target
//! policy, and recomputes realised fractions once the book exists.

use serde::Serialize;

use crate::error::SimError;
use crate::loans::Loan;
use crate::tls::{Zone, ZoneMap};

const SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    pub committed_capital: f64,
    /// Target fractions from config, as validated.
    pub target: ZoneMap<f64>,
    /// Dollars handed to the loan generator per zone.
    pub dollars: ZoneMap<f64>,
    /// Realised fractions after loan generation.
    pub actual: Option<ZoneMap<f64>>,
    /// target − actual, per zone: positive means under-allocated.
    pub rebalance: Option<ZoneMap<f64>>,
}

/// Validate fractions and split `committed_capital`. Fractions must be
/// non-negative, within per-zone caps, and sum to 1 ± 1e-9.
pub fn allocate(
    committed_capital: f64,
    target: &ZoneMap<f64>,
    caps: &ZoneMap<f64>,
) -> Result<AllocationResult, SimError> {
    validate_fractions(target, caps)?;
    if committed_capital <= 0.0 {
        return Err(SimError::config(format!(
            "invalid allocation: committed capital must be positive, got {committed_capital}"
        )));
    }

    let dollars = target.map(|_, f| committed_capital * f);
    Ok(AllocationResult {
        committed_capital,
        target: *target,
        dollars,
        actual: None,
        rebalance: None,
    })
}

pub fn validate_fractions(target: &ZoneMap<f64>, caps: &ZoneMap<f64>) -> Result<(), SimError> {
    for (zone, &fraction) in target.iter() {
        if fraction < 0.0 {
            return Err(SimError::config(format!(
                "invalid allocation: {} fraction {fraction} is negative",
                zone.name()
            )));
        }
        let cap = *caps.get(zone);
        if fraction > cap + SUM_TOLERANCE {
            return Err(SimError::config(format!(
                "invalid allocation: {} fraction {fraction} exceeds cap {cap}",
                zone.name()
            )));
        }
    }
    let sum = target.sum();
    if (sum - 1.0).abs() > SUM_TOLERANCE {
        return Err(SimError::config(format!(
            "invalid allocation: zone fractions sum to {sum}, expected 1"
        )));
    }
    Ok(())
}

/// Recompute realised fractions from the generated book and derive the
/// rebalance-adjustment vector.
pub fn update_actual_allocation(allocation: &mut AllocationResult, loans: &[Loan]) {
    let mut invested = ZoneMap::uniform(0.0_f64);
    for loan in loans {
        *invested.get_mut(loan.zone) += loan.principal;
    }
    let total: f64 = invested.sum();
    let actual = if total > 0.0 {
        invested.map(|_, v| v / total)
    } else {
        ZoneMap::uniform(0.0)
    };
    let rebalance = ZoneMap {
        green: allocation.target.green - actual.green,
        orange: allocation.target.orange - actual.orange,
        red: allocation.target.red - actual.red,
    };
    allocation.actual = Some(actual);
    allocation.rebalance = Some(rebalance);
}

/// Re-weight target fractions by trailing zone performance, clamp to caps,
/// and re-normalise. Used by the reinvestment engine in dynamic mode.
pub fn dynamic_weights(
    target: &ZoneMap<f64>,
    trailing_return: &ZoneMap<f64>,
    caps: &ZoneMap<f64>,
    tilt: f64,
) -> ZoneMap<f64> {
    let mut raw = ZoneMap::uniform(0.0_f64);
    for zone in Zone::all() {
        let weight = target.get(zone) * (1.0 + tilt * trailing_return.get(zone)).max(0.05);
        *raw.get_mut(zone) = weight.min(*caps.get(zone));
    }
    let sum = raw.sum();
    if sum <= 0.0 {
        return *target;
    }
    raw.map(|_, w| w / sum)
}

//! Deterministic internal scoring: the C1/C2/C3 criteria
//!
//! Pure, total functions of the signal bag and thresholds. Missing signals
//! default to the risk-free extreme; this engine never errors.

use crate::model::config::{ScalePair, Thresholds};
use crate::model::{InternalScores, InternalSignals};

/// C1 sub-weights: delay frequency / delay severity / quality incidents.
const C1_WEIGHTS: (f64, f64, f64) = (0.40, 0.30, 0.30);
/// C3 weights: contract maturity / litigation history.
const C3_WEIGHTS: (f64, f64) = (0.40, 0.60);

/// Compute all three internal criteria for one supplier.
pub fn compute_internal_scores(signals: &InternalSignals, thresholds: &Thresholds) -> InternalScores {
    InternalScores {
        c1: compute_c1(signals, thresholds),
        c2: compute_c2(signals, thresholds),
        c3: compute_c3(signals, thresholds),
    }
}

/// C1: delivery performance. Higher = riskier.
pub fn compute_c1(signals: &InternalSignals, thresholds: &Thresholds) -> i32 {
    let t = &thresholds.c1;
    let freq = linear_scale(f64::from(signals.delivery_delays_last_12m), t.delay_frequency);
    let severity = linear_scale(signals.avg_delay_days, t.delay_severity);
    let quality = linear_scale(
        f64::from(signals.quality_incidents_last_12m),
        t.quality_incidents,
    );

    let (w_freq, w_sev, w_qual) = C1_WEIGHTS;
    clamp_score(freq * w_freq + severity * w_sev + quality * w_qual)
}

/// C2: dependency / criticality. Mean of the criticality lookup and the
/// monosource penalty (zero when multi-sourced).
pub fn compute_c2(signals: &InternalSignals, thresholds: &Thresholds) -> i32 {
    let t = &thresholds.c2;
    let criticality = t
        .criticality_scores
        .get(&signals.criticality)
        .copied()
        .unwrap_or(10.0);
    let monosource = if signals.is_monosource {
        t.monosource_penalty
    } else {
        0.0
    };
    clamp_score((criticality + monosource) / 2.0)
}

/// C3: relationship history. Longer tenure lowers risk (inverted scale);
/// litigation risk comes from the lookup table with the count clamped to
/// its largest key.
pub fn compute_c3(signals: &InternalSignals, thresholds: &Thresholds) -> i32 {
    let t = &thresholds.c3;
    let maturity_risk = 100.0 - linear_scale(signals.contract_years, t.contract_maturity_years);

    let litigation_risk = match t.litigation_scores.keys().next_back() {
        None => 0.0,
        Some(&max_key) => {
            let key = signals.litigation_count.min(max_key);
            t.litigation_scores.get(&key).copied().unwrap_or(75.0)
        }
    };

    let (w_maturity, w_litigation) = C3_WEIGHTS;
    clamp_score(maturity_risk * w_maturity + litigation_risk * w_litigation)
}

/// Scale `value` linearly into [0, 100] against a (low, high) pair:
/// values at or below `low` score 0, at or above `high` score 100.
fn linear_scale(value: f64, pair: ScalePair) -> f64 {
    if value <= pair.low {
        0.0
    } else if value >= pair.high {
        100.0
    } else {
        (value - pair.low) / (pair.high - pair.low) * 100.0
    }
}

fn clamp_score(value: f64) -> i32 {
    value.round().clamp(0.0, 100.0) as i32
}

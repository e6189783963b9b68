//! Special functions and small numeric helpers shared by the families.

use numr::algorithm::special::scalar as numr_special;

/// ln(sqrt(2π))
pub const LN_SQRT_2PI: f64 = 0.9189385332046727;

/// Log-gamma function.
pub fn lgamma(x: f64) -> f64 {
    numr_special::lgamma_scalar(x)
}

/// Digamma (psi) function: ψ(x) = d/dx ln(Γ(x))
pub fn digamma(x: f64) -> f64 {
    numr_special::digamma_scalar(x)
}

/// Solve `ln(a) - ψ(a) = s` for the gamma shape `a`.
///
/// The left side decreases monotonically from +∞ (a → 0) to 0 (a → ∞), so a
/// positive finite `s` has exactly one root; bisection in log-space finds it.
/// Returns `None` when `s` is not positive and finite.
pub fn gamma_shape_from_log_gap(s: f64) -> Option<f64> {
    if !(s.is_finite() && s > 0.0) {
        return None;
    }
    let f = |a: f64| a.ln() - digamma(a) - s;

    let (mut lo, mut hi) = (1e-10_f64.ln(), 1e10_f64.ln());
    if f(lo.exp()) < 0.0 || f(hi.exp()) > 0.0 {
        return None;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if f(mid.exp()) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }
    Some((0.5 * (lo + hi)).exp())
}

/// Index of the largest finite entry, lowest index on ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((idx, v)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Population mean and variance of a slice.
pub fn mean_var(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var)
}

//! Standard normal helpers for the two-player skill update
//!
//! The error function and its inverse come from `statrs`; this module only
//! adds the truncated-Gaussian corrections TrueSkill needs on top of them.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::{erfc, erfc_inv};

/// Standard normal cumulative distribution
pub fn cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal density
pub fn pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * PI).sqrt()
}

/// Standard normal quantile, infinite at 0 and 1
pub fn ppf(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Mean correction for a win given normalized skill difference and margin
pub fn v_win(diff: f64, draw_margin: f64) -> f64 {
    let x = diff - draw_margin;
    let denom = cdf(x);
    if denom > 0.0 {
        pdf(x) / denom
    } else {
        -x
    }
}

/// Variance correction for a win given normalized skill difference and margin
///
/// Always in (0, 1); values outside that range only appear when `cdf`
/// underflows far in the tail, where the asymptotic limit 1 is used.
pub fn w_win(diff: f64, draw_margin: f64) -> f64 {
    let x = diff - draw_margin;
    let v = v_win(diff, draw_margin);
    let w = v * (v + x);
    if w > 0.0 && w < 1.0 {
        w
    } else {
        1.0
    }
}

/// Win margin implied by a draw probability between two players
pub fn draw_margin(draw_probability: f64, beta: f64) -> f64 {
    ppf((draw_probability + 1.0) / 2.0) * SQRT_2 * beta
}

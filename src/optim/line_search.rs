//! Moré-Thuente line search (component H): finds a step along a descent
//! direction satisfying the strong Wolfe conditions, using safeguarded cubic
//! and quadratic interpolation inside a shrinking bracket. Follows the
//! classic `cvsrch`/`dcsrch` structure: while the sufficient-decrease test
//! has not yet been satisfied by any trial point (stage 1), the bracket is
//! built from the auxiliary function `psi(t) = f(t) - f(0) - ftol*t*f'(0)`
//! rather than `f` itself, since `psi` is better-behaved near a minimizer
//! that does not yet satisfy the curvature condition.

use crate::consts::{DEFAULT_LINE_SEARCH_FTOL, DEFAULT_LINE_SEARCH_GTOL, DEFAULT_LINE_SEARCH_XTOL};
use crate::error::{Result, TipiError};

#[derive(Clone, Copy, Debug)]
pub struct LineSearchParams {
    /// Sufficient decrease parameter (Armijo), `0 < ftol < gtol < 1`.
    pub ftol: f64,
    /// Curvature parameter.
    pub gtol: f64,
    /// Minimum relative width of the uncertainty interval before giving up.
    pub xtol: f64,
    pub step_min: f64,
    pub step_max: f64,
    pub max_evaluations: usize,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            ftol: DEFAULT_LINE_SEARCH_FTOL,
            gtol: DEFAULT_LINE_SEARCH_GTOL,
            xtol: DEFAULT_LINE_SEARCH_XTOL,
            step_min: 1e-20,
            step_max: 1e20,
            max_evaluations: 40,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LineSearchOutcome {
    pub step: f64,
    pub value: f64,
    pub directional_derivative: f64,
    pub evaluations: usize,
}

/// One bracket endpoint, always tracked in terms of the raw function.
#[derive(Clone, Copy, Debug)]
struct Point {
    step: f64,
    value: f64,
    deriv: f64,
}

/// Runs the search given a closure that evaluates `(f(x0 + step*d), f'(x0 + step*d))`.
/// `f0`/`g0` are the value and directional derivative at `step = 0`;
/// `g0` must be strictly negative (a descent direction) or this returns
/// [`TipiError::NoDescent`].
pub fn more_thuente<F>(
    mut eval: F,
    f0: f64,
    g0: f64,
    initial_step: f64,
    params: &LineSearchParams,
) -> Result<LineSearchOutcome>
where
    F: FnMut(f64) -> Result<(f64, f64)>,
{
    if !(g0 < 0.0) {
        return Err(TipiError::NoDescent);
    }
    if !(params.ftol > 0.0 && params.ftol < params.gtol && params.gtol < 1.0) {
        return Err(TipiError::InvalidArgument(
            "line search requires 0 < ftol < gtol < 1".into(),
        ));
    }

    let mut step = initial_step.clamp(params.step_min, params.step_max);

    // Bracket tracked via the modified function psi during stage 1, via the
    // raw function afterward. Both share the same Point representation; the
    // caller just has to remember which one is currently live.
    let mut lo = Point { step: 0.0, value: 0.0, deriv: g0 };
    let mut hi = Point { step: 0.0, value: 0.0, deriv: g0 };
    let mut bracketed = false;
    let mut stage1 = true;

    let width0 = params.step_max - params.step_min;
    let mut width = width0;
    let mut width_prev = 2.0 * width0;

    for evaluations in 1..=params.max_evaluations {
        let (f, g) = eval(step)?;

        let ftest = f0 + step * params.ftol * g0;
        let sufficient_decrease = f <= ftest;
        let curvature = g.abs() <= params.gtol * (-g0);

        if sufficient_decrease && curvature {
            return Ok(LineSearchOutcome {
                step,
                value: f,
                directional_derivative: g,
                evaluations,
            });
        }

        if bracketed && (step <= lo.step.min(hi.step) || step >= lo.step.max(hi.step)) {
            return Err(TipiError::LineSearchFailed(
                "step escaped the bracketing interval".into(),
            ));
        }
        if bracketed && (hi.step - lo.step).abs() <= params.xtol * lo.step.max(hi.step).max(1.0) {
            return Err(TipiError::LineSearchFailed(
                "bracket width shrank below xtol before satisfying the Wolfe conditions".into(),
            ));
        }
        if step >= params.step_max && sufficient_decrease && g <= params.ftol * g0 {
            return Err(TipiError::LineSearchFailed("step pinned at step_max".into()));
        }
        if step <= params.step_min && (!sufficient_decrease || g >= params.ftol * g0) {
            return Err(TipiError::LineSearchFailed("step pinned at step_min".into()));
        }

        if stage1 && sufficient_decrease && g >= params.ftol.min(params.gtol) * g0 {
            stage1 = false;
        }

        let current = Point { step, value: f, deriv: g };

        if stage1 && !sufficient_decrease {
            // Work in psi-space: psi(t) = f(t) - f0 - ftol*t*g0.
            let to_psi = |p: Point| Point {
                step: p.step,
                value: p.value - f0 - params.ftol * p.step * g0,
                deriv: p.deriv - params.ftol * g0,
            };
            let (new_lo, new_hi, brkt) = update_interval(to_psi(lo), to_psi(hi), to_psi(current), bracketed);
            // translate back to raw-function terms, keeping the raw step;
            // value/deriv are only ever read by update_interval, so it is
            // enough to remember which original Point each endpoint came from.
            // Snapshot before reassigning: the second pick_raw call must still
            // see the pre-update lo/hi, not the one just written below.
            let (old_lo, old_hi) = (lo, hi);
            lo = pick_raw(new_lo.step, old_lo, old_hi, current);
            hi = pick_raw(new_hi.step, old_lo, old_hi, current);
            bracketed = brkt;
        } else {
            let (new_lo, new_hi, brkt) = update_interval(lo, hi, current, bracketed);
            lo = new_lo;
            hi = new_hi;
            bracketed = brkt;
        }

        if bracketed {
            width_prev = width;
            width = (hi.step - lo.step).abs();
            if width >= 0.66 * width_prev {
                step = lo.step + 0.5 * (hi.step - lo.step);
            } else {
                step = trial_value(lo, hi);
            }
            let (a, b) = (lo.step.min(hi.step), lo.step.max(hi.step));
            step = step.clamp(a, b);
        } else {
            step = step + 4.0 * (step - lo.step);
        }
        step = step.clamp(params.step_min, params.step_max);
    }

    Err(TipiError::LineSearchFailed(
        "exceeded the maximum number of function evaluations".into(),
    ))
}

/// Resolves which of `lo`/`hi`/`current` (in raw-function terms) a psi-space
/// endpoint step came from.
fn pick_raw(step: f64, lo: Point, hi: Point, current: Point) -> Point {
    if step == lo.step {
        lo
    } else if step == hi.step {
        hi
    } else {
        current
    }
}

/// Safeguarded interpolation step of the Moré-Thuente algorithm: picks the
/// next interval endpoints given the current bracket (`lo`,`hi`) and the
/// newly evaluated `t`.
fn update_interval(lo: Point, hi: Point, t: Point, bracketed: bool) -> (Point, Point, bool) {
    if t.value > lo.value {
        (lo, t, true)
    } else if t.deriv * (lo.step - t.step) > 0.0 {
        (t, hi, bracketed)
    } else if t.deriv * (lo.step - t.step) < 0.0 {
        (t, lo, true)
    } else {
        (t, t, true)
    }
}

fn trial_value(lo: Point, hi: Point) -> f64 {
    let s = (hi.deriv - lo.deriv).abs().max(f64::EPSILON);
    let theta = 3.0 * (lo.value - hi.value) / (hi.step - lo.step) + lo.deriv + hi.deriv;
    let gamma = s * ((theta / s).powi(2) - (lo.deriv / s) * (hi.deriv / s)).max(0.0).sqrt();
    let gamma = if hi.step < lo.step { -gamma } else { gamma };
    let p = (gamma - lo.deriv) + theta;
    let q = ((gamma - lo.deriv) + gamma) + hi.deriv;
    let r = p / q;
    if r.is_finite() && q != 0.0 {
        lo.step + r * (hi.step - lo.step)
    } else {
        lo.step + 0.5 * (hi.step - lo.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_bowl_converges_near_the_minimizer() {
        // f(x) = (x - 3)^2 along the line x(t) = 0 + t*1, started at x=0.
        let eval = |t: f64| -> Result<(f64, f64)> {
            let x = t;
            let f = (x - 3.0).powi(2);
            let g = 2.0 * (x - 3.0);
            Ok((f, g))
        };
        let params = LineSearchParams::default();
        let outcome = more_thuente(eval, 9.0, -6.0, 1.0, &params).unwrap();
        assert!((outcome.step - 3.0).abs() < 1e-3, "step = {}", outcome.step);
    }

    #[test]
    fn rejects_non_descent_direction() {
        let eval = |t: f64| -> Result<(f64, f64)> { Ok((t, 1.0)) };
        let params = LineSearchParams::default();
        assert!(matches!(
            more_thuente(eval, 0.0, 1.0, 1.0, &params),
            Err(TipiError::NoDescent)
        ));
    }
}

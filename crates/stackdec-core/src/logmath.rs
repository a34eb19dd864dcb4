/// Log-domain score. Natural log inside the Gaussian evaluator, log10 once a
/// state likelihood leaves the mixture computation.
pub type LogProb = f32;

/// Stand-in for log(0).
pub const LOG_ZERO: LogProb = -1.0e10;

pub const INV_LOG_TEN: f32 = std::f32::consts::LOG10_E;

/// log(exp(a) + exp(b)) without overflow.
#[inline]
pub fn addlog(a: LogProb, b: LogProb) -> LogProb {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo <= LOG_ZERO {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

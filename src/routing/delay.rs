//! Response delay calculation.

use std::time::Duration;

use rand::Rng;

use crate::config::DelayConfig;

/// Compute the delay for one response.
///
/// Disabled ⇒ none. A positive `fixed` wins. Otherwise a value is drawn
/// uniformly from `[min, max]` (inclusive) when both bounds are set and
/// ordered. Anything else ⇒ none.
pub fn compute_delay<R: Rng + ?Sized>(config: &DelayConfig, rng: &mut R) -> Duration {
    if !config.enabled {
        return Duration::ZERO;
    }

    if let Some(fixed) = config.fixed.filter(|f| *f > 0) {
        return Duration::from_millis(fixed);
    }

    match (config.min, config.max) {
        (Some(min), Some(max)) if min <= max => Duration::from_millis(rng.gen_range(min..=max)),
        _ => Duration::ZERO,
    }
}

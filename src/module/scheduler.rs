//! Revalidation scheduling
//!
//! Drives the lifecycle manager: once at startup, once per external
//! event (activation, client attached), and on a periodic timer whose
//! interval is resampled each period from a truncated skew-normal
//! distribution. Randomizing the period per process avoids many
//! independent gateways polling the same origin in lockstep.

use rand::Rng;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::module::manager::{InstanceLifecycleManager, RevalidateTrigger};

/// Bounds and shape of the randomized revalidation period.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPolicy {
    /// Lower bound of the sampled period
    pub min: Duration,
    /// Upper bound of the sampled period
    pub max: Duration,
    /// Skew exponent applied to the unit-interval sample
    pub skew: f64,
    /// Truncation width in standard deviations
    pub sigma: f64,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(5 * 60),
            max: Duration::from_secs(15 * 60),
            skew: 1.0,
            sigma: 4.0,
        }
    }
}

impl IntervalPolicy {
    /// Draw one period. Every draw lies within `[min, max]`.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        let min = self.min.as_secs_f64();
        let max = self.max.as_secs_f64();
        // Config validation rejects non-positive skew, but the bound
        // has to hold for any policy value.
        let secs = skew_normal(rng, min, max, self.skew, self.sigma).clamp(min, max);
        Duration::from_secs_f64(secs)
    }
}

/// A random number stretched to `[min, max]`, drawn from the normal
/// distribution truncated at `sigma` standard deviations and skewed by
/// raising the unit-interval sample to `skew`.
fn skew_normal(rng: &mut impl Rng, min: f64, max: f64, skew: f64, sigma: f64) -> f64 {
    // Box-Muller transform; resample until the truncated value lands
    // in the unit interval.
    let unit = loop {
        let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let v: f64 = rng.gen();
        let normal = (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos();
        let shifted = normal / (sigma * 2.0) + 0.5;
        if (0.0..=1.0).contains(&shifted) {
            break shifted;
        }
    };
    min + (max - min) * unit.powf(skew)
}

/// Handle for feeding external revalidation triggers to a running
/// scheduler (activation, client attached).
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<RevalidateTrigger>,
}

impl SchedulerHandle {
    /// Request an immediate revalidation. A scheduler that has shut
    /// down ignores the notification.
    pub fn notify(&self, trigger: RevalidateTrigger) {
        let _ = self.tx.send(trigger);
    }
}

/// Drives periodic and event-triggered revalidation attempts.
pub struct RevalidationScheduler {
    manager: Arc<InstanceLifecycleManager>,
    policy: IntervalPolicy,
    events: mpsc::UnboundedReceiver<RevalidateTrigger>,
    handle: SchedulerHandle,
}

impl RevalidationScheduler {
    /// Create a scheduler over `manager` with the given period policy.
    pub fn new(manager: Arc<InstanceLifecycleManager>, policy: IntervalPolicy) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            manager,
            policy,
            events,
            handle: SchedulerHandle { tx },
        }
    }

    /// Handle for external event triggers.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run until dropped: revalidate at startup, then on every timer
    /// fire and external event. Revalidation errors are already logged
    /// by the manager; the cadence itself is the retry policy.
    pub async fn run(self) {
        let Self {
            manager,
            policy,
            mut events,
            handle,
        } = self;
        // Only externally held handles should keep the event channel
        // open.
        drop(handle);

        let _ = manager.revalidate(RevalidateTrigger::Startup).await;

        loop {
            let period = policy.sample(&mut rand::thread_rng());
            debug!(period_secs = period.as_secs(), "next periodic module check scheduled");

            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    let _ = manager.revalidate(RevalidateTrigger::Interval).await;
                }
                event = events.recv() => match event {
                    Some(trigger) => {
                        let _ = manager.revalidate(trigger).await;
                    }
                    // All handles dropped; fall back to the periodic
                    // cadence alone.
                    None => {
                        tokio::time::sleep(period).await;
                        let _ = manager.revalidate(RevalidateTrigger::Interval).await;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_intervals_stay_within_bounds() {
        let policy = IntervalPolicy::default();
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let period = policy.sample(&mut rng);
            assert!(period >= policy.min, "period {period:?} below minimum");
            assert!(period <= policy.max, "period {period:?} above maximum");
        }
    }

    #[test]
    fn skew_compresses_toward_the_minimum() {
        let skewed = IntervalPolicy {
            skew: 3.0,
            ..IntervalPolicy::default()
        };
        let mut rng = rand::thread_rng();
        let draws = 2_000;
        let mean: f64 = (0..draws)
            .map(|_| skewed.sample(&mut rng).as_secs_f64())
            .sum::<f64>()
            / draws as f64;
        let midpoint = (skewed.min.as_secs_f64() + skewed.max.as_secs_f64()) / 2.0;
        assert!(mean < midpoint, "skewed mean {mean} not below midpoint {midpoint}");
    }

    #[test]
    fn pathological_skew_never_escapes_bounds() {
        // A non-positive skew inverts the unit-interval sample; the
        // drawn period must still respect the configured bounds
        for skew in [-1.0, 0.0] {
            let policy = IntervalPolicy {
                skew,
                ..IntervalPolicy::default()
            };
            let mut rng = rand::thread_rng();
            for _ in 0..1_000 {
                let period = policy.sample(&mut rng);
                assert!(period >= policy.min, "period {period:?} below minimum");
                assert!(period <= policy.max, "period {period:?} above maximum");
            }
        }
    }

    #[test]
    fn degenerate_range_always_returns_the_bound() {
        let fixed = IntervalPolicy {
            min: Duration::from_secs(60),
            max: Duration::from_secs(60),
            ..IntervalPolicy::default()
        };
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert_eq!(fixed.sample(&mut rng), Duration::from_secs(60));
        }
    }
}

//! Configuration and derived pacing parameters for the batcher.

/// Configuration for a [`Batcher`](super::Batcher).
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum number of requests per delivered batch. 0 means unlimited:
    /// every cycle drains everything visible at the moment each queue lock
    /// is taken.
    pub max_batch: u32,

    /// Hold-off applied after a batch of one, in milliseconds.
    pub min_hold_ms: u32,

    /// Hold-off applied after a full batch, in milliseconds. The hold-off
    /// for intermediate sizes is interpolated linearly.
    pub max_hold_ms: u32,

    /// Start the worker thread on construction. When false, the batcher
    /// queues pushes but delivers nothing until `start()` is called.
    pub auto_start: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch: 0,
            min_hold_ms: 0,
            max_hold_ms: 0,
            auto_start: true,
        }
    }
}

impl BatcherConfig {
    /// Config tuned for latency: small batches, no pacing.
    pub fn low_latency() -> Self {
        Self {
            max_batch: 10,
            min_hold_ms: 0,
            max_hold_ms: 0,
            auto_start: true,
        }
    }

    /// Config tuned for throughput: large batches with pacing so the
    /// consumer sees fewer, fuller deliveries.
    pub fn high_throughput() -> Self {
        Self {
            max_batch: 200,
            min_hold_ms: 5,
            max_hold_ms: 100,
            auto_start: true,
        }
    }

    /// Create config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REQBATCH_MAX_BATCH") {
            if let Ok(n) = val.parse() {
                config.max_batch = n;
            }
        }

        if let Ok(val) = std::env::var("REQBATCH_MIN_HOLD_MS") {
            if let Ok(n) = val.parse() {
                config.min_hold_ms = n;
            }
        }

        if let Ok(val) = std::env::var("REQBATCH_MAX_HOLD_MS") {
            if let Ok(n) = val.parse() {
                config.max_hold_ms = n;
            }
        }

        config
    }
}

/// Derived pacing parameters, kept behind the batcher's parameter lock and
/// snapshotted once per use so a worker cycle never sees a torn update.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HoldOff {
    /// Batch size cap (0 = unlimited).
    pub max_batch: u32,
    /// Fixed hold-off term, seconds.
    pub fix_s: f64,
    /// Per-item hold-off term, seconds per request.
    pub var_s: f64,
}

impl HoldOff {
    /// Derive pacing terms from the configured milliseconds.
    ///
    /// `var_s` interpolates linearly between `min_hold_ms` (batch of one,
    /// approximately) and `max_hold_ms` (full batch). With `max_batch == 0`
    /// or `max_hold_ms == 0` there is no per-item term. `max_hold_ms` below
    /// `min_hold_ms` is not clamped: the slope goes negative and hold-off
    /// shrinks as batches grow.
    pub fn from_params(max_batch: u32, min_hold_ms: u32, max_hold_ms: u32) -> Self {
        let var_s = if max_batch > 0 && max_hold_ms > 0 {
            (f64::from(max_hold_ms) - f64::from(min_hold_ms)) / (f64::from(max_batch) * 1e3)
        } else {
            0.0
        };
        Self {
            max_batch,
            fix_s: f64::from(min_hold_ms) / 1e3,
            var_s,
        }
    }

    /// Hold-off in seconds after delivering a batch of `len` items.
    pub fn hold_off_secs(&self, len: usize) -> f64 {
        self.fix_s + self.var_s * len as f64
    }

    /// The configured minimal hold-off, reconstituted in milliseconds.
    pub fn min_hold_ms(&self) -> u32 {
        (self.fix_s * 1e3) as u32
    }

    /// The configured maximal hold-off, reconstituted in milliseconds.
    pub fn max_hold_ms(&self) -> u32 {
        ((self.fix_s + self.var_s * f64::from(self.max_batch)) * 1e3) as u32
    }
}

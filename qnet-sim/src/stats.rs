//! Per-node time-integral accumulators.
//!
//! Every integral (`queue_integral`, `busy_time`, `down_time`) is kept in
//! sync using the same deferred-accumulation trick: before a gauge (queue
//! length, busy server count, down server count) changes, fold
//! `(now - last_update_time) * current_gauge_value` into its integral, then
//! move `last_update_time` forward. That way the integral is always correct
//! as of the last touch, without needing a background clock tick.

/// Accumulators for a single node, reset at the end of the warmup window and
/// read out (still live, via [`Stats::finalize`]) at the end of the run.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub queue_integral: f64,
    pub busy_time: f64,
    pub down_time: f64,
    pub completed_services: u64,
    pub arrivals_total: u64,
    pub reneged_total: u64,
    pub waiting_time_sum: f64,
    pub system_time_sum: f64,
    pub served_customer_count: u64,
    pub exited_count: u64,
    last_update_time: f64,
    queue_length: usize,
    busy_count: usize,
    down_count: usize,
}

impl Stats {
    fn accumulate(&mut self, now: f64) {
        let dt = now - self.last_update_time;
        self.queue_integral += dt * self.queue_length as f64;
        self.busy_time += dt * self.busy_count as f64;
        self.down_time += dt * self.down_count as f64;
        self.last_update_time = now;
    }

    /// Records the node's total waiting-line length as of `now`.
    pub fn record_queue_length(&mut self, now: f64, new_len: usize) {
        self.accumulate(now);
        self.queue_length = new_len;
    }

    /// Adjusts the count of currently-busy servers by `delta` (+1 or -1).
    pub fn record_busy_delta(&mut self, now: f64, delta: i32) {
        self.accumulate(now);
        self.busy_count = (self.busy_count as i64 + delta as i64).max(0) as usize;
    }

    /// Adjusts the count of currently-down servers by `delta` (+1 or -1).
    pub fn record_down_delta(&mut self, now: f64, delta: i32) {
        self.accumulate(now);
        self.down_count = (self.down_count as i64 + delta as i64).max(0) as usize;
    }

    /// Folds the interval up to `now` into the integrals, without resetting
    /// counters. Called once at the end of a replication.
    pub fn finalize(&mut self, now: f64) {
        self.accumulate(now);
    }

    /// The warmup checkpoint: finalizes the pre-warmup interval, then zeroes
    /// every integral and count — but not the live gauges (`queue_length`,
    /// `busy_count`, `down_count`), which describe physical state that
    /// doesn't reset just because the observation window does.
    pub fn reset_warmup(&mut self, now: f64) {
        self.accumulate(now);
        self.queue_integral = 0.0;
        self.busy_time = 0.0;
        self.down_time = 0.0;
        self.completed_services = 0;
        self.arrivals_total = 0;
        self.reneged_total = 0;
        self.waiting_time_sum = 0.0;
        self.system_time_sum = 0.0;
        self.served_customer_count = 0;
        self.exited_count = 0;
        self.last_update_time = now;
    }
}

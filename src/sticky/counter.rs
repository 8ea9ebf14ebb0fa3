/// A rate counter with a decaying window: on update, if more than one
/// window has elapsed since the last update, the accumulated value is
/// scaled down by the elapsed fraction before the new amount is added.
/// This keeps `conn_rate`/`sess_rate`/`http_req_rate`/`http_err_rate`
/// reflecting recent load rather than an all-time average.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateCounter {
    value: f64,
    last_update_ms: u64,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, amount: f64, now_ms: u64, window_ms: u64) {
        if window_ms > 0 {
            let elapsed = now_ms.saturating_sub(self.last_update_ms);
            if elapsed > window_ms {
                let periods = elapsed as f64 / window_ms as f64;
                self.value *= 0.5f64.powf(periods);
            }
        }
        self.value += amount;
        self.last_update_ms = now_ms;
    }

    pub fn rate(&self) -> f64 {
        self.value
    }
}

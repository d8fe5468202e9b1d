use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Wall-clock timer for one run. [`finish`](Timer::finish) logs and returns
/// the elapsed time; a timer dropped unfinished logs how long the run lasted
/// before it stopped.
pub struct Timer {
    label: String,
    start: Instant,
    finished: bool,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  {}: started", label);
        Self { label, start: Instant::now(), finished: false }
    }

    pub fn finish(mut self) -> Duration {
        self.finished = true;
        let took = self.start.elapsed();
        info!("⏱  {}: finished in {:.2?}", self.label, took);
        took
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.finished {
            warn!("⏱  {}: stopped after {:.2?}", self.label, self.start.elapsed());
        }
    }
}

/// Integer with thousands separators: 1234567 → "1,234,567".
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// GBP amount for display: `Some(1299.5)` → "£1,299.50", `None` → "—".
pub fn fmt_price(amount: Option<f64>) -> String {
    let Some(v) = amount else {
        return "—".to_string();
    };
    let pence = (v * 100.0).round() as i64;
    format!("£{}.{:02}", fmt_number(pence / 100), (pence % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(1_234_567), "1,234,567");
        assert_eq!(fmt_number(0), "0");
        assert_eq!(fmt_number(999), "999");
        assert_eq!(fmt_number(-42_000), "-42,000");
    }

    #[test]
    fn test_fmt_price() {
        assert_eq!(fmt_price(Some(329.99)), "£329.99");
        assert_eq!(fmt_price(Some(1299.5)), "£1,299.50");
        assert_eq!(fmt_price(Some(0.0)), "£0.00");
        assert_eq!(fmt_price(None), "—");
    }

    #[test]
    fn test_timer_reports_elapsed() {
        let t = Timer::start("run");
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.finish() >= Duration::from_millis(5));
    }
}

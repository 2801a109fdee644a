//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Error;
use std::fmt::Formatter;
use std::time::Duration;
use std::time::Instant;

use log::info;

/// A simple timer that reports through the logger
///
/// Log output may look like
/// `[bucket 3 | ecdh mask size: 10000] elapsed: 0.00625 sec [qps: 1600435]`
///
/// # Example
///
/// ```
/// use common::timer;
/// let mut t = timer::Timer::new_silent("bucket 0");
/// let values = vec![1, 2, 3];
/// // sends a line like
/// // [bucket 0 | read input size: 3] elapsed 0.231 sec [qps: 12]
/// t.qps("read input", values.len());
/// ```
///
/// A non-silent timer logs the total time when it goes out of scope.
pub struct Timer {
    start: Instant,
    lap: Instant,
    label: String,
    silent: bool,
}

impl Timer {
    pub fn new(label: &str) -> Timer {
        let now = Instant::now();
        Timer {
            start: now,
            lap: now,
            label: String::from(label),
            silent: false,
        }
    }

    /// A silent timer does not fire when dropped
    pub fn new_silent(label: &str) -> Timer {
        let mut t = Timer::new(label);
        t.silent = true;
        t
    }

    /// Time since the timer was created
    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Formats the time elapsed since the previous lap and starts a new one
    pub fn lap_str(&mut self, label: Option<&str>, size: Option<usize>) -> String {
        let e = self.lap.elapsed().as_secs_f64();
        self.lap = Instant::now();

        let fixed_label = label.map(|x| format!(" | {}", x)).unwrap_or_default();
        let fixed_size = size.map(|x| format!(" size: {}", x)).unwrap_or_default();
        let fixed_qps = match size {
            Some(x) if e > 0.0 => format!(" [qps: {:.0}]", (x as f64) / e),
            _ => String::new(),
        };

        format!(
            "[{}{}{}] elapsed: {:.5} sec{}",
            self.label, fixed_label, fixed_size, e, fixed_qps
        )
    }

    pub fn elapsed_log(&mut self, label: &str) {
        let s = self.lap_str(Some(label), None);
        info!("{}", s);
    }

    pub fn qps(&mut self, label: &str, size: usize) {
        let s = self.lap_str(Some(label), Some(size));
        info!("{}", s);
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "timer, label: {}", self.label)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.silent {
            info!(
                "[{}] total elapsed: {:.5} sec",
                self.label,
                self.total().as_secs_f64()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lap_string_has_label_and_size() {
        let mut timer = Timer::new_silent("timer");
        let s = timer.lap_str(Some("hello"), Some(100500));
        assert!(s.starts_with("[timer | hello size: 100500]"));
        assert!(s.contains("elapsed"));
    }

    #[test]
    fn lap_without_size_has_no_qps() {
        let mut timer = Timer::new_silent("timer");
        let s = timer.lap_str(None, None);
        assert!(!s.contains("qps"));
    }

    #[test]
    fn debug_output() {
        let t = Timer::new("foo");
        assert_eq!(format!("{:?}", t), "timer, label: foo");
    }
}

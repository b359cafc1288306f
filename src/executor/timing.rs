//! Request timing measurement and formatting utilities.
//!
//! This module measures the phases of a single GraphQL exchange (sending the
//! request, waiting for the first byte, downloading the body) and formats
//! them for display.

use crate::models::response::Timings;
use std::time::{Duration, Instant};

/// Timing checkpoints collected during request execution.
#[derive(Debug, Clone)]
pub struct TimingCheckpoints {
    /// When the request started.
    pub request_start: Instant,

    /// When the request was handed to the HTTP client.
    pub request_sent: Option<Instant>,

    /// When the response head was received.
    pub first_byte_received: Option<Instant>,

    /// When the response body was completely read.
    pub response_complete: Option<Instant>,
}

impl TimingCheckpoints {
    /// Creates a new TimingCheckpoints with the request start time.
    pub fn new() -> Self {
        Self {
            request_start: Instant::now(),
            request_sent: None,
            first_byte_received: None,
            response_complete: None,
        }
    }

    /// Records when the request was sent to the network.
    pub fn mark_request_sent(&mut self) {
        self.request_sent = Some(Instant::now());
    }

    /// Records when the first response byte was received.
    pub fn mark_first_byte_received(&mut self) {
        self.first_byte_received = Some(Instant::now());
    }

    /// Records when the response was completely received.
    pub fn mark_response_complete(&mut self) {
        self.response_complete = Some(Instant::now());
    }

    /// Converts checkpoints into [`Timings`].
    ///
    /// Missing checkpoints collapse onto the previous one, so a phase that was
    /// never reached reports zero and `total` is measured up to the last
    /// recorded checkpoint.
    ///
    /// # Returns
    ///
    /// A `Timings` record in milliseconds.
    pub fn to_timings(&self) -> Timings {
        let sent = self.request_sent.unwrap_or(self.request_start);
        let first_byte = self.first_byte_received.unwrap_or(sent);
        let complete = self.response_complete.unwrap_or(first_byte);

        Timings {
            request: millis(sent.duration_since(self.request_start)),
            first_byte: millis(first_byte.duration_since(sent)),
            download: millis(complete.duration_since(first_byte)),
            total: millis(complete.duration_since(self.request_start)),
        }
    }
}

impl Default for TimingCheckpoints {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Formats timings into a human-readable string.
///
/// # Arguments
///
/// * `timings` - The timings to format
///
/// # Returns
///
/// A formatted string like "Request: 1ms | First Byte: 30ms | Download: 2ms | Total: 33ms"
///
/// # Examples
///
/// ```
/// use qi_client::executor::timing::format_timings;
/// use qi_client::models::Timings;
///
/// let timings = Timings { request: 1.0, first_byte: 30.0, download: 2.0, total: 33.0 };
/// let formatted = format_timings(&timings);
/// assert!(formatted.contains("First Byte: 30ms"));
/// assert!(formatted.contains("Total: 33ms"));
/// ```
pub fn format_timings(timings: &Timings) -> String {
    format!(
        "Request: {} | First Byte: {} | Download: {} | Total: {}",
        format_millis(timings.request),
        format_millis(timings.first_byte),
        format_millis(timings.download),
        format_millis(timings.total)
    )
}

/// Formats a millisecond value with an appropriate unit.
///
/// Values under one second are shown in whole milliseconds, longer ones in
/// seconds with two decimals.
pub fn format_millis(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{}ms", ms.round() as u64)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_timings_full() {
        let start = Instant::now();
        let checkpoints = TimingCheckpoints {
            request_start: start,
            request_sent: Some(start + Duration::from_millis(5)),
            first_byte_received: Some(start + Duration::from_millis(35)),
            response_complete: Some(start + Duration::from_millis(40)),
        };

        let timings = checkpoints.to_timings();
        assert!((timings.request - 5.0).abs() < 0.001);
        assert!((timings.first_byte - 30.0).abs() < 0.001);
        assert!((timings.download - 5.0).abs() < 0.001);
        assert!((timings.total - 40.0).abs() < 0.001);
    }

    #[test]
    fn test_to_timings_without_response() {
        let start = Instant::now();
        let checkpoints = TimingCheckpoints {
            request_start: start,
            request_sent: Some(start + Duration::from_millis(2)),
            first_byte_received: None,
            response_complete: None,
        };

        let timings = checkpoints.to_timings();
        assert_eq!(timings.first_byte, 0.0);
        assert_eq!(timings.download, 0.0);
        assert!((timings.total - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0.4), "0ms");
        assert_eq!(format_millis(245.6), "246ms");
        assert_eq!(format_millis(1500.0), "1.50s");
    }

    #[test]
    fn test_format_timings() {
        let timings = Timings {
            request: 1.0,
            first_byte: 30.0,
            download: 2.0,
            total: 33.0,
        };
        assert_eq!(
            format_timings(&timings),
            "Request: 1ms | First Byte: 30ms | Download: 2ms | Total: 33ms"
        );
    }
}

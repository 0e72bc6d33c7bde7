use crate::browser::NavigationTiming;

/// Page timings derived from a navigation timing snapshot, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfMetrics {
    pub ttfb_ms: Option<u32>,
    pub dom_ms: Option<u32>,
    pub load_ms: Option<u32>,
}

/// Performance observer for one page session
pub struct PerfCollector;

impl PerfCollector {
    pub fn derive(timing: Option<&NavigationTiming>) -> PerfMetrics {
        let Some(timing) = timing else {
            return PerfMetrics::default();
        };

        PerfMetrics {
            ttfb_ms: span(timing.request_start, timing.response_start),
            dom_ms: span(timing.navigation_start, timing.dom_content_loaded_event_end),
            load_ms: span(timing.navigation_start, timing.load_event_end),
        }
    }
}

/// `end - start`, or `None` when a mark is missing, the end never fired or the
/// difference is negative
fn span(start: Option<f64>, end: Option<f64>) -> Option<u32> {
    let (start, end) = (start?, end?);
    if end <= 0.0 || !start.is_finite() || !end.is_finite() {
        return None;
    }

    let diff = end - start;
    if diff < 0.0 {
        return None;
    }
    Some(diff.round().min(u32::MAX as f64) as u32)
}

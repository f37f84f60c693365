//! Stack timeline module.
//!
//! A [`StackTimeline`] records how many instances of one countable
//! resource (for example the stacks of a buff) are active over time.
//! It stores a sparse list of breakpoints: each breakpoint carries the
//! count that becomes active at its timestamp and stays active until
//! the next breakpoint.
//!
//! Intervals are inserted one at a time and not necessarily in order.
//! Each insertion adds exactly one unit across `[start, end)`, so
//! overlapping intervals compose additively: when one interval ends,
//! the count drops by one instead of falling to zero.

use crate::event::Timestamp;
use serde::{Deserialize, Serialize};

/// A change point in a [`StackTimeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// When the count becomes active.
    pub timestamp: Timestamp,
    /// The count active from `timestamp` until the next breakpoint.
    pub count: u32,
}

/// Stack count over time for one resource.
///
/// Breakpoints are kept strictly increasing by timestamp, and no two
/// consecutive breakpoints carry the same count.
///
/// # Examples
///
/// ```rust
/// use zzparse::StackTimeline;
///
/// let mut timeline = StackTimeline::new();
/// timeline.insert(5, 15);
/// timeline.insert(0, 10); // inserted out of order
///
/// assert_eq!(timeline.query(2), 1);
/// assert_eq!(timeline.query(7), 2);
/// assert_eq!(timeline.query(12), 1);
/// assert_eq!(timeline.query(20), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTimeline {
    breakpoints: Vec<Breakpoint>,
}

impl StackTimeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of breakpoints past the last breakpoint at or before
    /// `timestamp`, i.e. the insertion point after it.
    fn upper_bound(&self, timestamp: Timestamp) -> usize {
        self.breakpoints
            .partition_point(|bp| bp.timestamp <= timestamp)
    }

    /// Add one unit of count across `[start, end)`.
    ///
    /// Zero-width (and inverted) intervals contribute nothing and leave
    /// the timeline untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzparse::StackTimeline;
    ///
    /// let mut timeline = StackTimeline::new();
    /// timeline.insert(0, 6_000);
    /// timeline.insert(0, 6_000);
    /// timeline.insert(4_000, 10_000);
    ///
    /// assert_eq!(timeline.query(1_000), 2);
    /// assert_eq!(timeline.query(5_000), 3);
    /// assert_eq!(timeline.query(6_000), 1);
    /// assert_eq!(timeline.query(10_000), 0);
    /// ```
    pub fn insert(&mut self, start: Timestamp, end: Timestamp) {
        if end <= start {
            return;
        }

        let after = self.upper_bound(start);
        let mut i = if after > 0 && self.breakpoints[after - 1].timestamp == start {
            after - 1
        } else {
            let baseline = if after > 0 {
                self.breakpoints[after - 1].count
            } else {
                0
            };
            self.breakpoints.insert(
                after,
                Breakpoint {
                    timestamp: start,
                    count: baseline,
                },
            );
            after
        };

        let mut last = 0;
        while i < self.breakpoints.len() && self.breakpoints[i].timestamp < end {
            self.breakpoints[i].count += 1;
            last = self.breakpoints[i].count;
            i += 1;
        }

        // An existing breakpoint at `end` already holds the count without us.
        let ends_on_breakpoint =
            i < self.breakpoints.len() && self.breakpoints[i].timestamp == end;
        if !ends_on_breakpoint {
            self.breakpoints.insert(
                i,
                Breakpoint {
                    timestamp: end,
                    count: last - 1,
                },
            );
        }

        self.normalize();
    }

    /// The count active at `timestamp`; 0 before the first breakpoint.
    pub fn query(&self, timestamp: Timestamp) -> u32 {
        match self.upper_bound(timestamp) {
            0 => 0,
            idx => self.breakpoints[idx - 1].count,
        }
    }

    /// Force the count to `count` from `timestamp` onward.
    ///
    /// Discards every breakpoint at or after `timestamp`. Used when an
    /// authoritative external reset (such as leaving a shapeshift form)
    /// overrides the additive model.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzparse::StackTimeline;
    ///
    /// let mut timeline = StackTimeline::new();
    /// timeline.insert(0, 10_000);
    /// timeline.insert(2_000, 12_000);
    /// timeline.truncate(5_000, 0);
    ///
    /// assert_eq!(timeline.query(4_999), 2);
    /// assert_eq!(timeline.query(5_000), 0);
    /// assert_eq!(timeline.query(11_000), 0);
    /// ```
    pub fn truncate(&mut self, timestamp: Timestamp, count: u32) {
        let keep = self
            .breakpoints
            .partition_point(|bp| bp.timestamp < timestamp);
        self.breakpoints.truncate(keep);
        self.breakpoints.push(Breakpoint { timestamp, count });
        self.normalize();
    }

    /// Drop redundant breakpoints: leading zeros and repeats of the
    /// previous count.
    fn normalize(&mut self) {
        let mut previous = 0;
        self.breakpoints.retain(|bp| {
            let keep = bp.count != previous;
            previous = bp.count;
            keep
        });
    }

    /// The breakpoints, in timestamp order.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Whether no interval is recorded.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Highest count ever active.
    pub fn max_count(&self) -> u32 {
        self.breakpoints.iter().map(|bp| bp.count).max().unwrap_or(0)
    }

    /// Constant-count segments clipped to `[start, end)`, as
    /// `(segment_start, segment_end, count)`.
    pub fn segments(&self, start: Timestamp, end: Timestamp) -> Vec<(Timestamp, Timestamp, u32)> {
        let mut segments = Vec::new();
        if end <= start {
            return segments;
        }

        let mut from = start;
        let mut count = self.query(start);
        for bp in &self.breakpoints[self.upper_bound(start)..] {
            if bp.timestamp >= end {
                break;
            }
            segments.push((from, bp.timestamp, count));
            from = bp.timestamp;
            count = bp.count;
        }
        segments.push((from, end, count));
        segments
    }

    /// Milliseconds within `[start, end)` during which the count was
    /// greater than zero.
    pub fn active_duration(&self, start: Timestamp, end: Timestamp) -> i64 {
        self.segments(start, end)
            .into_iter()
            .filter(|&(_, _, count)| count > 0)
            .map(|(from, to, _)| to - from)
            .sum()
    }

    /// Sum of `count × duration` over `[start, end)`, in stack-milliseconds.
    pub fn stack_duration(&self, start: Timestamp, end: Timestamp) -> i64 {
        self.segments(start, end)
            .into_iter()
            .map(|(from, to, count)| i64::from(count) * (to - from))
            .sum()
    }

    /// Milliseconds within `[start, end)` spent at each stack count,
    /// indexed by count.
    pub fn duration_by_count(&self, start: Timestamp, end: Timestamp) -> Vec<i64> {
        let mut durations = vec![0; self.max_count() as usize + 1];
        for (from, to, count) in self.segments(start, end) {
            durations[count as usize] += to - from;
        }
        durations
    }
}

//! # Channel Buffer Module
//!
//! Per-channel time series backing both the live display and CSV export.
//!
//! Every sample is retained for the lifetime of a connection so exports carry
//! full history. The live display only looks at the most recent window (100 s
//! by default). Because timestamps never decrease, each series keeps a cursor
//! to its oldest in-window element and only ever moves it forward, so the
//! display view costs O(1) amortized per append. Arbitrary window widths are
//! answered with a binary search over the sorted timestamps.
//!
//! Consumers never get a live reference into the buffer: [`ChannelBuffer::snapshot`]
//! and friends return an owned [`BufferSnapshot`].

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::BufferError;
use crate::protocol::types::{Channel, Frame, Sample, NUM_CHANNELS};

/// Default display window (100 seconds)
pub const DEFAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(100);

/// Ordered time series for one channel
///
/// `timestamps` and `values` are index-aligned and insertion ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    /// Index of the oldest element inside the display window
    window_start: usize,
}

impl ChannelSeries {
    /// Creates an empty series
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reading
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfOrder`] if `timestamp` is older than the
    /// newest stored timestamp. Equal timestamps are accepted.
    pub fn append(&mut self, timestamp: DateTime<Utc>, value: f64) -> Result<(), BufferError> {
        self.check_order(timestamp)?;
        self.timestamps.push(timestamp);
        self.values.push(value);
        Ok(())
    }

    fn check_order(&self, timestamp: DateTime<Utc>) -> Result<(), BufferError> {
        match self.timestamps.last() {
            Some(&latest) if timestamp < latest => Err(BufferError::OutOfOrder { timestamp, latest }),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Newest timestamp and value
    #[must_use]
    pub fn latest(&self) -> Option<(DateTime<Utc>, f64)> {
        Some((*self.timestamps.last()?, *self.values.last()?))
    }

    /// Count, min, max and latest value of the series
    #[must_use]
    pub fn stats(&self) -> Option<SeriesStats> {
        let (_, latest) = self.latest()?;
        let (min, max) = self
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(SeriesStats {
            count: self.len(),
            min,
            max,
            latest,
        })
    }

    /// Moves the display cursor past everything older than `latest - width`
    fn advance_window(&mut self, width: Duration) {
        let Some(cutoff) = self.cutoff(width) else {
            return;
        };
        while self.window_start < self.timestamps.len() && self.timestamps[self.window_start] < cutoff {
            self.window_start += 1;
        }
    }

    /// First index inside a window of `width`, found by binary search
    fn window_start_for(&self, width: Duration) -> usize {
        match self.cutoff(width) {
            Some(cutoff) => self.timestamps.partition_point(|&ts| ts < cutoff),
            None => 0,
        }
    }

    /// Oldest timestamp still inside a window of `width`, if it is bounded
    fn cutoff(&self, width: Duration) -> Option<DateTime<Utc>> {
        let latest = *self.timestamps.last()?;
        let width = chrono::Duration::from_std(width).ok()?;
        latest.checked_sub_signed(width)
    }

    /// Owned copy of the elements from `start` onwards
    fn tail(&self, start: usize) -> ChannelSeries {
        ChannelSeries {
            timestamps: self.timestamps[start..].to_vec(),
            values: self.values[start..].to_vec(),
            window_start: 0,
        }
    }

    fn clear(&mut self) {
        self.timestamps.clear();
        self.values.clear();
        self.window_start = 0;
    }
}

/// Summary of one channel, used by the status display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
}

/// The four channel series of one session
///
/// Samples enter only through [`ChannelBuffer::push`], which updates all four
/// series together so they always have the same length.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    series: [ChannelSeries; NUM_CHANNELS],
    display_window: Duration,
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_WINDOW)
    }
}

impl ChannelBuffer {
    /// Creates an empty buffer with the given display window
    #[must_use]
    pub fn new(display_window: Duration) -> Self {
        Self {
            series: Default::default(),
            display_window,
        }
    }

    /// Appends a sample to all four series
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfOrder`] if the sample is older than the
    /// newest stored one. Nothing is appended in that case.
    pub fn push(&mut self, sample: &Sample) -> Result<(), BufferError> {
        // All series share timestamps, so checking one covers the rest
        self.series[0].check_order(sample.timestamp)?;

        for channel in Channel::ALL {
            self.append(channel, sample.timestamp, sample.value(channel))?;
        }
        Ok(())
    }

    /// Appends one reading to one series
    pub(crate) fn append(
        &mut self,
        channel: Channel,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<(), BufferError> {
        let series = &mut self.series[channel.index()];
        series.append(timestamp, value)?;
        series.advance_window(self.display_window);
        Ok(())
    }

    /// Series for one channel
    #[must_use]
    pub fn series(&self, channel: Channel) -> &ChannelSeries {
        &self.series[channel.index()]
    }

    /// Number of samples stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series[0].is_empty()
    }

    /// Most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<Sample> {
        self.snapshot_sample(self.len().checked_sub(1)?)
    }

    fn snapshot_sample(&self, index: usize) -> Option<Sample> {
        let timestamp = *self.series[0].timestamps().get(index)?;
        let mut values = [0.0; NUM_CHANNELS];
        for (value, series) in values.iter_mut().zip(&self.series) {
            *value = *series.values().get(index)?;
        }
        Some(Frame::from_values(values).at(timestamp))
    }

    /// Full-history copy of all four series
    #[must_use]
    pub fn snapshot(&self) -> BufferSnapshot {
        self.snapshot_from(|_| 0)
    }

    /// Copy of the samples inside the display window
    #[must_use]
    pub fn display_snapshot(&self) -> BufferSnapshot {
        self.snapshot_from(|series| series.window_start)
    }

    /// Copy of the samples no older than `latest - width`
    #[must_use]
    pub fn window(&self, width: Duration) -> BufferSnapshot {
        self.snapshot_from(|series| series.window_start_for(width))
    }

    fn snapshot_from(&self, start: impl Fn(&ChannelSeries) -> usize) -> BufferSnapshot {
        BufferSnapshot {
            series: std::array::from_fn(|i| {
                let series = &self.series[i];
                series.tail(start(series))
            }),
        }
    }

    /// Clears all series
    pub fn reset(&mut self) {
        for series in &mut self.series {
            series.clear();
        }
    }
}

/// Read-only copy of the four series, handed to display and export consumers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSnapshot {
    series: [ChannelSeries; NUM_CHANNELS],
}

impl BufferSnapshot {
    #[must_use]
    pub fn series(&self, channel: Channel) -> &ChannelSeries {
        &self.series[channel.index()]
    }

    /// Sample timestamps, shared by all four series
    #[must_use]
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        self.series[0].timestamps()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series[0].is_empty()
    }

    /// Values of all four channels at `index`, in wire order
    #[must_use]
    pub fn values_at(&self, index: usize) -> Option<[f64; NUM_CHANNELS]> {
        let mut values = [0.0; NUM_CHANNELS];
        for (value, series) in values.iter_mut().zip(&self.series) {
            *value = *series.values().get(index)?;
        }
        Some(values)
    }
}

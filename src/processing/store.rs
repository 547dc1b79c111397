use serde::{Deserialize, Serialize};

use super::detectors::{baseline, PeakClassification, PeakEvent};

// BUFFER COMPONENT ------------------------------------------------------------

/// Fixed-capacity FIFO backed by a single allocation. Once full, each push
/// overwrites the oldest slot and advances `start`.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    start: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            start: 0,
        }
    }

    pub fn add(&mut self, element: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(element);
        } else {
            self.buffer[self.start] = element;
            self.start = (self.start + 1) % self.capacity; // Overwrite oldest if full
        }
    }

    /// Element at logical position `index`, 0 being the oldest retained.
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.buffer.len() {
            return None;
        }
        let adjusted_index = (self.start + index) % self.buffer.len();
        Some(self.buffer[adjusted_index])
    }

    pub fn latest(&self) -> Option<T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// The newest `count` elements (or fewer), oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = T> + '_ {
        let skip = self.len().saturating_sub(count);
        self.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.start = 0;
    }
}

// SAMPLE STORE ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub frame_index: u64,
    /// Seconds since the pipeline epoch (monotonic).
    pub timestamp: f64,
    pub value: f64,
    pub peak: Option<PeakClassification>,
}

/// Bounded history plus the running counters derived from it. Not
/// synchronized itself; the pipeline keeps it behind its single lock.
pub struct SampleStore {
    samples: RingBuffer<Sample>,
    peak_log: RingBuffer<PeakEvent>,
    baseline_window: usize,
    total_frame_count: u64,
    current_baseline: Option<f64>,
    peak_signal: Option<PeakClassification>,
    last_peak_signal: Option<PeakClassification>,
}

impl SampleStore {
    pub fn new(capacity: usize, peak_log_capacity: usize, baseline_window: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
            peak_log: RingBuffer::new(peak_log_capacity.max(1)),
            baseline_window,
            total_frame_count: 0,
            current_baseline: None,
            peak_signal: None,
            last_peak_signal: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_frame_count(&self) -> u64 {
        self.total_frame_count
    }

    /// Index the next appended sample will carry. Frames are numbered from 1.
    pub fn next_frame_index(&self) -> u64 {
        self.total_frame_count + 1
    }

    pub fn current_baseline(&self) -> Option<f64> {
        self.current_baseline
    }

    /// Annotation of the newest sample.
    pub fn peak_signal(&self) -> Option<PeakClassification> {
        self.peak_signal
    }

    /// Most recent non-empty classification.
    pub fn last_peak_signal(&self) -> Option<PeakClassification> {
        self.last_peak_signal
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.latest()
    }

    /// Copies the newest `count` values into `out`, oldest first.
    pub fn recent_values_into(&self, count: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.samples.recent(count).map(|s| s.value));
    }

    /// Appends one complete sample, evicting the oldest when full, and
    /// refreshes baseline and peak state in the same call.
    pub fn append(&mut self, timestamp: f64, value: f64, peak: Option<PeakEvent>) -> Sample {
        let sample = Sample {
            frame_index: self.next_frame_index(),
            timestamp,
            value,
            peak: peak.map(|event| event.classification),
        };
        self.samples.add(sample);
        self.total_frame_count = sample.frame_index;
        self.refresh_baseline();

        self.peak_signal = sample.peak;
        if let Some(event) = peak {
            self.last_peak_signal = Some(event.classification);
            self.peak_log.add(PeakEvent {
                frame_index: sample.frame_index,
                ..event
            });
        }
        sample
    }

    /// Changes the baseline window and recomputes the baseline over the
    /// samples already stored.
    pub fn set_baseline_window(&mut self, window: usize) {
        self.baseline_window = window;
        self.refresh_baseline();
    }

    fn refresh_baseline(&mut self) {
        let window: Vec<f64> = self
            .samples
            .recent(self.baseline_window)
            .map(|s| s.value)
            .collect();
        self.current_baseline = baseline(&window, self.baseline_window);
    }

    pub fn snapshot(&self, count: usize) -> Vec<Sample> {
        self.samples.recent(count).collect()
    }

    pub fn peak_events(&self) -> Vec<PeakEvent> {
        self.peak_log.iter().collect()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.peak_log.clear();
        self.total_frame_count = 0;
        self.current_baseline = None;
        self.peak_signal = None;
        self.last_peak_signal = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_overwrites_oldest() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=5 {
            ring.add(v);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.get(0), Some(3));
        assert_eq!(ring.get(3), None);
        assert_eq!(ring.latest(), Some(5));
        assert_eq!(ring.recent(2).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(ring.recent(10).count(), 3);
    }

    #[test]
    fn store_keeps_most_recent_in_order() {
        let mut store = SampleStore::new(100, 8, 60);
        for i in 0..250 {
            store.append(i as f64 * 0.01, i as f64, None);
        }
        let samples = store.snapshot(500);
        assert_eq!(samples.len(), 100);
        assert_eq!(samples[0].frame_index, 151);
        assert_eq!(samples[99].frame_index, 250);
        assert!(samples.windows(2).all(|w| w[0].frame_index < w[1].frame_index));
        assert_eq!(store.total_frame_count(), 250);
    }

    #[test]
    fn baseline_undefined_until_window_filled() {
        let mut store = SampleStore::new(100, 8, 60);
        for _ in 0..59 {
            store.append(0.0, 120.0, None);
        }
        assert_eq!(store.current_baseline(), None);
        store.append(0.0, 120.0, None);
        assert_eq!(store.current_baseline(), Some(120.0));
    }

    #[test]
    fn peak_annotation_and_last_peak_are_tracked_separately() {
        let mut store = SampleStore::new(10, 4, 5);
        let event = PeakEvent {
            frame_index: 0,
            classification: PeakClassification::Strong,
            confidence_delta: 3.0,
            excursion: 9.0,
        };
        store.append(0.0, 1.0, Some(event));
        store.append(0.1, 1.0, None);
        assert_eq!(store.peak_signal(), None);
        assert_eq!(store.last_peak_signal(), Some(PeakClassification::Strong));
        let events = store.peak_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 1);
        assert_eq!(store.snapshot(2)[0].peak, Some(PeakClassification::Strong));
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = SampleStore::new(10, 4, 2);
        store.append(0.0, 5.0, None);
        store.append(0.1, 7.0, None);
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.total_frame_count(), 0);
        assert_eq!(store.current_baseline(), None);
        assert_eq!(store.next_frame_index(), 1);
    }

    #[test]
    fn changing_baseline_window_recomputes_baseline() {
        let mut store = SampleStore::new(10, 4, 4);
        for v in [1.0, 2.0, 3.0, 4.0] {
            store.append(0.0, v, None);
        }
        assert_eq!(store.current_baseline(), Some(2.5));
        store.set_baseline_window(2);
        assert_eq!(store.current_baseline(), Some(3.5));
        store.set_baseline_window(6);
        assert_eq!(store.current_baseline(), None);
    }
}

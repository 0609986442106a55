//! Activity span accumulation over analyzed frames.
//!
//! Frames are observed in index order with their motion/object verdicts.
//! Activity opens a span padded backwards by the buffer; a quiet gap longer
//! than the buffer closes it padded forwards. Overlapping spans merge after
//! the pass so padding never produces back-to-back clips of the same event.

/// A stretch of frames worth keeping, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
    pub motion: bool,
    pub objects: bool,
}

impl Span {
    pub fn duration_seconds(&self, fps: f64) -> f64 {
        (self.end - self.start) as f64 / fps
    }
}

/// Builds activity spans from per-frame verdicts.
#[derive(Debug)]
pub struct SegmentBuilder {
    buffer_frames: u64,
    total_frames: u64,
    open: Option<Span>,
    closed: Vec<Span>,
}

impl SegmentBuilder {
    pub fn new(buffer_frames: u64, total_frames: u64) -> Self {
        Self {
            buffer_frames,
            total_frames,
            open: None,
            closed: Vec::new(),
        }
    }

    /// Feed one analyzed frame's verdicts. Frames must arrive in
    /// increasing index order.
    pub fn observe(&mut self, frame_idx: u64, motion: bool, objects: bool) {
        let active = motion || objects;
        match (&mut self.open, active) {
            (None, true) => {
                self.open = Some(Span {
                    start: frame_idx.saturating_sub(self.buffer_frames),
                    end: frame_idx,
                    motion,
                    objects,
                });
            }
            (Some(span), true) => {
                span.end = frame_idx;
                span.motion |= motion;
                span.objects |= objects;
            }
            (Some(span), false) => {
                // Only a quiet stretch longer than the buffer closes the
                // span; the tail padding may run past the last frame and
                // the extractor tolerates that.
                if frame_idx - span.end > self.buffer_frames {
                    let mut finished = span.clone();
                    finished.end += self.buffer_frames;
                    self.closed.push(finished);
                    self.open = None;
                }
            }
            (None, false) => {}
        }
    }

    /// Number of spans closed so far. The span still being extended, if
    /// any, is not counted.
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Close any open span, clamp its tail to the stream, and return all
    /// spans sorted and merged.
    pub fn finish(mut self) -> Vec<Span> {
        if let Some(mut span) = self.open.take() {
            span.end = (span.end + self.buffer_frames).min(self.total_frames.saturating_sub(1));
            self.closed.push(span);
        }
        self.closed.sort_by_key(|s| s.start);
        merge_spans(self.closed)
    }
}

/// Merge spans whose padded ranges touch or overlap. Expects the input
/// sorted by start.
fn merge_spans(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                last.end = last.end.max(span.end);
                last.motion |= span.motion;
                last.objects |= span.objects;
            }
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_opens_span_with_lead_in() {
        let mut builder = SegmentBuilder::new(75, 10_000);
        builder.observe(300, true, false);
        let spans = builder.finish();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 225);
    }

    #[test]
    fn test_lead_in_saturates_at_zero() {
        let mut builder = SegmentBuilder::new(75, 10_000);
        builder.observe(30, true, false);
        let spans = builder.finish();
        assert_eq!(spans[0].start, 0);
    }

    #[test]
    fn test_short_gap_keeps_span_open() {
        let mut builder = SegmentBuilder::new(50, 10_000);
        builder.observe(100, true, false);
        builder.observe(130, false, false);
        builder.observe(140, true, false);
        let spans = builder.finish();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 190);
    }

    #[test]
    fn test_long_gap_closes_with_tail_padding() {
        let mut builder = SegmentBuilder::new(50, 10_000);
        builder.observe(100, true, false);
        builder.observe(151, false, false);
        assert_eq!(builder.closed_count(), 1);
        builder.observe(500, true, false);
        let spans = builder.finish();
        assert_eq!(spans.len(), 2);
        // Tail of the first span is its last active frame plus the buffer.
        assert_eq!(spans[0].end, 150);
        assert_eq!(spans[1].start, 450);
    }

    #[test]
    fn test_gap_equal_to_buffer_does_not_close() {
        let mut builder = SegmentBuilder::new(50, 10_000);
        builder.observe(100, true, false);
        builder.observe(150, false, false);
        assert_eq!(builder.closed_count(), 0);
    }

    #[test]
    fn test_finish_clamps_open_span_to_stream() {
        let mut builder = SegmentBuilder::new(100, 1_000);
        builder.observe(950, true, false);
        let spans = builder.finish();
        assert_eq!(spans[0].end, 999);
    }

    #[test]
    fn test_spans_come_back_in_start_order() {
        let mut builder = SegmentBuilder::new(10, 100_000);
        builder.observe(1_000, true, false);
        builder.observe(1_011, false, false);
        builder.observe(5_000, false, true);
        builder.observe(5_011, false, false);
        builder.observe(9_000, true, true);
        let spans = builder.finish();
        assert_eq!(spans.len(), 3);
        assert!(spans.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_flags_accumulate_across_span() {
        let mut builder = SegmentBuilder::new(10, 10_000);
        builder.observe(100, true, false);
        builder.observe(105, false, true);
        let spans = builder.finish();
        assert!(spans[0].motion);
        assert!(spans[0].objects);
    }

    #[test]
    fn test_overlapping_spans_merge() {
        let mut builder = SegmentBuilder::new(50, 10_000);
        builder.observe(100, true, false);
        builder.observe(151, false, false);
        builder.observe(180, false, true);
        let spans = builder.finish();
        // First span tail reaches 150, second leads in to 130: one clip.
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 50);
        assert!(spans[0].motion);
        assert!(spans[0].objects);
    }

    #[test]
    fn test_touching_spans_merge() {
        let merged = merge_spans(vec![
            Span {
                start: 0,
                end: 100,
                motion: true,
                objects: false,
            },
            Span {
                start: 100,
                end: 200,
                motion: false,
                objects: true,
            },
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].end, 200);
        assert!(merged[0].motion && merged[0].objects);
    }

    #[test]
    fn test_disjoint_spans_stay_separate() {
        let merged = merge_spans(vec![
            Span {
                start: 0,
                end: 100,
                motion: true,
                objects: false,
            },
            Span {
                start: 101,
                end: 200,
                motion: true,
                objects: false,
            },
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_activity_no_spans() {
        let mut builder = SegmentBuilder::new(50, 10_000);
        for idx in (0..1_000).step_by(15) {
            builder.observe(idx, false, false);
        }
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn test_span_duration() {
        let span = Span {
            start: 100,
            end: 400,
            motion: true,
            objects: false,
        };
        assert_eq!(span.duration_seconds(30.0), 10.0);
    }
}

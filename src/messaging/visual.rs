// Visual channel - Lock-free audio -> UI step notifications
//
// The scheduler pushes one event per scheduled step, stamped with the clock
// time the step sounds at. The UI side drains whatever is due on its own
// frame clock, so the two clocks meet only through the shared sample counter.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

/// What the UI needs to animate one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualEvent {
    /// Audio clock time (samples) the step sounds at
    pub at: u64,
    pub step: usize,
    /// Highest active pitch row, `None` for a rest
    pub primary_row: Option<usize>,
    /// Transport run that scheduled the step
    pub run_id: u64,
}

pub type VisualProducer = ringbuf::HeapProd<VisualEvent>;
pub type VisualConsumer = ringbuf::HeapCons<VisualEvent>;

pub fn create_visual_channel(capacity: usize) -> (VisualProducer, VisualConsumer) {
    let rb = HeapRb::<VisualEvent>::new(capacity.max(1));
    rb.split()
}

/// Push without blocking; `false` if the UI fell behind and the buffer is full
pub fn send_visual(tx: &mut VisualProducer, event: VisualEvent) -> bool {
    tx.try_push(event).is_ok()
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub fired: usize,
    /// Too old to show, skipped instead of fired late
    pub late: usize,
    /// Scheduled by an earlier run
    pub stale_run: usize,
}

/// UI-side reader of the visual channel
pub struct VisualFeed {
    rx: VisualConsumer,
    /// Popped but not yet due
    held: Option<VisualEvent>,
}

impl VisualFeed {
    pub fn new(rx: VisualConsumer) -> Self {
        Self { rx, held: None }
    }

    fn next_event(&mut self) -> Option<VisualEvent> {
        self.held.take().or_else(|| self.rx.try_pop())
    }

    /// Fire every event due at `now`, in order
    ///
    /// Events from a run other than `run_id` are discarded. Due events more
    /// than `max_lateness` samples old are dropped.
    pub fn drain_due<F>(&mut self, now: u64, run_id: u64, max_lateness: u64, mut fire: F) -> DrainReport
    where
        F: FnMut(&VisualEvent),
    {
        let mut report = DrainReport::default();
        while let Some(event) = self.next_event() {
            if event.run_id != run_id {
                report.stale_run += 1;
                continue;
            }
            if event.at > now {
                self.held = Some(event);
                break;
            }
            if now - event.at > max_lateness {
                report.late += 1;
                continue;
            }
            fire(&event);
            report.fired += 1;
        }
        report
    }

    /// Throw away everything queued; returns the number of events discarded
    pub fn discard_all(&mut self) -> usize {
        let mut discarded = usize::from(self.held.take().is_some());
        while self.rx.try_pop().is_some() {
            discarded += 1;
        }
        discarded
    }

    pub fn queued(&self) -> usize {
        self.rx.occupied_len() + usize::from(self.held.is_some())
    }
}

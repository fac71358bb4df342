// Scheduler - Look-ahead step scheduling on the audio clock
//
// Runs at the start of every audio block. Every step whose start time falls
// inside [now, now + lookahead) is turned into an event: voices are triggered
// at the exact step time and a visual event is queued for the UI.

use super::pattern::{pitch_for_row, Pattern, PatternStore, Pitch, ROWS, STEPS};
use super::timeline::{step_at, TICKS_PER_STEP};
use super::transport::SharedTransportState;
use crate::messaging::visual::{send_visual, VisualEvent, VisualProducer};
use crate::synth::voice_bank::VoiceBank;
use arrayvec::ArrayVec;
use tracing::warn;

/// One step resolved against a pattern snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Audio clock time (samples)
    pub time: u64,
    pub step: usize,
    /// Every active pitch of the step, highest first; empty = rest
    pub pitches: ArrayVec<Pitch, ROWS>,
    /// Row reported to the animation channel
    pub primary_row: Option<usize>,
}

impl ScheduledEvent {
    pub fn resolve(pattern: &Pattern, step: usize, time: u64) -> Self {
        Self {
            time,
            step,
            pitches: pattern.active_rows(step).filter_map(pitch_for_row).collect(),
            primary_row: pattern.primary_row(step),
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn visual(&self, run_id: u64) -> VisualEvent {
        VisualEvent {
            at: self.time,
            step: self.step,
            primary_row: self.primary_row,
            run_id,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled: usize,
    /// Steps already in the past when reached (the clock jumped ahead)
    pub skipped: usize,
    /// Visual events lost to a full channel
    pub dropped_visual: usize,
}

pub struct Scheduler {
    sample_rate: f64,
    lookahead_samples: u64,
    /// Note length as a fraction of the step
    gate: f64,
    /// Transport run the step grid below belongs to
    armed_run: Option<u64>,
    /// Unswung clock time of the next step to schedule (fractional)
    next_step_time: f64,
}

impl Scheduler {
    pub fn new(sample_rate: f64, lookahead_ms: f64, gate: f64) -> Self {
        Self {
            sample_rate,
            lookahead_samples: (lookahead_ms.max(0.0) * 0.001 * sample_rate).round() as u64,
            gate: gate.clamp(0.05, 1.0),
            armed_run: None,
            next_step_time: 0.0,
        }
    }

    /// Clock time of the next step to schedule, `None` while not running
    pub fn next_step_time(&self) -> Option<u64> {
        self.armed_run.map(|_| self.next_step_time.round() as u64)
    }

    /// Forget the current run; the next running tick starts a new grid at `now`
    pub fn reset(&mut self) {
        self.armed_run = None;
    }

    /// Schedule every step starting before `now + max(lookahead, frames)`
    ///
    /// The pattern is loaded once per tick, so an edit published before this
    /// call is heard from this tick on.
    pub fn tick(
        &mut self,
        now: u64,
        frames: usize,
        transport: &SharedTransportState,
        patterns: &PatternStore,
        voices: &mut VoiceBank,
        visual_tx: &mut VisualProducer,
    ) -> TickReport {
        let mut report = TickReport::default();

        if !transport.is_running() {
            self.armed_run = None;
            return report;
        }

        let run_id = transport.run_id();
        if self.armed_run != Some(run_id) {
            self.armed_run = Some(run_id);
            self.next_step_time = now as f64;
        }

        let horizon = now + self.lookahead_samples.max(frames as u64);
        let pattern = patterns.snapshot();

        while self.next_step_time < horizon as f64 {
            // Tempo and swing are read per step: changes only move future steps
            let step_len = transport.tempo().step_duration_samples(self.sample_rate);
            let step = step_at(transport.position_ticks(), STEPS);
            let swing_offset = if step % 2 == 1 {
                transport.swing() as f64 * step_len * 0.5
            } else {
                0.0
            };
            let at = (self.next_step_time + swing_offset).round() as u64;

            if at < now {
                report.skipped += 1;
            } else {
                let event = ScheduledEvent::resolve(&pattern, step, at);
                if !event.is_rest() {
                    let duration = (step_len * self.gate).round() as u64;
                    voices.trigger(&event.pitches, at, duration);
                }
                if !send_visual(visual_tx, event.visual(run_id)) {
                    report.dropped_visual += 1;
                }
                report.scheduled += 1;
            }

            transport.advance_position(TICKS_PER_STEP);
            self.next_step_time += step_len;
        }

        if report.skipped > 0 {
            warn!(skipped = report.skipped, now, "scheduler fell behind the audio clock, stale steps skipped");
        }
        report
    }
}

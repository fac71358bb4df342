// Voice - One sound generator, one note at a time

use super::envelope::ArEnvelope;
use super::oscillator::{Oscillator, SimpleOscillator, WaveformType};
use crate::sequencer::pattern::Pitch;

/// Generator settings shared by every voice of a bank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub waveform: WaveformType,
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub release: f32,
    pub velocity: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            waveform: WaveformType::Triangle,
            attack: 0.005,
            release: 0.12,
            velocity: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Note {
    pitch: Pitch,
    start_at: u64,
    release_at: u64,
    /// Trigger order, lower = older (used for stealing)
    age: u64,
}

/// Plays notes scheduled on the audio clock
///
/// A note triggered while the voice is busy is queued: the current note keeps
/// sounding until the queued one reaches its start time, then is cut.
pub struct Voice {
    oscillator: SimpleOscillator,
    envelope: ArEnvelope,
    velocity: f32,
    note: Option<Note>,
    started: bool,
    queued: Option<Note>,
}

impl Voice {
    pub fn new(params: &VoiceParams, sample_rate: f32) -> Self {
        Self {
            oscillator: SimpleOscillator::new(params.waveform, sample_rate),
            envelope: ArEnvelope::new(params.attack, params.release, sample_rate),
            velocity: params.velocity,
            note: None,
            started: false,
            queued: None,
        }
    }

    /// Play `pitch` from `start_at` for `duration` samples
    ///
    /// On a busy voice the note replaces any queued one and takes over at `start_at`.
    pub fn trigger(&mut self, pitch: Pitch, start_at: u64, duration: u64, age: u64) {
        let note = Note {
            pitch,
            start_at,
            release_at: start_at + duration.max(1),
            age,
        };
        if self.is_busy() {
            self.queued = Some(note);
        } else {
            self.begin(note);
        }
    }

    fn begin(&mut self, note: Note) {
        self.envelope.kill();
        self.oscillator.set_frequency(note.pitch.frequency());
        self.oscillator.reset();
        self.note = Some(note);
        self.started = false;
    }

    /// Busy = waiting for a start time or still audible
    pub fn is_busy(&self) -> bool {
        self.note.is_some() || self.queued.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.queued.is_some() || (self.note.is_some() && !self.started)
    }

    /// A later note is waiting to take this voice over
    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    pub fn is_sounding(&self) -> bool {
        self.started && self.envelope.is_active()
    }

    pub fn is_releasing(&self) -> bool {
        self.started && self.envelope.is_releasing()
    }

    /// Latest note given to this voice (the queued one if any)
    pub fn pitch(&self) -> Option<Pitch> {
        self.queued.or(self.note).map(|note| note.pitch)
    }

    pub fn age(&self) -> u64 {
        self.queued.or(self.note).map_or(0, |note| note.age)
    }

    /// Forget every note that has not started yet
    pub fn cancel_pending(&mut self) -> bool {
        let dropped_queued = self.queued.take().is_some();
        if self.note.is_some() && !self.started {
            self.clear();
            return true;
        }
        dropped_queued
    }

    /// Let a sounding note fade with its release tail
    pub fn release(&mut self) {
        if self.started {
            self.envelope.release();
        }
    }

    /// Immediate silence, queued note included
    pub fn cut(&mut self) {
        self.envelope.kill();
        self.queued = None;
        self.clear();
    }

    fn clear(&mut self) {
        self.note = None;
        self.started = false;
    }

    /// Render the sample at absolute clock position `now`
    pub fn next_sample(&mut self, now: u64) -> f32 {
        if let Some(next) = self.queued.filter(|next| now >= next.start_at) {
            self.queued = None;
            self.begin(next);
        }

        let Some(note) = self.note else {
            return 0.0;
        };
        if now < note.start_at {
            return 0.0;
        }

        if !self.started {
            self.started = true;
            self.envelope.trigger();
        }
        if now >= note.release_at && !self.envelope.is_releasing() {
            self.envelope.release();
        }

        let level = self.envelope.process();
        let sample = self.oscillator.next_sample() * level * self.velocity;

        if !self.envelope.is_active() {
            self.clear();
        }
        sample
    }
}

// Voice Bank - Bounded polyphony with oldest-first stealing

use super::voice::{Voice, VoiceParams};
use crate::audio::dsp_utils::{flush_denormals_to_zero, soft_clip, OnePoleSmoother};
use crate::sequencer::pattern::Pitch;
use tracing::debug;

pub const DEFAULT_MAX_VOICES: usize = 8;

/// Headroom for chords before the soft clipper
const MIX_GAIN: f32 = 0.3;

/// Volume smoothing time, avoids zipper noise on `set_volume`
const VOLUME_SMOOTHING_MS: f32 = 10.0;

pub struct VoiceBank {
    /// Grown lazily, never beyond `max_voices` (capacity reserved up front)
    voices: Vec<Voice>,
    max_voices: usize,
    sample_rate: f32,
    params: VoiceParams,
    /// Age counter incremented on each triggered note, for stealing priority
    age_counter: u64,
    disposed: bool,
    stolen: u64,
    volume: f32,
    volume_smoother: OnePoleSmoother,
}

impl VoiceBank {
    pub fn new(max_voices: usize, params: VoiceParams, volume: f32, sample_rate: f32) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices,
            sample_rate,
            params,
            age_counter: 0,
            disposed: false,
            stolen: 0,
            volume,
            volume_smoother: OnePoleSmoother::new(volume, VOLUME_SMOOTHING_MS, sample_rate),
        }
    }

    /// Sound `pitches` together at clock time `at` for `duration` samples
    ///
    /// Uses a free voice, then a new one while under the cap, then steals.
    /// A stolen voice keeps its current note until `at`.
    /// Ignored once the bank is disposed. Returns the number of notes left
    /// holding a voice (a chord larger than the pool keeps its last notes).
    pub fn trigger(&mut self, pitches: &[Pitch], at: u64, duration: u64) -> usize {
        if self.disposed {
            debug!(notes = pitches.len(), "trigger on disposed voice bank ignored");
            return 0;
        }

        for &pitch in pitches {
            self.age_counter = self.age_counter.wrapping_add(1);
            let index = self.allocate();
            self.voices[index].trigger(pitch, at, duration, self.age_counter);
        }
        pitches.len().min(self.max_voices)
    }

    fn allocate(&mut self) -> usize {
        if let Some(index) = self.voices.iter().position(|v| !v.is_busy()) {
            return index;
        }
        if self.voices.len() < self.max_voices {
            self.voices.push(Voice::new(&self.params, self.sample_rate));
            return self.voices.len() - 1;
        }

        let index = self.find_voice_to_steal();
        self.stolen += 1;
        if let Some(pitch) = self.voices[index].pitch() {
            debug!(%pitch, "voice stolen");
        }
        index
    }

    /// Voice to reuse when the pool is full
    ///
    /// Priority: a voice with no note queued, then one already in its release
    /// tail, then the oldest trigger.
    fn find_voice_to_steal(&self) -> usize {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, voice)| (voice.has_queued(), !voice.is_releasing(), voice.age()))
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    /// Forget every note that has not started sounding yet
    pub fn cancel_pending(&mut self) -> usize {
        self.voices
            .iter_mut()
            .map(|v| v.cancel_pending())
            .filter(|&cancelled| cancelled)
            .count()
    }

    /// Release every sounding note with its normal tail
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    /// Cut and drop every generator; later triggers are ignored
    ///
    /// Safe mid-sound and safe to call repeatedly. Returns `false` if already disposed.
    pub fn dispose_all(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        for voice in &mut self.voices {
            voice.cut();
        }
        self.voices.clear();
        self.disposed = true;
        debug!(stolen = self.stolen, "voice bank disposed");
        true
    }

    /// Render one block starting at absolute clock position `block_start`
    ///
    /// `out` is interleaved with `channels` channels and fully overwritten.
    pub fn render(&mut self, block_start: u64, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if self.disposed {
            out.fill(0.0);
            return;
        }

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let now = block_start + i as u64;
            let mix: f32 = self.voices.iter_mut().map(|v| v.next_sample(now)).sum();
            let gain = self.volume_smoother.process(self.volume);
            let sample = soft_clip(flush_denormals_to_zero(mix * MIX_GAIN * gain));
            frame.fill(sample);
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Voices waiting to start or still audible
    pub fn busy_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_busy()).count()
    }

    pub fn sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_sounding()).count()
    }

    /// Pitches currently held by a voice (pending or sounding)
    pub fn busy_pitches(&self) -> impl Iterator<Item = Pitch> + '_ {
        self.voices.iter().filter_map(|v| v.pitch())
    }

    /// Generators created so far
    pub fn allocated(&self) -> usize {
        self.voices.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn stolen_count(&self) -> u64 {
        self.stolen
    }
}

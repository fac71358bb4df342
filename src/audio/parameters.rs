// Atomic parameters - Lock-free communication UI ↔ Audio thread
// Floats are stored as their bit patterns in atomic integers

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Thread-safe f32 parameter (volume, swing)
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Set the value (called from UI thread)
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get the value (called from audio thread)
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Thread-safe f64 parameter (tempo needs the extra precision for long runs)
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32_roundtrip() {
        let p = AtomicF32::new(0.5);
        assert_eq!(p.get(), 0.5);
        p.set(0.25);
        assert_eq!(p.get(), 0.25);
    }

    #[test]
    fn test_atomic_f64_keeps_precision() {
        let p = AtomicF64::new(120.0);
        p.set(133.333_333_333_3);
        assert_eq!(p.get(), 133.333_333_333_3);
    }
}

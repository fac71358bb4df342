// Pattern - The pitch x step grid and its lock-free publication
//
// The UI owns the authoritative grid and publishes a complete new copy on
// every edit. The scheduler only ever loads the latest published snapshot.

use crate::error::{EngineError, EngineResult};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Pitch lanes in the grid
pub const ROWS: usize = 8;

/// Time slots per loop
pub const STEPS: usize = 16;

/// A fixed pitch of the scale table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub name: &'static str,
    pub midi: u8,
}

impl Pitch {
    /// Equal-tempered frequency: 440 * 2^((note - 69) / 12)
    pub fn frequency(&self) -> f32 {
        440.0 * 2_f32.powf((self.midi as f32 - 69.0) / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Row -> pitch table. Row 0 is the highest pitch, row `ROWS - 1` the lowest.
pub const SCALE: [Pitch; ROWS] = [
    Pitch { name: "C5", midi: 72 },
    Pitch { name: "A4", midi: 69 },
    Pitch { name: "G4", midi: 67 },
    Pitch { name: "E4", midi: 64 },
    Pitch { name: "D4", midi: 62 },
    Pitch { name: "C4", midi: 60 },
    Pitch { name: "A3", midi: 57 },
    Pitch { name: "G3", midi: 55 },
];

/// Pitch sounded by a grid row
pub fn pitch_for_row(row: usize) -> Option<Pitch> {
    SCALE.get(row).copied()
}

/// Immutable-per-read grid of `ROWS` x `STEPS` cells
///
/// `Copy` on purpose: editing always produces a new grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pattern {
    cells: [[bool; STEPS]; ROWS],
}

impl Pattern {
    /// Empty grid
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(cells: [[bool; STEPS]; ROWS]) -> Self {
        Self { cells }
    }

    /// Build from a dynamically sized grid (e.g. coming from the UI layer)
    ///
    /// Rejects anything that is not exactly `ROWS` rows of `STEPS` cells.
    pub fn from_grid<R: AsRef<[bool]>>(grid: &[R]) -> EngineResult<Self> {
        let bad_row = grid.iter().find(|row| row.as_ref().len() != STEPS);
        if grid.len() != ROWS || bad_row.is_some() {
            return Err(EngineError::InvalidPattern {
                rows: grid.len(),
                steps: bad_row
                    .or(grid.first())
                    .map(|row| row.as_ref().len())
                    .unwrap_or(0),
                expected_rows: ROWS,
                expected_steps: STEPS,
            });
        }

        let mut pattern = Self::new();
        for (row, cells) in grid.iter().enumerate() {
            pattern.cells[row].copy_from_slice(cells.as_ref());
        }
        Ok(pattern)
    }

    pub fn is_active(&self, row: usize, step: usize) -> bool {
        self.cells
            .get(row)
            .and_then(|r| r.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Copy of this grid with one cell set
    pub fn with_cell(&self, row: usize, step: usize, active: bool) -> EngineResult<Self> {
        check_cell(row, step)?;
        let mut next = *self;
        next.cells[row][step] = active;
        Ok(next)
    }

    /// Copy of this grid with one cell flipped
    pub fn toggled(&self, row: usize, step: usize) -> EngineResult<Self> {
        self.with_cell(row, step, !self.is_active(row, step))
    }

    /// Active rows for a step, highest pitch (lowest row index) first
    pub fn active_rows(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        (0..ROWS).filter(move |&row| self.is_active(row, step))
    }

    /// Row reported to the animation channel for a step
    ///
    /// Chords resolve to the highest pitch, i.e. the lowest active row index.
    pub fn primary_row(&self, step: usize) -> Option<usize> {
        self.active_rows(step).next()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&cell| cell).count()
    }
}

fn check_cell(row: usize, step: usize) -> EngineResult<()> {
    if row >= ROWS || step >= STEPS {
        return Err(EngineError::CellOutOfRange { row, step });
    }
    Ok(())
}

/// Built-in grids offered by the activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    Empty,
    /// Walks up the scale twice
    ScaleRun,
    /// C major arpeggio with a chord on the downbeat
    Arpeggio,
    Lullaby,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Empty,
        Preset::ScaleRun,
        Preset::Arpeggio,
        Preset::Lullaby,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Empty => "empty",
            Preset::ScaleRun => "scale-run",
            Preset::Arpeggio => "arpeggio",
            Preset::Lullaby => "lullaby",
        }
    }

    pub fn pattern(&self) -> Pattern {
        let mut cells = [[false; STEPS]; ROWS];
        match self {
            Preset::Empty => {}
            Preset::ScaleRun => {
                for step in 0..STEPS {
                    cells[ROWS - 1 - step % ROWS][step] = true;
                }
            }
            Preset::Arpeggio => {
                // C4 E4 G4 C5 and back down, C/E/G chord on step 0
                const ROW_SEQUENCE: [usize; 8] = [5, 3, 2, 0, 2, 3, 5, 7];
                for step in 0..STEPS {
                    cells[ROW_SEQUENCE[step % ROW_SEQUENCE.len()]][step] = true;
                }
                cells[3][0] = true;
                cells[2][0] = true;
            }
            Preset::Lullaby => {
                const MELODY: [(usize, usize); 10] = [
                    (2, 0),
                    (2, 2),
                    (1, 4),
                    (2, 6),
                    (0, 8),
                    (0, 9),
                    (3, 10),
                    (4, 12),
                    (5, 14),
                    (7, 14),
                ];
                for (row, step) in MELODY {
                    cells[row][step] = true;
                }
            }
        }
        Pattern::from_rows(cells)
    }
}

impl FromStr for Preset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::Config(format!("Unknown preset: {}", s)))
    }
}

/// Latest-published pattern, shared between the UI (writer) and the scheduler (reader)
///
/// Publication is a pointer swap; readers never observe a half-written grid
/// and never hold a lock the writer could wait on.
#[derive(Clone)]
pub struct PatternStore {
    current: Arc<ArcSwap<Pattern>>,
}

impl PatternStore {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(pattern)),
        }
    }

    /// Replace the grid with a complete new version
    pub fn publish(&self, pattern: Pattern) {
        self.current.store(Arc::new(pattern));
    }

    /// Copy of the latest published grid
    pub fn snapshot(&self) -> Pattern {
        **self.current.load()
    }

    /// Derive and publish a new grid from the latest one (copy-on-write)
    ///
    /// Concurrent writers are serialized: a lost race re-runs `edit` on the winner's grid.
    pub fn update<F>(&self, edit: F) -> Pattern
    where
        F: Fn(&Pattern) -> Pattern,
    {
        let previous = self.current.rcu(|current| edit(current));
        edit(&previous)
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(Pattern::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_table() {
        assert_eq!(SCALE[5].name, "C4");
        assert_eq!(SCALE[5].midi, 60);
        // Row 0 highest, last row lowest
        for pair in SCALE.windows(2) {
            assert!(pair[0].midi > pair[1].midi);
        }
        assert!((pitch_for_row(1).unwrap().frequency() - 440.0).abs() < 0.01);
        assert!(pitch_for_row(ROWS).is_none());
    }

    #[test]
    fn test_from_grid_validates_dimensions() {
        let good = vec![vec![false; STEPS]; ROWS];
        assert!(Pattern::from_grid(&good).is_ok());

        let too_few_rows = vec![vec![false; STEPS]; ROWS - 1];
        assert!(matches!(
            Pattern::from_grid(&too_few_rows),
            Err(EngineError::InvalidPattern { rows: 7, .. })
        ));

        let mut short_row = vec![vec![false; STEPS]; ROWS];
        short_row[3] = vec![false; 12];
        assert!(matches!(
            Pattern::from_grid(&short_row),
            Err(EngineError::InvalidPattern { steps: 12, .. })
        ));
    }

    #[test]
    fn test_toggle_is_copy_on_write() {
        let empty = Pattern::new();
        let edited = empty.toggled(2, 8).unwrap();

        assert!(!empty.is_active(2, 8));
        assert!(edited.is_active(2, 8));
        assert!(!edited.toggled(2, 8).unwrap().is_active(2, 8));

        assert!(matches!(
            empty.toggled(ROWS, 0),
            Err(EngineError::CellOutOfRange { .. })
        ));
        assert!(empty.toggled(0, STEPS).is_err());
    }

    #[test]
    fn test_primary_row_is_highest_pitch() {
        let pattern = Pattern::new()
            .with_cell(6, 4, true)
            .and_then(|p| p.with_cell(1, 4, true))
            .and_then(|p| p.with_cell(3, 4, true))
            .unwrap();

        assert_eq!(pattern.primary_row(4), Some(1));
        assert_eq!(pattern.active_rows(4).collect::<Vec<_>>(), vec![1, 3, 6]);
        assert_eq!(pattern.primary_row(5), None);
    }

    #[test]
    fn test_presets() {
        assert!(Preset::Empty.pattern().is_empty());
        let run = Preset::ScaleRun.pattern();
        assert_eq!(run.active_count(), STEPS);
        assert_eq!(run.primary_row(0), Some(ROWS - 1));
        assert_eq!(Preset::Arpeggio.pattern().active_rows(0).count(), 3);
        assert_eq!("Scale-Run".parse::<Preset>().unwrap(), Preset::ScaleRun);
        assert!("polka".parse::<Preset>().is_err());
    }

    #[test]
    fn test_store_publish_and_snapshot() {
        let store = PatternStore::default();
        let reader = store.clone();
        assert!(reader.snapshot().is_empty());

        store.publish(Preset::Lullaby.pattern());
        assert_eq!(reader.snapshot(), Preset::Lullaby.pattern());

        let updated = store.update(|p| p.toggled(0, 0).unwrap_or(*p));
        assert!(updated.is_active(0, 0));
        assert_eq!(reader.snapshot(), updated);
    }

    #[test]
    fn test_serde_shape() {
        let pattern = Pattern::new().with_cell(2, 8, true).unwrap();
        let value = serde_json::to_value(pattern).unwrap();

        let cells = value["cells"].as_array().unwrap();
        assert_eq!(cells.len(), ROWS);
        assert!(cells.iter().all(|row| row.as_array().unwrap().len() == STEPS));
        assert_eq!(cells[2][8], serde_json::Value::Bool(true));

        assert_eq!(serde_json::to_value(Preset::ScaleRun).unwrap(), "ScaleRun");
        let back: Pattern = serde_json::from_value(value).unwrap();
        assert_eq!(back, pattern);
    }
}

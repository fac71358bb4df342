// Observers - UI-facing step and note callbacks

/// Receives the two animation channels
///
/// Called on the thread that polls the engine. Implementations must be cheap
/// and must not call back into the engine.
pub trait SequencerObserver: Send {
    /// Step index for each step boundary, `-1` when playback is stopped/reset
    fn on_step(&mut self, step: i32);

    /// Highest sounding pitch row, `None` for silence
    fn on_note_play(&mut self, row: Option<usize>);
}

/// Adapts two closures into a `SequencerObserver`
pub struct CallbackObserver<S, N>
where
    S: FnMut(i32) + Send,
    N: FnMut(Option<usize>) + Send,
{
    on_step: S,
    on_note_play: N,
}

impl<S, N> CallbackObserver<S, N>
where
    S: FnMut(i32) + Send,
    N: FnMut(Option<usize>) + Send,
{
    pub fn new(on_step: S, on_note_play: N) -> Self {
        Self {
            on_step,
            on_note_play,
        }
    }
}

impl<S, N> SequencerObserver for CallbackObserver<S, N>
where
    S: FnMut(i32) + Send,
    N: FnMut(Option<usize>) + Send,
{
    fn on_step(&mut self, step: i32) {
        (self.on_step)(step)
    }

    fn on_note_play(&mut self, row: Option<usize>) {
        (self.on_note_play)(row)
    }
}

/// Handle returned by `Observers::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of subscribed observers, notified in subscription order
#[derive(Default)]
pub struct Observers {
    entries: Vec<(SubscriptionId, Box<dyn SequencerObserver>)>,
    next_id: u64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn SequencerObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    /// Returns `false` if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One step boundary: `on_step` then `on_note_play` on every observer
    pub fn notify_step(&mut self, step: usize, primary_row: Option<usize>) {
        for (_, observer) in &mut self.entries {
            observer.on_step(step as i32);
            observer.on_note_play(primary_row);
        }
    }

    /// Back to rest: step `-1`, no note
    pub fn notify_reset(&mut self) {
        for (_, observer) in &mut self.entries {
            observer.on_step(-1);
            observer.on_note_play(None);
        }
    }
}

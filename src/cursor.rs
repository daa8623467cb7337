//! Fixed-size window into a query's result sequence

use crate::types::{CursorEvent, CursorId, WorldId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// A consumer's view of `size` consecutive rows of a query.
///
/// Cursors are owned by their query and only ever see the query's id
/// sequence, so every position they report refers to a matching item.
pub struct Cursor {
    pub(crate) id: CursorId,
    size: usize,
    first: usize,
    desired_selection: Option<WorldId>,
    events: UnboundedSender<CursorEvent>,
}

impl Cursor {
    pub(crate) fn new(
        id: CursorId,
        desired_selection: Option<WorldId>,
        size: usize,
        events: UnboundedSender<CursorEvent>,
    ) -> Self {
        Self {
            id,
            size: size.max(1),
            first: 0,
            desired_selection,
            events,
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Query index of the first row in the window
    pub fn first(&self) -> usize {
        self.first
    }

    pub fn desired_selection(&self) -> Option<WorldId> {
        self.desired_selection
    }

    /// Index range of the window clamped to a sequence of `len` items
    pub fn window(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.first.min(len);
        start..self.first.saturating_add(self.size).min(len)
    }

    /// Whether the window reaches within `margin` rows of the end of `len`
    pub(crate) fn near_end(&self, len: usize, margin: usize) -> bool {
        self.first.saturating_add(self.size).saturating_add(margin) >= len
    }

    pub(crate) fn notify(&self, event: CursorEvent) {
        trace!(cursor = self.id.0, ?event, "Cursor event");
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.events.send(event);
    }

    fn max_first(&self, len: usize) -> usize {
        len.saturating_sub(self.size)
    }

    /// Scroll by `delta` rows within a sequence of `len` items.
    /// Returns the delta actually applied.
    pub(crate) fn shift(&mut self, delta: isize, len: usize) -> isize {
        self.desired_selection = None;
        let target = self.first.saturating_add_signed(delta).min(self.max_first(len));
        let applied = target as isize - self.first as isize;
        if applied != 0 {
            self.first = target;
            self.notify(CursorEvent::Shifted { delta: applied });
        }
        applied
    }

    /// Reposition so that `index` is visible, keeping the window full when possible
    pub(crate) fn jump_to_index(&mut self, index: usize, len: usize) {
        let first = if self.window(len).contains(&index) {
            self.first
        } else {
            index.min(self.max_first(len))
        };
        self.first = first;
        self.notify(CursorEvent::Jumped { first });
    }

    pub(crate) fn jump_to_start(&mut self) {
        self.first = 0;
        self.notify(CursorEvent::Jumped { first: 0 });
    }

    /// Anchor on the desired selection if present in `ids`, else go to the start
    pub(crate) fn anchor(&mut self, ids: &[WorldId]) {
        match self
            .desired_selection
            .and_then(|want| ids.iter().position(|id| *id == want))
        {
            Some(index) => {
                self.desired_selection = None;
                self.jump_to_index(index, ids.len());
            }
            None => self.jump_to_start(),
        }
    }

    /// `id` was inserted at `index`; `len` is the new sequence length
    pub(crate) fn on_addition(&mut self, id: WorldId, index: usize, len: usize) {
        if self.desired_selection == Some(id) {
            self.desired_selection = None;
            self.notify(CursorEvent::Addition {
                index,
                window_index: None,
            });
            self.jump_to_index(index, len);
            return;
        }

        // Keep the visible rows stable when something lands above them.
        if index < self.first {
            self.first += 1;
        }
        let window_index = self.window(len).contains(&index).then(|| index - self.first);
        self.notify(CursorEvent::Addition {
            index,
            window_index,
        });
    }

    /// The item at `index` was removed; `len` is the new sequence length
    pub(crate) fn on_removal(&mut self, index: usize, len: usize) {
        let window_index = (index >= self.first && index < self.first.saturating_add(self.size))
            .then(|| index - self.first);
        if index < self.first {
            self.first -= 1;
        }
        self.notify(CursorEvent::Removal {
            index,
            window_index,
        });
        // Keep the window full when rows vanish from its tail end.
        if self.first > self.max_first(len) {
            self.first = self.max_first(len);
            self.notify(CursorEvent::Jumped { first: self.first });
        }
    }
}

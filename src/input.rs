use std::collections::{HashSet, VecDeque};

use glam::Vec2;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

impl KeyCode {
    pub const fn character(ch: char) -> Self {
        Self::Character(ch.to_ascii_uppercase())
    }
}

/// Friendly names for the non-character keys the camera listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Space,
    Escape,
    LeftShift,
    RightShift,
}

/// Keyboard state polled once per frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_shift_down(&self) -> bool {
        self.is_key_down(KeyCode::Named(NamedKey::LeftShift))
            || self.is_key_down(KeyCode::Named(NamedKey::RightShift))
    }

    /// Forgets every held key, e.g. after the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Pointer and window events consumed at the start of the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    CursorMoved { x: f32, y: f32 },
    Scroll { delta: f32 },
    Resized { width: u32, height: u32 },
}

/// FIFO of input events gathered between two frames.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// Yields queued events oldest first and leaves the queue empty.
    pub fn drain(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Unbounded cursor position built from raw mouse motion.
///
/// A grabbed, hidden cursor stops at the window edge on most platforms, so
/// mouse look integrates device deltas instead of reading the OS cursor.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualCursor {
    position: Vec2,
}

impl VirtualCursor {
    pub fn advance(&mut self, dx: f64, dy: f64) -> InputEvent {
        self.position += Vec2::new(dx as f32, dy as f32);
        InputEvent::CursorMoved {
            x: self.position.x,
            y: self.position.y,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_tracks_keys() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        assert!(state.is_key_down(KeyCode::Named(NamedKey::Space)));
        state.set_key_up(KeyCode::Named(NamedKey::Space));
        assert!(!state.is_key_down(KeyCode::Named(NamedKey::Space)));
    }

    #[test]
    fn either_shift_counts() {
        let mut state = InputState::new();
        assert!(!state.is_shift_down());
        state.set_key_down(KeyCode::Named(NamedKey::RightShift));
        assert!(state.is_shift_down());
        state.clear();
        assert!(!state.is_shift_down());
    }

    #[test]
    fn character_keys_are_uppercase() {
        assert_eq!(KeyCode::character('w'), KeyCode::Character('W'));
    }

    #[test]
    fn queue_preserves_order_and_empties() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent::Scroll { delta: 1.0 });
        queue.push(InputEvent::CursorMoved { x: 2.0, y: 3.0 });
        assert_eq!(queue.len(), 2);

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![
                InputEvent::Scroll { delta: 1.0 },
                InputEvent::CursorMoved { x: 2.0, y: 3.0 },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn virtual_cursor_accumulates_motion() {
        let mut cursor = VirtualCursor::default();
        cursor.advance(10.0, -4.0);
        let event = cursor.advance(5.0, 1.0);
        assert_eq!(event, InputEvent::CursorMoved { x: 15.0, y: -3.0 });
        assert_eq!(cursor.position(), Vec2::new(15.0, -3.0));
    }
}

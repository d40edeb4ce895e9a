//! Input gestures and input records.

use std::fmt;

use bitflags::bitflags;

use crate::ElementId;

/// A keyboard key used in a gesture.
///
/// Gesture keys are case-insensitive, [`Key::Char`] and [`Key::Str`] match ignoring case.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Key {
    /// Character key.
    Char(char),
    /// Key that generates a string.
    Str(String),

    /// Enter or return key.
    Enter,
    /// Tab key.
    Tab,
    /// Space bar.
    Space,
    /// Backspace key.
    Backspace,
    /// Escape key.
    Escape,
    /// Delete key.
    Delete,
    /// Insert key.
    Insert,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page up key.
    PageUp,
    /// Page down key.
    PageDown,
    /// Left arrow.
    ArrowLeft,
    /// Right arrow.
    ArrowRight,
    /// Up arrow.
    ArrowUp,
    /// Down arrow.
    ArrowDown,
    /// The context menu key, also called the "applications" key.
    ContextMenu,

    /// F1 key.
    F1,
    /// F2 key.
    F2,
    /// F3 key.
    F3,
    /// F4 key.
    F4,
    /// F5 key.
    F5,
    /// F6 key.
    F6,
    /// F7 key.
    F7,
    /// F8 key.
    F8,
    /// F9 key.
    F9,
    /// F10 key.
    F10,
    /// F11 key.
    F11,
    /// F12 key.
    F12,

    /// Media play.
    MediaPlay,
    /// Media pause.
    MediaPause,
    /// Media play or pause toggle.
    MediaPlayPause,
    /// Media stop.
    MediaStop,
    /// Media record.
    MediaRecord,
    /// Next media track.
    MediaTrackNext,
    /// Previous media track.
    MediaTrackPrevious,
    /// Volume up.
    AudioVolumeUp,
    /// Volume down.
    AudioVolumeDown,
    /// Volume mute toggle.
    AudioVolumeMute,
}
impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Key::Char(c) => {
                for c in c.to_uppercase() {
                    c.hash(state);
                }
            }
            Key::Str(s) => {
                unicase::UniCase::new(s).hash(state);
            }
            _ => {}
        }
    }
}
impl Eq for Key {}
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Char(l), Key::Char(r)) => l.to_uppercase().eq(r.to_uppercase()),
            (Key::Str(l), Key::Str(r)) => unicase::eq(l, r),
            (l, r) => core::mem::discriminant(l) == core::mem::discriminant(r),
        }
    }
}
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c.to_uppercase()),
            Key::Str(s) => write!(f, "{s}"),
            Key::Escape => write!(f, "Esc"),
            Key::Delete => write!(f, "Del"),
            Key::ArrowLeft => write!(f, "←"),
            Key::ArrowRight => write!(f, "→"),
            Key::ArrowUp => write!(f, "↑"),
            Key::ArrowDown => write!(f, "↓"),
            k => write!(f, "{k:?}"),
        }
    }
}
impl From<char> for Key {
    fn from(c: char) -> Self {
        Key::Char(c)
    }
}

bitflags! {
    /// Represents the current state of the keyboard modifiers.
    ///
    /// Each flag represents a modifier and is set if this modifier is active.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct ModifiersState: u8 {
        /// The left "shift" key.
        const L_SHIFT = 0b0000_0001;
        /// The right "shift" key.
        const R_SHIFT = 0b0000_0010;
        /// Any "shift" key.
        const SHIFT = 0b0000_0011;

        /// The left "control" key.
        const L_CTRL = 0b0000_0100;
        /// The right "control" key.
        const R_CTRL = 0b0000_1000;
        /// Any "control" key.
        const CTRL = 0b0000_1100;

        /// The left "alt" key.
        const L_ALT = 0b0001_0000;
        /// The right "alt" key.
        const R_ALT = 0b0010_0000;
        /// Any "alt" key.
        const ALT = 0b0011_0000;

        /// The left "logo" key.
        const L_SUPER = 0b0100_0000;
        /// The right "logo" key.
        const R_SUPER = 0b1000_0000;
        /// Any "logo" key.
        const SUPER = 0b1100_0000;
    }
}
impl ModifiersState {
    /// Returns `true` if any shift key is pressed.
    pub fn has_shift(self) -> bool {
        self.intersects(Self::SHIFT)
    }
    /// Returns `true` if any control key is pressed.
    pub fn has_ctrl(self) -> bool {
        self.intersects(Self::CTRL)
    }
    /// Returns `true` if any alt key is pressed.
    pub fn has_alt(self) -> bool {
        self.intersects(Self::ALT)
    }
    /// Returns `true` if any logo key is pressed.
    pub fn has_super(self) -> bool {
        self.intersects(Self::SUPER)
    }

    /// Returns modifiers that set both left and right flags if any side is set in `self`.
    pub fn ambit(self) -> Self {
        let mut r = Self::empty();
        if self.has_alt() {
            r |= Self::ALT;
        }
        if self.has_ctrl() {
            r |= Self::CTRL;
        }
        if self.has_shift() {
            r |= Self::SHIFT;
        }
        if self.has_super() {
            r |= Self::SUPER;
        }
        r
    }
}
fn write_modifiers(f: &mut fmt::Formatter, modifiers: ModifiersState) -> fmt::Result {
    if modifiers.has_super() {
        write!(f, "Super+")?
    }
    if modifiers.has_ctrl() {
        write!(f, "Ctrl+")?
    }
    if modifiers.has_shift() {
        write!(f, "Shift+")?
    }
    if modifiers.has_alt() {
        write!(f, "Alt+")?
    }
    Ok(())
}

/// Mouse actions that can be used in a gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MouseAction {
    /// Left button click.
    LeftClick,
    /// Right button click.
    RightClick,
    /// Middle button click.
    MiddleClick,
    /// Wheel rotation.
    WheelClick,
    /// Left button double click.
    LeftDoubleClick,
    /// Right button double click.
    RightDoubleClick,
    /// Middle button double click.
    MiddleDoubleClick,
}

/// Raw device input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// Key press.
    Key {
        /// Modifiers pressed with the key.
        modifiers: ModifiersState,
        /// The key.
        key: Key,
    },
    /// Mouse action.
    Mouse {
        /// Modifiers pressed during the action.
        modifiers: ModifiersState,
        /// The action.
        action: MouseAction,
    },
}

/// Input event resolved by the command dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRecord {
    /// The input.
    pub input: InputKind,
    /// If the input was generated by the user, not synthesized by code.
    pub user_initiated: bool,
}
impl InputRecord {
    /// New user initiated key input.
    pub fn key(modifiers: ModifiersState, key: impl Into<Key>) -> Self {
        InputRecord {
            input: InputKind::Key {
                modifiers,
                key: key.into(),
            },
            user_initiated: true,
        }
    }

    /// New user initiated mouse input.
    pub fn mouse(modifiers: ModifiersState, action: MouseAction) -> Self {
        InputRecord {
            input: InputKind::Mouse { modifiers, action },
            user_initiated: true,
        }
    }

    /// Mark the input as synthesized by code.
    pub fn synthetic(mut self) -> Self {
        self.user_initiated = false;
        self
    }
}

/// Predicate over input records.
///
/// Gestures are matched in the context of the element that received the input.
pub trait InputGesture: fmt::Debug + Send + Sync + 'static {
    /// If the `input` on `target` matches the gesture.
    fn matches(&self, target: ElementId, input: &InputRecord) -> bool;
}

/// A keyboard combination.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct KeyGesture {
    /// The key modifiers.
    ///
    /// Matches the [`ambit`] modifiers, so a `L_CTRL` gesture matches a `R_CTRL` press.
    ///
    /// [`ambit`]: ModifiersState::ambit
    pub modifiers: ModifiersState,
    /// The key.
    pub key: Key,
}
impl PartialEq for KeyGesture {
    fn eq(&self, other: &Self) -> bool {
        self.modifiers.ambit() == other.modifiers.ambit() && self.key == other.key
    }
}
impl Eq for KeyGesture {}
impl std::hash::Hash for KeyGesture {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.modifiers.ambit().hash(state);
        self.key.hash(state);
    }
}
impl KeyGesture {
    /// New from modifiers and key.
    pub fn new(modifiers: ModifiersState, key: impl Into<Key>) -> Self {
        KeyGesture {
            modifiers,
            key: key.into(),
        }
    }

    /// New key gesture without modifiers.
    pub fn new_key(key: impl Into<Key>) -> Self {
        Self::new(ModifiersState::empty(), key)
    }
}
impl InputGesture for KeyGesture {
    fn matches(&self, _: ElementId, input: &InputRecord) -> bool {
        match &input.input {
            InputKind::Key { modifiers, key } => self.modifiers.ambit() == modifiers.ambit() && &self.key == key,
            InputKind::Mouse { .. } => false,
        }
    }
}
impl fmt::Debug for KeyGesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("KeyGesture")
                .field("modifiers", &self.modifiers)
                .field("key", &self.key)
                .finish()
        } else {
            write!(f, "{self}")
        }
    }
}
impl fmt::Display for KeyGesture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_modifiers(f, self.modifiers)?;
        write!(f, "{}", self.key)
    }
}

/// A mouse action with modifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MouseGesture {
    /// The key modifiers.
    pub modifiers: ModifiersState,
    /// The mouse action.
    pub action: MouseAction,
}
impl MouseGesture {
    /// New from modifiers and action.
    pub fn new(modifiers: ModifiersState, action: MouseAction) -> Self {
        MouseGesture { modifiers, action }
    }
}
impl InputGesture for MouseGesture {
    fn matches(&self, _: ElementId, input: &InputRecord) -> bool {
        match &input.input {
            InputKind::Mouse { modifiers, action } => self.modifiers.ambit() == modifiers.ambit() && self.action == *action,
            InputKind::Key { .. } => false,
        }
    }
}
impl fmt::Debug for MouseGesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
impl fmt::Display for MouseGesture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_modifiers(f, self.modifiers)?;
        write!(f, "{:?}", self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_case_insensitive() {
        assert_eq!(Key::Char('c'), Key::Char('C'));
        assert_eq!(Key::Str("Abc".into()), Key::Str("aBC".into()));
        assert_ne!(Key::Char('c'), Key::Char('x'));
        assert_ne!(Key::F1, Key::F2);
        assert_eq!(Key::Escape, Key::Escape);
    }

    #[test]
    fn key_gesture_matches_ambit() {
        let target = ElementId::new_unique();
        let gesture = KeyGesture::new(ModifiersState::CTRL, 'C');
        assert!(gesture.matches(target, &InputRecord::key(ModifiersState::L_CTRL, 'c')));
        assert!(gesture.matches(target, &InputRecord::key(ModifiersState::R_CTRL, 'C')));
        assert!(!gesture.matches(target, &InputRecord::key(ModifiersState::CTRL | ModifiersState::SHIFT, 'c')));
        assert!(!gesture.matches(target, &InputRecord::key(ModifiersState::empty(), 'c')));
        assert!(!gesture.matches(target, &InputRecord::mouse(ModifiersState::CTRL, MouseAction::LeftClick)));
    }

    #[test]
    fn mouse_gesture() {
        let target = ElementId::new_unique();
        let gesture = MouseGesture::new(ModifiersState::SHIFT, MouseAction::RightClick);
        assert!(gesture.matches(target, &InputRecord::mouse(ModifiersState::R_SHIFT, MouseAction::RightClick)));
        assert!(!gesture.matches(target, &InputRecord::mouse(ModifiersState::SHIFT, MouseAction::LeftClick)));
    }

    #[test]
    fn serialize() {
        let modifiers = ModifiersState::CTRL | ModifiersState::L_SHIFT;
        let json = serde_json::to_string(&modifiers).unwrap();
        assert_eq!(serde_json::from_str::<ModifiersState>(&json).unwrap(), modifiers);

        let gesture = KeyGesture::new(modifiers, 's');
        let json = serde_json::to_string(&gesture).unwrap();
        let back: KeyGesture = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gesture);
        assert_eq!(back.modifiers, modifiers);

        let gesture = KeyGesture::new_key(Key::MediaPlayPause);
        let back: KeyGesture = serde_json::from_str(&serde_json::to_string(&gesture).unwrap()).unwrap();
        assert_eq!(back, gesture);

        assert_eq!(serde_json::to_string(&MouseAction::LeftClick).unwrap(), "\"LeftClick\"");
        let gesture = MouseGesture::new(ModifiersState::ALT, MouseAction::MiddleDoubleClick);
        let back: MouseGesture = serde_json::from_str(&serde_json::to_string(&gesture).unwrap()).unwrap();
        assert_eq!(back, gesture);
    }

    #[test]
    fn display() {
        assert_eq!(KeyGesture::new(ModifiersState::CTRL | ModifiersState::SHIFT, 's').to_string(), "Ctrl+Shift+S");
        assert_eq!(KeyGesture::new_key(Key::F1).to_string(), "F1");
        assert_eq!(MouseGesture::new(ModifiersState::ALT, MouseAction::LeftClick).to_string(), "Alt+LeftClick");
    }
}

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{Command, CommandError, InputGesture, Key, KeyGesture, ModifiersState as M};

/// Fixed size table of lazily created commands, indexed by id.
struct CommandTable<const N: usize>([OnceCell<Command>; N]);
impl<const N: usize> CommandTable<N> {
    const fn new() -> Self {
        CommandTable([const { OnceCell::new() }; N])
    }

    fn get_or_init(&self, index: usize, init: impl FnOnce() -> Command) -> Command {
        self.0[index].get_or_init(init).clone()
    }
}

fn key(modifiers: M, key: impl Into<Key>) -> Arc<dyn InputGesture> {
    Arc::new(KeyGesture::new(modifiers, key))
}

macro_rules! command_library {
    (
        $(#[$attr:meta])*
        pub struct $Lib:ident: $Id:ident {
            $(
                $(#[$cattr:meta])*
                $Name:ident $(= [$($gesture:expr),+ $(,)?])?,
            )+
        }
    ) => {
        #[doc = concat!("Ids of the [`", stringify!($Lib), "`] commands.")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $Id {
            $(
                $(#[$cattr])*
                $Name,
            )+
        }
        impl $Id {
            /// All ids, in id order.
            pub const ALL: &'static [$Id] = &[$($Id::$Name),+];

            /// Command name.
            pub fn name(self) -> &'static str {
                match self {
                    $($Id::$Name => stringify!($Name),)+
                }
            }

            /// Id value.
            pub fn index(self) -> usize {
                self as usize
            }

            fn default_gestures(self) -> Vec<Arc<dyn InputGesture>> {
                match self {
                    $($Id::$Name => vec![$($($gesture),+)?],)+
                }
            }
        }

        $(#[$attr])*
        pub struct $Lib;
        #[allow(clippy::new_ret_no_self)]
        impl $Lib {
            /// Owner tag of the library commands.
            pub const OWNER: &'static str = stringify!($Lib);
            /// Number of commands in the library.
            pub const LEN: usize = $Id::ALL.len();

            /// Get the command, it is created on the first request.
            pub fn command(id: $Id) -> Command {
                static TABLE: CommandTable<{ $Id::ALL.len() }> = CommandTable::new();
                TABLE.get_or_init(id.index(), || {
                    Command::builder(id.name(), Self::OWNER)
                        .gestures(move || id.default_gestures())
                        .build_with_id(id.index())
                })
            }

            /// Get the command by id value.
            pub fn get(id: usize) -> Result<Command, CommandError> {
                match $Id::ALL.get(id) {
                    Some(id) => Ok(Self::command(*id)),
                    None => {
                        tracing::error!("command id `{id}` out of range for `{}`", Self::OWNER);
                        Err(CommandError::IdOutOfRange {
                            owner: Self::OWNER,
                            id,
                            len: Self::LEN,
                        })
                    }
                }
            }

            paste::paste! {
                $(
                    $(#[$cattr])*
                    pub fn [<$Name:snake>]() -> Command {
                        Self::command($Id::$Name)
                    }
                )+
            }
        }
    };
}

command_library! {
    /// Standard application commands.
    ///
    /// Each command is created on first use and lives for the duration of the process, default gestures
    /// are loaded on the first gesture query.
    pub struct ApplicationCommands: ApplicationCommandId {
        /// Cut the selection to the clipboard.
        Cut = [key(M::CTRL, 'X'), key(M::SHIFT, Key::Delete)],
        /// Copy the selection to the clipboard.
        Copy = [key(M::CTRL, 'C'), key(M::CTRL, Key::Insert)],
        /// Paste the clipboard.
        Paste = [key(M::CTRL, 'V'), key(M::SHIFT, Key::Insert)],
        /// Delete the selection.
        Delete = [key(M::empty(), Key::Delete)],
        /// Undo the last action.
        Undo = [key(M::CTRL, 'Z'), key(M::ALT, Key::Backspace)],
        /// Redo the last undone action.
        Redo = [key(M::CTRL, 'Y'), key(M::CTRL | M::SHIFT, 'Z')],
        /// Find text.
        Find = [key(M::CTRL, 'F')],
        /// Find and replace text.
        Replace = [key(M::CTRL, 'H')],
        /// Select all content.
        SelectAll = [key(M::CTRL, 'A')],
        /// Open help.
        Help = [key(M::empty(), Key::F1)],
        /// New document.
        New = [key(M::CTRL, 'N')],
        /// Open document.
        Open = [key(M::CTRL, 'O')],
        /// Save document.
        Save = [key(M::CTRL, 'S')],
        /// Save document with a new name.
        SaveAs,
        /// Close document.
        Close,
        /// Print document.
        Print = [key(M::CTRL, 'P')],
        /// Show properties.
        Properties = [key(M::empty(), Key::F4)],
        /// Open the context menu.
        ContextMenu = [key(M::SHIFT, Key::F10), key(M::empty(), Key::ContextMenu)],
        /// Open the spelling correction list.
        CorrectionList,
        /// Stop the current operation.
        Stop = [key(M::empty(), Key::Escape)],
        /// Command that does nothing.
        ///
        /// Bind a gesture to this command to disable a default binding, the input is not consumed and continues
        /// to the parent element.
        NotACommand,
    }
}

command_library! {
    /// Standard media commands.
    pub struct MediaCommands: MediaCommandId {
        /// Start playback.
        Play = [key(M::empty(), Key::MediaPlay)],
        /// Pause playback.
        Pause = [key(M::empty(), Key::MediaPause)],
        /// Stop playback.
        Stop = [key(M::empty(), Key::MediaStop)],
        /// Start recording.
        Record = [key(M::empty(), Key::MediaRecord)],
        /// Go to next track.
        NextTrack = [key(M::empty(), Key::MediaTrackNext)],
        /// Go to previous track.
        PreviousTrack = [key(M::empty(), Key::MediaTrackPrevious)],
        /// Toggle between play and pause.
        TogglePlayPause = [key(M::empty(), Key::MediaPlayPause)],
        /// Increase volume.
        IncreaseVolume = [key(M::empty(), Key::AudioVolumeUp)],
        /// Decrease volume.
        DecreaseVolume = [key(M::empty(), Key::AudioVolumeDown)],
        /// Toggle mute.
        MuteVolume = [key(M::empty(), Key::AudioVolumeMute)],
    }
}

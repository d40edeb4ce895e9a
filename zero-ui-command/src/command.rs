use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use zero_ui_weak_event::{Liveness, LivenessKey, RequerySignal};

use crate::{ApplicationCommands, CommandError, ElementId, InputGesture, InputGestureCollection, InputRecord, MediaCommands};

type GestureLoader = Box<dyn FnOnce() -> Vec<Arc<dyn InputGesture>> + Send>;
type DefaultCanExecute = Arc<dyn Fn(Option<&CommandParam>) -> bool + Send + Sync>;

struct CommandData {
    name: String,
    owner: &'static str,
    id: usize,
    text: Option<String>,
    default_can_execute: Option<DefaultCanExecute>,
    gestures: RwLock<InputGestureCollection>,
    gesture_loader: Mutex<Option<GestureLoader>>,
}

/// Identifies a routed command.
///
/// A command represents an user intent, like *copy* or *play*, it does not implement the intent, elements
/// declare [`CommandBinding`] handlers for it and the [`CommandManager`] routes the command to them. Input
/// gestures are bound to commands using [`InputBinding`] or the command default [`gestures`].
///
/// Commands are cheap to clone and compare by identity, two commands with the same name are different commands.
/// Well known commands are provided by [`ApplicationCommands`] and [`MediaCommands`].
///
/// [`CommandBinding`]: crate::CommandBinding
/// [`CommandManager`]: crate::CommandManager
/// [`InputBinding`]: crate::InputBinding
/// [`gestures`]: Self::with_gestures
#[derive(Clone)]
pub struct Command(Arc<CommandData>);
impl Command {
    /// New command with an id allocated in the `owner` scope.
    pub fn new(name: impl Into<String>, owner: &'static str) -> Result<Command, CommandError> {
        Self::builder(name, owner).build()
    }

    /// Command builder.
    pub fn builder(name: impl Into<String>, owner: &'static str) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            owner,
            text: None,
            default_can_execute: None,
            gesture_loader: None,
        }
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Tag of the type that declares the command.
    pub fn owner(&self) -> &'static str {
        self.0.owner
    }

    /// Id of the command, unique in the [`owner`] scope.
    ///
    /// [`owner`]: Self::owner
    pub fn id(&self) -> usize {
        self.0.id
    }

    /// Display text.
    ///
    /// Is the text set on build or a title derived from the name, `"SelectAll"` is `"Select All"`.
    pub fn text(&self) -> String {
        match &self.0.text {
            Some(t) => t.clone(),
            None => title_from_name(&self.0.name),
        }
    }

    /// Visit the command input gestures.
    ///
    /// Default gestures are loaded on the first call. The gestures are shared by all clones of the command and
    /// can be modified unless sealed.
    ///
    /// The gestures are locked while `visit` runs, it must not access the gestures of the same command.
    pub fn with_gestures<R>(&self, visit: impl FnOnce(&mut InputGestureCollection) -> R) -> R {
        self.load_gestures();
        visit(&mut self.0.gestures.write())
    }

    /// If any command gesture matches the `input`.
    pub fn gestures_match(&self, target: ElementId, input: &InputRecord) -> bool {
        self.load_gestures();
        let gestures: Vec<_> = self.0.gestures.read().iter().cloned().collect();
        gestures.iter().any(|g| g.matches(target, input))
    }

    fn load_gestures(&self) {
        // the loader runs without any lock held
        let Some(loader) = self.0.gesture_loader.lock().take() else {
            return;
        };
        let gestures = loader();
        tracing::trace!("loaded {} default gestures for {self:?}", gestures.len());
        self.0.gestures.write().prepend(gestures);
    }

    /// Command answer when no element handles the can-execute notification.
    ///
    /// Is `false` if the command has no default predicate.
    pub fn default_can_execute(&self, param: Option<&CommandParam>) -> bool {
        match &self.0.default_can_execute {
            Some(p) => p(param),
            None => false,
        }
    }

    /// If the command has a default can-execute predicate.
    pub fn has_default_can_execute(&self) -> bool {
        self.0.default_can_execute.is_some()
    }

    /// Identity of the command in weak event tables.
    pub fn key(&self) -> LivenessKey {
        LivenessKey::of_ref(&*self.0)
    }

    /// Weak reference to the command.
    pub fn liveness(&self) -> Liveness {
        Liveness::of(&self.0)
    }

    /// If this is the [`ApplicationCommands::not_a_command`] sentinel.
    pub fn is_not_a_command(&self) -> bool {
        *self == ApplicationCommands::not_a_command()
    }
}
impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Command {}
impl std::hash::Hash for Command {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state)
    }
}
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("Command")
                .field("name", &self.0.name)
                .field("owner", &self.0.owner)
                .field("id", &self.0.id)
                .finish_non_exhaustive()
        } else {
            write!(f, "{}::{}", self.0.owner, self.0.name)
        }
    }
}

/// Builds a [`Command`].
pub struct CommandBuilder {
    name: String,
    owner: &'static str,
    text: Option<String>,
    default_can_execute: Option<DefaultCanExecute>,
    gesture_loader: Option<GestureLoader>,
}
impl CommandBuilder {
    /// Set the display text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the answer for can-execute queries no element handles.
    pub fn default_can_execute(mut self, predicate: impl Fn(Option<&CommandParam>) -> bool + Send + Sync + 'static) -> Self {
        self.default_can_execute = Some(Arc::new(predicate));
        self
    }

    /// Set a loader for the default gestures, it is called on the first gesture query.
    pub fn gestures(mut self, loader: impl FnOnce() -> Vec<Arc<dyn InputGesture>> + Send + 'static) -> Self {
        self.gesture_loader = Some(Box::new(loader));
        self
    }

    /// Build the command, allocates the next id of the owner.
    pub fn build(self) -> Result<Command, CommandError> {
        if self.name.is_empty() {
            return Err(CommandError::EmptyName);
        }
        let id = next_id(self.owner);
        Ok(self.build_with_id(id))
    }

    pub(crate) fn build_with_id(self, id: usize) -> Command {
        Command(Arc::new(CommandData {
            name: self.name,
            owner: self.owner,
            id,
            text: self.text,
            default_can_execute: self.default_can_execute,
            gestures: RwLock::new(InputGestureCollection::new()),
            gesture_loader: Mutex::new(self.gesture_loader),
        }))
    }
}

fn next_id(owner: &'static str) -> usize {
    static NEXT_IDS: Lazy<Mutex<HashMap<&'static str, usize>>> = Lazy::new(Default::default);

    let mut ids = NEXT_IDS.lock();
    let next = ids.entry(owner).or_insert_with(|| {
        // library ids are reserved
        if owner == ApplicationCommands::OWNER {
            ApplicationCommands::LEN
        } else if owner == MediaCommands::OWNER {
            MediaCommands::LEN
        } else {
            0
        }
    });
    let id = *next;
    *next += 1;
    id
}

fn title_from_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut r = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || (prev.is_uppercase() && next_lower) {
                r.push(' ');
            }
        }
        r.push(*c);
    }
    r
}

/// Represents a reference counted `dyn Any` object.
#[derive(Clone)]
pub struct CommandParam(pub Arc<dyn Any + Send + Sync>);
impl CommandParam {
    /// New param.
    pub fn new(param: impl Any + Send + Sync + 'static) -> Self {
        CommandParam(Arc::new(param))
    }

    /// Gets the [`TypeId`] of the parameter.
    pub fn type_id(&self) -> TypeId {
        (*self.0).type_id()
    }

    /// Gets a typed reference to the parameter if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Returns `true` if the parameter type is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}
impl fmt::Debug for CommandParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandParam").field(&self.type_id()).finish()
    }
}

/// A command that is not routed, it implements the intent itself.
///
/// Input bindings can bind custom commands, the dispatcher calls [`can_execute`] and [`execute`] directly.
///
/// [`can_execute`]: CustomCommand::can_execute
/// [`execute`]: CustomCommand::execute
pub trait CustomCommand: Send + Sync + 'static {
    /// If the command can execute with the parameter.
    fn can_execute(&self, param: Option<&CommandParam>) -> bool;

    /// Execute the command.
    fn execute(&self, param: Option<&CommandParam>);

    /// Signal the command raises when [`can_execute`] may have changed.
    ///
    /// Commands without own signal delegate to the context requery resender.
    ///
    /// [`can_execute`]: CustomCommand::can_execute
    fn requery_signal(&self) -> Option<&RequerySignal> {
        None
    }
}

/// Command bound by an input binding.
#[derive(Clone)]
pub enum BoundCommand {
    /// Command routed in the element tree.
    Routed(Command),
    /// Command that executes itself.
    Custom(Arc<dyn CustomCommand>),
}
impl BoundCommand {
    /// Routed command.
    pub fn routed(&self) -> Option<&Command> {
        match self {
            BoundCommand::Routed(c) => Some(c),
            BoundCommand::Custom(_) => None,
        }
    }

    /// Identity of the command in weak event tables.
    pub fn key(&self) -> LivenessKey {
        match self {
            BoundCommand::Routed(c) => c.key(),
            BoundCommand::Custom(c) => LivenessKey::of_ref(&**c),
        }
    }

    /// Weak reference to the command.
    pub fn liveness(&self) -> Liveness {
        match self {
            BoundCommand::Routed(c) => c.liveness(),
            BoundCommand::Custom(c) => Liveness::of(c),
        }
    }
}
impl From<Command> for BoundCommand {
    fn from(c: Command) -> Self {
        BoundCommand::Routed(c)
    }
}
impl From<Arc<dyn CustomCommand>> for BoundCommand {
    fn from(c: Arc<dyn CustomCommand>) -> Self {
        BoundCommand::Custom(c)
    }
}
impl PartialEq for BoundCommand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Routed(a), Self::Routed(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl fmt::Debug for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundCommand::Routed(c) => fmt::Debug::fmt(c, f),
            BoundCommand::Custom(c) => write!(f, "Custom({:p})", Arc::as_ptr(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyGesture, ModifiersState};

    #[test]
    fn identity_and_ids() {
        let a = Command::new("Frobnicate", "tests::identity").unwrap();
        let b = Command::new("Frobnicate", "tests::identity").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.id() + 1, b.id());
        assert_eq!(Command::new("", "tests::identity").map(|_| ()), Err(CommandError::EmptyName));
    }

    #[test]
    fn library_owner_ids_reserved() {
        let custom = Command::new("Custom", ApplicationCommands::OWNER).unwrap();
        assert!(custom.id() >= ApplicationCommands::LEN);
    }

    #[test]
    fn text() {
        assert_eq!(title_from_name("SelectAll"), "Select All");
        assert_eq!(title_from_name("NotACommand"), "Not A Command");
        assert_eq!(title_from_name("Copy"), "Copy");

        let cmd = Command::builder("SaveAs", "tests::text").text("Save As...").build().unwrap();
        assert_eq!(cmd.text(), "Save As...");
    }

    #[test]
    fn lazy_gestures() {
        let cmd = Command::builder("Frob", "tests::gestures")
            .gestures(|| vec![Arc::new(KeyGesture::new(ModifiersState::CTRL, 'F')) as Arc<dyn InputGesture>])
            .build()
            .unwrap();
        let target = ElementId::new_unique();

        assert!(cmd.gestures_match(target, &InputRecord::key(ModifiersState::CTRL, 'f')));
        cmd.with_gestures(|g| g.add_gesture(KeyGesture::new_key(crate::Key::F9))).unwrap();
        assert!(cmd.gestures_match(target, &InputRecord::key(ModifiersState::empty(), crate::Key::F9)));
        assert_eq!(cmd.with_gestures(|g| g.len()), 2);
    }

    #[test]
    fn gestures_can_reenter() {
        let slot = Arc::new(Mutex::new(None::<Command>));
        let s = slot.clone();
        let cmd = Command::builder("Reenter", "tests::gestures")
            .gestures(move || {
                // loading again from the loader sees no gestures yet
                let cmd = s.lock().clone().unwrap();
                assert!(!cmd.gestures_match(ElementId::new_unique(), &InputRecord::key(ModifiersState::CTRL, 'r')));
                vec![Arc::new(KeyGesture::new(ModifiersState::CTRL, 'R')) as Arc<dyn InputGesture>]
            })
            .build()
            .unwrap();
        *slot.lock() = Some(cmd.clone());

        #[derive(Debug)]
        struct CountsGestures(Command);
        impl InputGesture for CountsGestures {
            fn matches(&self, _: ElementId, _: &InputRecord) -> bool {
                self.0.with_gestures(|g| g.len()) == 2
            }
        }
        cmd.with_gestures(|g| g.add_gesture(CountsGestures(cmd.clone()))).unwrap();

        let target = ElementId::new_unique();
        assert!(cmd.gestures_match(target, &InputRecord::key(ModifiersState::CTRL, 'r')));
        // the custom gesture reads the gestures of its own command while matching
        assert!(cmd.gestures_match(target, &InputRecord::key(ModifiersState::empty(), crate::Key::F12)));
        assert_eq!(cmd.with_gestures(|g| g.len()), 2);
    }

    #[test]
    fn default_can_execute() {
        let plain = Command::new("Plain", "tests::default").unwrap();
        assert!(!plain.default_can_execute(None));

        let even = Command::builder("Even", "tests::default")
            .default_can_execute(|p| p.and_then(|p| p.downcast_ref::<u32>()).map(|n| n % 2 == 0).unwrap_or(false))
            .build()
            .unwrap();
        assert!(even.default_can_execute(Some(&CommandParam::new(2u32))));
        assert!(!even.default_can_execute(Some(&CommandParam::new(3u32))));
    }

    #[test]
    fn param() {
        let p = CommandParam::new(10i32);
        assert!(p.is::<i32>());
        assert_eq!(p.type_id(), TypeId::of::<i32>());
        assert_eq!(p.downcast_ref::<i32>(), Some(&10));
        assert!(p.downcast_ref::<u8>().is_none());
    }
}

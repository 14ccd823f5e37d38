//! Texture lifecycle notifications
//!
//! The store reports every load, unload, cancellation, failure and
//! invalidation through an [`Emitter`]. Listeners register for one
//! [`TextureEventKind`] or for all of them and are removed by the
//! [`ListenerId`] returned at registration.

use panoview_scheduler::LoadError;

/// A notification about one tile's texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureEvent<T> {
    /// A load pipeline was started for the tile
    StartLoad(T),
    /// The tile's texture is ready
    Load(T),
    /// A loaded (or failed) tile was evicted
    Unload(T),
    /// The tile's dynamic asset changed and its texture must be refreshed
    Invalid(T),
    /// An in-flight load was cancelled
    Cancel(T),
    /// The load failed after exhausting its attempts
    Error { tile: T, error: LoadError },
}

impl<T> TextureEvent<T> {
    /// The kind of this event
    pub fn kind(&self) -> TextureEventKind {
        match self {
            TextureEvent::StartLoad(_) => TextureEventKind::StartLoad,
            TextureEvent::Load(_) => TextureEventKind::Load,
            TextureEvent::Unload(_) => TextureEventKind::Unload,
            TextureEvent::Invalid(_) => TextureEventKind::Invalid,
            TextureEvent::Cancel(_) => TextureEventKind::Cancel,
            TextureEvent::Error { .. } => TextureEventKind::Error,
        }
    }

    /// The tile this event is about
    pub fn tile(&self) -> &T {
        match self {
            TextureEvent::StartLoad(tile)
            | TextureEvent::Load(tile)
            | TextureEvent::Unload(tile)
            | TextureEvent::Invalid(tile)
            | TextureEvent::Cancel(tile)
            | TextureEvent::Error { tile, .. } => tile,
        }
    }
}

/// Discriminant of a [`TextureEvent`], used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureEventKind {
    StartLoad,
    Load,
    Unload,
    Invalid,
    Cancel,
    Error,
}

impl TextureEventKind {
    /// Event name as seen by renderers
    pub fn name(&self) -> &'static str {
        match self {
            TextureEventKind::StartLoad => "textureStartLoad",
            TextureEventKind::Load => "textureLoad",
            TextureEventKind::Unload => "textureUnload",
            TextureEventKind::Invalid => "textureInvalid",
            TextureEventKind::Cancel => "textureCancel",
            TextureEventKind::Error => "textureError",
        }
    }
}

impl std::fmt::Display for TextureEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Box<dyn FnMut(&TextureEvent<T>)>;

struct Registration<T> {
    id: ListenerId,
    kind: Option<TextureEventKind>,
    listener: Listener<T>,
}

/// Receiver of texture events
///
/// Implemented by [`Emitter`]; the store wraps its emitter to keep
/// statistics alongside delivery.
pub trait EventSink<T> {
    /// Deliver `event`
    fn notify(&mut self, event: TextureEvent<T>);
}

/// Listener registry dispatching [`TextureEvent`]s
///
/// Listeners run synchronously in registration order.
pub struct Emitter<T> {
    registrations: Vec<Registration<T>>,
    next_id: u64,
}

impl<T> Emitter<T> {
    /// Create an emitter with no listeners
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            next_id: 0,
        }
    }

    fn register(&mut self, kind: Option<TextureEventKind>, listener: Listener<T>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.registrations.push(Registration { id, kind, listener });
        id
    }

    /// Register `listener` for events of `kind`
    pub fn add_listener<F>(&mut self, kind: TextureEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&TextureEvent<T>) + 'static,
    {
        self.register(Some(kind), Box::new(listener))
    }

    /// Register `listener` for every event
    pub fn add_listener_all<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TextureEvent<T>) + 'static,
    {
        self.register(None, Box::new(listener))
    }

    /// Unregister a listener, returning false if it was not registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|registration| registration.id != id);
        self.registrations.len() != before
    }

    /// Deliver `event` to every interested listener
    pub fn emit(&mut self, event: &TextureEvent<T>) {
        let kind = event.kind();
        for registration in &mut self.registrations {
            if registration.kind.map_or(true, |k| k == kind) {
                (registration.listener)(event);
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.registrations.len()
    }

    /// Remove every listener
    pub fn clear(&mut self) {
        self.registrations.clear();
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.registrations.len())
            .finish()
    }
}

impl<T> EventSink<T> for Emitter<T> {
    fn notify(&mut self, event: TextureEvent<T>) {
        self.emit(&event);
    }
}

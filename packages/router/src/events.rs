//! Navigation lifecycle notifications.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use slab::Slab;
use tracing::trace;

use crate::{error::LoadError, state::NavigationMode};

/// The kinds of [`RouterEvent`]s, for filtered subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`RouterEvent::Navigating`].
    Navigating,
    /// See [`RouterEvent::Rendering`].
    Rendering,
    /// See [`RouterEvent::Rendered`].
    Rendered,
    /// See [`RouterEvent::InitialLocaleCode`].
    InitialLocaleCode,
    /// See [`RouterEvent::LocaleCodeChanging`].
    LocaleCodeChanging,
    /// See [`RouterEvent::LocaleChanged`].
    LocaleChanged,
    /// See [`RouterEvent::LoadFailed`].
    LoadFailed,
}

impl EventKind {
    /// The event's conventional name, e.g. `localeCodeChanging`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Navigating => "navigating",
            Self::Rendering => "rendering",
            Self::Rendered => "rendered",
            Self::InitialLocaleCode => "initialLocaleCode",
            Self::LocaleCodeChanging => "localeCodeChanging",
            Self::LocaleChanged => "localeChanged",
            Self::LoadFailed => "loadFailed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A notification about the router's progress.
///
/// For every transition, [`Navigating`](Self::Navigating) precedes
/// [`Rendering`](Self::Rendering), which precedes [`Rendered`](Self::Rendered). Locale events
/// bracket the locale swap and are emitted before the transition's `Navigating`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterEvent {
    /// A transition started.
    Navigating {
        /// The app-relative route being navigated to.
        route: String,
        /// Why the transition happens.
        mode: NavigationMode,
        /// The route active before the transition.
        previous_route: String,
    },
    /// A route is about to be painted. The output is available through
    /// [`Navigator::output`](crate::navigator::Navigator::output).
    Rendering {
        /// The app-relative route.
        route: String,
        /// Why the transition happened.
        mode: NavigationMode,
    },
    /// A route was painted.
    Rendered {
        /// The app-relative route.
        route: String,
        /// Why the transition happened.
        mode: NavigationMode,
    },
    /// The first locale segment of the session was seen. Emitted at most once.
    InitialLocaleCode {
        /// The detected locale.
        locale: String,
    },
    /// The locale is about to change.
    LocaleCodeChanging {
        /// The new locale.
        locale: String,
        /// The locale still active.
        previous: String,
    },
    /// The locale changed.
    LocaleChanged {
        /// The new, now active, locale.
        locale: String,
        /// The locale active before.
        previous: String,
    },
    /// Loading the code of a route failed. The not found behavior follows.
    LoadFailed {
        /// The app-relative route that could not be loaded.
        route: String,
        /// The failure.
        error: LoadError,
    },
}

impl RouterEvent {
    /// The event's kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Navigating { .. } => EventKind::Navigating,
            Self::Rendering { .. } => EventKind::Rendering,
            Self::Rendered { .. } => EventKind::Rendered,
            Self::InitialLocaleCode { .. } => EventKind::InitialLocaleCode,
            Self::LocaleCodeChanging { .. } => EventKind::LocaleCodeChanging,
            Self::LocaleChanged { .. } => EventKind::LocaleChanged,
            Self::LoadFailed { .. } => EventKind::LoadFailed,
        }
    }
}

struct Listener {
    kind: Option<EventKind>,
    callback: RefCell<Box<dyn FnMut(&RouterEvent)>>,
}

type Listeners = RefCell<Slab<Rc<Listener>>>;

/// An ordered publish/subscribe channel for [`RouterEvent`]s.
///
/// Listeners are called in subscription order. Subscribing and unsubscribing is allowed from
/// within a listener: listeners added during a dispatch first see the next event, and listeners
/// removed during a dispatch are not called anymore.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Rc<Listeners>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventBus {
    /// Call `callback` for every event of `kind`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: impl FnMut(&RouterEvent) + 'static,
    ) -> Subscription {
        self.insert(Some(kind), Box::new(callback))
    }

    /// Call `callback` for every event.
    pub fn subscribe_all(&self, callback: impl FnMut(&RouterEvent) + 'static) -> Subscription {
        self.insert(None, Box::new(callback))
    }

    /// The number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Whether nobody listens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Deliver `event` to every interested listener.
    pub fn emit(&self, event: &RouterEvent) {
        trace!(event = %event.kind(), "emitting");

        let snapshot: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|(key, listener)| (key, listener.clone()))
            .collect();

        for (key, listener) in snapshot {
            if listener.kind.is_some_and(|kind| kind != event.kind()) {
                continue;
            }

            let subscribed = self
                .listeners
                .borrow()
                .get(key)
                .is_some_and(|current| Rc::ptr_eq(current, &listener));
            if !subscribed {
                continue;
            }

            match listener.callback.try_borrow_mut() {
                Ok(mut callback) => callback(event),
                // the listener emitted an event itself
                Err(_) => trace!(event = %event.kind(), "skipping reentrant listener"),
            }
        }
    }

    fn insert(&self, kind: Option<EventKind>, callback: Box<dyn FnMut(&RouterEvent)>) -> Subscription {
        let listener = Rc::new(Listener {
            kind,
            callback: RefCell::new(callback),
        });
        let key = self.listeners.borrow_mut().insert(listener.clone());

        Subscription {
            key,
            listener: Rc::downgrade(&listener),
            listeners: Rc::downgrade(&self.listeners),
        }
    }
}

/// A handle to a listener registered with an [`EventBus`].
///
/// Dropping the handle keeps the listener subscribed. Call [`Subscription::unsubscribe`] to
/// remove it.
pub struct Subscription {
    key: usize,
    listener: Weak<Listener>,
    listeners: Weak<Listeners>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

impl Subscription {
    /// Remove the listener. Safe to call while an event is being dispatched.
    pub fn unsubscribe(self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };

        let mut listeners = listeners.borrow_mut();
        let owned = listeners
            .get(self.key)
            .is_some_and(|current| std::ptr::eq(Rc::as_ptr(current), self.listener.as_ptr()));
        if owned {
            listeners.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn rendered(route: &str) -> RouterEvent {
        RouterEvent::Rendered {
            route: route.to_string(),
            mode: NavigationMode::Navigation,
        }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = log.clone();
        bus.subscribe_all(move |_| first.borrow_mut().push("first"));
        let second = log.clone();
        bus.subscribe(EventKind::Rendered, move |_| second.borrow_mut().push("second"));
        let third = log.clone();
        bus.subscribe(EventKind::Navigating, move |_| third.borrow_mut().push("third"));

        bus.emit(&rendered("/"));
        assert_eq!(*log.borrow(), ["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let calls = Rc::new(Cell::new(0));

        let counted = calls.clone();
        let subscription = bus.subscribe_all(move |_| counted.set(counted.get() + 1));
        bus.emit(&rendered("/"));
        subscription.unsubscribe();
        bus.emit(&rendered("/"));

        assert_eq!(calls.get(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn unsubscribe_during_dispatch() {
        let bus = EventBus::default();
        let calls = Rc::new(Cell::new(0));
        let handle: Rc<RefCell<Option<Subscription>>> = Rc::default();

        // the first listener removes the second one before it is called
        let to_remove = handle.clone();
        bus.subscribe_all(move |_| {
            if let Some(subscription) = to_remove.borrow_mut().take() {
                subscription.unsubscribe();
            }
        });
        let counted = calls.clone();
        *handle.borrow_mut() = Some(bus.subscribe_all(move |_| counted.set(counted.get() + 1)));

        bus.emit(&rendered("/"));
        bus.emit(&rendered("/"));
        assert_eq!(calls.get(), 0);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn subscribe_during_dispatch() {
        let bus = EventBus::default();
        let calls = Rc::new(Cell::new(0));

        let inner_bus = bus.clone();
        let counted = calls.clone();
        let once = Cell::new(false);
        bus.subscribe_all(move |_| {
            if !once.replace(true) {
                let counted = counted.clone();
                inner_bus.subscribe_all(move |_| counted.set(counted.get() + 1));
            }
        });

        bus.emit(&rendered("/"));
        assert_eq!(calls.get(), 0);
        bus.emit(&rendered("/"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stale_handles_do_not_remove_reused_slots() {
        let bus = EventBus::default();
        let calls = Rc::new(Cell::new(0));

        let first = bus.subscribe_all(|_| {});
        let stale = Subscription {
            key: first.key,
            listener: first.listener.clone(),
            listeners: first.listeners.clone(),
        };
        first.unsubscribe();

        let counted = calls.clone();
        bus.subscribe_all(move |_| counted.set(counted.get() + 1));
        stale.unsubscribe();

        bus.emit(&rendered("/"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn event_names() {
        assert_eq!(EventKind::LocaleCodeChanging.to_string(), "localeCodeChanging");
        assert_eq!(rendered("/").kind(), EventKind::Rendered);
    }
}

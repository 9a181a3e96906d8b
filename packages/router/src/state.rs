use std::fmt;

use crate::{helpers::concat_route, matcher::Params, routes::Layout};

/// Why a transition happens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NavigationMode {
    /// A regular navigation to another path.
    #[default]
    Navigation,
    /// A navigation to the same route in another locale.
    ChangeLocale,
    /// A traversal of the history, through the router or the host (a browser's back button).
    BackForward,
    /// A re-render of the active route.
    Refresh,
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Navigation => "navigation",
            Self::ChangeLocale => "changeLocale",
            Self::BackForward => "backForward",
            Self::Refresh => "refresh",
        })
    }
}

/// Where the navigation controller is in its state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing is happening.
    #[default]
    Idle,
    /// A location was parsed and a route is being looked up.
    Resolving,
    /// Waiting for app or module code.
    LazyLoading,
    /// The output was produced, and the view layer is painting it.
    Rendering,
    /// Nothing matched, and the not found behavior is being applied.
    NotFound,
}

/// The current routing information.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavigationState {
    /// The active locale. Starts as the default locale and only changes when a path carries a
    /// locale segment.
    pub locale: String,

    /// Whether the active path carried a locale segment.
    pub has_locale_prefix: bool,

    /// Whether a locale segment was ever seen during this session.
    pub initial_locale_detected: bool,

    /// The app owning the active route, if any app is registered.
    pub app: Option<String>,

    /// The active app-relative route. Always starts with `/`.
    pub route: String,

    /// The route active before the last external navigation trigger.
    pub previous_route: String,

    /// The parameters of the most recent successful match.
    pub params: Params,

    /// Why the last transition happened.
    pub mode: NavigationMode,

    /// The current query string, if present.
    pub query: Option<String>,

    /// The current fragment, if present.
    pub hash: Option<String>,

    /// Whether the active transition waits for app or module code.
    pub loading: bool,

    /// The controller's phase.
    pub phase: Phase,

    /// Whether there is a prior path to go back to.
    ///
    /// This might be [`true`] even if there isn't.
    pub can_go_back: bool,

    /// Whether there is a later path to forward to.
    ///
    /// This might be [`true`] even if there isn't.
    pub can_go_forward: bool,
}

impl NavigationState {
    /// Checks if `route` is the active app-relative route.
    ///
    /// If `exact` is [`false`], `route` only has to be a prefix of the active route, segment by
    /// segment. The query and fragment are ignored.
    ///
    /// ```rust
    /// # use mosaic_router::state::NavigationState;
    /// let state = NavigationState {
    ///     route: String::from("/users/42"),
    ///     ..Default::default()
    /// };
    /// assert!(state.is_active("/users/42/", true));
    /// assert!(state.is_active("/users", false));
    /// assert!(!state.is_active("/use", false));
    /// ```
    #[must_use]
    pub fn is_active(&self, route: &str, exact: bool) -> bool {
        let route = concat_route([route]);
        if exact || route == self.route {
            return route == self.route;
        }

        route == "/"
            || self
                .route
                .strip_prefix(&route)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// What the view layer should paint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View<T> {
    /// The matched route's own content.
    Page(T),
    /// Content provided by a middleware instead of the route's.
    Guarded(T),
    /// Nothing matched. Contains the configured fallback content, if any.
    NotFound(Option<T>),
}

impl<T> View<T> {
    /// The content to paint, if any.
    #[must_use]
    pub fn content(&self) -> Option<&T> {
        match self {
            Self::Page(content) | Self::Guarded(content) => Some(content),
            Self::NotFound(content) => content.as_ref(),
        }
    }
}

/// The result of a transition, handed to the view layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOutput<T> {
    /// The app-relative route.
    pub route: String,
    /// The compiled path of the matched route. Empty when nothing matched.
    pub compiled_path: String,
    /// The locale the output was produced for.
    pub locale: String,
    /// The app owning the route.
    pub app: Option<String>,
    /// The layout wrapping the view.
    pub layout: Layout<T>,
    /// The content to paint.
    pub view: View<T>,
    /// The parameters captured by the match.
    pub params: Params,
    /// The identity of this render. Changes whenever the view layer must paint from scratch.
    pub key: String,
}

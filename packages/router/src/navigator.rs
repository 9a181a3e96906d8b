use std::{cell::RefCell, rc::Rc};

use futures_channel::mpsc::UnboundedSender;
use tracing::error;

use crate::{
    error::{Result, RouterError},
    events::{EventBus, EventKind, RouterEvent, Subscription},
    location::Locations,
    query::QueryString,
    routes::RouteRegistry,
    service::RouterMessage,
    state::{NavigationMode, NavigationState, RenderOutput},
};

/// A handle to control a [`RouterService`](crate::service::RouterService) and observe its state.
///
/// Cheap to clone. Every method returns immediately: requests are handled the next time the
/// service's event loop runs.
///
/// Paths given to the navigation methods are app-relative and may carry a query string and a
/// fragment. Unless told otherwise, navigation stays in the active app, and keeps the active
/// locale segment if the active path carries one.
pub struct Navigator<T> {
    pub(crate) tx: UnboundedSender<RouterMessage>,
    pub(crate) state: Rc<RefCell<NavigationState>>,
    pub(crate) output: Rc<RefCell<Option<Rc<RenderOutput<T>>>>>,
    pub(crate) events: EventBus,
    pub(crate) routes: RouteRegistry<T>,
    pub(crate) locations: Locations,
}

impl<T> Clone for Navigator<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: self.state.clone(),
            output: self.output.clone(),
            events: self.events.clone(),
            routes: self.routes.clone(),
            locations: self.locations.clone(),
        }
    }
}

impl<T> Navigator<T> {
    /// A snapshot of the current routing information.
    #[must_use]
    pub fn state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    /// The last produced output, if any.
    #[must_use]
    pub fn output(&self) -> Option<Rc<RenderOutput<T>>> {
        self.output.borrow().clone()
    }

    /// The router's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Call `callback` for every event of `kind`. See [`EventBus::subscribe`].
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: impl FnMut(&RouterEvent) + 'static,
    ) -> Subscription {
        self.events.subscribe(kind, callback)
    }

    /// The route registry, for registering routes after startup.
    #[must_use]
    pub fn routes(&self) -> &RouteRegistry<T> {
        &self.routes
    }

    /// The location parser and builder the router uses.
    #[must_use]
    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    /// Checks if `route` is the active app-relative route. See [`NavigationState::is_active`].
    #[must_use]
    pub fn is_active(&self, route: &str, exact: bool) -> bool {
        self.state.borrow().is_active(route, exact)
    }

    /// Prefix `path` with the base path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        self.locations.url(path)
    }

    /// Build the full URL of `path` in `app` and `locale`.
    ///
    /// [`None`] keeps the active app, and the active locale if the active path carries one.
    pub fn href(&self, path: &str, locale: Option<&str>, app: Option<&str>) -> Result<String> {
        if let Some(app) = app {
            self.locations.apps().require(app)?;
        }
        if let Some(locale) = locale {
            self.require_locale(locale)?;
        }
        Ok(self.build(path, locale, app))
    }

    /// Navigate to `path` in the active app.
    pub fn navigate_to(&self, path: &str) {
        let url = self.build(path, None, None);
        self.send(RouterMessage::Push {
            path: url,
            mode: NavigationMode::Navigation,
        });
    }

    /// Navigate to `path` in `app` and `locale`. See [`Navigator::href`].
    pub fn navigate_in(&self, path: &str, locale: Option<&str>, app: Option<&str>) -> Result<()> {
        let url = self.href(path, locale, app)?;
        self.send(RouterMessage::Push {
            path: url,
            mode: NavigationMode::Navigation,
        });
        Ok(())
    }

    /// Navigate to a path relative to the base path, including its locale and app segments.
    pub fn go_to(&self, path: &str) {
        self.send(RouterMessage::Push {
            path: self.locations.url(path),
            mode: NavigationMode::Navigation,
        });
    }

    /// Navigate to the route that was active before the last navigation.
    ///
    /// Unlike [`Navigator::go_back`], this pushes a new history entry.
    pub fn navigate_back(&self) {
        let previous = self.state.borrow().previous_route.clone();
        self.navigate_to(&previous);
    }

    /// Go back a step in the history.
    pub fn go_back(&self) {
        self.send(RouterMessage::GoBack);
    }

    /// Go forward a step in the history.
    pub fn go_forward(&self) {
        self.send(RouterMessage::GoForward);
    }

    /// Render the active location again, with a fresh render key.
    pub fn refresh(&self) {
        self.send(RouterMessage::Refresh);
    }

    /// Show the active route in another locale.
    ///
    /// Fails with [`RouterError::UnknownLocale`] if `code` is not configured.
    pub fn change_locale(&self, code: &str) -> Result<()> {
        self.require_locale(code)?;

        let (path, app) = {
            let state = self.state.borrow();
            (with_query(&state.route, state.query.as_deref()), state.app.clone())
        };
        self.send(RouterMessage::Push {
            path: self.locations.build(&path, Some(code), app.as_deref()),
            mode: NavigationMode::ChangeLocale,
        });
        Ok(())
    }

    /// Replace the current URL with `path` in the active app, without any transition.
    ///
    /// Only the query and fragment of the [`NavigationState`] follow the new URL; the route is not
    /// resolved again.
    pub fn replace_silently(&self, path: &str) {
        let url = self.build(path, None, None);
        self.send(RouterMessage::ReplaceSilently(url));
    }

    /// Load the code `path` of the active app needs, without navigating to it.
    pub fn prefetch(&self, path: &str) {
        let url = self.build(path, None, None);
        self.send(RouterMessage::Prefetch(url));
    }

    /// The active query string.
    #[must_use]
    pub fn query(&self) -> QueryString {
        self.state
            .borrow()
            .query
            .as_deref()
            .map(QueryString::parse)
            .unwrap_or_default()
    }

    /// The active fragment.
    #[must_use]
    pub fn hash(&self) -> Option<String> {
        self.state.borrow().hash.clone()
    }

    /// Set the query string of the active route.
    ///
    /// If `navigate` is [`true`], this is a regular navigation. Otherwise, the URL is replaced
    /// silently.
    pub fn update_query(&self, query: &QueryString, navigate: bool) {
        let route = self.state.borrow().route.clone();
        let query = query.to_string();
        let path = with_query(&route, Some(query.as_str()).filter(|q| !q.is_empty()));

        if navigate {
            self.navigate_to(&path);
        } else {
            self.replace_silently(&path);
        }
    }

    fn require_locale(&self, locale: &str) -> Result<()> {
        if self.locations.locale_codes().iter().any(|code| code == locale) {
            Ok(())
        } else {
            Err(RouterError::UnknownLocale(locale.to_string()))
        }
    }

    fn build(&self, path: &str, locale: Option<&str>, app: Option<&str>) -> String {
        let state = self.state.borrow();
        let locale = locale.or_else(|| state.has_locale_prefix.then_some(state.locale.as_str()));
        let app = app.or(state.app.as_deref());
        self.locations.build(path, locale, app)
    }

    fn send(&self, message: RouterMessage) {
        if self.tx.unbounded_send(message).is_err() {
            error!("router service is gone, dropping navigation request");
        }
    }
}

fn with_query(route: &str, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{route}?{query}"),
        None => route.to_string(),
    }
}

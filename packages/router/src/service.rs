use std::{cell::RefCell, rc::Rc};

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::{
    future::{self, LocalBoxFuture},
    select,
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use mosaic_history::History;
use tracing::{debug, error, trace, warn};

use crate::{
    cache::RenderCache,
    error::{LoadError, Result},
    events::{EventBus, RouterEvent},
    helpers::{concat_route, render_token, split_location},
    lazy::{LazyLoader, LoadPlan},
    location::{Location, Locations},
    matcher::Params,
    navigator::Navigator,
    router_cfg::{NotFound, RouterConfig, StaleLoads},
    routes::{Guard, Layout, MiddlewareContext, RegisteredRoute, RouteRegistry},
    state::{NavigationMode, NavigationState, Phase, RenderOutput, View},
};

/// How many redirects a single trigger may cause before the router gives up and renders the
/// not found view.
pub const MAX_REDIRECTS: usize = 8;

/// A set of messages that the [`RouterService`] can handle.
pub(crate) enum RouterMessage {
    /// Push a new history item and navigate to it, unless it is already active.
    Push { path: String, mode: NavigationMode },

    /// Replace the current history item without any transition.
    ReplaceSilently(String),

    /// Go back a step in the navigation history.
    GoBack,

    /// Go a step forward in the navigation history.
    GoForward,

    /// The history changed outside the router.
    HistoryChanged,

    /// Render the active location again.
    Refresh,

    /// Load the code of a location without navigating to it.
    Prefetch(String),
}

/// Something the router waited for.
enum Outcome {
    Loaded {
        transition: Transition,
        result: std::result::Result<(), LoadError>,
    },
    Prefetched {
        route: String,
        result: std::result::Result<(), LoadError>,
    },
    Rendered {
        generation: u64,
        route: String,
        mode: NavigationMode,
    },
}

enum Wake {
    Message(RouterMessage),
    Outcome(Outcome),
}

/// A transition in progress.
struct Transition {
    generation: u64,
    location: Location,
    mode: NavigationMode,
    redirects: usize,
}

/// Whether a location is the one already active.
enum Activity {
    Inactive,
    HashChange,
    Active,
}

/// The core of the router.
///
/// This combines the [`RouteRegistry`], the [`LazyLoader`] and a [`History`] to decide what to
/// render for the current location, and notifies the view layer through the [`EventBus`].
///
/// The [`RouterService`] can be made to do things through the [`Navigator`] it returns when it is
/// constructed. The [`Navigator`] also provides information about the service's current state.
///
/// Nothing happens until [`RouterService::run`] is polled.
pub struct RouterService<T> {
    rx: UnboundedReceiver<RouterMessage>,
    history: Rc<dyn History>,
    routes: RouteRegistry<T>,
    locations: Locations,
    loader: Rc<LazyLoader>,
    events: EventBus,
    cache: RenderCache<T>,
    state: Rc<RefCell<NavigationState>>,
    output: Rc<RefCell<Option<Rc<RenderOutput<T>>>>>,
    not_found: NotFound<T>,
    force_refresh: bool,
    stale_loads: StaleLoads,
    generation: u64,
    tasks: FuturesUnordered<LocalBoxFuture<'static, Outcome>>,
}

impl<T: Clone + 'static> RouterService<T> {
    /// Create a new [`RouterService`].
    ///
    /// The returned [`RouterService`] and [`Navigator`] are linked with each other. Fails if the
    /// configured default locale is not one of the configured locale codes.
    pub fn new(
        config: RouterConfig<T>,
        routes: RouteRegistry<T>,
        history: Rc<dyn History>,
    ) -> Result<(Self, Navigator<T>)> {
        let default_locale = config.resolved_default_locale()?;
        if routes.locale_codes() != config.locale_codes.as_slice() {
            warn!(
                configured = ?config.locale_codes,
                compiled = ?routes.locale_codes(),
                "route registry was built for other locale codes"
            );
        }

        // create channel
        let (tx, rx) = unbounded();

        let locations = Locations::new(
            &config.base_path,
            config.locale_codes.clone(),
            routes.apps().clone(),
        );
        let loader = Rc::new(LazyLoader::new(
            routes.apps().clone(),
            config.app_loader.clone(),
            config.module_loader.clone(),
        ));

        // create state and navigator
        let state = Rc::new(RefCell::new(NavigationState {
            locale: default_locale,
            route: String::from("/"),
            previous_route: String::from("/"),
            ..Default::default()
        }));
        let output = Rc::new(RefCell::new(None));
        let events = EventBus::default();
        let navigator = Navigator {
            tx: tx.clone(),
            state: state.clone(),
            output: output.clone(),
            events: events.clone(),
            routes: routes.clone(),
            locations: locations.clone(),
        };

        history.updater(Rc::new(move || {
            tx.unbounded_send(RouterMessage::HistoryChanged).ok();
        }));

        Ok((
            Self {
                rx,
                history,
                routes,
                locations,
                loader,
                events,
                cache: RenderCache::new(config.render_cache),
                state,
                output,
                not_found: config.not_found,
                force_refresh: config.force_refresh,
                stale_loads: config.stale_loads,
                generation: 0,
                tasks: FuturesUnordered::new(),
            },
            navigator,
        ))
    }

    /// The router's event loop.
    ///
    /// Resolves the initial location, then handles navigation requests, history updates and load
    /// completions. Stops when no more messages can arrive.
    pub async fn run(&mut self) {
        // Trigger initial routing. Listeners subscribed before this happens see the initial
        // transition.
        self.enter(NavigationMode::Navigation, 0, true);

        loop {
            let wake = select! {
                message = self.rx.next() => match message {
                    Some(message) => Wake::Message(message),
                    None => break,
                },
                outcome = self.tasks.select_next_some() => Wake::Outcome(outcome),
                complete => break,
            };

            match wake {
                Wake::Message(message) => self.handle_message(message),
                Wake::Outcome(outcome) => self.handle_outcome(outcome),
            }
        }
    }

    fn handle_message(&mut self, message: RouterMessage) {
        match message {
            RouterMessage::Push { path, mode } => {
                let location = self.locations.parse(&path);
                match self.activity(&location) {
                    Activity::Inactive => {}
                    Activity::HashChange => {
                        self.history.push(path);
                        self.state.borrow_mut().hash = location.hash;
                        return;
                    }
                    Activity::Active if !self.force_refresh => {
                        trace!(%path, "location is already active");
                        return;
                    }
                    Activity::Active => {}
                }

                self.history.push(path);
                self.enter(mode, 0, true);
            }
            RouterMessage::ReplaceSilently(path) => {
                let location = self.locations.parse(&path);
                self.history.replace(path);

                let mut state = self.state.borrow_mut();
                state.query = location.query;
                state.hash = location.hash;
            }
            RouterMessage::GoBack => self.traverse(|history| history.go_back()),
            RouterMessage::GoForward => self.traverse(|history| history.go_forward()),
            RouterMessage::HistoryChanged => self.enter(NavigationMode::BackForward, 0, true),
            RouterMessage::Refresh => self.enter(NavigationMode::Refresh, 0, true),
            RouterMessage::Prefetch(path) => {
                let location = self.locations.parse(&path);
                let load = self
                    .loader
                    .prefetch(location.app.as_deref(), &location.route);
                let route = location.route;
                self.tasks.push(
                    async move {
                        Outcome::Prefetched {
                            route,
                            result: load.await,
                        }
                    }
                    .boxed_local(),
                );
            }
        }
    }

    fn traverse(&mut self, step: impl FnOnce(&dyn History)) {
        let before = self.history.current_location();
        step(&*self.history);

        if self.history.current_location() == before {
            trace!("nothing to traverse to");
            return;
        }
        self.enter(NavigationMode::BackForward, 0, true);
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Loaded { transition, result } => self.finish_load(transition, result),
            Outcome::Prefetched { route, result } => match result {
                Ok(()) => debug!(%route, "prefetched"),
                Err(error) => warn!(%route, %error, "prefetch failed"),
            },
            Outcome::Rendered {
                generation,
                route,
                mode,
            } => {
                if generation == self.generation {
                    let mut state = self.state.borrow_mut();
                    if state.phase == Phase::Rendering {
                        state.phase = Phase::Idle;
                    }
                }
                self.events.emit(&RouterEvent::Rendered { route, mode });
            }
        }
    }

    /// Whether `location` is the active location, ignoring the fragment.
    fn activity(&self, location: &Location) -> Activity {
        let state = self.state.borrow();
        let same = state.route == location.route
            && state.app == location.app
            && state.locale == self.effective_locale(location)
            && state.has_locale_prefix == location.locale.is_some()
            && state.query == location.query;

        match (same, state.hash == location.hash) {
            (false, _) => Activity::Inactive,
            (true, false) => Activity::HashChange,
            (true, true) => Activity::Active,
        }
    }

    /// The locale `location` is shown in: its locale segment, or else the active locale.
    fn effective_locale(&self, location: &Location) -> String {
        location
            .locale
            .clone()
            .unwrap_or_else(|| self.state.borrow().locale.clone())
    }

    /// Start a transition to the history's current location.
    ///
    /// `external` is false for redirects, which continue the trigger that caused them.
    fn enter(&mut self, mode: NavigationMode, redirects: usize, external: bool) {
        let raw = self.history.current_location();
        let location = self.locations.parse(&raw);
        self.generation += 1;
        trace!(generation = self.generation, %raw, %mode, "entering transition");

        self.apply_locale(&location);

        let previous_route = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if external {
                state.previous_route = state.route.clone();
            }
            state.route = location.route.clone();
            state.app = location.app.clone();
            state.query = location.query.clone();
            state.hash = location.hash.clone();
            state.mode = mode;
            state.loading = false;
            state.phase = Phase::Resolving;
            state.can_go_back = self.history.can_go_back();
            state.can_go_forward = self.history.can_go_forward();
            state.previous_route.clone()
        };

        self.events.emit(&RouterEvent::Navigating {
            route: location.route.clone(),
            mode,
            previous_route,
        });

        self.resolve(Transition {
            generation: self.generation,
            location,
            mode,
            redirects,
        });
    }

    fn apply_locale(&mut self, location: &Location) {
        let locale = self.effective_locale(location);
        let (previous, detected) = {
            let mut state = self.state.borrow_mut();
            let detected = location.locale.is_some() && !state.initial_locale_detected;
            state.initial_locale_detected |= detected;
            state.has_locale_prefix = location.locale.is_some();
            (state.locale.clone(), detected)
        };

        if detected {
            self.events.emit(&RouterEvent::InitialLocaleCode {
                locale: locale.clone(),
            });
        }

        if previous == locale {
            return;
        }

        // the first transition only establishes the locale
        if self.generation == 1 {
            self.state.borrow_mut().locale = locale;
            return;
        }

        debug!(%previous, %locale, "switching locale");
        self.events.emit(&RouterEvent::LocaleCodeChanging {
            locale: locale.clone(),
            previous: previous.clone(),
        });
        self.state.borrow_mut().locale = locale.clone();
        self.events
            .emit(&RouterEvent::LocaleChanged { locale, previous });
    }

    fn resolve(&mut self, transition: Transition) {
        let app = transition.location.app.clone();
        let route = &transition.location.route;

        // a module may register the route only once loaded, so plan before matching
        if let Some(plan) = self
            .loader
            .plan_load(app.as_deref(), route)
            .filter(|plan| !plan.is_ready())
        {
            self.lazy_load(transition, plan);
            return;
        }

        let path = self.locations.match_path(&transition.location);
        if let Some((route, params)) = self.routes.find(&path, app.as_deref()) {
            self.render(transition, route, params);
        } else if let Some(plan) = self
            .loader
            .plan_dynamic(app.as_deref())
            .filter(|plan| !plan.is_ready())
        {
            self.lazy_load(transition, plan);
        } else {
            self.not_found(transition);
        }
    }

    fn lazy_load(&mut self, transition: Transition, plan: LoadPlan) {
        debug!(
            route = %transition.location.route,
            pending = ?plan.pending(),
            "waiting for code"
        );

        if transition.generation == self.generation {
            let mut state = self.state.borrow_mut();
            state.loading = true;
            state.phase = Phase::LazyLoading;
        }

        let load = self.loader.run(&plan);
        self.tasks.push(
            async move {
                Outcome::Loaded {
                    result: load.await,
                    transition,
                }
            }
            .boxed_local(),
        );
    }

    fn finish_load(&mut self, transition: Transition, result: std::result::Result<(), LoadError>) {
        let current = transition.generation == self.generation;
        if current {
            self.state.borrow_mut().loading = false;
        }

        if !current && self.stale_loads == StaleLoads::Discard {
            warn!(
                route = %transition.location.route,
                "discarding load completed after a newer navigation"
            );
            return;
        }

        match result {
            Ok(()) => self.resolve(transition),
            Err(error) => {
                error!(route = %transition.location.route, %error, "failed to load route code");
                self.events.emit(&RouterEvent::LoadFailed {
                    route: transition.location.route.clone(),
                    error,
                });
                self.not_found(transition);
            }
        }
    }

    fn render(&mut self, transition: Transition, route: RegisteredRoute<T>, params: Params) {
        let location = &transition.location;
        let locale = self.effective_locale(location);

        let context = MiddlewareContext {
            pattern: route.pattern(),
            route: &location.route,
            params: &params,
            locale: &locale,
            app: location.app.as_deref(),
        };
        let view = match route.guard(&context) {
            Guard::Next => View::Page(route.content().clone()),
            Guard::Render(content) => View::Guarded(content),
            Guard::Redirect(path) => {
                self.redirect(transition, &path);
                return;
            }
        };

        if transition.mode == NavigationMode::BackForward && matches!(view, View::Page(_)) {
            if let Some(cached) = self.cache.lookup(&locale, route.compiled_path(), &params) {
                debug!(route = %location.route, "reusing cached output");
                self.commit(&transition, cached);
                return;
            }
        }

        let key = self.render_key(transition.mode, route.compiled_path());
        let output = RenderOutput {
            route: location.route.clone(),
            compiled_path: route.compiled_path().to_string(),
            locale,
            app: location.app.clone(),
            layout: route.layout().clone(),
            view,
            params,
            key,
        };
        self.commit(&transition, Rc::new(output));
    }

    /// The render identity: the compiled path, unless the view layer must paint from scratch.
    fn render_key(&self, mode: NavigationMode, compiled_path: &str) -> String {
        let repeated = self
            .output
            .borrow()
            .as_ref()
            .is_some_and(|output| output.compiled_path == compiled_path);

        match mode {
            NavigationMode::Refresh | NavigationMode::ChangeLocale => render_token(),
            _ if repeated && self.force_refresh => render_token(),
            _ => compiled_path.to_string(),
        }
    }

    fn commit(&mut self, transition: &Transition, output: Rc<RenderOutput<T>>) {
        if transition.generation == self.generation {
            let mut state = self.state.borrow_mut();
            state.params = output.params.clone();
            state.loading = false;
            state.phase = Phase::Rendering;
        } else {
            warn!(route = %output.route, "committing output of a superseded navigation");
        }

        *self.output.borrow_mut() = Some(output.clone());
        if matches!(output.view, View::Page(_)) {
            self.cache.put(output.clone());
        }

        self.events.emit(&RouterEvent::Rendering {
            route: output.route.clone(),
            mode: transition.mode,
        });

        // painted once the view layer had its turn
        self.tasks.push(
            future::ready(Outcome::Rendered {
                generation: transition.generation,
                route: output.route.clone(),
                mode: transition.mode,
            })
            .boxed_local(),
        );
    }

    fn not_found(&mut self, transition: Transition) {
        debug!(route = %transition.location.route, "no route matched");
        if transition.generation == self.generation {
            let mut state = self.state.borrow_mut();
            state.phase = Phase::NotFound;
            state.params = Params::default();
        }

        match self.not_found.clone() {
            NotFound::Redirect(path)
                if concat_route([split_location(&path).0]) != transition.location.route =>
            {
                self.redirect(transition, &path);
            }
            NotFound::Redirect(path) => {
                warn!(%path, "not found redirect target does not match any route");
                self.render_not_found(transition, None);
            }
            NotFound::Render(content) => self.render_not_found(transition, content),
        }
    }

    fn render_not_found(&mut self, transition: Transition, content: Option<T>) {
        let output = RenderOutput {
            route: transition.location.route.clone(),
            compiled_path: String::new(),
            locale: self.effective_locale(&transition.location),
            app: transition.location.app.clone(),
            layout: Layout::full_page(),
            view: View::NotFound(content),
            params: Params::default(),
            key: self.render_key(transition.mode, ""),
        };
        self.commit(&transition, Rc::new(output));
    }

    /// Replace the current history entry with `path`, relative to the transition's app and
    /// locale, and navigate there.
    fn redirect(&mut self, transition: Transition, path: &str) {
        if transition.generation != self.generation {
            warn!(%path, "ignoring redirect of a superseded navigation");
            return;
        }
        if transition.redirects >= MAX_REDIRECTS {
            warn!(%path, redirects = transition.redirects, "too many redirects");
            self.render_not_found(transition, None);
            return;
        }

        let url = self.locations.build(
            path,
            transition.location.locale.as_deref(),
            transition.location.app.as_deref(),
        );
        debug!(%url, "redirecting");
        self.history.replace(url);
        self.enter(transition.mode, transition.redirects + 1, false);
    }
}

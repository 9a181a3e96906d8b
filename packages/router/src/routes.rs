//! The append-only collection of registered routes.

use std::{cell::RefCell, fmt, rc::Rc};

use tracing::{debug, trace};

use crate::{
    apps::{App, AppRegistry},
    error::Result,
    helpers::concat_route,
    matcher::{CompiledPattern, Params, PathMatcher, PatternCompiler},
};

/// The name of the parameter capturing the locale segment of compiled paths.
pub const LOCALE_PARAMETER: &str = "localeCode";

/// What a middleware decides about the render it is asked to guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard<T> {
    /// Continue with the next middleware, or with the route's own content.
    Next,
    /// Stop and render this content instead of the route's.
    Render(T),
    /// Stop and navigate to this path instead. The path is relative to the route's app.
    Redirect(String),
}

/// What a middleware gets to see about the route being rendered.
#[derive(Debug)]
pub struct MiddlewareContext<'a> {
    /// The pattern of the matched route, as registered.
    pub pattern: &'a str,
    /// The app-relative route being rendered.
    pub route: &'a str,
    /// The parameters captured by the match.
    pub params: &'a Params,
    /// The active locale.
    pub locale: &'a str,
    /// The app owning the route.
    pub app: Option<&'a str>,
}

/// A step of a route's middleware chain.
pub type Middleware<T> = Rc<dyn Fn(&MiddlewareContext<'_>) -> Guard<T>>;

/// A route, before registration.
pub struct Route<T> {
    pattern: String,
    content: T,
    middleware: Vec<Middleware<T>>,
}

impl<T> Route<T> {
    /// Create a route rendering `content` at `pattern`.
    ///
    /// The pattern is relative to the app the route is registered in. See
    /// [`matcher`](crate::matcher) for the pattern syntax.
    pub fn new(pattern: impl Into<String>, content: T) -> Self {
        Self {
            pattern: pattern.into(),
            content,
            middleware: Vec::new(),
        }
    }

    /// Append a middleware to the route's chain. Middleware runs in the order it is added.
    pub fn middleware(
        mut self,
        middleware: impl Fn(&MiddlewareContext<'_>) -> Guard<T> + 'static,
    ) -> Self {
        self.middleware.push(Rc::new(middleware));
        self
    }
}

/// A shared wrapper for a group of routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout<T> {
    key: String,
    wrapper: Option<T>,
}

impl<T> Layout<T> {
    /// The key of [`Layout::full_page`].
    pub const FULL_PAGE: &'static str = "full-page";

    /// A layout wrapping its routes in `wrapper`.
    ///
    /// Routes registered with layouts sharing a key belong to the same layout.
    pub fn new(key: impl Into<String>, wrapper: T) -> Self {
        Self {
            key: key.into(),
            wrapper: Some(wrapper),
        }
    }

    /// A layout without a wrapper: routes render on their own.
    pub fn full_page() -> Self {
        Self {
            key: Self::FULL_PAGE.to_string(),
            wrapper: None,
        }
    }

    /// The layout's key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The layout's wrapper, if any.
    #[must_use]
    pub fn wrapper(&self) -> Option<&T> {
        self.wrapper.as_ref()
    }
}

/// Options shared by a batch of routes. See [`RouteRegistry::group`].
pub struct GroupOptions<T> {
    layout: Layout<T>,
    prefix: String,
    middleware: Vec<Middleware<T>>,
}

impl<T> GroupOptions<T> {
    /// Group routes under `layout`.
    pub fn new(layout: Layout<T>) -> Self {
        Self {
            layout,
            prefix: String::new(),
            middleware: Vec::new(),
        }
    }

    /// Prefix every route pattern of the group with `prefix`.
    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self
        }
    }

    /// Run `middleware` before the routes' own middleware.
    pub fn middleware(
        mut self,
        middleware: impl Fn(&MiddlewareContext<'_>) -> Guard<T> + 'static,
    ) -> Self {
        self.middleware.push(Rc::new(middleware));
        self
    }
}

/// A route, after registration.
pub struct RegisteredRoute<T> {
    pattern: String,
    compiled_path: String,
    compiled: Rc<CompiledPattern>,
    app: Option<String>,
    layout: Layout<T>,
    content: T,
    middleware: Vec<Middleware<T>>,
}

impl<T: Clone> Clone for RegisteredRoute<T> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            compiled_path: self.compiled_path.clone(),
            compiled: self.compiled.clone(),
            app: self.app.clone(),
            layout: self.layout.clone(),
            content: self.content.clone(),
            middleware: self.middleware.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RegisteredRoute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredRoute")
            .field("pattern", &self.pattern)
            .field("compiled_path", &self.compiled_path)
            .field("app", &self.app)
            .field("layout", &self.layout)
            .field("content", &self.content)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl<T> RegisteredRoute<T> {
    /// The pattern as registered, including any group prefix.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The absolute pattern: locale group, app base path and pattern.
    #[must_use]
    pub fn compiled_path(&self) -> &str {
        &self.compiled_path
    }

    /// The owning app.
    #[must_use]
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// The layout the route was registered with.
    #[must_use]
    pub fn layout(&self) -> &Layout<T> {
        &self.layout
    }

    /// The route's own content.
    #[must_use]
    pub fn content(&self) -> &T {
        &self.content
    }

    /// The route's middleware chain, group middleware first.
    #[must_use]
    pub fn middleware(&self) -> &[Middleware<T>] {
        &self.middleware
    }

    /// Run the middleware chain, stopping at the first middleware that does not return
    /// [`Guard::Next`].
    pub fn guard(&self, context: &MiddlewareContext<'_>) -> Guard<T> {
        for middleware in &self.middleware {
            match middleware(context) {
                Guard::Next => continue,
                decision => return decision,
            }
        }
        Guard::Next
    }
}

/// The compiled paths of every route registered with one layout key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutGroup {
    key: String,
    route_paths: Vec<String>,
}

impl LayoutGroup {
    /// The layout key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The compiled paths of the layout's routes, in registration order.
    #[must_use]
    pub fn route_paths(&self) -> &[String] {
        &self.route_paths
    }

    /// Whether the route with `compiled_path` belongs to this layout.
    #[must_use]
    pub fn contains(&self, compiled_path: &str) -> bool {
        self.route_paths.iter().any(|path| path == compiled_path)
    }
}

struct RegistryInner<T> {
    routes: Vec<RegisteredRoute<T>>,
    layouts: Vec<LayoutGroup>,
}

/// All registered routes, in registration order.
///
/// The registry is a cheap handle: clones share the same routes, which is how code loaded by an
/// [`AppLoader`](crate::lazy::AppLoader) or [`ModuleLoader`](crate::lazy::ModuleLoader) registers
/// the routes it brings. Routes are never removed.
pub struct RouteRegistry<T> {
    inner: Rc<RefCell<RegistryInner<T>>>,
    apps: AppRegistry,
    locale_codes: Vec<String>,
    matcher: Rc<PathMatcher>,
}

impl<T> Clone for RouteRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            apps: self.apps.clone(),
            locale_codes: self.locale_codes.clone(),
            matcher: self.matcher.clone(),
        }
    }
}

impl<T> RouteRegistry<T> {
    /// Create an empty registry for `apps`, compiling patterns with `compiler`.
    ///
    /// Fails if the apps are inconsistent with each other or with `locale_codes`. See
    /// [`AppRegistry::new`].
    pub fn new(
        apps: Vec<App>,
        locale_codes: Vec<String>,
        compiler: Rc<dyn PatternCompiler>,
    ) -> Result<Self> {
        let apps = AppRegistry::new(apps, &locale_codes)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                routes: Vec::new(),
                layouts: Vec::new(),
            })),
            apps,
            locale_codes,
            matcher: Rc::new(PathMatcher::new(compiler)),
        })
    }

    /// The registered apps.
    #[must_use]
    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    /// The locale codes compiled paths accept.
    #[must_use]
    pub fn locale_codes(&self) -> &[String] {
        &self.locale_codes
    }

    /// The matcher used for compiled paths.
    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Register `routes` in `app` under `layout`.
    ///
    /// If `app` is [`None`] the routes belong to the default app (the one rooted at `/`), if any.
    /// All routes are compiled before any is added: when one pattern is malformed, none of the
    /// routes is registered.
    pub fn register(
        &self,
        app: Option<&str>,
        layout: Layout<T>,
        routes: impl IntoIterator<Item = Route<T>>,
    ) -> Result<()>
    where
        T: Clone,
    {
        self.group(app, GroupOptions::new(layout), routes)
    }

    /// Register `routes` in `app`, applying the group's prefix, middleware and layout to each.
    ///
    /// ```rust
    /// # use std::rc::Rc;
    /// # use mosaic_router::prelude::*;
    /// let routes = RouteRegistry::new(
    ///     vec![App::new("admin", "/admin")],
    ///     vec![String::from("en")],
    ///     Rc::new(UrlPatternCompiler),
    /// )
    /// .unwrap();
    ///
    /// routes
    ///     .group(
    ///         Some("admin"),
    ///         GroupOptions::new(Layout::new("dashboard", "Dashboard")).prefix("/users"),
    ///         [Route::new("/", "UserList"), Route::new("/:id", "UserDetails")],
    ///     )
    ///     .unwrap();
    ///
    /// let compiled: Vec<_> = routes
    ///     .list()
    ///     .into_iter()
    ///     .map(|route| route.compiled_path().to_string())
    ///     .collect();
    /// assert_eq!(
    ///     compiled,
    ///     ["/:localeCode(en)?/admin/users", "/:localeCode(en)?/admin/users/:id"]
    /// );
    /// ```
    pub fn group(
        &self,
        app: Option<&str>,
        options: GroupOptions<T>,
        routes: impl IntoIterator<Item = Route<T>>,
    ) -> Result<()>
    where
        T: Clone,
    {
        let app = match app {
            Some(name) => Some(self.apps.require(name)?),
            None => self.apps.default_app(),
        };
        let app_name = app.map(|app| app.name().to_string());
        let base_path = app.map_or("/", App::base_path);
        let locale_group = self.locale_group();

        let mut registered = Vec::new();
        for route in routes {
            let pattern = concat_route([options.prefix.as_str(), route.pattern.as_str()]);
            let compiled_path = concat_route([
                locale_group.as_str(),
                base_path,
                pattern.as_str(),
            ]);
            let compiled = self.matcher.compile(&compiled_path)?;

            let mut middleware = options.middleware.clone();
            middleware.extend(route.middleware);

            trace!(%compiled_path, app = ?app_name, "compiled route");
            registered.push(RegisteredRoute {
                pattern,
                compiled_path,
                compiled,
                app: app_name.clone(),
                layout: options.layout.clone(),
                content: route.content,
                middleware,
            });
        }

        let mut inner = self.inner.borrow_mut();
        let key = options.layout.key();
        let index = match inner.layouts.iter().position(|layout| layout.key == key) {
            Some(index) => index,
            None => {
                inner.layouts.push(LayoutGroup {
                    key: key.to_string(),
                    route_paths: Vec::new(),
                });
                inner.layouts.len() - 1
            }
        };
        let paths = registered.iter().map(|route| route.compiled_path.clone());
        inner.layouts[index].route_paths.extend(paths);

        debug!(
            count = registered.len(),
            app = ?app_name,
            layout = key,
            "registered routes"
        );
        inner.routes.extend(registered);
        Ok(())
    }

    /// A registration handle bound to `app`.
    pub fn scope(&self, app: &str) -> Result<RouteScope<T>> {
        self.apps.require(app)?;
        Ok(RouteScope {
            registry: self.clone(),
            app: app.to_string(),
        })
    }

    /// Every registered route, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<RegisteredRoute<T>>
    where
        T: Clone,
    {
        self.inner.borrow().routes.clone()
    }

    /// The number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().routes.len()
    }

    /// Whether no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().routes.is_empty()
    }

    /// The layout group registered under `key`.
    #[must_use]
    pub fn layout(&self, key: &str) -> Option<LayoutGroup> {
        self.inner
            .borrow()
            .layouts
            .iter()
            .find(|layout| layout.key == key)
            .cloned()
    }

    /// Find the first route of `app` matching `path`.
    ///
    /// `path` is the app base path followed by the app-relative route, without any locale
    /// segment. See [`Locations::match_path`](crate::location::Locations::match_path).
    #[must_use]
    pub fn find(&self, path: &str, app: Option<&str>) -> Option<(RegisteredRoute<T>, Params)>
    where
        T: Clone,
    {
        self.inner
            .borrow()
            .routes
            .iter()
            .filter(|route| route.app.as_deref() == app)
            .find_map(|route| {
                let params = route.compiled.captures(path)?;
                Some((route.clone(), params))
            })
    }

    fn locale_group(&self) -> String {
        if self.locale_codes.is_empty() {
            return String::new();
        }

        let alternatives: Vec<_> = self
            .locale_codes
            .iter()
            .map(|code| regex::escape(code))
            .collect();
        format!("/:{LOCALE_PARAMETER}({})?", alternatives.join("|"))
    }
}

/// A [`RouteRegistry`] handle registering into one app.
pub struct RouteScope<T> {
    registry: RouteRegistry<T>,
    app: String,
}

impl<T: Clone> RouteScope<T> {
    /// The app routes are registered in.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Register a single route under the full page layout.
    pub fn add(&self, route: Route<T>) -> Result<&Self> {
        self.registry
            .register(Some(&self.app), Layout::full_page(), [route])?;
        Ok(self)
    }

    /// Register `routes` as part of `layout`.
    pub fn part_of(
        &self,
        layout: Layout<T>,
        routes: impl IntoIterator<Item = Route<T>>,
    ) -> Result<&Self> {
        self.registry.register(Some(&self.app), layout, routes)?;
        Ok(self)
    }

    /// Register `routes` with shared options. See [`RouteRegistry::group`].
    pub fn group(
        &self,
        options: GroupOptions<T>,
        routes: impl IntoIterator<Item = Route<T>>,
    ) -> Result<&Self> {
        self.registry.group(Some(&self.app), options, routes)?;
        Ok(self)
    }
}

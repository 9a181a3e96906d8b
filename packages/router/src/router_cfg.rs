use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    apps::App,
    error::{Result, RouterError},
    helpers::concat_route,
    lazy::{AppLoader, ModuleLoader, NoopLoader},
    matcher::{PatternCompiler, UrlPatternCompiler},
    routes::RouteRegistry,
};

/// The path redirected to when nothing matches and no other path is configured.
pub const DEFAULT_NOT_FOUND_ROUTE: &str = "/404";

/// What to do when no route matches a location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotFound<T> {
    /// Navigate to this app-relative path instead, replacing the current history entry.
    Redirect(String),
    /// Render this fallback content. [`None`] renders an empty
    /// [`View::NotFound`](crate::state::View::NotFound).
    Render(Option<T>),
}

impl<T> Default for NotFound<T> {
    fn default() -> Self {
        Self::Render(None)
    }
}

/// What happens to a transition whose loads complete after a newer transition started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleLoads {
    /// Record the loaded code, but do not render the superseded route.
    #[default]
    Discard,
    /// Render the superseded route anyway, possibly replacing a newer output.
    Commit,
}

/// Global configuration options for the router.
///
/// This implements [`Default`] and follows the builder pattern, so you can use it like this:
/// ```rust
/// # use mosaic_router::prelude::*;
/// let cfg = RouterConfig::<&str>::default()
///     .locale_codes(["en", "ar"])
///     .default_locale("en")
///     .not_found(NotFound::Redirect(String::from("/404")))
///     .force_refresh(false);
/// ```
pub struct RouterConfig<T> {
    pub(crate) base_path: String,
    pub(crate) locale_codes: Vec<String>,
    pub(crate) default_locale: Option<String>,
    pub(crate) not_found: NotFound<T>,
    pub(crate) force_refresh: bool,
    pub(crate) pattern_compiler: Rc<dyn PatternCompiler>,
    pub(crate) render_cache: bool,
    pub(crate) stale_loads: StaleLoads,
    pub(crate) app_loader: Rc<dyn AppLoader>,
    pub(crate) module_loader: Rc<dyn ModuleLoader>,
}

impl<T> Default for RouterConfig<T> {
    fn default() -> Self {
        Self {
            base_path: String::from("/"),
            locale_codes: Vec::new(),
            default_locale: None,
            not_found: NotFound::default(),
            force_refresh: true,
            pattern_compiler: Rc::new(UrlPatternCompiler),
            render_cache: true,
            stale_loads: StaleLoads::default(),
            app_loader: Rc::new(NoopLoader),
            module_loader: Rc::new(NoopLoader),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RouterConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("base_path", &self.base_path)
            .field("locale_codes", &self.locale_codes)
            .field("default_locale", &self.default_locale)
            .field("not_found", &self.not_found)
            .field("force_refresh", &self.force_refresh)
            .field("render_cache", &self.render_cache)
            .field("stale_loads", &self.stale_loads)
            .finish_non_exhaustive()
    }
}

impl<T> RouterConfig<T> {
    /// Build a configuration from deserialized [`RouterSettings`].
    ///
    /// Options that cannot be expressed as data (loaders, the pattern compiler, not found
    /// content) keep their defaults and can be set afterward.
    pub fn from_settings(settings: RouterSettings) -> Self {
        let defaults = Self::default();
        let not_found = match settings.not_found {
            Some(NotFoundSettings {
                mode: NotFoundMode::Redirect,
                route,
            }) => NotFound::Redirect(route.unwrap_or_else(|| DEFAULT_NOT_FOUND_ROUTE.to_string())),
            _ => NotFound::Render(None),
        };

        Self {
            base_path: settings
                .base_path
                .map_or(defaults.base_path.clone(), |path| concat_route([path])),
            locale_codes: settings.locale_codes,
            default_locale: settings.default_locale,
            not_found,
            force_refresh: settings.force_refresh.unwrap_or(defaults.force_refresh),
            render_cache: settings.render_cache.unwrap_or(defaults.render_cache),
            stale_loads: settings.stale_loads.unwrap_or(defaults.stale_loads),
            ..defaults
        }
    }

    /// The path the application is served under. Stripped before parsing, added when building
    /// URLs.
    ///
    /// Defaults to `/`.
    pub fn base_path(self, base_path: impl AsRef<str>) -> Self {
        Self {
            base_path: concat_route([base_path]),
            ..self
        }
    }

    /// The locale codes that may appear as the first segment of a path.
    ///
    /// Defaults to none.
    pub fn locale_codes<I, S>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locale_codes: codes.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// The locale used when a path carries no locale segment.
    ///
    /// Defaults to the first of the [`locale_codes`](Self::locale_codes).
    pub fn default_locale(self, code: impl Into<String>) -> Self {
        Self {
            default_locale: Some(code.into()),
            ..self
        }
    }

    /// What to do when no route matches.
    ///
    /// Defaults to [`NotFound::Render(None)`](NotFound::Render).
    pub fn not_found(self, not_found: NotFound<T>) -> Self {
        Self { not_found, ..self }
    }

    /// Whether navigating to the active location renders it again, with a fresh render key.
    /// Otherwise such a navigation does nothing at all.
    ///
    /// Defaults to [`true`].
    pub fn force_refresh(self, force_refresh: bool) -> Self {
        Self {
            force_refresh,
            ..self
        }
    }

    /// The compiler turning route patterns into matchers.
    ///
    /// Defaults to [`UrlPatternCompiler`].
    pub fn pattern_compiler(self, compiler: impl PatternCompiler + 'static) -> Self {
        Self {
            pattern_compiler: Rc::new(compiler),
            ..self
        }
    }

    /// Whether outputs are cached for reuse on history traversal.
    ///
    /// Defaults to [`true`].
    pub fn render_cache(self, enabled: bool) -> Self {
        Self {
            render_cache: enabled,
            ..self
        }
    }

    /// What to do with loads completing after their transition was superseded.
    ///
    /// Defaults to [`StaleLoads::Discard`].
    pub fn stale_loads(self, stale_loads: StaleLoads) -> Self {
        Self {
            stale_loads,
            ..self
        }
    }

    /// The loader bringing in app code.
    ///
    /// Defaults to a loader that loads nothing.
    pub fn app_loader(self, loader: impl AppLoader + 'static) -> Self {
        Self {
            app_loader: Rc::new(loader),
            ..self
        }
    }

    /// The loader bringing in module code.
    ///
    /// Defaults to a loader that loads nothing.
    pub fn module_loader(self, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            module_loader: Rc::new(loader),
            ..self
        }
    }

    /// Create an empty [`RouteRegistry`] for `apps`, using this configuration's locale codes and
    /// pattern compiler.
    pub fn route_registry(&self, apps: Vec<App>) -> Result<RouteRegistry<T>> {
        RouteRegistry::new(
            apps,
            self.locale_codes.clone(),
            self.pattern_compiler.clone(),
        )
    }

    /// The configured locale codes.
    #[must_use]
    pub fn configured_locales(&self) -> &[String] {
        &self.locale_codes
    }

    /// The locale used when a path carries none, after validation.
    pub(crate) fn resolved_default_locale(&self) -> Result<String> {
        match &self.default_locale {
            Some(code) if self.locale_codes.is_empty() || self.locale_codes.contains(code) => {
                Ok(code.clone())
            }
            Some(code) => Err(RouterError::UnknownLocale(code.clone())),
            None => Ok(self.locale_codes.first().cloned().unwrap_or_default()),
        }
    }
}

/// The data-only subset of [`RouterConfig`], for hosts shipping router options in a manifest.
///
/// Keys are camel cased, and all of them are optional:
/// ```rust
/// # use mosaic_router::prelude::*;
/// let settings: RouterSettings = serde_json::from_str(
///     r#"{ "basePath": "/shop", "localeCodes": ["en", "ar"], "notFound": { "mode": "redirect" } }"#,
/// )
/// .unwrap();
///
/// let cfg = RouterConfig::<()>::from_settings(settings);
/// assert_eq!(format!("{cfg:?}").contains("Redirect(\"/404\")"), true);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterSettings {
    /// See [`RouterConfig::base_path`].
    pub base_path: Option<String>,
    /// See [`RouterConfig::locale_codes`].
    pub locale_codes: Vec<String>,
    /// See [`RouterConfig::default_locale`].
    pub default_locale: Option<String>,
    /// See [`RouterConfig::force_refresh`].
    pub force_refresh: Option<bool>,
    /// See [`RouterConfig::render_cache`].
    pub render_cache: Option<bool>,
    /// See [`RouterConfig::stale_loads`].
    pub stale_loads: Option<StaleLoads>,
    /// See [`RouterConfig::not_found`].
    pub not_found: Option<NotFoundSettings>,
}

/// The data-only form of [`NotFound`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotFoundSettings {
    /// Whether to redirect or render.
    pub mode: NotFoundMode,
    /// The redirect target. Defaults to [`DEFAULT_NOT_FOUND_ROUTE`].
    pub route: Option<String>,
}

/// See [`NotFoundSettings::mode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFoundMode {
    /// See [`NotFound::Redirect`].
    Redirect,
    /// See [`NotFound::Render`].
    #[default]
    Render,
}

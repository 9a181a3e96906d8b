//! Static description of the apps sharing the session, and the modules each app owns.

use std::collections::HashSet;

use crate::{
    error::{Result, RouterError},
    helpers::concat_route,
};

/// A named subset of an [`App`]'s routes, loaded as one lazy unit.
///
/// A module claims the routes whose first segment is one of its entry prefixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    name: String,
    entry_prefixes: Vec<String>,
}

impl Module {
    /// Create a module claiming `entry_prefixes`.
    ///
    /// ```rust
    /// # use mosaic_router::apps::Module;
    /// let module = Module::new("users", ["users", "/profiles/"]);
    /// assert_eq!(module.entry_prefixes(), ["/users", "/profiles"]);
    /// ```
    pub fn new<I, S>(name: impl Into<String>, entry_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            entry_prefixes: entry_prefixes
                .into_iter()
                .map(|prefix| concat_route([prefix]))
                .collect(),
        }
    }

    /// The module's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized route prefixes this module claims.
    #[must_use]
    pub fn entry_prefixes(&self) -> &[String] {
        &self.entry_prefixes
    }

    /// Whether this module owns routes starting with `segment` (normalized, e.g. `/users`).
    #[must_use]
    pub fn claims(&self, segment: &str) -> bool {
        self.entry_prefixes
            .iter()
            .any(|prefix| prefix.eq_ignore_ascii_case(segment))
    }
}

/// A self-contained, independently loadable unit of the application, rooted at a base path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct App {
    name: String,
    base_path: String,
    modules: Vec<Module>,
    dynamic_module: Option<String>,
}

impl App {
    /// Create an app rooted at `base_path`. Use `/` for the default app.
    pub fn new(name: impl Into<String>, base_path: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            base_path: concat_route([base_path]),
            modules: Vec::new(),
            dynamic_module: None,
        }
    }

    /// Add a lazily loaded module.
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Name a module to load when no registered route of this app matches.
    ///
    /// Such a module typically registers catch-all routes (CMS pages, for example) when loaded.
    pub fn dynamic_module(mut self, module: impl Into<String>) -> Self {
        self.dynamic_module = Some(module.into());
        self
    }

    /// The app's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The app's normalized base path.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The app's modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The module loaded when nothing else matches, if any.
    #[must_use]
    pub fn dynamic_route_module(&self) -> Option<&str> {
        self.dynamic_module.as_deref()
    }

    /// Whether this is the app rooted at `/`.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.base_path == "/"
    }

    /// The base path as a bare URL segment (`/admin` -> `admin`), empty for the default app.
    fn segment(&self) -> &str {
        self.base_path.trim_start_matches('/')
    }
}

/// All registered apps. Built once at startup and read-only afterward.
#[derive(Clone, Debug, Default)]
pub struct AppRegistry {
    apps: Vec<App>,
}

impl AppRegistry {
    /// Validate and store `apps`.
    ///
    /// Fails if two apps share a name or a base path, if a base path spans more than one segment,
    /// or if a base path is identical to one of the `locale_codes`. Base paths and locale codes
    /// compare ignoring ASCII case, like URL segments do.
    pub fn new(apps: Vec<App>, locale_codes: &[String]) -> Result<Self> {
        let mut names = HashSet::new();
        let mut base_paths = HashSet::new();

        for app in &apps {
            if !names.insert(app.name.as_str()) {
                return Err(RouterError::DuplicateApp(app.name.clone()));
            }
            if !base_paths.insert(app.base_path.to_ascii_lowercase()) {
                return Err(RouterError::DuplicateBasePath(app.base_path.clone()));
            }
            if app.segment().contains('/') {
                return Err(RouterError::InvalidBasePath {
                    app: app.name.clone(),
                    base_path: app.base_path.clone(),
                });
            }
            if let Some(locale) = locale_codes
                .iter()
                .find(|code| code.eq_ignore_ascii_case(app.segment()))
            {
                return Err(RouterError::LocaleCollision {
                    app: app.name.clone(),
                    locale: locale.clone(),
                });
            }
        }

        Ok(Self { apps })
    }

    /// Whether no app is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Iterate over all apps, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &App> {
        self.apps.iter()
    }

    /// Get an app by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&App> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Get an app by name, failing with [`RouterError::UnknownApp`].
    pub fn require(&self, name: &str) -> Result<&App> {
        self.get(name)
            .ok_or_else(|| RouterError::UnknownApp(name.to_string()))
    }

    /// Get the non-default app whose base path is the URL segment `segment`.
    #[must_use]
    pub fn by_segment(&self, segment: &str) -> Option<&App> {
        self.apps
            .iter()
            .find(|app| !app.is_default() && app.segment().eq_ignore_ascii_case(segment))
    }

    /// The app rooted at `/`, if any.
    #[must_use]
    pub fn default_app(&self) -> Option<&App> {
        self.apps.iter().find(|app| app.is_default())
    }

    /// The base path of the app called `name`, or `/` if there is no such app.
    #[must_use]
    pub fn base_path_of(&self, name: Option<&str>) -> &str {
        name.and_then(|name| self.get(name))
            .map_or("/", |app| app.base_path())
    }
}

//! Tracking and running the asynchronous loads that bring app and module code in.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    future::Future,
    rc::{Rc, Weak},
};

use futures_util::{
    future::{self, try_join_all, LocalBoxFuture, Shared},
    FutureExt,
};
use tracing::{debug, trace};

use crate::{apps::AppRegistry, error::LoadError, helpers::first_segment};

/// The future returned by loaders.
pub type LoadFuture = LocalBoxFuture<'static, Result<(), LoadError>>;

/// Loads the code of an app.
///
/// Implemented for every `Fn(&str) -> impl Future<Output = Result<(), LoadError>>`.
pub trait AppLoader {
    /// Start loading `app`.
    fn load_app(&self, app: &str) -> LoadFuture;
}

impl<F, Fut> AppLoader for F
where
    F: Fn(&str) -> Fut,
    Fut: Future<Output = Result<(), LoadError>> + 'static,
{
    fn load_app(&self, app: &str) -> LoadFuture {
        self(app).boxed_local()
    }
}

/// Loads the code of a module.
///
/// Implemented for every `Fn(&str, &str) -> impl Future<Output = Result<(), LoadError>>`, called
/// with the app and module names.
pub trait ModuleLoader {
    /// Start loading `module` of `app`.
    fn load_module(&self, app: &str, module: &str) -> LoadFuture;
}

impl<F, Fut> ModuleLoader for F
where
    F: Fn(&str, &str) -> Fut,
    Fut: Future<Output = Result<(), LoadError>> + 'static,
{
    fn load_module(&self, app: &str, module: &str) -> LoadFuture {
        self(app, module).boxed_local()
    }
}

/// A loader with nothing to load. Used when no loader is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLoader;

impl AppLoader for NoopLoader {
    fn load_app(&self, _: &str) -> LoadFuture {
        future::ready(Ok(())).boxed_local()
    }
}

impl ModuleLoader for NoopLoader {
    fn load_module(&self, _: &str, _: &str) -> LoadFuture {
        future::ready(Ok(())).boxed_local()
    }
}

/// A single call to a loader.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoadOperation {
    /// Load an app.
    App {
        /// The app's name.
        app: String,
    },
    /// Load a module of an app.
    Module {
        /// The app's name.
        app: String,
        /// The module's name.
        module: String,
    },
}

impl LoadOperation {
    /// A human readable name of what is loaded: `admin` or `admin/users`.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::App { app } => app.clone(),
            Self::Module { app, module } => format!("{app}/{module}"),
        }
    }
}

impl fmt::Display for LoadOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target())
    }
}

/// The apps and modules whose code is loaded. Only ever grows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadedSet {
    apps: HashSet<String>,
    modules: HashSet<String>,
}

impl LoadedSet {
    /// Whether the app's code is loaded.
    #[must_use]
    pub fn contains_app(&self, app: &str) -> bool {
        self.apps.contains(app)
    }

    /// Whether the module's code is loaded.
    #[must_use]
    pub fn contains_module(&self, app: &str, module: &str) -> bool {
        self.modules.contains(&module_key(app, module))
    }

    /// Whether the operation would load anything new.
    #[must_use]
    pub fn satisfies(&self, operation: &LoadOperation) -> bool {
        match operation {
            LoadOperation::App { app } => self.contains_app(app),
            LoadOperation::Module { app, module } => self.contains_module(app, module),
        }
    }

    fn insert(&mut self, operation: &LoadOperation) {
        match operation {
            LoadOperation::App { app } => self.apps.insert(app.clone()),
            LoadOperation::Module { app, module } => self.modules.insert(module_key(app, module)),
        };
    }
}

fn module_key(app: &str, module: &str) -> String {
    format!("{app}+{module}")
}

/// The loads needed before a route of a module can render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadPlan {
    app: String,
    module: String,
    pending: Vec<LoadOperation>,
}

impl LoadPlan {
    /// The app owning the module.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// The module owning the route.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The operations still needed, app first.
    #[must_use]
    pub fn pending(&self) -> &[LoadOperation] {
        &self.pending
    }

    /// Whether nothing needs loading.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Decides which loads a route needs, runs them and records their completion.
///
/// Operations are deduplicated twice: against the [`LoadedSet`], and against the loads already in
/// flight, which overlapping navigations share instead of starting again.
pub struct LazyLoader {
    apps: AppRegistry,
    app_loader: Rc<dyn AppLoader>,
    module_loader: Rc<dyn ModuleLoader>,
    loaded: RefCell<LoadedSet>,
    in_flight: RefCell<HashMap<LoadOperation, Shared<LoadFuture>>>,
}

impl LazyLoader {
    /// Create a loader for `apps`.
    pub fn new(
        apps: AppRegistry,
        app_loader: Rc<dyn AppLoader>,
        module_loader: Rc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            apps,
            app_loader,
            module_loader,
            loaded: RefCell::new(LoadedSet::default()),
            in_flight: RefCell::new(HashMap::new()),
        }
    }

    /// A snapshot of what is loaded.
    #[must_use]
    pub fn loaded(&self) -> LoadedSet {
        self.loaded.borrow().clone()
    }

    /// Whether `operation` is currently running.
    #[must_use]
    pub fn is_in_flight(&self, operation: &LoadOperation) -> bool {
        self.in_flight.borrow().contains_key(operation)
    }

    /// Plan the loads needed by `route` of `app`.
    ///
    /// Returns [`None`] if no module of the app claims the route's first segment: such a route is
    /// not lazy and can render right away.
    #[must_use]
    pub fn plan_load(&self, app: Option<&str>, route: &str) -> Option<LoadPlan> {
        let app = self.apps.get(app?)?;
        let segment = first_segment(route);
        let module = app.modules().iter().find(|module| module.claims(&segment))?;
        Some(self.plan(app.name(), module.name()))
    }

    /// Plan the loads of the app's dynamic route module, if it has one.
    #[must_use]
    pub fn plan_dynamic(&self, app: Option<&str>) -> Option<LoadPlan> {
        let app = self.apps.get(app?)?;
        let module = app.dynamic_route_module()?;
        Some(self.plan(app.name(), module))
    }

    fn plan(&self, app: &str, module: &str) -> LoadPlan {
        let loaded = self.loaded.borrow();
        let pending = [
            LoadOperation::App {
                app: app.to_string(),
            },
            LoadOperation::Module {
                app: app.to_string(),
                module: module.to_string(),
            },
        ]
        .into_iter()
        .filter(|operation| !loaded.satisfies(operation))
        .collect();

        LoadPlan {
            app: app.to_string(),
            module: module.to_string(),
            pending,
        }
    }

    /// Run every pending operation of `plan`, resolving once all of them succeeded or one failed.
    ///
    /// Each operation records itself in the [`LoadedSet`] as soon as it succeeds. Failed
    /// operations are not recorded, so a later plan requests them again.
    pub fn run(self: &Rc<Self>, plan: &LoadPlan) -> LoadFuture {
        let loads: Vec<_> = plan
            .pending
            .iter()
            .map(|operation| self.start(operation))
            .collect();

        async move { try_join_all(loads).await.map(drop) }.boxed_local()
    }

    /// Load what `route` of `app` needs, without navigating.
    pub fn prefetch(self: &Rc<Self>, app: Option<&str>, route: &str) -> LoadFuture {
        match self.plan_load(app, route) {
            Some(plan) if !plan.is_ready() => self.run(&plan),
            _ => future::ready(Ok(())).boxed_local(),
        }
    }

    fn start(self: &Rc<Self>, operation: &LoadOperation) -> Shared<LoadFuture> {
        if let Some(running) = self.in_flight.borrow().get(operation) {
            trace!(target = %operation, "joining in-flight load");
            return running.clone();
        }

        trace!(target = %operation, "starting load");
        let load = match operation {
            LoadOperation::App { app } => self.app_loader.load_app(app),
            LoadOperation::Module { app, module } => self.module_loader.load_module(app, module),
        };

        let this: Weak<Self> = Rc::downgrade(self);
        let key = operation.clone();
        let tracked = async move {
            let result = load.await;
            if let Some(this) = this.upgrade() {
                this.in_flight.borrow_mut().remove(&key);
                if result.is_ok() {
                    debug!(target = %key, "loaded");
                    this.loaded.borrow_mut().insert(&key);
                }
            }
            result
        }
        .boxed_local()
        .shared();

        self.in_flight
            .borrow_mut()
            .insert(operation.clone(), tracked.clone());
        tracked
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures::{channel::oneshot, executor::block_on};

    use super::*;
    use crate::apps::{App, Module};

    fn apps() -> AppRegistry {
        AppRegistry::new(
            vec![
                App::new("admin", "/admin")
                    .module(Module::new("users", ["/users"]))
                    .dynamic_module("pages"),
                App::new("front", "/"),
            ],
            &[],
        )
        .unwrap()
    }

    fn counting_loader(calls: Rc<Cell<usize>>) -> LazyLoader {
        let app_calls = calls.clone();
        LazyLoader::new(
            apps(),
            Rc::new(move |_: &str| {
                app_calls.set(app_calls.get() + 1);
                future::ready(Ok::<(), LoadError>(()))
            }),
            Rc::new(move |_: &str, _: &str| {
                calls.set(calls.get() + 1);
                future::ready(Ok::<(), LoadError>(()))
            }),
        )
    }

    #[test]
    fn non_module_routes_are_not_lazy() {
        let loader = LazyLoader::new(apps(), Rc::new(NoopLoader), Rc::new(NoopLoader));
        assert!(loader.plan_load(Some("admin"), "/settings").is_none());
        assert!(loader.plan_load(Some("front"), "/users").is_none());
        assert!(loader.plan_load(None, "/users").is_none());
    }

    #[test]
    fn plans_app_and_module() {
        let loader = LazyLoader::new(apps(), Rc::new(NoopLoader), Rc::new(NoopLoader));
        let plan = loader.plan_load(Some("admin"), "/users/42").unwrap();
        assert_eq!(plan.module(), "users");
        assert_eq!(
            plan.pending(),
            [
                LoadOperation::App {
                    app: String::from("admin")
                },
                LoadOperation::Module {
                    app: String::from("admin"),
                    module: String::from("users")
                },
            ]
        );

        let dynamic = loader.plan_dynamic(Some("admin")).unwrap();
        assert_eq!(dynamic.module(), "pages");
        assert!(loader.plan_dynamic(Some("front")).is_none());
    }

    #[test]
    fn commits_and_skips_loaded() {
        let calls = Rc::new(Cell::new(0));
        let loader = Rc::new(counting_loader(calls.clone()));

        let plan = loader.plan_load(Some("admin"), "/users/42").unwrap();
        block_on(loader.run(&plan)).unwrap();
        assert_eq!(calls.get(), 2);

        let loaded = loader.loaded();
        assert!(loaded.contains_app("admin"));
        assert!(loaded.contains_module("admin", "users"));

        let sibling = loader.plan_load(Some("admin"), "/users/7/edit").unwrap();
        assert!(sibling.is_ready());

        // only the dynamic module is missing
        assert_eq!(loader.plan_dynamic(Some("admin")).unwrap().pending().len(), 1);
    }

    #[test]
    fn overlapping_runs_share_loads() {
        let calls = Rc::new(Cell::new(0));
        let (tx, rx) = oneshot::channel::<()>();
        let rx = RefCell::new(Some(rx));

        let counted = calls.clone();
        let loader = Rc::new(LazyLoader::new(
            apps(),
            Rc::new(NoopLoader),
            Rc::new(move |_: &str, _: &str| {
                counted.set(counted.get() + 1);
                let rx = rx.borrow_mut().take();
                async move {
                    if let Some(rx) = rx {
                        rx.await.map_err(|e| LoadError::new("admin/users", e))?;
                    }
                    Ok::<(), LoadError>(())
                }
            }),
        ));

        let plan = loader.plan_load(Some("admin"), "/users").unwrap();
        let first = loader.run(&plan);
        let second = loader.run(&plan);
        assert_eq!(calls.get(), 1);
        assert!(loader.is_in_flight(&plan.pending()[1]));

        tx.send(()).unwrap();
        block_on(async {
            first.await.unwrap();
            second.await.unwrap();
        });
        assert_eq!(calls.get(), 1);
        assert!(!loader.is_in_flight(&plan.pending()[1]));
    }

    #[test]
    fn failures_are_not_committed() {
        let loader = Rc::new(LazyLoader::new(
            apps(),
            Rc::new(NoopLoader),
            Rc::new(|app: &str, module: &str| {
                future::ready(Err::<(), LoadError>(LoadError::new(
                    format!("{app}/{module}"),
                    "offline",
                )))
            }),
        ));

        let plan = loader.plan_load(Some("admin"), "/users").unwrap();
        let error = block_on(loader.run(&plan)).unwrap_err();
        assert_eq!(error.target, "admin/users");
        assert!(!loader.loaded().contains_module("admin", "users"));
        assert!(!loader.plan_load(Some("admin"), "/users").unwrap().is_ready());
    }

    #[test]
    fn loaded_app_survives_a_failed_module() {
        let loader = Rc::new(LazyLoader::new(
            apps(),
            Rc::new(NoopLoader),
            Rc::new(|_: &str, _: &str| {
                future::ready(Err::<(), LoadError>(LoadError::new("admin/users", "offline")))
            }),
        ));

        let plan = loader.plan_load(Some("admin"), "/users").unwrap();
        assert!(block_on(loader.run(&plan)).is_err());
        assert!(loader.loaded().contains_app("admin"));
        assert!(!loader.loaded().contains_module("admin", "users"));

        // a retry only needs the module
        let retry = loader.plan_load(Some("admin"), "/users").unwrap();
        assert_eq!(
            retry.pending(),
            [LoadOperation::Module {
                app: String::from("admin"),
                module: String::from("users")
            }]
        );
    }

    #[test]
    fn prefetch_loads_without_planning_twice() {
        let calls = Rc::new(Cell::new(0));
        let loader = Rc::new(counting_loader(calls.clone()));

        block_on(loader.prefetch(Some("admin"), "/users")).unwrap();
        block_on(loader.prefetch(Some("admin"), "/users/1")).unwrap();
        block_on(loader.prefetch(Some("admin"), "/settings")).unwrap();
        assert_eq!(calls.get(), 2);
    }
}

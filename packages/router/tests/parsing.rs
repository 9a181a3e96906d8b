use std::{cell::RefCell, rc::Rc};

use futures::{channel::oneshot, executor::LocalPool, task::LocalSpawnExt};
use mosaic_router::{helpers::concat_route, prelude::*};
use pretty_assertions::assert_eq;
use proptest::{prelude::*, sample::select};

const LOCALES: [&str; 2] = ["en", "ar"];

fn locales() -> Vec<String> {
    LOCALES.map(String::from).to_vec()
}

fn apps() -> AppRegistry {
    AppRegistry::new(
        vec![App::new("admin", "/admin"), App::new("front", "/")],
        &locales(),
    )
    .unwrap()
}

/// A path segment that is neither a locale code nor an app base path.
fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,7}".prop_filter("reserved segment", |s| {
        !matches!(s.as_str(), "en" | "ar" | "admin")
    })
}

/// One action of a randomized navigation session.
#[derive(Clone, Debug)]
enum Step {
    /// Navigate to one of the session's targets.
    Go(prop::sample::Index),
    /// Let every pending module load complete.
    Release,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => any::<prop::sample::Index>().prop_map(Step::Go),
        1 => Just(Step::Release),
    ]
}

proptest! {
    #[test]
    fn concat_route_is_idempotent(pieces in prop::collection::vec("[a-z/]{0,12}", 0..5)) {
        let once = concat_route(&pieces);
        prop_assert_eq!(concat_route([&once]), once.clone());
        prop_assert!(once.starts_with('/'));
        prop_assert!(!once.contains("//"));
        prop_assert!(once == "/" || !once.ends_with('/'));
    }

    #[test]
    fn patterns_capture_what_they_were_filled_with(
        parts in prop::collection::vec((segment(), "[A-Za-z0-9_.~-]{1,10}"), 1..5)
    ) {
        let pattern = concat_route(
            parts
                .iter()
                .enumerate()
                .map(|(i, (literal, _))| format!("{literal}/:p{i}")),
        );
        let path = concat_route(
            parts
                .iter()
                .map(|(literal, value)| format!("{literal}/{value}")),
        );

        let params = PathMatcher::default().match_path(&pattern, &path).unwrap().unwrap();
        let expected: Params = parts
            .iter()
            .enumerate()
            .map(|(i, (_, value))| (format!("p{i}"), value.clone()))
            .collect();
        prop_assert_eq!(params, expected);
    }

    #[test]
    fn built_locations_parse_back(
        locale in prop::option::of(select(LOCALES.to_vec())),
        app in prop::option::of(select(vec!["admin", "front"])),
        route in prop::collection::vec(segment(), 0..4),
        app_first in any::<bool>(),
    ) {
        let apps = apps();
        let route = concat_route(&route);
        let locale_segment = locale.unwrap_or_default();
        let app_segment = apps.base_path_of(app);
        let raw = if app_first {
            concat_route([app_segment, locale_segment, route.as_str()])
        } else {
            concat_route([locale_segment, app_segment, route.as_str()])
        };

        let location = parse_location(&raw, "/", &locales(), &apps);
        prop_assert_eq!(location.locale.as_deref(), locale);
        prop_assert_eq!(location.app.as_deref(), Some(app.unwrap_or("front")));
        prop_assert_eq!(location.route, route);
    }

    #[test]
    fn base_path_is_stripped_per_segment(route in prop::collection::vec(segment(), 0..4)) {
        let apps = apps();
        let route = concat_route(&route);

        let location = parse_location(&concat_route(["/shop", route.as_str()]), "/shop", &locales(), &apps);
        prop_assert_eq!(location.route, route.clone());

        // `/shopping` does not live under `/shop`
        let location = parse_location(&concat_route(["/shopping", route.as_str()]), "/shop", &locales(), &apps);
        prop_assert_eq!(location.route, concat_route(["/shopping", route.as_str()]));
    }

    #[test]
    fn every_render_follows_its_navigation(
        names in prop::collection::hash_set(segment(), 1..6),
        steps in prop::collection::vec(step(), 1..16),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let routes = RouteRegistry::new(
            vec![
                App::new("admin", "/admin")
                    .module(Module::new("users", ["/users"]))
                    .dynamic_module("pages"),
                App::new("front", "/"),
            ],
            locales(),
            Rc::new(UrlPatternCompiler),
        )
        .unwrap();
        routes
            .register(
                None,
                Layout::full_page(),
                names.iter().map(|name| Route::new(format!("/{name}"), name.clone())),
            )
            .unwrap();
        routes
            .register(
                Some("admin"),
                Layout::full_page(),
                [
                    Route::new("/", String::from("dashboard")),
                    Route::new("/users", String::from("users")),
                    Route::new("/users/:id", String::from("user")),
                ],
            )
            .unwrap();

        // every module load waits for a release; `pages` registers its routes once loaded
        let gates: Rc<RefCell<Vec<oneshot::Sender<()>>>> = Rc::default();
        let pending = gates.clone();
        let loader_routes = routes.clone();
        let config = RouterConfig::default()
            .locale_codes(LOCALES)
            .module_loader(move |app: &str, module: &str| {
                let (tx, rx) = oneshot::channel();
                pending.borrow_mut().push(tx);
                let target = format!("{app}/{module}");
                let app = app.to_string();
                let registry = (module == "pages").then(|| loader_routes.clone());
                async move {
                    rx.await.map_err(|e| LoadError::new(target.clone(), e))?;
                    if let Some(registry) = registry {
                        registry
                            .register(
                                Some(&app),
                                Layout::full_page(),
                                [Route::new("/pages/:slug", String::from("page"))],
                            )
                            .map_err(|e| LoadError::new(target, e))?;
                    }
                    Ok::<(), LoadError>(())
                }
            });
        let history = Rc::new(MemoryHistory::default());
        let (mut service, navigator) = RouterService::new(config, routes, history).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        navigator.events().subscribe_all(move |event| sink.borrow_mut().push(event.clone()));

        let mut pool = LocalPool::new();
        pool.spawner().spawn_local(async move { service.run().await }).unwrap();
        pool.run_until_stalled();

        let mut targets: Vec<(String, &str)> = names
            .iter()
            .map(|name| (format!("/{name}"), "front"))
            .collect();
        targets.push((String::from("/missing"), "front"));
        targets.extend(
            ["/", "/users", "/users/7", "/pages/about"].map(|path| (path.to_string(), "admin")),
        );

        let release = |gates: &RefCell<Vec<oneshot::Sender<()>>>| {
            for gate in gates.borrow_mut().drain(..) {
                gate.send(()).ok();
            }
        };
        for step in &steps {
            match step {
                Step::Go(pick) => {
                    let (path, app) = &targets[pick.index(targets.len())];
                    navigator.navigate_in(path, None, Some(*app)).unwrap();
                }
                Step::Release => release(&gates),
            }
            pool.run_until_stalled();
        }
        release(&gates);
        pool.run_until_stalled();

        let mut navigated: Option<String> = None;
        let mut rendering: Option<String> = None;
        for event in log.borrow().iter() {
            match event {
                RouterEvent::Navigating { route, .. } => navigated = Some(route.clone()),
                RouterEvent::Rendering { route, .. } => {
                    prop_assert_eq!(Some(route), navigated.as_ref());
                    rendering = Some(route.clone());
                }
                RouterEvent::Rendered { route, .. } => {
                    prop_assert_eq!(Some(route), rendering.as_ref());
                }
                _ => {}
            }
        }
        prop_assert_eq!(navigator.state().phase, Phase::Idle);
        prop_assert!(!navigator.state().loading);
    }
}

#[test]
fn locale_and_app_segments_anywhere_in_the_path() {
    let apps = apps();

    let location = parse_location("/users/en/admin", "/", &locales(), &apps);
    assert_eq!(location.locale.as_deref(), Some("en"));
    assert_eq!(location.app.as_deref(), Some("admin"));
    assert_eq!(location.route, "/users");

    let location = parse_location("/en/admin/ar/users/admin", "/", &locales(), &apps);
    assert_eq!(location.locale.as_deref(), Some("ar"));
    assert_eq!(location.app.as_deref(), Some("admin"));
    assert_eq!(location.route, "/users");
}

#[test]
fn query_and_fragment_are_split_off() {
    let location = parse_location("/ar/posts/7?sort=new&page=2#top", "/", &locales(), &apps());
    assert_eq!(
        location,
        Location {
            locale: Some(String::from("ar")),
            app: Some(String::from("front")),
            route: String::from("/posts/7"),
            query: Some(String::from("sort=new&page=2")),
            hash: Some(String::from("top")),
        }
    );
}

#[test]
fn optional_and_repeated_parameters() {
    let matcher = PathMatcher::default();

    let params = matcher
        .match_path("/posts/:page?", "/posts")
        .unwrap()
        .unwrap();
    assert!(params.is_empty());

    let params = matcher
        .match_path("/docs/:path+", "/docs/guide/routing")
        .unwrap()
        .unwrap();
    assert_eq!(params.get("path"), Some("guide/routing"));

    assert_eq!(matcher.match_path("/docs/:path+", "/docs").unwrap(), None);
    assert_eq!(matcher.cached(), 2);
}

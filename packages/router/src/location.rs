//! Decomposition of raw URL paths into locale, app and app-relative route.

use crate::{
    apps::AppRegistry,
    helpers::{concat_route, split_location},
};

/// A raw location broken into its parts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// The locale code present in the path, if any.
    pub locale: Option<String>,
    /// The app owning the path: the app named by the path, or the default app.
    pub app: Option<String>,
    /// The app-relative route. Always starts with `/`.
    pub route: String,
    /// The query string, without the leading `?`.
    pub query: Option<String>,
    /// The fragment, without the leading `#`.
    pub hash: Option<String>,
}

/// Parse `raw` (`{base}/{locale?}/{app?}/{route}{?query}{#hash}`).
///
/// Every segment is classified, left to right: a segment equal to a locale code records the
/// locale, else a segment equal to an app's base path records the app, else it is appended to the
/// route. Locale and app segments therefore compose in either order, and a route segment can
/// never be spelled like a locale code or an app base path. Comparisons ignore ASCII case, like
/// route matching does; the recorded locale is the configured code.
///
/// If apps are registered but none is named by the path, the app rooted at `/` owns it.
///
/// ```rust
/// # use mosaic_router::{apps::{App, AppRegistry}, location::parse_location};
/// let locales = vec![String::from("en"), String::from("ar")];
/// let apps = AppRegistry::new(vec![App::new("admin", "/admin"), App::new("front", "/")], &locales)
///     .unwrap();
///
/// let location = parse_location("/ar/admin/users/42", "/", &locales, &apps);
/// assert_eq!(location.locale.as_deref(), Some("ar"));
/// assert_eq!(location.app.as_deref(), Some("admin"));
/// assert_eq!(location.route, "/users/42");
/// ```
#[must_use]
pub fn parse_location(
    raw: &str,
    base_path: &str,
    locale_codes: &[String],
    apps: &AppRegistry,
) -> Location {
    let (path, query, hash) = split_location(raw);
    let path = strip_base_path(path, base_path);

    let mut locale = None;
    let mut app = None;
    let mut route = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if let Some(code) = locale_codes
            .iter()
            .find(|code| code.eq_ignore_ascii_case(segment))
        {
            locale = Some(code.clone());
        } else if let Some(found) = apps.by_segment(segment) {
            app = Some(found.name().to_string());
        } else {
            route.push(segment);
        }
    }

    if app.is_none() {
        app = apps.default_app().map(|app| app.name().to_string());
    }

    Location {
        locale,
        app,
        route: concat_route(route),
        query: query.map(str::to_string),
        hash: hash.map(str::to_string),
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> &'a str {
    let base = base_path.trim_end_matches('/');
    if base.is_empty() {
        return path;
    }

    match path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Builds and parses locations for one router configuration.
#[derive(Clone, Debug)]
pub struct Locations {
    base_path: String,
    locale_codes: Vec<String>,
    apps: AppRegistry,
}

impl Locations {
    pub(crate) fn new(base_path: &str, locale_codes: Vec<String>, apps: AppRegistry) -> Self {
        Self {
            base_path: concat_route([base_path]),
            locale_codes,
            apps,
        }
    }

    /// The configured base path.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The configured locale codes.
    #[must_use]
    pub fn locale_codes(&self) -> &[String] {
        &self.locale_codes
    }

    /// The registered apps.
    #[must_use]
    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    /// Parse a raw location. See [`parse_location`].
    #[must_use]
    pub fn parse(&self, raw: &str) -> Location {
        parse_location(raw, &self.base_path, &self.locale_codes, &self.apps)
    }

    /// Prefix `path` with the base path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        let (path, query, hash) = split_location(path);
        let mut url = concat_route([self.base_path.as_str(), path]);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        if let Some(hash) = hash {
            url.push('#');
            url.push_str(hash);
        }
        url
    }

    /// Build the raw location of `route` inside `app`, optionally prefixed by `locale`.
    ///
    /// `route` may carry a query string and a fragment.
    #[must_use]
    pub fn build(&self, route: &str, locale: Option<&str>, app: Option<&str>) -> String {
        let base = self.apps.base_path_of(app);
        self.url(&concat_route_keeping_extras(
            [locale.unwrap_or_default(), base],
            route,
        ))
    }

    /// The path routes are matched against: the app base path followed by the route.
    #[must_use]
    pub fn match_path(&self, location: &Location) -> String {
        concat_route([
            self.apps.base_path_of(location.app.as_deref()),
            location.route.as_str(),
        ])
    }
}

/// Like [`concat_route`], but keeps the query and fragment of `route`.
fn concat_route_keeping_extras<'a>(
    prefixes: impl IntoIterator<Item = &'a str>,
    route: &'a str,
) -> String {
    let (path, query, hash) = split_location(route);
    let mut out = concat_route(prefixes.into_iter().chain([path]));
    if let Some(query) = query {
        out.push('?');
        out.push_str(query);
    }
    if let Some(hash) = hash {
        out.push('#');
        out.push_str(hash);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::App;

    fn locales() -> Vec<String> {
        vec![String::from("en"), String::from("ar")]
    }

    fn apps() -> AppRegistry {
        AppRegistry::new(
            vec![App::new("admin", "/admin"), App::new("front", "/")],
            &locales(),
        )
        .unwrap()
    }

    fn parse(raw: &str) -> Location {
        parse_location(raw, "/", &locales(), &apps())
    }

    #[test]
    fn locale_then_app() {
        let location = parse("/ar/admin/users/42");
        assert_eq!(location.locale.as_deref(), Some("ar"));
        assert_eq!(location.app.as_deref(), Some("admin"));
        assert_eq!(location.route, "/users/42");
    }

    #[test]
    fn app_then_locale_is_equivalent() {
        let a = parse("/admin/en/users");
        let b = parse("/en/admin/users");
        assert_eq!(a, b);
        assert_eq!(a.route, "/users");
    }

    #[test]
    fn falls_back_to_default_app() {
        let location = parse("/users");
        assert_eq!(location.locale, None);
        assert_eq!(location.app.as_deref(), Some("front"));
        assert_eq!(location.route, "/users");
    }

    #[test]
    fn no_apps_registered() {
        let location = parse_location("/en/users", "/", &locales(), &AppRegistry::default());
        assert_eq!(location.app, None);
        assert_eq!(location.route, "/users");
    }

    #[test]
    fn root_paths() {
        assert_eq!(parse("/").route, "/");
        assert_eq!(parse("").route, "/");

        let location = parse("/en");
        assert_eq!(location.locale.as_deref(), Some("en"));
        assert_eq!(location.route, "/");
    }

    #[test]
    fn every_segment_is_classified() {
        let location = parse("/users/en/admin");
        assert_eq!(location.locale.as_deref(), Some("en"));
        assert_eq!(location.app.as_deref(), Some("admin"));
        assert_eq!(location.route, "/users");

        // the last locale segment wins
        let location = parse("/en/x/ar");
        assert_eq!(location.locale.as_deref(), Some("ar"));
        assert_eq!(location.route, "/x");
    }

    #[test]
    fn classification_ignores_case() {
        let location = parse("/AR/Admin/Users");
        assert_eq!(location.locale.as_deref(), Some("ar"));
        assert_eq!(location.app.as_deref(), Some("admin"));
        assert_eq!(location.route, "/Users");
    }

    #[test]
    fn strips_base_path_query_and_hash() {
        let location = parse_location("/shop/en/admin/users?page=2#top", "/shop", &locales(), &apps());
        assert_eq!(location.locale.as_deref(), Some("en"));
        assert_eq!(location.app.as_deref(), Some("admin"));
        assert_eq!(location.route, "/users");
        assert_eq!(location.query.as_deref(), Some("page=2"));
        assert_eq!(location.hash.as_deref(), Some("top"));

        // only whole segments are stripped
        let location = parse_location("/shopping", "/shop", &locales(), &apps());
        assert_eq!(location.route, "/shopping");
    }

    #[test]
    fn builds_locations() {
        let locations = Locations::new("/shop", locales(), apps());
        assert_eq!(locations.url("/users"), "/shop/users");
        assert_eq!(
            locations.build("/users/42?tab=1", Some("ar"), Some("admin")),
            "/shop/ar/admin/users/42?tab=1"
        );
        assert_eq!(locations.build("/", None, Some("front")), "/shop");
        assert_eq!(
            locations.match_path(&locations.parse("/shop/en/admin/users")),
            "/admin/users"
        );
    }
}

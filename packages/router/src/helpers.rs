/// Join route pieces into a single normalized path.
///
/// Every piece may or may not carry leading and trailing slashes. The result always starts with a
/// single `/`, never ends with one (unless it is the root) and never contains empty segments.
///
/// ```rust
/// # use mosaic_router::helpers::concat_route;
/// assert_eq!(concat_route(["/en", "admin/", "/users/42"]), "/en/admin/users/42");
/// assert_eq!(concat_route(["", "/"]), "/");
/// ```
#[must_use]
pub fn concat_route<I, S>(pieces: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut route = String::new();
    for piece in pieces {
        for segment in piece.as_ref().split('/').filter(|s| !s.is_empty()) {
            route.push('/');
            route.push_str(segment);
        }
    }

    if route.is_empty() {
        route.push('/');
    }
    route
}

/// Split a raw location into its path, query and fragment.
///
/// The markers (`?`, `#`) are not part of the returned query and fragment. Empty queries and
/// fragments are reported as [`None`].
#[must_use]
pub fn split_location(raw: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, hash) = match raw.split_once('#') {
        Some((rest, hash)) => (rest, Some(hash)),
        None => (raw, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    (
        path,
        query.filter(|q| !q.is_empty()),
        hash.filter(|h| !h.is_empty()),
    )
}

/// The first segment of a route, as a normalized path (`/users/42` -> `/users`).
#[must_use]
pub(crate) fn first_segment(route: &str) -> String {
    concat_route(route.split('/').find(|s| !s.is_empty()))
}

/// A fresh token, used to give a render a distinct identity.
#[must_use]
pub(crate) fn render_token() -> String {
    format!("{:016x}", rand::random::<u64>())
}

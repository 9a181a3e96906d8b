use std::{cell::RefCell, rc::Rc};

use tracing::error;
use url::Url;

use crate::History;

// Only used to resolve relative paths, never exposed.
const RESOLVE_ORIGIN: &str = "mosaic://index.html";

struct MemoryHistoryState {
    current: String,
    history: Vec<String>,
    future: Vec<String>,
}

/// A [`History`] that stores all navigation information in memory.
pub struct MemoryHistory {
    state: RefCell<MemoryHistoryState>,
    updater: RefCell<Option<Rc<dyn Fn()>>>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::with_initial_path("/")
    }
}

impl MemoryHistory {
    /// Create a [`MemoryHistory`] starting at `path`.
    ///
    /// ```rust
    /// # use mosaic_history::{History, MemoryHistory};
    /// let history = MemoryHistory::with_initial_path("/en/admin/users");
    /// assert_eq!(history.current_location(), "/en/admin/users");
    /// assert_eq!(history.can_go_back(), false);
    /// ```
    pub fn with_initial_path(path: impl ToString) -> Self {
        let mut current = path.to_string();
        if !current.starts_with('/') {
            current.insert(0, '/');
        }

        Self {
            state: MemoryHistoryState {
                current,
                history: Vec::new(),
                future: Vec::new(),
            }
            .into(),
            updater: RefCell::new(None),
        }
    }

    /// Move through the history the way a user would with the browser buttons.
    ///
    /// Unlike [`History::go_back`] and [`History::go_forward`], which are called by the router
    /// itself, this notifies the registered updater, so the router sees a foreign navigation.
    /// A negative `delta` goes back, a positive one forward.
    pub fn traverse(&self, delta: isize) {
        for _ in 0..delta.unsigned_abs() {
            if delta < 0 {
                self.go_back();
            } else {
                self.go_forward();
            }
        }

        let updater = self.updater.borrow().clone();
        if let Some(updater) = updater {
            updater();
        }
    }

    fn resolve(current: &str, path: &str) -> Option<String> {
        let url = Url::parse(RESOLVE_ORIGIN)
            .and_then(|origin| origin.join(current))
            .and_then(|current| current.join(path))
            .ok()?;

        let mut location = url.path().to_string();
        if let Some(query) = url.query() {
            location.push('?');
            location.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            location.push('#');
            location.push_str(fragment);
        }
        Some(location)
    }
}

impl History for MemoryHistory {
    fn current_location(&self) -> String {
        self.state.borrow().current.clone()
    }

    fn can_go_back(&self) -> bool {
        !self.state.borrow().history.is_empty()
    }

    fn go_back(&self) {
        let mut write = self.state.borrow_mut();
        if let Some(last) = write.history.pop() {
            let old = std::mem::replace(&mut write.current, last);
            write.future.push(old);
        }
    }

    fn can_go_forward(&self) -> bool {
        !self.state.borrow().future.is_empty()
    }

    fn go_forward(&self) {
        let mut write = self.state.borrow_mut();
        if let Some(next) = write.future.pop() {
            let old = std::mem::replace(&mut write.current, next);
            write.history.push(old);
        }
    }

    fn push(&self, path: String) {
        if path.starts_with("//") {
            error!(r#"cannot navigate to paths starting with "//", path: {path}"#);
            return;
        }

        let mut write = self.state.borrow_mut();
        let Some(new) = Self::resolve(&write.current, &path) else {
            error!("cannot resolve path: {path}");
            return;
        };

        // don't push the same location twice
        if write.current == new {
            return;
        }
        let old = std::mem::replace(&mut write.current, new);
        write.history.push(old);
        write.future.clear();
    }

    fn replace(&self, path: String) {
        if path.starts_with("//") {
            error!(r#"cannot navigate to paths starting with "//", path: {path}"#);
            return;
        }

        let mut write = self.state.borrow_mut();
        if let Some(new) = Self::resolve(&write.current, &path) {
            write.current = new;
        }
    }

    fn updater(&self, callback: Rc<dyn Fn()>) {
        *self.updater.borrow_mut() = Some(callback);
    }
}

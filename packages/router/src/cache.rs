//! Reuse of render outputs on history traversal.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use tracing::trace;

use crate::{matcher::Params, state::RenderOutput};

/// The last output produced for every `(locale, compiled path)` pair.
///
/// A pure optimization: a miss, or a disabled cache, only means the output is produced again.
pub struct RenderCache<T> {
    enabled: bool,
    entries: RefCell<HashMap<(String, String), Rc<RenderOutput<T>>>>,
}

impl<T> RenderCache<T> {
    /// Create an empty cache. A disabled cache never stores anything.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Whether the cache stores outputs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The output last stored for the pair.
    #[must_use]
    pub fn get(&self, locale: &str, compiled_path: &str) -> Option<Rc<RenderOutput<T>>> {
        self.entries
            .borrow()
            .get(&(locale.to_string(), compiled_path.to_string()))
            .cloned()
    }

    /// The output last stored for the pair, if it was produced for the same parameters.
    ///
    /// Routes with parameters share a compiled path, so an entry for `/users/1` must not be
    /// reused for `/users/2`.
    #[must_use]
    pub fn lookup(
        &self,
        locale: &str,
        compiled_path: &str,
        params: &Params,
    ) -> Option<Rc<RenderOutput<T>>> {
        let hit = self
            .get(locale, compiled_path)
            .filter(|output| output.params == *params);
        trace!(locale, compiled_path, hit = hit.is_some(), "render cache lookup");
        hit
    }

    /// Store `output` under its own locale and compiled path.
    pub fn put(&self, output: Rc<RenderOutput<T>>) {
        if !self.enabled || output.compiled_path.is_empty() {
            return;
        }

        let key = (output.locale.clone(), output.compiled_path.clone());
        self.entries.borrow_mut().insert(key, output);
    }

    /// The number of stored outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

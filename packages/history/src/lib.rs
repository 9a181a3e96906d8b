//! History Integration
//!
//! The mosaic router relies on a [`History`] to store the current URL, and possibly a history
//! (i.e. a browsers back button) and future (i.e. a browsers forward button).
//!
//! To integrate the router with any kind of history, all you have to do is implement the
//! [`History`] trait. This crate ships an in-memory implementation, [`MemoryHistory`], which is
//! what tests and non-browser hosts use.
#![deny(missing_docs)]

use std::rc::Rc;

mod memory;
pub use memory::*;

/// An integration with some kind of navigation history.
///
/// Depending on your use case, your implementation may deviate from the described procedure. This
/// is fine, as long as `current_location` matches the described format.
///
/// The described behaviors are designed to mimic a web browser, which most users should already
/// know. Deviations might confuse them.
pub trait History {
    /// Get the current location, as a browser would report it.
    ///
    /// **Must start** with `/`. Contains the configured base path (if any), the path, and the
    /// query string and fragment when present.
    ///
    /// ```rust
    /// # use mosaic_history::{History, MemoryHistory};
    /// let history = MemoryHistory::default();
    /// assert_eq!(history.current_location(), "/");
    ///
    /// history.push(String::from("/path?page=2"));
    /// assert_eq!(history.current_location(), "/path?page=2");
    /// ```
    #[must_use]
    fn current_location(&self) -> String;

    /// Check whether there is a previous page to navigate back to.
    ///
    /// If a [`History`] cannot know this, it should return [`true`].
    #[must_use]
    fn can_go_back(&self) -> bool {
        true
    }

    /// Go back to a previous page.
    ///
    /// If a [`History`] cannot go to a previous page, it should do nothing. This method might be
    /// called, even if `can_go_back` returns [`false`].
    ///
    /// ```rust
    /// # use mosaic_history::{History, MemoryHistory};
    /// let history = MemoryHistory::default();
    /// history.go_back();
    /// assert_eq!(history.current_location(), "/");
    ///
    /// history.push(String::from("/some-other-page"));
    /// history.go_back();
    /// assert_eq!(history.current_location(), "/");
    /// ```
    fn go_back(&self);

    /// Check whether there is a future page to navigate forward to.
    ///
    /// If a [`History`] cannot know this, it should return [`true`].
    #[must_use]
    fn can_go_forward(&self) -> bool {
        true
    }

    /// Go forward to a future page.
    ///
    /// If a [`History`] cannot go to a future page, it should do nothing. This method might be
    /// called, even if `can_go_forward` returns [`false`].
    fn go_forward(&self);

    /// Go to another page.
    ///
    /// This should do three things:
    /// 1. Merge the current URL with the `path` parameter (which may also include a query part).
    /// 2. Add the previous URL to the navigation history.
    /// 3. Clear the navigation future.
    fn push(&self, path: String);

    /// Replace the current page with another one.
    ///
    /// In contrast to the `push` function, the navigation history and future should stay
    /// untouched.
    fn replace(&self, path: String);

    /// Provide the [`History`] with an update callback.
    ///
    /// Some [`History`]s receive URL updates from outside the router (a browser's back button,
    /// for example). When such updates are received, they should call `callback`, which will make
    /// the router perform a back/forward transition.
    #[allow(unused_variables)]
    fn updater(&self, callback: Rc<dyn Fn()>) {}
}

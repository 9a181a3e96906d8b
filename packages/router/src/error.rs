//! Errors reported by the router.

/// A [`Result`](std::result::Result) defaulting to [`RouterError`].
pub type Result<T, E = RouterError> = std::result::Result<T, E>;

/// Everything that can go wrong while configuring the router or registering routes.
///
/// Navigation itself never fails: an unmatched path resolves to the configured
/// [`NotFound`](crate::router_cfg::NotFound) behavior, and loader failures are reported through
/// [`RouterEvent::LoadFailed`](crate::events::RouterEvent::LoadFailed).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The route pattern cannot be compiled into a matcher.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A pattern names the same parameter twice.
    #[error("route pattern `{pattern}` declares parameter `{name}` more than once")]
    DuplicateParameter {
        /// The offending pattern.
        pattern: String,
        /// The repeated parameter name.
        name: String,
    },

    /// Two apps share a name.
    #[error("app `{0}` is registered more than once")]
    DuplicateApp(String),

    /// Two apps share a base path.
    #[error("base path `{0}` is claimed by more than one app")]
    DuplicateBasePath(String),

    /// An app base path spans more than one URL segment.
    #[error("base path `{base_path}` of app `{app}` must be a single segment")]
    InvalidBasePath {
        /// The app's name.
        app: String,
        /// The rejected base path.
        base_path: String,
    },

    /// An app with the given name does not exist.
    #[error("no app named `{0}` is registered")]
    UnknownApp(String),

    /// An app base path is lexically identical to a locale code, which makes URLs ambiguous.
    #[error("base path of app `{app}` collides with locale code `{locale}`")]
    LocaleCollision {
        /// The app's name.
        app: String,
        /// The locale code its base path collides with.
        locale: String,
    },

    /// The locale code is not part of the configured locale codes.
    #[error("locale code `{0}` is not configured")]
    UnknownLocale(String),

    /// An app or module loader failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// The failure of an [`AppLoader`](crate::lazy::AppLoader) or
/// [`ModuleLoader`](crate::lazy::ModuleLoader).
///
/// Cloneable, because every navigation waiting on the same in-flight load observes the same
/// outcome.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load `{target}`: {message}")]
pub struct LoadError {
    /// The app (`admin`) or module (`admin/users`) that failed to load.
    pub target: String,
    /// A human readable description of the failure.
    pub message: String,
}

impl LoadError {
    /// Create a new [`LoadError`].
    pub fn new(target: impl Into<String>, message: impl ToString) -> Self {
        Self {
            target: target.into(),
            message: message.to_string(),
        }
    }
}

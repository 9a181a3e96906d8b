//! Route pattern compilation and matching.
//!
//! A route pattern is a path made of literal segments and named parameters:
//!
//! | Token      | Matches                                   |
//! |------------|-------------------------------------------|
//! | `:name`    | exactly one segment                       |
//! | `:name?`   | zero or one segment                       |
//! | `:name+`   | one or more slash separated segments      |
//! | `:name*`   | zero or more slash separated segments     |
//!
//! A parameter may carry an inline constraint, `:localeCode(en|ar)?`, which replaces the default
//! "any segment" expression. Constraints must not contain `/`.
//!
//! Patterns are matched case-insensitively, and a trailing slash on the path is always accepted.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use regex::{Regex, RegexBuilder};
use tracing::trace;

use crate::error::{Result, RouterError};

/// The parameters captured by a successful match, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Get the raw (still percent-encoded) value of a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the percent-decoded value of a parameter.
    ///
    /// Returns [`None`] if the parameter is absent or not valid UTF-8 once decoded.
    #[must_use]
    pub fn decoded(&self, key: &str) -> Option<String> {
        let raw = self.get(key)?;
        urlencoding::decode(raw).ok().map(|v| v.into_owned())
    }

    /// Iterate over all captured parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameter was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, key: String, value: String) {
        self.0.push((key, value));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A route pattern translated into a regular expression plus its ordered parameter names.
#[derive(Clone)]
pub struct CompiledPattern {
    regex: Regex,
    keys: Vec<String>,
    named_groups: bool,
}

impl CompiledPattern {
    /// Wrap a custom regular expression.
    ///
    /// Capture group `n + 1` provides the value of `keys[n]`.
    pub fn new(regex: Regex, keys: Vec<String>) -> Self {
        Self {
            regex,
            keys,
            named_groups: false,
        }
    }

    /// The compiled expression.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// The parameter names, in declaration order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Run the pattern against `path`.
    ///
    /// Returns [`None`] if the path does not match. Optional parameters that matched nothing are
    /// left out of the returned [`Params`].
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;

        let mut params = Params::default();
        for (index, key) in self.keys.iter().enumerate() {
            let value = if self.named_groups {
                captures.name(&group_name(index))
            } else {
                captures.get(index + 1)
            };

            if let Some(value) = value {
                params.push(key.clone(), value.as_str().to_string());
            }
        }

        Some(params)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("regex", &self.regex.as_str())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Turns a route pattern into a [`CompiledPattern`].
///
/// The router uses [`UrlPatternCompiler`] unless another compiler is configured through
/// [`RouterConfig::pattern_compiler`](crate::router_cfg::RouterConfig::pattern_compiler).
pub trait PatternCompiler {
    /// Compile `pattern`, failing if it is malformed.
    fn compile(&self, pattern: &str) -> Result<CompiledPattern>;
}

impl<F> PatternCompiler for F
where
    F: Fn(&str) -> Result<CompiledPattern>,
{
    fn compile(&self, pattern: &str) -> Result<CompiledPattern> {
        self(pattern)
    }
}

/// The default [`PatternCompiler`], implementing the `:name`, `:name?`, `:name+` and `:name*`
/// mini language.
#[derive(Clone, Copy, Debug, Default)]
pub struct UrlPatternCompiler;

impl PatternCompiler for UrlPatternCompiler {
    fn compile(&self, pattern: &str) -> Result<CompiledPattern> {
        let invalid = |reason: &str| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut keys: Vec<String> = Vec::new();
        let mut source = String::from("^");
        let mut literal_start = 0;
        let mut i = 0;

        while i < pattern.len() {
            let rest = &pattern[i..];
            if !rest.starts_with(':') {
                i += rest.chars().next().map_or(1, char::len_utf8);
                continue;
            }

            let name_len = rest[1..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len() - 1);

            // a lone colon is a literal
            if name_len == 0 {
                i += 1;
                continue;
            }

            let name = &rest[1..=name_len];
            let mut end = i + 1 + name_len;

            let mut constraint = None;
            if pattern[end..].starts_with('(') {
                let close = group_end(pattern, end)
                    .ok_or_else(|| invalid("unclosed parameter constraint"))?;
                let inner = &pattern[end + 1..close];
                if inner.is_empty() {
                    return Err(invalid("empty parameter constraint"));
                }
                if inner.contains('/') {
                    return Err(invalid("parameter constraints cannot contain `/`"));
                }
                constraint = Some(inner);
                end = close + 1;
            }

            let modifier = pattern[end..]
                .chars()
                .next()
                .filter(|c| matches!(c, '?' | '+' | '*'));
            if modifier.is_some() {
                end += 1;
            }

            let repeat = matches!(modifier, Some('+' | '*'));
            let optional = matches!(modifier, Some('?' | '*'));
            // fold the preceding slash into the optional group
            let prefixed = optional && i > literal_start && pattern[..i].ends_with('/');
            let literal_end = if prefixed { i - 1 } else { i };

            if keys.iter().any(|k| k == name) {
                return Err(RouterError::DuplicateParameter {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }

            source.push_str(&regex::escape(&pattern[literal_start..literal_end]));
            source.push_str(&segment_source(
                keys.len(),
                constraint,
                repeat,
                optional,
                prefixed,
            ));
            keys.push(name.to_string());

            i = end;
            literal_start = end;
        }

        let mut tail = &pattern[literal_start..];
        if literal_start > 0 || tail.len() > 1 {
            tail = tail.strip_suffix('/').unwrap_or(tail);
        }
        source.push_str(&regex::escape(tail));
        source.push_str("(?:/)?$");

        trace!(pattern, source, "compiled route pattern");

        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|err| invalid(&err.to_string()))?;

        Ok(CompiledPattern {
            regex,
            keys,
            named_groups: true,
        })
    }
}

fn group_name(index: usize) -> String {
    format!("p{index}")
}

/// The regular expression for a single parameter token.
fn segment_source(
    index: usize,
    constraint: Option<&str>,
    repeat: bool,
    optional: bool,
    prefixed: bool,
) -> String {
    let segment = match constraint {
        Some(constraint) => format!("(?:{constraint})"),
        None => String::from("[^/]+?"),
    };
    let name = group_name(index);

    let mut capture = if repeat {
        format!("(?P<{name}>{segment}(?:/{segment})*)")
    } else {
        format!("(?P<{name}>{segment})")
    };
    if optional && prefixed {
        capture = format!("(?:/{capture})");
    }
    if optional {
        capture.push('?');
    }
    capture
}

/// Find the `)` closing the `(` at `open`.
fn group_end(pattern: &str, open: usize) -> Option<usize> {
    let bytes = pattern.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Matches paths against patterns, compiling every distinct pattern once.
///
/// Compiled patterns are cached by their exact text for the lifetime of the matcher. Patterns are
/// static after registration, so the cache is never invalidated.
pub struct PathMatcher {
    compiler: Rc<dyn PatternCompiler>,
    cache: RefCell<HashMap<String, Rc<CompiledPattern>>>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(Rc::new(UrlPatternCompiler))
    }
}

impl PathMatcher {
    /// Create a matcher using `compiler`.
    pub fn new(compiler: Rc<dyn PatternCompiler>) -> Self {
        Self {
            compiler,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Get the compiled form of `pattern`, compiling and caching it on first use.
    pub fn compile(&self, pattern: &str) -> Result<Rc<CompiledPattern>> {
        if let Some(compiled) = self.cache.borrow().get(pattern) {
            return Ok(compiled.clone());
        }

        let compiled = Rc::new(self.compiler.compile(pattern)?);
        self.cache
            .borrow_mut()
            .insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Match `path` against `pattern`.
    ///
    /// Returns the captured parameters when the path matches, [`None`] otherwise.
    ///
    /// ```rust
    /// # use mosaic_router::matcher::PathMatcher;
    /// let matcher = PathMatcher::default();
    /// let params = matcher.match_path("/users/:id", "/users/42").unwrap().unwrap();
    /// assert_eq!(params.get("id"), Some("42"));
    ///
    /// assert!(matcher.match_path("/users/:id", "/posts/42").unwrap().is_none());
    /// ```
    pub fn match_path(&self, pattern: &str, path: &str) -> Result<Option<Params>> {
        Ok(self.compile(pattern)?.captures(path))
    }

    /// The number of distinct patterns compiled so far.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

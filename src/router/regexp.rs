//! Brace-template compilation for variable routes.
//!
//! A template such as `/articles/{category}/{id:[0-9]+}` is compiled into an
//! anchored [`Regex`]. Each `{name}` or `{name:pattern}` becomes one capture
//! group, and the literal text between placeholders is escaped. Default
//! patterns depend on where the template applies:
//!
//! | kind  | default   |
//! |-------|-----------|
//! | path  | `[^/]+`   |
//! | host  | `[^.]+`   |
//! | query | `.*`      |
//!
//! User patterns must not contain capturing groups of their own; use
//! `(?:...)` instead.

use std::borrow::Cow;
use std::collections::HashMap;

use http::StatusCode;
use regex::Regex;

use super::route::RouteMatch;
use crate::error::{Result, RouterError};
use crate::handler::redirect_handler;
use crate::server::Request;

/// Where a template is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexpKind {
    /// Whole request path
    Path,
    /// Leading part of the request path
    PathPrefix,
    /// Request host, with or without a port
    Host,
    /// One `key=value` query pair
    Query,
}

/// Per-route flags that change how templates compile and match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexpOptions {
    /// Accept the path with or without a trailing slash and redirect to the
    /// form the template declares
    pub strict_slash: bool,
    /// Match against the raw percent-encoded path instead of the decoded one
    pub use_encoded_path: bool,
}

/// A compiled brace template
#[derive(Debug, Clone)]
pub struct RouteRegexp {
    template: String,
    kind: RegexpKind,
    options: RegexpOptions,
    regexp: Regex,
    /// Literal text before each variable, plus the trailing text
    reverse: Vec<String>,
    names: Vec<String>,
    /// Anchored per-variable patterns used when building URLs
    validators: Vec<Regex>,
    /// Host templates without a port ignore the request's port
    wildcard_host_port: bool,
    /// Key of a query template
    query_key: Option<String>,
}

impl RouteRegexp {
    /// Compile `template` for the given position in the request.
    ///
    /// # Errors
    ///
    /// Fails on unbalanced braces, empty variable names or patterns, patterns
    /// that do not compile, and patterns containing capturing groups.
    pub fn new(template: &str, kind: RegexpKind, options: RegexpOptions) -> Result<Self> {
        let braces = brace_indices(template)?;

        let default_pattern = match kind {
            RegexpKind::Query => ".*",
            RegexpKind::Host => "[^.]+",
            RegexpKind::Path | RegexpKind::PathPrefix => "[^/]+",
        };

        // Trailing-slash handling only makes sense for full paths
        let mut options = options;
        if kind != RegexpKind::Path {
            options.strict_slash = false;
        }

        let mut tpl = template;
        let mut end_slash = false;
        if options.strict_slash && tpl.ends_with('/') {
            tpl = &tpl[..tpl.len() - 1];
            end_slash = true;
        }

        let mut pattern = String::with_capacity(tpl.len() + 16);
        pattern.push('^');
        let mut reverse = Vec::with_capacity(braces.len() + 1);
        let mut names = Vec::with_capacity(braces.len());
        let mut validators = Vec::with_capacity(braces.len());

        let mut end = 0;
        for &(start, close) in &braces {
            let raw = &tpl[end..start];
            end = close;

            let inner = &tpl[start + 1..close - 1];
            let (name, patt) = inner.split_once(':').unwrap_or((inner, default_pattern));
            if name.is_empty() || patt.is_empty() {
                return Err(RouterError::invalid_pattern(
                    template,
                    format!("missing name or pattern in {:?}", &tpl[start..close]),
                ));
            }

            pattern.push_str(&regex::escape(raw));
            pattern.push('(');
            pattern.push_str(patt);
            pattern.push(')');

            reverse.push(raw.to_string());
            names.push(name.to_string());
            validators.push(Regex::new(&format!("^(?:{patt})$"))?);
        }

        let raw = &tpl[end..];
        pattern.push_str(&regex::escape(raw));
        if options.strict_slash {
            pattern.push_str("[/]?");
        }

        let query_key = if kind == RegexpKind::Query {
            let (key, value) = template.split_once('=').unwrap_or((template, ""));
            // `key=` matches any value for that key
            if value.is_empty() {
                pattern.push_str(default_pattern);
            }
            Some(key.to_string())
        } else {
            None
        };

        if kind != RegexpKind::PathPrefix {
            pattern.push('$');
        }

        let mut tail = raw.to_string();
        if end_slash {
            tail.push('/');
        }
        reverse.push(tail);

        let regexp = Regex::new(&pattern)?;

        if regexp.captures_len() - 1 != names.len() {
            return Err(RouterError::invalid_pattern(
                template,
                "route regexp contains capture groups, use non-capturing groups (?:pattern) instead",
            ));
        }

        let wildcard_host_port = kind == RegexpKind::Host && !pattern.contains(':');

        Ok(Self {
            template: template.to_string(),
            kind,
            options,
            regexp,
            reverse,
            names,
            validators,
            wildcard_host_port,
            query_key,
        })
    }

    /// The template this was compiled from
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Where the template applies
    #[must_use]
    pub fn kind(&self) -> RegexpKind {
        self.kind
    }

    /// Variable names in declaration order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The compiled, anchored pattern
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regexp.as_str()
    }

    /// Whether the request satisfies this template
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        self.regexp.is_match(&self.subject(request))
    }

    /// The part of the request this template is matched against
    fn subject<'a>(&self, request: &'a Request) -> Cow<'a, str> {
        match self.kind {
            RegexpKind::Host => {
                let host = request.host().unwrap_or("");
                if self.wildcard_host_port {
                    Cow::Borrowed(strip_port(host))
                } else {
                    Cow::Borrowed(host)
                }
            }
            RegexpKind::Query => Cow::Owned(self.url_query(request)),
            RegexpKind::Path | RegexpKind::PathPrefix => {
                if self.options.use_encoded_path {
                    Cow::Borrowed(request.raw_path())
                } else {
                    Cow::Borrowed(request.path())
                }
            }
        }
    }

    /// `key=value` for the first value of this template's key, or ""
    fn url_query(&self, request: &Request) -> String {
        let Some(key) = &self.query_key else {
            return String::new();
        };
        request
            .query_pairs()
            .find(|(k, _)| **k == **key)
            .map(|(k, v)| format!("{k}={v}"))
            .unwrap_or_default()
    }

    /// Copy captured values into `vars`
    fn extract(&self, subject: &str, vars: &mut Option<HashMap<String, String>>) {
        if self.names.is_empty() {
            return;
        }
        let Some(caps) = self.regexp.captures(subject) else {
            return;
        };
        let vars = vars.get_or_insert_with(HashMap::new);
        for (i, name) in self.names.iter().enumerate() {
            if let Some(value) = caps.get(i + 1) {
                vars.insert(name.clone(), value.as_str().to_string());
            }
        }
    }

    /// Fill the template with `values`.
    ///
    /// Query values are percent-encoded after validation.
    pub(crate) fn build(&self, values: &HashMap<&str, &str>) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        for (i, name) in self.names.iter().enumerate() {
            let value = values
                .get(name.as_str())
                .ok_or_else(|| RouterError::BuildUrl(format!("missing route variable {name:?}")))?;

            if !self.validators[i].is_match(value) {
                return Err(RouterError::BuildUrl(format!(
                    "variable {name:?} doesn't match, expected {:?}",
                    self.validators[i].as_str()
                )));
            }

            out.push_str(&self.reverse[i]);
            if self.kind == RegexpKind::Query {
                out.push_str(&urlencoding::encode(value));
            } else {
                out.push_str(value);
            }
        }
        if let Some(tail) = self.reverse.last() {
            out.push_str(tail);
        }
        Ok(out)
    }
}

/// Host, path and query templates of one route, evaluated together
#[derive(Debug, Clone, Default)]
pub struct RegexpGroup {
    pub(crate) host: Option<RouteRegexp>,
    pub(crate) path: Option<RouteRegexp>,
    pub(crate) queries: Vec<RouteRegexp>,
}

impl RegexpGroup {
    /// Extract variables after a successful match and, for strict-slash
    /// paths whose trailing slash disagrees with the template, replace the
    /// handler with a permanent redirect.
    pub(crate) fn set_match(&self, request: &Request, m: &mut RouteMatch<'_>) {
        if let Some(host) = &self.host {
            host.extract(&host.subject(request), &mut m.vars);
        }

        if let Some(path) = &self.path {
            let subject = path.subject(request);
            path.extract(&subject, &mut m.vars);

            if path.options.strict_slash {
                let has_slash = subject.ends_with('/');
                let wants_slash = path.template.ends_with('/');
                if has_slash != wants_slash {
                    let raw = request.raw_path();
                    let target = if has_slash {
                        Cow::Borrowed(raw.strip_suffix('/').unwrap_or(raw))
                    } else {
                        Cow::Owned(format!("{raw}/"))
                    };
                    m.handler = Some(redirect_handler(
                        request.url_with_path(&target),
                        StatusCode::MOVED_PERMANENTLY,
                    ));
                }
            }
        }

        for query in &self.queries {
            query.extract(&query.url_query(request), &mut m.vars);
        }
    }
}

/// Start and end (exclusive) offsets of each top-level `{...}` block
fn brace_indices(s: &str) -> Result<Vec<(usize, usize)>> {
    let mut level = 0i32;
    let mut start = 0;
    let mut out = Vec::new();

    for (i, b) in s.bytes().enumerate() {
        match b {
            b'{' => {
                level += 1;
                if level == 1 {
                    start = i;
                }
            }
            b'}' => {
                level -= 1;
                if level == 0 {
                    out.push((start, i + 1));
                } else if level < 0 {
                    return Err(RouterError::invalid_pattern(s, "unbalanced braces"));
                }
            }
            _ => {}
        }
    }

    if level != 0 {
        return Err(RouterError::invalid_pattern(s, "unbalanced braces"));
    }

    Ok(out)
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons
    if let Some(rest) = host.strip_prefix('[') {
        return rest
            .find(']')
            .map_or(host, |end| &host[..end + 2]);
    }
    host.split(':').next().unwrap_or(host)
}

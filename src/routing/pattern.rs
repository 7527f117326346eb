//! Route template compilation and matching.
//!
//! # Responsibilities
//! - Parse `/literal`, `:name` and trailing `/*` template syntax
//! - Record parameter names in declaration order
//! - Compile the template into an anchored regex
//! - Match request paths and zip captures with parameter names
//!
//! # Design Decisions
//! - Parameters capture exactly one path segment (`[^/]+`)
//! - A trailing `/*` leaves the end unanchored: any path starting with
//!   the prefix matches (`/foo/*` matches `/foo`, `/foo/x` and `/foobar`)
//! - Duplicate parameter names are rejected at compile time
//! - Literal text is escaped, so `.` or `+` in a template match themselves

use indexmap::IndexMap;
use regex::Regex;

/// Suffix marking a prefix (wildcard) template.
const WILDCARD_SUFFIX: &str = "/*";

/// Capture used in place of every `:name` segment.
const PARAM_CAPTURE: &str = "([^/]+)";

/// Ordered mapping of parameter name to captured value.
pub type Params = IndexMap<String, String>;

/// Error produced when a template cannot be compiled.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("parameter `{name}` declared more than once in `{template}`")]
    DuplicateParameter { template: String, name: String },

    #[error("template `{template}` does not compile: {source}")]
    InvalidRegex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    parameter_names: Vec<String>,
    matcher: Regex,
    prefix_match: bool,
}

impl RoutePattern {
    /// Compile a template such as `/users/:id` or `/static/*`.
    pub fn new(template: impl Into<String>) -> Result<Self, PatternError> {
        let template = template.into();

        let (body, prefix_match) = match template.strip_suffix(WILDCARD_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (template.as_str(), false),
        };

        let mut expression = String::from("^");
        let mut parameter_names = Vec::new();

        for piece in tokenize(body) {
            match piece {
                Piece::Literal(text) => expression.push_str(&regex::escape(text)),
                Piece::Param(name) => {
                    if parameter_names.iter().any(|n| n == name) {
                        return Err(PatternError::DuplicateParameter {
                            template: template.clone(),
                            name: name.to_string(),
                        });
                    }
                    parameter_names.push(name.to_string());
                    expression.push_str(PARAM_CAPTURE);
                }
            }
        }

        if !prefix_match {
            expression.push('$');
        }

        let matcher = Regex::new(&expression).map_err(|source| PatternError::InvalidRegex {
            template: template.clone(),
            source,
        })?;

        Ok(Self {
            template,
            parameter_names,
            matcher,
            prefix_match,
        })
    }

    /// Match a request path (query already stripped).
    ///
    /// Returns `None` when the path does not match. A match on a template
    /// without parameters yields an empty map.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.matcher.captures(path)?;

        let params = self
            .parameter_names
            .iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, group)| group.map(|g| (name.clone(), g.as_str().to_string())))
            .collect();

        Some(params)
    }

    /// The source template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in declaration order.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// True when the template ended with `/*`.
    pub fn is_prefix_match(&self) -> bool {
        self.prefix_match
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

enum Piece<'a> {
    Literal(&'a str),
    Param(&'a str),
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split a template into literal runs and `:name` parameters.
///
/// A `:` that is not followed by an identifier character stays literal.
fn tokenize(body: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut chars = body.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != ':' {
            continue;
        }
        let name_start = idx + 1;
        let mut name_end = name_start;
        while let Some(&(next_idx, next)) = chars.peek() {
            if !is_ident_char(next) {
                break;
            }
            name_end = next_idx + next.len_utf8();
            chars.next();
        }
        if name_end == name_start {
            continue;
        }
        if literal_start < idx {
            pieces.push(Piece::Literal(&body[literal_start..idx]));
        }
        pieces.push(Piece::Param(&body[name_start..name_end]));
        literal_start = name_end;
    }

    if literal_start < body.len() {
        pieces.push(Piece::Literal(&body[literal_start..]));
    }
    pieces
}

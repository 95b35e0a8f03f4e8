//! Audit identifiers and path template normalization.

use http::Method;
use std::borrow::Cow;
use std::fmt;

/// Segment substituted for template parameters.
pub const WILDCARD: &str = "~";

/// Which side of the service an exchange was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// A request received by this service.
    Inbound,
    /// A call this service made to `host`.
    Outbound { host: String },
}

impl Direction {
    pub fn outbound(host: impl Into<String>) -> Self {
        Direction::Outbound { host: host.into() }
    }
}

/// Request or response half of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Request,
    Response,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Param,
    Literal(String),
}

/// Compiled path templates such as `/users/{id}/tasks`.
///
/// A segment wrapped in braces is a parameter and collapses to [`WILDCARD`].
/// Templates are tried in order; the first one with the same number of
/// segments whose literals all match wins.
#[derive(Debug, Clone, Default)]
pub struct PathTemplates {
    templates: Vec<Vec<Segment>>,
}

impl PathTemplates {
    pub fn new<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let templates = templates
            .into_iter()
            .map(|t| {
                split(t.as_ref())
                    .map(|seg| {
                        let seg = seg.trim();
                        if seg.starts_with('{') && seg.ends_with('}') {
                            Segment::Param
                        } else {
                            Segment::Literal(seg.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self { templates }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Normalize `path`, e.g. `/foo/123/bar/456` to `/foo/~/bar/~`.
    ///
    /// Paths matching no template are returned verbatim.
    pub fn normalize<'a>(&self, path: &'a str) -> Cow<'a, str> {
        let actual: Vec<&str> = split(path).collect();

        'templates: for template in &self.templates {
            if template.len() != actual.len() {
                continue;
            }
            let mut out = Vec::with_capacity(actual.len());
            for (known, seg) in template.iter().zip(actual.iter().copied()) {
                match known {
                    Segment::Param => out.push(WILDCARD),
                    Segment::Literal(lit) if lit == seg => out.push(seg),
                    Segment::Literal(_) => continue 'templates,
                }
            }
            return Cow::Owned(format!("/{}", out.join("/")));
        }

        Cow::Borrowed(path)
    }

    /// Build the audit identifier for an exchange.
    ///
    /// Shape: `in|out/<host>` + normalized path + `/` + method + `/request|/response`.
    pub fn identifier(
        &self,
        direction: &Direction,
        method: &Method,
        path: &str,
        phase: Phase,
    ) -> String {
        let path = self.normalize(path);
        let mut id = match direction {
            Direction::Inbound => String::from("in"),
            Direction::Outbound { host } => format!("out/{host}"),
        };
        id.push_str(&path);
        if !path.ends_with('/') {
            id.push('/');
        }
        id.push_str(method.as_str());
        id.push('/');
        id.push_str(phase.as_str());
        id
    }
}

fn split(path: &str) -> std::str::Split<'_, char> {
    path.trim_matches('/').split('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn users() -> PathTemplates {
        PathTemplates::new(["/users/{id}", "/users/{id}/tasks"])
    }

    #[test]
    fn test_normalize_collapses_parameters() {
        let templates = users();
        assert_eq!(templates.normalize("/users/42"), "/users/~");
        assert_eq!(templates.normalize("/users/99"), "/users/~");
        assert_eq!(templates.normalize("/users/7/tasks"), "/users/~/tasks");
        assert_eq!(templates.normalize("/users/99/tasks/"), "/users/~/tasks");
    }

    #[test]
    fn test_normalize_without_match_is_verbatim() {
        let templates = users();
        assert_eq!(templates.normalize("/accounts/42"), "/accounts/42");
        assert_eq!(templates.normalize("/users/42/notes"), "/users/42/notes");
        assert_eq!(templates.normalize("/users"), "/users");
        assert!(matches!(templates.normalize("/other"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_first_matching_template_wins() {
        let templates = PathTemplates::new(["/foo/{a}/bar/{b}", "/foo/{a}/{b}/{c}"]);
        assert_eq!(templates.normalize("/foo/1/bar/2"), "/foo/~/bar/~");
        assert_eq!(templates.normalize("/foo/1/baz/2"), "/foo/~/~/~");
    }

    #[test]
    fn test_identifier_shapes() {
        let templates = users();
        assert_eq!(
            templates.identifier(&Direction::Inbound, &Method::POST, "/users", Phase::Request),
            "in/users/POST/request"
        );
        assert_eq!(
            templates.identifier(
                &Direction::outbound("api.example.com"),
                &Method::GET,
                "/users/12",
                Phase::Response
            ),
            "out/api.example.com/users/~/GET/response"
        );
        assert_eq!(
            templates.identifier(&Direction::Inbound, &Method::GET, "/", Phase::Request),
            "in/GET/request"
        );
    }

    proptest! {
        #[test]
        fn prop_parameter_values_collapse(a in "[0-9a-z]{1,12}", b in "[0-9a-z]{1,12}") {
            let templates = users();

            let single_a = templates.identifier(&Direction::Inbound, &Method::GET, &format!("/users/{a}"), Phase::Request);
            let single_b = templates.identifier(&Direction::Inbound, &Method::GET, &format!("/users/{b}"), Phase::Request);
            prop_assert_eq!(&single_a, &single_b);

            let nested_a = templates.identifier(&Direction::Inbound, &Method::GET, &format!("/users/{a}/tasks"), Phase::Request);
            let nested_b = templates.identifier(&Direction::Inbound, &Method::GET, &format!("/users/{b}/tasks"), Phase::Request);
            prop_assert_eq!(&nested_a, &nested_b);
            prop_assert_ne!(single_a, nested_a);
        }
    }
}

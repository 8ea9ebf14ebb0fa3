//! Route match rules — component K.

use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Any,
}

impl Method {
    pub fn parse(s: &str) -> Method {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            _ => Method::Any,
        }
    }
}

/// Everything `route_request` needs to evaluate a route's rules against
/// one request.
pub struct RequestMeta<'a> {
    pub method: Method,
    pub path: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub query: HashMap<&'a str, &'a str>,
}

impl<'a> RequestMeta<'a> {
    pub fn new(method: Method, path_and_query: &'a str, headers: &'a HashMap<String, String>) -> Self {
        let (path, query_str) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, q),
            None => (path_and_query, ""),
        };
        let query = query_str
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| pair.split_once('='))
            .collect();
        Self { method, path, headers, query }
    }
}

/// One match condition. A `Route` matches a request only when every one
/// of its rules matches (AND semantics, per §4.K step 2).
#[derive(Debug, Clone)]
pub enum Rule {
    PathExact(String),
    PathPrefix(String),
    PathRegex(#[allow(dead_code)] String, Regex),
    Header { name: String, value: String },
    Method(Method),
    QueryParam { name: String, value: String },
}

impl Rule {
    pub fn path_regex(pattern: &str) -> Result<Rule, regex::Error> {
        Ok(Rule::PathRegex(pattern.to_string(), Regex::new(pattern)?))
    }

    pub fn matches(&self, req: &RequestMeta) -> bool {
        match self {
            Rule::PathExact(p) => req.path == p,
            Rule::PathPrefix(p) => req.path.starts_with(p.as_str()),
            Rule::PathRegex(_, re) => re.is_match(req.path),
            Rule::Header { name, value } => {
                req.headers.get(name).map(|v| v == value).unwrap_or(false)
            }
            Rule::Method(m) => *m == Method::Any || *m == req.method,
            Rule::QueryParam { name, value } => {
                req.query.get(name.as_str()).map(|v| *v == value).unwrap_or(false)
            }
        }
    }
}

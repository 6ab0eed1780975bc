//! Value sources the template engine reads placeholders from

use serde_json::Value;

use super::json;

/// Answers placeholder names for a single request
pub trait ValueSource {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Query parameters of a GET request.
///
/// The first occurrence of a repeated parameter wins. The `token`
/// parameter is never exposed to templates.
pub struct QuerySource<'a> {
    params: &'a [(String, String)],
}

impl<'a> QuerySource<'a> {
    pub fn new(params: &'a [(String, String)]) -> Self {
        Self { params }
    }
}

impl ValueSource for QuerySource<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        if key == "token" {
            return None;
        }
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

/// A normalized JSON body, addressed with dotted paths
pub struct JsonSource<'a> {
    root: &'a Value,
}

impl<'a> JsonSource<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }
}

impl ValueSource for JsonSource<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        json::resolve(key, self.root)
    }
}

/// Source for bodies that are not parsed; nothing resolves
pub struct NoValues;

impl ValueSource for NoValues {
    fn lookup(&self, _key: &str) -> Option<String> {
        None
    }
}

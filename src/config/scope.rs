//! OS scopes and the precedence ladder used for configuration overlays.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key holding the fallback value of an OS-scoped operation.
pub const DEFAULT_SCOPE_KEY: &str = "default";

/// One rung of the precedence ladder, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsScope {
    /// Exact platform code, e.g. `linux-x86_64`
    ExactCode,
    /// Platform name, e.g. `linux`, `macos`, `windows`
    Name,
    /// Platform family, e.g. `unix`, `windows`
    Family,
    /// Unscoped
    Default,
}

impl OsScope {
    pub const PRECEDENCE: [OsScope; 4] = [
        OsScope::ExactCode,
        OsScope::Name,
        OsScope::Family,
        OsScope::Default,
    ];
}

/// The platform a resolution run executes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsContext {
    pub code: String,
    pub name: String,
    pub family: String,
}

impl OsContext {
    pub fn new(code: impl Into<String>, name: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            family: family.into(),
        }
    }

    /// Context of the running process.
    pub fn detect() -> Self {
        let name = std::env::consts::OS;
        Self::new(
            format!("{}-{}", name, std::env::consts::ARCH),
            name,
            std::env::consts::FAMILY,
        )
    }

    /// Build a context from a platform name alone, inferring the family.
    pub fn for_name(name: &str) -> Self {
        let family = match name {
            "windows" => "windows",
            "" => "",
            _ => "unix",
        };
        Self::new(name, name, family)
    }

    /// Key for a scope; `None` for [`OsScope::Default`] and empty values.
    pub fn key(&self, scope: OsScope) -> Option<&str> {
        let key = match scope {
            OsScope::ExactCode => self.code.as_str(),
            OsScope::Name => self.name.as_str(),
            OsScope::Family => self.family.as_str(),
            OsScope::Default => return None,
        };
        (!key.is_empty()).then_some(key)
    }

    /// Scopes in precedence order with duplicate keys removed. The unscoped
    /// entry (`None`) is always last.
    pub fn scope_keys(&self) -> Vec<Option<&str>> {
        let mut keys: Vec<Option<&str>> = Vec::with_capacity(4);
        for scope in OsScope::PRECEDENCE {
            let key = self.key(scope);
            if key.is_some() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.push(None);
        keys
    }

    /// Pick the value for this platform out of an OS-keyed map.
    ///
    /// Walks exact code, name and family, then falls back to the `default`
    /// key. Returns `None` when no key matches.
    pub fn resolve<'a>(&self, scoped: &'a Map<String, Value>) -> Option<&'a Value> {
        self.scope_keys()
            .into_iter()
            .map(|key| key.unwrap_or(DEFAULT_SCOPE_KEY))
            .find_map(|key| scoped.get(key))
    }
}

impl Default for OsContext {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_scope_keys_dedupe() {
        let ctx = OsContext::new("windows", "windows", "windows");
        assert_eq!(ctx.scope_keys(), vec![Some("windows"), None]);

        let ctx = OsContext::new("linux-x86_64", "linux", "unix");
        assert_eq!(
            ctx.scope_keys(),
            vec![Some("linux-x86_64"), Some("linux"), Some("unix"), None]
        );
    }

    #[test]
    fn test_resolve_precedence() {
        let ctx = OsContext::new("linux-x86_64", "linux", "unix");
        let map = object(json!({"default": "d", "unix": "u", "linux": "l"}));
        assert_eq!(ctx.resolve(&map), Some(&json!("l")));

        let map = object(json!({"default": "d", "unix": "u"}));
        assert_eq!(ctx.resolve(&map), Some(&json!("u")));

        let map = object(json!({"default": "d", "windows": "w"}));
        assert_eq!(ctx.resolve(&map), Some(&json!("d")));

        let map = object(json!({"windows": "w"}));
        assert_eq!(ctx.resolve(&map), None);
    }

    #[test]
    fn test_for_name_family() {
        assert_eq!(OsContext::for_name("macos").family, "unix");
        assert_eq!(OsContext::for_name("windows").family, "windows");
    }
}

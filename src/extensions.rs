//! Protocol extensions negotiated at login
//!
//! The login result may list extension names under `"extensions"`. Two of them
//! can also be switched on by static pool configuration, independent of what
//! the pool advertised.

use crate::config::PoolConfig;
use serde_json::Value;
use std::fmt;

/// Optional protocol capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// Pool accepts `algo` in submits and sends it in jobs
    Algo,
    /// Nicehash-style nonce (pool owns the top nonce byte)
    Nicehash,
    /// Inline connect
    Connect,
    /// `keepalived` pings are understood
    Keepalive,
    /// Transport-level TLS
    Tls,
}

impl Extension {
    /// Every extension, in bit order
    pub const ALL: [Extension; 5] = [
        Extension::Algo,
        Extension::Nicehash,
        Extension::Connect,
        Extension::Keepalive,
        Extension::Tls,
    ];

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Extension::Algo => "algo",
            Extension::Nicehash => "nicehash",
            Extension::Connect => "connect",
            Extension::Keepalive => "keepalive",
            Extension::Tls => "tls",
        }
    }

    /// Parse a wire name (exact match)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ext| ext.name() == name)
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }

    /// Enabled by pool configuration regardless of negotiation
    pub fn static_override(&self, pool: &PoolConfig) -> bool {
        match self {
            Extension::Nicehash => pool.nicehash,
            Extension::Keepalive => pool.keepalive > 0,
            _ => false,
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size set of negotiated extensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionSet(u8);

impl ExtensionSet {
    /// Empty set
    pub fn new() -> Self {
        Self(0)
    }

    /// Parse the `extensions` array of a login result; unknown names and
    /// non-string entries are skipped
    pub fn from_login_result(result: &Value) -> Self {
        let mut set = Self::new();

        if let Some(names) = result.get("extensions").and_then(Value::as_array) {
            for ext in names.iter().filter_map(Value::as_str).filter_map(Extension::from_name) {
                set.insert(ext);
            }
        }

        set
    }

    /// Mark an extension as negotiated
    pub fn insert(&mut self, ext: Extension) {
        self.0 |= ext.bit();
    }

    /// Whether the pool negotiated this extension
    pub fn contains(&self, ext: Extension) -> bool {
        self.0 & ext.bit() != 0
    }

    /// Negotiated OR enabled by pool configuration
    pub fn is_active(&self, ext: Extension, pool: &PoolConfig) -> bool {
        self.contains(ext) || ext.static_override(pool)
    }

    /// Clear all negotiated extensions
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Whether nothing was negotiated
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over negotiated extensions
    pub fn iter(&self) -> impl Iterator<Item = Extension> + '_ {
        Extension::ALL.into_iter().filter(|ext| self.contains(*ext))
    }
}

impl fmt::Display for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|ext| ext.name()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extensions() {
        let result = json!({"id": "x", "extensions": ["algo", "keepalive", 5, "unknown", "tls"]});
        let set = ExtensionSet::from_login_result(&result);

        assert!(set.contains(Extension::Algo));
        assert!(set.contains(Extension::Keepalive));
        assert!(set.contains(Extension::Tls));
        assert!(!set.contains(Extension::Nicehash));
        assert!(!set.contains(Extension::Connect));
        assert_eq!(set.to_string(), "[algo, keepalive, tls]");
    }

    #[test]
    fn test_missing_or_malformed_extensions() {
        assert!(ExtensionSet::from_login_result(&json!({"id": "x"})).is_empty());
        assert!(ExtensionSet::from_login_result(&json!({"extensions": "algo"})).is_empty());
    }

    #[test]
    fn test_static_overrides() {
        let set = ExtensionSet::new();
        let mut pool = PoolConfig::new("ws://127.0.0.1:3333", "wallet");

        assert!(!set.is_active(Extension::Nicehash, &pool));
        assert!(!set.is_active(Extension::Keepalive, &pool));

        pool.nicehash = true;
        pool.keepalive = 60;
        assert!(set.is_active(Extension::Nicehash, &pool));
        assert!(set.is_active(Extension::Keepalive, &pool));
        assert!(!set.is_active(Extension::Algo, &pool));
    }
}

//! Message catalog: scope + optional key → canned busy text.
//!
//! Resolution order is explicit message, then the `(scope, key)` entry,
//! then the scope default, then the catalog-wide default ("Loading...").

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::model::Scope;

/// Universal fallback text.
pub const DEFAULT_MESSAGE: &str = "Loading...";

/// Key under `[messages.<scope>]` that replaces the scope default.
pub const SCOPE_DEFAULT_KEY: &str = "default";

const ROUTE: &[(&str, &str)] = &[
    ("dashboard", "Loading dashboard..."),
    ("routes", "Loading routes..."),
    ("route_editor", "Opening route editor..."),
    ("customers", "Loading customers..."),
    ("drivers", "Loading drivers..."),
    ("bus_types", "Loading bus types..."),
    ("admin", "Loading admin tools..."),
];

const AUTH: &[(&str, &str)] = &[
    ("sign_in", "Signing in..."),
    ("sign_out", "Signing out..."),
    ("sign_up", "Creating your account..."),
    ("reset_password", "Sending reset link..."),
    ("accept_invite", "Accepting invitation..."),
];

const ACTION: &[(&str, &str)] = &[
    ("save_route", "Saving route..."),
    ("delete_route", "Deleting route..."),
    ("import_customers", "Importing customers..."),
    ("export_customers", "Exporting customers..."),
    ("save_driver", "Saving driver..."),
    ("save_bus_type", "Saving bus type..."),
    ("send_invite", "Sending invitation..."),
];

const SYSTEM: &[(&str, &str)] = &[
    ("bootstrap", "Starting BusFlow..."),
    ("reconnect", "Reconnecting..."),
];

#[derive(Debug, Clone, Default)]
struct ScopeMessages {
    default: Option<String>,
    keys: HashMap<String, String>,
}

impl ScopeMessages {
    fn from_table(default: Option<&str>, table: &[(&str, &str)]) -> Self {
        Self {
            default: default.map(str::to_string),
            keys: table
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Static lookup table for busy messages.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    scopes: HashMap<Scope, ScopeMessages>,
    default_message: String,
}

impl MessageCatalog {
    /// The built-in BusFlow table with the given universal fallback.
    pub fn builtin(default_message: impl Into<String>) -> Self {
        let scopes = HashMap::from([
            (
                Scope::Route,
                ScopeMessages::from_table(Some("Loading page..."), ROUTE),
            ),
            (
                Scope::Auth,
                ScopeMessages::from_table(Some("Checking your session..."), AUTH),
            ),
            (
                Scope::Action,
                ScopeMessages::from_table(Some("Working..."), ACTION),
            ),
            (Scope::System, ScopeMessages::from_table(None, SYSTEM)),
        ]);
        Self {
            scopes,
            default_message: default_message.into(),
        }
    }

    /// Layer config overrides on top of the catalog.
    ///
    /// Outer keys are scope names; the inner key `default` replaces the
    /// scope default, any other key adds or replaces an entry.
    pub fn with_overrides(
        mut self,
        overrides: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self> {
        for (scope_name, entries) in overrides {
            let scope: Scope = scope_name
                .parse()
                .map_err(|e| Error::Config(format!("bad [messages] table: {e}")))?;
            let messages = self.scopes.entry(scope).or_default();
            for (key, text) in entries {
                if key == SCOPE_DEFAULT_KEY {
                    messages.default = Some(text.clone());
                } else {
                    messages.keys.insert(key.clone(), text.clone());
                }
            }
        }
        Ok(self)
    }

    pub fn default_message(&self) -> &str {
        &self.default_message
    }

    /// Resolve the text to show. Blank explicit messages count as absent.
    pub fn resolve(&self, scope: Scope, message: Option<&str>, key: Option<&str>) -> String {
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            return message.to_string();
        }
        let Some(messages) = self.scopes.get(&scope) else {
            return self.default_message.clone();
        };
        key.and_then(|k| messages.keys.get(k))
            .or(messages.default.as_ref())
            .cloned()
            .unwrap_or_else(|| self.default_message.clone())
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::builtin(DEFAULT_MESSAGE)
    }
}

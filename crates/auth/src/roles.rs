use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role code used for explicit role requirements (e.g. `"admin"`).
///
/// Route-level authorization never looks at role codes; it only consults the
/// flattened permission set. Codes matter for `require_any_role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(Cow<'static, str>);

impl RoleCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoleCode {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for RoleCode {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

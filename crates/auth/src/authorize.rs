use serde::Serialize;
use thiserror::Error;

use xadmin_core::MenuId;

use crate::permissions::{PermissionEntry, compile_path};
use crate::policy::AccessPolicy;
use crate::principal::{Principal, PrincipalState};
use crate::roles::RoleCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthorized authentication")]
    Unauthenticated,

    #[error("permission denied: {0}")]
    Forbidden(String),
}

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantBasis {
    Superuser,
    Whitelist,
    Permission,
}

/// Successful authorization outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub basis: GrantBasis,

    /// Menu whose permission matched (permission grants only).
    pub menu_id: Option<MenuId>,

    /// Field-level filtering is lifted for whitelisted requests.
    pub all_fields: bool,
}

impl Grant {
    fn superuser() -> Self {
        Self {
            basis: GrantBasis::Superuser,
            menu_id: None,
            all_fields: false,
        }
    }

    fn whitelist() -> Self {
        Self {
            basis: GrantBasis::Whitelist,
            menu_id: None,
            all_fields: true,
        }
    }

    fn permission(entry: &PermissionEntry) -> Self {
        Self {
            basis: GrantBasis::Permission,
            menu_id: entry.menu_id,
            all_fields: false,
        }
    }
}

/// Decide whether `principal` may perform `method` on `path`.
///
/// - No IO
/// - No panics
/// - Pure over (principal snapshot, path, method, policy)
pub fn authorize(
    principal: Option<&Principal>,
    path: &str,
    method: &str,
    policy: &AccessPolicy,
) -> Result<Grant, AuthzError> {
    let Some(principal) = principal else {
        return Err(AuthzError::Unauthenticated);
    };

    if principal.is_superuser {
        return Ok(Grant::superuser());
    }

    if policy.whitelist.matching(path, method).is_some() {
        return Ok(Grant::whitelist());
    }

    let canonical = policy.canonical_path(path);
    match principal.permissions.find_match(&canonical, method) {
        Some(entry) => Ok(Grant::permission(entry)),
        None => {
            tracing::debug!(user = %principal.username, %path, %method, "permission denied");
            Err(AuthzError::Forbidden(format!("{} {}", method.to_ascii_uppercase(), path)))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Explicit requirements
// ─────────────────────────────────────────────────────────────────────────────

pub fn require_superuser(principal: &Principal) -> Result<(), AuthzError> {
    if principal.is_superuser {
        Ok(())
    } else {
        Err(AuthzError::Forbidden("superuser required".to_string()))
    }
}

pub fn require_staff(principal: &Principal) -> Result<(), AuthzError> {
    if principal.is_superuser || principal.is_staff {
        Ok(())
    } else {
        Err(AuthzError::Forbidden("staff required".to_string()))
    }
}

pub fn require_any_role(principal: &Principal, codes: &[RoleCode]) -> Result<(), AuthzError> {
    if principal.is_superuser || codes.iter().any(|c| principal.has_role(c.as_str())) {
        return Ok(());
    }
    let wanted: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
    Err(AuthzError::Forbidden(format!("one of roles [{}] required", wanted.join(", "))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Mirrors [`authorize`] step for step, but records what happened instead of
/// short-circuiting into an error.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub path: String,
    pub method: String,

    /// Path after alias rewriting, as matched against permissions.
    pub canonical_path: String,

    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub basis: Option<GrantBasis>,

    /// Whitelist pattern or permission entry that allowed the request.
    pub matched_whitelist: Option<String>,
    pub matched_permission: Option<PermissionEntry>,

    pub principal: Option<PrincipalState>,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    MissingPermission,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain(
    principal: Option<&Principal>,
    path: &str,
    method: &str,
    policy: &AccessPolicy,
) -> AuthorizationExplanation {
    let method = method.to_ascii_uppercase();
    let canonical = policy.canonical_path(path).into_owned();
    let mut out = AuthorizationExplanation {
        path: path.to_string(),
        method: method.clone(),
        canonical_path: canonical.clone(),
        granted: false,
        reason: String::new(),
        basis: None,
        matched_whitelist: None,
        matched_permission: None,
        principal: principal.map(Principal::summary),
        denial_reason: None,
    };

    let Some(principal) = principal else {
        out.reason = "No authenticated principal".to_string();
        out.denial_reason = Some(DenialReason {
            kind: DenialKind::Unauthenticated,
            message: "Request carried no valid bearer token".to_string(),
            suggestions: vec![
                "Log in and send the access token as 'Authorization: Bearer <token>'".to_string(),
                "Refresh the access token if it has expired".to_string(),
            ],
        });
        return out;
    };

    if principal.is_superuser {
        out.granted = true;
        out.basis = Some(GrantBasis::Superuser);
        out.reason = format!("User '{}' is a superuser", principal.username);
        return out;
    }

    if let Some(pattern) = policy.whitelist.matching(path, &method) {
        out.granted = true;
        out.basis = Some(GrantBasis::Whitelist);
        out.matched_whitelist = Some(pattern.to_string());
        out.reason = format!("Path matches whitelist pattern '{pattern}'");
        return out;
    }

    if let Some(entry) = principal.permissions.find_match(&canonical, &method) {
        out.granted = true;
        out.basis = Some(GrantBasis::Permission);
        out.reason = format!("Granted by permission '{} {}'", entry.method, entry.path);
        out.matched_permission = Some(entry.clone());
        return out;
    }

    let same_path: Vec<String> = principal
        .permissions
        .entries()
        .filter(|e| !e.allows_method(&method))
        .filter(|e| {
            compile_path(&e.path)
                .map(|re| re.is_match(&canonical))
                .unwrap_or(false)
        })
        .map(|e| e.method.to_ascii_uppercase())
        .collect();

    let mut suggestions = vec![
        format!("Assign a role whose permission menu grants {method} on a path matching '{canonical}'"),
        format!("Grant a direct data permission for {method} '{canonical}'"),
    ];
    if !same_path.is_empty() {
        suggestions.insert(
            0,
            format!("The path is already granted for other methods: {same_path:?}"),
        );
    }

    out.reason = format!(
        "User '{}' has no permission matching {method} {canonical}",
        principal.username
    );
    out.denial_reason = Some(DenialReason {
        kind: DenialKind::MissingPermission,
        message: format!("Missing permission for {method} {path}"),
        suggestions,
    });
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use xadmin_core::UserId;

    use super::*;
    use crate::permissions::PermissionSet;
    use crate::policy::{MethodSet, Whitelist};

    fn user_with(entries: Vec<PermissionEntry>) -> Principal {
        Principal::new(UserId::new(), "alice").with_permissions(Arc::new(PermissionSet::from_entries(entries)))
    }

    fn whitelist_policy() -> AccessPolicy {
        let whitelist = Whitelist::new()
            .allow("/api/system/userinfo", MethodSet::Any)
            .unwrap()
            .allow("/api/system/permission/explain", MethodSet::from_list(["GET"]))
            .unwrap();
        AccessPolicy::new(whitelist, ["/search-columns"])
    }

    #[test]
    fn absent_principal_is_unauthenticated() {
        let err = authorize(None, "/api/system/user", "GET", &AccessPolicy::default()).unwrap_err();
        assert_eq!(err, AuthzError::Unauthenticated);
    }

    #[test]
    fn empty_set_outside_whitelist_is_forbidden() {
        let p = user_with(vec![]);
        let err = authorize(Some(&p), "/api/system/user", "GET", &whitelist_policy()).unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(_)));
    }

    #[test]
    fn whitelist_grants_all_fields() {
        let p = user_with(vec![]);
        let grant = authorize(Some(&p), "/api/system/userinfo", "PUT", &whitelist_policy()).unwrap();
        assert_eq!(grant.basis, GrantBasis::Whitelist);
        assert!(grant.all_fields);
    }

    #[test]
    fn search_columns_shares_list_permission() {
        let menu = MenuId::new();
        let p = user_with(vec![PermissionEntry::new("/users/", "GET").with_menu(menu)]);
        let policy = AccessPolicy::default();

        let grant = authorize(Some(&p), "/users/search-columns", "GET", &policy).unwrap();
        assert_eq!(grant.basis, GrantBasis::Permission);
        assert_eq!(grant.menu_id, Some(menu));
        assert!(!grant.all_fields);

        assert!(matches!(
            authorize(Some(&p), "/users/", "DELETE", &policy),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn superuser_satisfies_requirements() {
        let su = Principal::new(UserId::new(), "root").superuser();
        assert!(require_superuser(&su).is_ok());
        assert!(require_staff(&su).is_ok());
        assert!(require_any_role(&su, &[RoleCode::new("auditor")]).is_ok());
    }

    #[test]
    fn requirements_deny_plain_users() {
        let p = Principal::new(UserId::new(), "bob").with_roles([RoleCode::new("ops")]);
        assert!(matches!(require_superuser(&p), Err(AuthzError::Forbidden(_))));
        assert!(matches!(require_staff(&p), Err(AuthzError::Forbidden(_))));
        assert!(require_staff(&p.clone().staff()).is_ok());
        assert!(require_any_role(&p, &[RoleCode::new("auditor"), RoleCode::new("ops")]).is_ok());
        assert!(matches!(
            require_any_role(&p, &[RoleCode::new("auditor")]),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn explanation_agrees_with_decision() {
        let p = user_with(vec![PermissionEntry::new("api/system/user", "GET")]);
        let policy = whitelist_policy();

        let allowed = explain(Some(&p), "/api/system/user/search-columns", "get", &policy);
        assert!(allowed.granted);
        assert_eq!(allowed.basis, Some(GrantBasis::Permission));
        assert_eq!(allowed.canonical_path, "/api/system/user/");

        let denied = explain(Some(&p), "/api/system/user", "DELETE", &policy);
        assert!(!denied.granted);
        let reason = denied.denial_reason.unwrap();
        assert_eq!(reason.kind, DenialKind::MissingPermission);
        assert!(reason.suggestions[0].contains("GET"));

        let anon = explain(None, "/api/system/user", "GET", &policy);
        assert_eq!(anon.denial_reason.unwrap().kind, DenialKind::Unauthenticated);
    }

    proptest! {
        #[test]
        fn superuser_is_always_allowed(
            path in "/[a-z0-9/_-]{0,40}",
            method in prop_oneof![Just("GET"), Just("POST"), Just("PUT"), Just("PATCH"), Just("DELETE")],
        ) {
            let su = Principal::new(UserId::new(), "root").superuser();
            let grant = authorize(Some(&su), &path, method, &whitelist_policy()).unwrap();
            prop_assert_eq!(grant.basis, GrantBasis::Superuser);
        }

        #[test]
        fn decision_matches_explanation(
            path in "/api/system/(user|role|menu)(/[a-z0-9]{1,6})?",
            method in prop_oneof![Just("GET"), Just("POST"), Just("DELETE")],
        ) {
            let p = user_with(vec![
                PermissionEntry::new("api/system/user", "GET"),
                PermissionEntry::new("api/system/role", "*"),
            ]);
            let policy = whitelist_policy();
            let decided = authorize(Some(&p), &path, method, &policy).is_ok();
            prop_assert_eq!(decided, explain(Some(&p), &path, method, &policy).granted);
        }
    }
}

//! Password hashing and strength rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("password does not meet strength requirements: {}", .0.join("; "))]
    Weak(Vec<String>),
}

/// bcrypt wrapper. The salt is random per hash, so two hashes of the same
/// password differ while both verify.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: bcrypt::DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn with_cost(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        bcrypt::hash(plain, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// `false` for mismatches and for malformed hashes alike.
    pub fn verify(&self, plain: &str, hashed: &str) -> bool {
        bcrypt::verify(plain, hashed).unwrap_or(false)
    }
}

/// Strength rules applied on user creation and password changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_symbol: bool,
    pub symbols: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: false,
            symbols: DEFAULT_SYMBOLS.to_string(),
        }
    }
}

impl PasswordPolicy {
    /// Check every rule and report all violations together.
    pub fn validate(&self, password: &str) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!("password must be at least {} characters long", self.min_length));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("password must contain at least one uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("password must contain at least one lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("password must contain at least one digit".to_string());
        }
        if self.require_symbol && !password.chars().any(|c| self.symbols.contains(c)) {
            errors.push(format!(
                "password must contain at least one special character ({})",
                self.symbols
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn check(&self, password: &str) -> Result<(), PasswordError> {
        self.validate(password).map_err(PasswordError::Weak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_examples() {
        let policy = PasswordPolicy::default();

        let short = policy.validate("short1").unwrap_err();
        assert_eq!(short.len(), 2, "{short:?}");
        assert!(short.iter().any(|e| e.contains("at least 8")));
        assert!(short.iter().any(|e| e.contains("uppercase")));

        let lower = policy.validate("alllowercase1").unwrap_err();
        assert_eq!(lower.len(), 1);
        assert!(lower[0].contains("uppercase"));

        let no_digits = policy.validate("NoDigitsHere!").unwrap_err();
        assert_eq!(no_digits.len(), 1);
        assert!(no_digits[0].contains("digit"));

        assert_eq!(policy.validate("Valid123"), Ok(()));
    }

    #[test]
    fn symbol_rule_only_applies_when_enabled() {
        let mut policy = PasswordPolicy::default();
        assert!(policy.validate("Valid123").is_ok());

        policy.require_symbol = true;
        let errors = policy.validate("Valid123").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("special character"));
        assert!(policy.validate("Valid123!").is_ok());
    }

    #[test]
    fn weak_error_lists_every_violation() {
        let err = PasswordPolicy::default().check("abc").unwrap_err();
        match err {
            PasswordError::Weak(list) => assert_eq!(list.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn hashes_are_salted_and_both_verify() {
        let hasher = PasswordHasher::with_cost(4);
        let a = hasher.hash("Valid123").unwrap();
        let b = hasher.hash("Valid123").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("Valid123", &a));
        assert!(hasher.verify("Valid123", &b));
        assert!(!hasher.verify("Wrong123", &a));
    }

    #[test]
    fn malformed_hash_does_not_verify() {
        assert!(!PasswordHasher::with_cost(4).verify("Valid123", "not-a-bcrypt-hash"));
    }
}

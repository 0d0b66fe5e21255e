//! Email address type with optional display name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An email address with an optional display name.
///
/// # Examples
///
/// ```
/// use mailtrace::Address;
///
/// // From email string
/// let addr: Address = "user@example.com".into();
/// assert_eq!(addr.email, "user@example.com");
/// assert_eq!(addr.name, None);
///
/// // From tuple (name, email)
/// let addr: Address = ("Alice", "alice@example.com").into();
/// assert_eq!(addr.email, "alice@example.com");
/// assert_eq!(addr.name, Some("Alice".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Alice Smith")
    pub name: Option<String>,
    /// Email address (e.g., "alice@example.com")
    pub email: String,
}

impl Address {
    /// Create a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new address with a name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Display name, or an empty string when none is set.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) if name.is_empty() => self.email.clone(),
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

/// Trait for types that can be converted to an [`Address`].
pub trait ToAddress {
    /// Convert to an Address.
    fn to_address(&self) -> Address;
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for &str {
    fn to_address(&self) -> Address {
        Address::new(*self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::new(self.clone())
    }
}

impl ToAddress for (&str, &str) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0, self.1)
    }
}

impl<T: ToAddress> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

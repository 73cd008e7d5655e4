//! Identity and credential types exchanged with the auth endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Fields returned by `PUT /profile`. May be a subset of [`Identity`].
pub type ProfilePatch = Map<String, Value>;

/// Opaque bearer token issued at login
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// The authenticated user's profile
///
/// Only `id` is required on the wire. Fields the client does not model are
/// kept in `extra` so a round trip through storage loses nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_organizer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    /// Minimal identity with only an id
    pub fn new(id: u64) -> Self {
        Self {
            id,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            is_admin: false,
            is_organizer: false,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// "First Last", falling back to the email
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    /// Overlay `patch` onto this identity.
    ///
    /// Fields present in the patch win; everything else is preserved.
    pub fn merge(&self, patch: &ProfilePatch) -> Result<Identity> {
        let Value::Object(mut merged) = serde_json::to_value(self)? else {
            return Err(Error::Other("identity did not serialize to an object".to_string()));
        };

        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }
}

/// `POST /login` body
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /login` response
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: Credential,
    pub user: Identity,
}

/// `POST /register` body
#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone", &self.phone)
            .finish_non_exhaustive()
    }
}

/// `PUT /profile` body. Unset fields are left unchanged by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.phone.is_none()
    }
}

/// `POST /change-password` body
#[derive(Serialize)]
pub(crate) struct PasswordChange<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

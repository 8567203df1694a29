use std::fmt;

use serde::{Deserialize, Serialize};

/// Role carried on the authenticated user. Unknown backend roles are kept
/// verbatim so a newer server never breaks deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Architect,
    Editor,
    Viewer,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Architect => "architect",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
            Role::Other(s) => s,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "architect" => Role::Architect,
            "editor" => Role::Editor,
            "viewer" => Role::Viewer,
            _ => Role::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
}

/// Who is logged in, and with which credential.
///
/// Invariant: `is_authenticated` implies `token.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl Session {
    pub fn authenticated(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            is_authenticated: true,
        }
    }

    pub fn is_consistent(&self) -> bool {
        !self.is_authenticated || self.token.is_some()
    }

    pub fn role(&self) -> Option<&Role> {
        self.user.as_ref().map(|u| &u.role)
    }
}

/// On-disk envelope of the session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: Session,
    #[serde(default)]
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trips_known_and_unknown() {
        let roles: Vec<Role> =
            serde_json::from_value(json!(["admin", "Viewer", "data_steward"])).unwrap();
        assert_eq!(
            roles,
            vec![
                Role::Admin,
                Role::Viewer,
                Role::Other("data_steward".to_string())
            ]
        );
        assert_eq!(
            serde_json::to_value(&roles).unwrap(),
            json!(["admin", "viewer", "data_steward"])
        );
    }

    #[test]
    fn test_persisted_session_shape() {
        let user = User {
            id: "u1".to_string(),
            email: "admin@archzero.local".to_string(),
            name: None,
            role: Role::Admin,
        };
        let record = PersistedSession {
            state: Session::authenticated(user, "tok".to_string()),
            version: 0,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["state"]["isAuthenticated"], json!(true));
        assert_eq!(value["state"]["token"], json!("tok"));
        assert_eq!(value["state"]["user"]["role"], json!("admin"));
        assert_eq!(value["version"], json!(0));
    }

    #[test]
    fn test_session_consistency() {
        assert!(Session::default().is_consistent());

        let broken = Session {
            user: None,
            token: None,
            is_authenticated: true,
        };
        assert!(!broken.is_consistent());
    }
}

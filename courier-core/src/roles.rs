//! Role registry and user profiles kept in the document store.
//!
//! - `roles/{email}`: `{ role }`
//! - `users/{uid}`: `{ email, displayName }`
//! - `admins/{email}`: `{ email, createdAt }`
//!
//! Emails are lower-cased before being used as keys.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::chat::now_millis;
use crate::error::{CourierError, CourierResult};
use crate::store::{read_as, read_children, DocumentStore};

const ROLES_ROOT: &str = "roles";
const USERS_ROOT: &str = "users";
const ADMINS_ROOT: &str = "admins";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EscrowAgent,
    Admin,
    User,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::EscrowAgent => write!(f, "escrow_agent"),
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "escrow_agent" => Ok(Role::EscrowAgent),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRecord {
    role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRecord {
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub email: String,
    #[serde(default)]
    pub created_at: i64,
}

fn email_key(email: &str) -> CourierResult<String> {
    let key = email.trim().to_lowercase();
    if key.is_empty() {
        return Err(CourierError::MissingField("email".to_string()));
    }
    if key.contains('/') || key.chars().any(char::is_control) {
        return Err(CourierError::invalid_argument(
            "email",
            "must not contain '/' or control characters",
        ));
    }
    Ok(key)
}

#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn DocumentStore>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn grant_role(&self, email: &str, role: Role) -> CourierResult<()> {
        let key = email_key(email)?;
        if role == Role::Unknown {
            return Err(CourierError::invalid_argument("role", "cannot grant unknown role"));
        }
        self.store
            .set(&format!("{}/{}", ROLES_ROOT, key), json!({ "role": role }))
            .await?;
        info!(email = %key, role = %role, "Granted role");
        Ok(())
    }

    pub async fn revoke_role(&self, email: &str) -> CourierResult<()> {
        let key = email_key(email)?;
        self.store.remove(&format!("{}/{}", ROLES_ROOT, key)).await?;
        info!(email = %key, "Revoked role");
        Ok(())
    }

    pub async fn role_of(&self, email: &str) -> CourierResult<Option<Role>> {
        let key = email_key(email)?;
        let record: Option<RoleRecord> =
            read_as(self.store.as_ref(), &format!("{}/{}", ROLES_ROOT, key)).await?;
        Ok(record.map(|r| r.role))
    }

    pub async fn upsert_profile(&self, profile: &UserProfile) -> CourierResult<()> {
        crate::chat::validate_id("uid", &profile.uid)?;
        let email = email_key(&profile.email)?;
        self.store
            .set(
                &format!("{}/{}", USERS_ROOT, profile.uid),
                json!({ "email": email, "displayName": profile.display_name }),
            )
            .await?;
        debug!(uid = %profile.uid, "Stored user profile");
        Ok(())
    }

    pub async fn profile(&self, uid: &str) -> CourierResult<Option<UserProfile>> {
        crate::chat::validate_id("uid", uid)?;
        let record: Option<ProfileRecord> =
            read_as(self.store.as_ref(), &format!("{}/{}", USERS_ROOT, uid)).await?;
        Ok(record.map(|r| UserProfile {
            uid: uid.to_string(),
            email: r.email,
            display_name: r.display_name,
        }))
    }

    pub async fn find_user_by_email(&self, email: &str) -> CourierResult<Option<UserProfile>> {
        let key = email_key(email)?;
        let users: Vec<(String, ProfileRecord)> =
            read_children(self.store.as_ref(), USERS_ROOT).await?;

        Ok(users
            .into_iter()
            .find(|(_, record)| record.email.trim().to_lowercase() == key)
            .map(|(uid, record)| UserProfile {
                uid,
                email: record.email,
                display_name: record.display_name,
            }))
    }

    pub async fn add_admin(&self, email: &str) -> CourierResult<()> {
        let key = email_key(email)?;
        self.store
            .set(
                &format!("{}/{}", ADMINS_ROOT, key),
                json!({ "email": key, "createdAt": now_millis() }),
            )
            .await?;
        info!(email = %key, "Added admin");
        Ok(())
    }

    pub async fn remove_admin(&self, email: &str) -> CourierResult<()> {
        let key = email_key(email)?;
        self.store.remove(&format!("{}/{}", ADMINS_ROOT, key)).await?;
        info!(email = %key, "Removed admin");
        Ok(())
    }

    pub async fn is_admin(&self, email: &str) -> CourierResult<bool> {
        let key = email_key(email)?;
        Ok(self
            .store
            .get(&format!("{}/{}", ADMINS_ROOT, key))
            .await?
            .is_some())
    }

    pub async fn list_admins(&self) -> CourierResult<Vec<AdminRecord>> {
        let admins: Vec<(String, AdminRecord)> =
            read_children(self.store.as_ref(), ADMINS_ROOT).await?;
        Ok(admins.into_iter().map(|(_, record)| record).collect())
    }

    /// Profile id of the account that handles escrow conversations.
    ///
    /// Escrow agents are preferred over admins; within a role, emails are
    /// tried in key order until one resolves to a profile.
    pub async fn find_escrow_agent(&self) -> CourierResult<Option<String>> {
        let roles: Vec<(String, RoleRecord)> =
            read_children(self.store.as_ref(), ROLES_ROOT).await?;

        for wanted in [Role::EscrowAgent, Role::Admin] {
            for (email, _) in roles.iter().filter(|(_, record)| record.role == wanted) {
                if let Some(profile) = self.find_user_by_email(email).await? {
                    debug!(email = %email, uid = %profile.uid, role = %wanted, "Resolved escrow agent");
                    return Ok(Some(profile.uid));
                }
            }
        }

        Ok(None)
    }
}

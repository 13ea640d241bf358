//! User profiles and role administration.
//!
//! Anyone may register; a new profile starts as [`Role::Pending`] and has no access until an
//! administrator assigns a role. The last remaining administrator cannot be demoted.

use crate::access::{Actor, Permission, Role};
use crate::error::{CoreError, CoreResult, FieldError};
use crate::repositories::units::HealthUnit;
use crate::store::{Collection, Document, DocumentStore, StoreTxn};
use crate::validation::{required_text, FieldErrors};
use chrono::{DateTime, Utc};
use reqtrack_types::EmailAddress;
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: RecordId,
    pub name: String,
    pub email: EmailAddress,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<RecordId>,
    pub created_at: DateTime<Utc>,
}

impl Document for UserProfile {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> RecordId {
        self.id
    }
}

impl UserProfile {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            role: self.role,
            unit_id: self.unit_id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UserService {
    store: Arc<DocumentStore>,
}

impl UserService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Creates a pending profile.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if the name is blank or the email is malformed.
    /// - [`CoreError::Conflict`] if the email is already registered.
    pub fn register(&self, name: &str, email: &str) -> CoreResult<UserProfile> {
        self.create_profile(name, email, Role::Pending)
    }

    fn create_profile(&self, name: &str, email: &str, role: Role) -> CoreResult<UserProfile> {
        let mut errors = FieldErrors::new();
        let name = errors.check(required_text("name", name));
        let email = errors.check(
            EmailAddress::parse(email).map_err(|e| FieldError::new("email", e.to_string())),
        );
        errors.into_result()?;
        let (Some(name), Some(email)) = (name, email) else {
            return Err(CoreError::InvalidInput("incomplete profile".into()));
        };

        let profile = self
            .store
            .transaction(|tx| insert_profile(tx, name.into_inner(), email, role))?;
        tracing::info!(user_id = %profile.id, role = %profile.role, "registered user profile");
        Ok(profile)
    }

    pub fn get(&self, id: &RecordId) -> CoreResult<UserProfile> {
        self.store.get(id)
    }

    pub fn find_by_email(&self, email: &EmailAddress) -> Option<UserProfile> {
        find_by_email(&self.store.list::<UserProfile>(), email)
    }

    /// Resolves the caller identified by a request header into an [`Actor`].
    ///
    /// An unknown id is reported as [`CoreError::Unauthenticated`] rather than `NotFound`.
    pub fn actor_for(&self, user_id: &RecordId) -> CoreResult<Actor> {
        match self.store.find::<UserProfile>(user_id)? {
            Some(profile) => Ok(profile.actor()),
            None => Err(CoreError::Unauthenticated(format!(
                "no user profile {}",
                user_id
            ))),
        }
    }

    /// All profiles, sorted by name.
    pub fn list(&self, actor: &Actor) -> CoreResult<Vec<UserProfile>> {
        actor.require(Permission::ManageUsers)?;
        let mut users = self.store.list::<UserProfile>();
        users.sort_by_key(|u| u.name.to_lowercase());
        Ok(users)
    }

    pub fn set_role(&self, actor: &Actor, id: &RecordId, role: Role) -> CoreResult<UserProfile> {
        actor.require(Permission::ManageUsers)?;

        let updated = self.store.transaction(|tx| {
            let target: UserProfile = tx.get(id)?;
            if target.role == Role::Admin && role != Role::Admin && admin_count(tx) <= 1 {
                return Err(CoreError::Conflict(
                    "cannot demote the last administrator".into(),
                ));
            }
            tx.modify::<UserProfile, _>(id, |profile| {
                profile.role = role;
                Ok(())
            })
        })?;
        tracing::info!(user_id = %id, role = %role, by = %actor.user_id, "changed user role");
        Ok(updated)
    }

    /// Binds a user to a health unit, or clears the binding with `None`.
    pub fn assign_unit(
        &self,
        actor: &Actor,
        id: &RecordId,
        unit_id: Option<RecordId>,
    ) -> CoreResult<UserProfile> {
        actor.require(Permission::ManageUsers)?;
        self.store.transaction(|tx| {
            if let Some(unit_id) = &unit_id {
                if !tx.exists::<HealthUnit>(unit_id) {
                    return Err(CoreError::field("unit_id", "unknown health unit"));
                }
            }
            tx.modify::<UserProfile, _>(id, |profile| {
                profile.unit_id = unit_id;
                Ok(())
            })
        })
    }

    /// Makes sure at least one administrator exists.
    ///
    /// When none does, the profile registered under `email` is promoted, or a new admin profile
    /// is created. Returns the profile that became admin, or `None` if an admin already existed.
    pub fn ensure_admin(&self, name: &str, email: &str) -> CoreResult<Option<UserProfile>> {
        let parsed = EmailAddress::parse(email)?;
        let name = required_text("name", name).map_err(|e| CoreError::Validation(vec![e]))?;

        let admin = self.store.transaction(|tx| {
            if admin_count(tx) > 0 {
                return Ok(None);
            }
            let profile = match find_by_email(&tx.list::<UserProfile>(), &parsed) {
                Some(existing) => tx.modify::<UserProfile, _>(&existing.id, |p| {
                    p.role = Role::Admin;
                    Ok(())
                })?,
                None => insert_profile(tx, name.into_inner(), parsed, Role::Admin)?,
            };
            Ok(Some(profile))
        })?;
        if let Some(admin) = &admin {
            tracing::info!(user_id = %admin.id, "bootstrapped administrator");
        }
        Ok(admin)
    }
}

fn find_by_email(profiles: &[UserProfile], email: &EmailAddress) -> Option<UserProfile> {
    profiles.iter().find(|p| &p.email == email).cloned()
}

fn admin_count(tx: &StoreTxn<'_>) -> usize {
    tx.list::<UserProfile>()
        .iter()
        .filter(|p| p.role == Role::Admin)
        .count()
}

/// Inserts a profile unless its email is taken. Runs inside a store transaction.
fn insert_profile(
    tx: &StoreTxn<'_>,
    name: String,
    email: EmailAddress,
    role: Role,
) -> CoreResult<UserProfile> {
    if find_by_email(&tx.list::<UserProfile>(), &email).is_some() {
        return Err(CoreError::Conflict(format!(
            "email {} is already registered",
            email
        )));
    }
    let profile = UserProfile {
        id: RecordId::new(),
        name,
        email,
        role,
        unit_id: None,
        created_at: Utc::now(),
    };
    tx.insert(&profile)?;
    Ok(profile)
}

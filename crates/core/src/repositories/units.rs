//! Health units: the municipal clinics and centres requisitions are routed through.

use crate::access::{Actor, Permission};
use crate::error::{CoreError, CoreResult};
use crate::repositories::agents::HealthAgent;
use crate::repositories::requisitions::Requisition;
use crate::store::{Collection, Document, DocumentStore, StoreTxn};
use crate::validation::{optional_cnes, optional_phone, optional_text, required_text, FieldErrors};
use chrono::{DateTime, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthUnit {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for HealthUnit {
    const COLLECTION: Collection = Collection::Units;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Unvalidated unit fields as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInput {
    pub name: String,
    #[serde(default)]
    pub cnes: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

struct ValidUnit {
    name: String,
    cnes: Option<String>,
    address: Option<String>,
    phone: Option<String>,
}

fn validate(input: &UnitInput) -> CoreResult<ValidUnit> {
    let mut errors = FieldErrors::new();
    let name = errors.check(required_text("name", &input.name));
    let cnes = errors.check(optional_cnes("cnes", input.cnes.as_deref()));
    let phone = errors.check(optional_phone("phone", input.phone.as_deref()));
    errors
        .finish(|| ValidUnit {
            name: name.map(|n| n.into_inner()).unwrap_or_default(),
            cnes: cnes.flatten(),
            address: optional_text(input.address.as_deref()),
            phone: phone.flatten(),
        })
        .map_err(CoreError::Validation)
}

#[derive(Clone, Debug)]
pub struct UnitService {
    store: Arc<DocumentStore>,
}

impl UnitService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, actor: &Actor, input: &UnitInput) -> CoreResult<HealthUnit> {
        actor.require(Permission::ManageCatalog)?;
        let valid = validate(input)?;

        let now = Utc::now();
        let unit = HealthUnit {
            id: RecordId::new(),
            name: valid.name,
            cnes: valid.cnes,
            address: valid.address,
            phone: valid.phone,
            active: input.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        self.store.transaction(|tx| {
            ensure_unique(tx, &unit.name, unit.cnes.as_deref(), None)?;
            tx.insert(&unit)
        })?;
        tracing::info!(unit_id = %unit.id, "created health unit");
        Ok(unit)
    }

    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<HealthUnit> {
        actor.require(Permission::ViewRequisitions)?;
        self.store.get(id)
    }

    /// Units sorted by name; inactive units are left out unless asked for.
    pub fn list(&self, actor: &Actor, include_inactive: bool) -> CoreResult<Vec<HealthUnit>> {
        actor.require(Permission::ViewRequisitions)?;
        let mut units: Vec<HealthUnit> = self
            .store
            .list::<HealthUnit>()
            .into_iter()
            .filter(|u| include_inactive || u.active)
            .collect();
        units.sort_by_key(|u| u.name.to_lowercase());
        Ok(units)
    }

    pub fn update(&self, actor: &Actor, id: &RecordId, input: &UnitInput) -> CoreResult<HealthUnit> {
        actor.require(Permission::ManageCatalog)?;
        let valid = validate(input)?;

        self.store.transaction(|tx| {
            ensure_unique(tx, &valid.name, valid.cnes.as_deref(), Some(id))?;
            tx.modify::<HealthUnit, _>(id, |unit| {
                unit.name = valid.name;
                unit.cnes = valid.cnes;
                unit.address = valid.address;
                unit.phone = valid.phone;
                if let Some(active) = input.active {
                    unit.active = active;
                }
                unit.updated_at = Utc::now();
                Ok(())
            })
        })
    }

    /// Deletes a unit nothing refers to.
    ///
    /// # Errors
    ///
    /// [`CoreError::Conflict`] while any agent or requisition references the unit.
    pub fn delete(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            if !tx.exists::<HealthUnit>(id) {
                return Err(CoreError::NotFound {
                    collection: Collection::Units.dir_name(),
                    id: id.to_string(),
                });
            }

            let agents = tx
                .list::<HealthAgent>()
                .iter()
                .filter(|a| &a.unit_id == id)
                .count();
            if agents > 0 {
                return Err(CoreError::Conflict(format!(
                    "unit {} still has {} agent(s)",
                    id, agents
                )));
            }
            if tx.list::<Requisition>().iter().any(|r| &r.unit_id == id) {
                return Err(CoreError::Conflict(format!(
                    "unit {} is referenced by requisitions",
                    id
                )));
            }
            tx.delete::<HealthUnit>(id)
        })?;
        tracing::info!(unit_id = %id, "deleted health unit");
        Ok(())
    }
}

fn ensure_unique(
    tx: &StoreTxn<'_>,
    name: &str,
    cnes: Option<&str>,
    except: Option<&RecordId>,
) -> CoreResult<()> {
    let clash = tx.list::<HealthUnit>().into_iter().find(|u| {
        Some(&u.id) != except
            && (u.name.eq_ignore_ascii_case(name) || (cnes.is_some() && u.cnes.as_deref() == cnes))
    });
    match clash {
        Some(existing) => Err(CoreError::Conflict(format!(
            "unit '{}' already uses that name or CNES",
            existing.name
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::repositories::agents::{AgentInput, AgentService};
    use tempfile::TempDir;

    fn admin() -> Actor {
        Actor {
            user_id: RecordId::new(),
            role: Role::Admin,
            unit_id: None,
        }
    }

    fn setup() -> (TempDir, Arc<DocumentStore>, UnitService) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());
        let units = UnitService::new(store.clone());
        (temp, store, units)
    }

    fn input(name: &str) -> UnitInput {
        UnitInput {
            name: name.into(),
            cnes: Some("2077485".into()),
            phone: Some("(11) 3333-4444".into()),
            ..Default::default()
        }
    }

    #[test]
    fn create_normalises_fields() {
        let (_t, _s, units) = setup();
        let unit = units.create(&admin(), &input("UBS Vila Nova")).unwrap();
        assert_eq!(unit.cnes.as_deref(), Some("2077485"));
        assert_eq!(unit.phone.as_deref(), Some("1133334444"));
        assert!(unit.active);
    }

    #[test]
    fn create_rejects_bad_cnes_and_blank_name() {
        let (_t, _s, units) = setup();
        let bad = UnitInput {
            name: "".into(),
            cnes: Some("12".into()),
            ..Default::default()
        };
        match units.create(&admin(), &bad) {
            Err(CoreError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_creates_keep_names_unique() {
        let (_t, store, units) = setup();
        let handles: Vec<_> = ["UBS Sul", "ubs sul", "UBS SUL", "Ubs Sul"]
            .into_iter()
            .map(|name| {
                let units = units.clone();
                std::thread::spawn(move || {
                    units.create(
                        &admin(),
                        &UnitInput {
                            name: name.into(),
                            ..Default::default()
                        },
                    )
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(created, 1);
        assert_eq!(store.list::<HealthUnit>().len(), 1);
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let (_t, _s, units) = setup();
        units.create(&admin(), &input("UBS Centro")).unwrap();
        let dup = UnitInput {
            name: "ubs centro".into(),
            ..Default::default()
        };
        assert!(matches!(
            units.create(&admin(), &dup),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn inactive_units_hidden_by_default() {
        let (_t, _s, units) = setup();
        let unit = units.create(&admin(), &input("UBS Leste")).unwrap();
        let mut change = input("UBS Leste");
        change.active = Some(false);
        units.update(&admin(), &unit.id, &change).unwrap();

        assert!(units.list(&admin(), false).unwrap().is_empty());
        assert_eq!(units.list(&admin(), true).unwrap().len(), 1);
    }

    #[test]
    fn delete_blocked_by_agents() {
        let (_t, store, units) = setup();
        let unit = units.create(&admin(), &input("UBS Sul")).unwrap();
        let agents = AgentService::new(store);
        let agent = agents
            .create(
                &admin(),
                &AgentInput {
                    name: "Joana".into(),
                    unit_id: unit.id.to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(matches!(
            units.delete(&admin(), &unit.id),
            Err(CoreError::Conflict(_))
        ));
        agents.delete(&admin(), &agent.id).unwrap();
        units.delete(&admin(), &unit.id).unwrap();
        assert!(matches!(
            units.get(&admin(), &unit.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn schedulers_cannot_edit_catalog() {
        let (_t, _s, units) = setup();
        let scheduler = Actor {
            user_id: RecordId::new(),
            role: Role::Scheduler,
            unit_id: None,
        };
        assert!(matches!(
            units.create(&scheduler, &input("UBS Norte")),
            Err(CoreError::Forbidden(_))
        ));
    }
}

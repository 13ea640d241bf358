//! Health agents. Each agent works for exactly one health unit.

use crate::access::{Actor, Permission};
use crate::error::{CoreError, CoreResult};
use crate::repositories::requisitions::Requisition;
use crate::repositories::units::HealthUnit;
use crate::store::{Collection, Document, DocumentStore, StoreTxn};
use crate::validation::{optional_phone, record_id, required_text, FieldErrors};
use chrono::{DateTime, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthAgent {
    pub id: RecordId,
    pub name: String,
    pub unit_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for HealthAgent {
    const COLLECTION: Collection = Collection::Agents;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInput {
    pub name: String,
    pub unit_id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct AgentService {
    store: Arc<DocumentStore>,
}

impl AgentService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Checks the fields; the unit must exist when seen through `tx`.
    fn validate(
        tx: &StoreTxn<'_>,
        input: &AgentInput,
    ) -> CoreResult<(String, RecordId, Option<String>)> {
        let mut errors = FieldErrors::new();
        let name = errors.check(required_text("name", &input.name));
        let unit_id = errors.check(record_id("unit_id", &input.unit_id));
        let phone = errors.check(optional_phone("phone", input.phone.as_deref()));
        if let Some(unit_id) = &unit_id {
            if !tx.exists::<HealthUnit>(unit_id) {
                errors.push("unit_id", "unknown health unit");
            }
        }
        errors.into_result()?;

        match (name, unit_id, phone) {
            (Some(name), Some(unit_id), Some(phone)) => Ok((name.into_inner(), unit_id, phone)),
            _ => Err(CoreError::InvalidInput("incomplete agent".into())),
        }
    }

    pub fn create(&self, actor: &Actor, input: &AgentInput) -> CoreResult<HealthAgent> {
        actor.require(Permission::ManageCatalog)?;
        let agent = self.store.transaction(|tx| {
            let (name, unit_id, phone) = Self::validate(tx, input)?;
            let now = Utc::now();
            let agent = HealthAgent {
                id: RecordId::new(),
                name,
                unit_id,
                phone,
                active: input.active.unwrap_or(true),
                created_at: now,
                updated_at: now,
            };
            tx.insert(&agent)?;
            Ok(agent)
        })?;
        tracing::info!(agent_id = %agent.id, unit_id = %agent.unit_id, "created health agent");
        Ok(agent)
    }

    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<HealthAgent> {
        actor.require(Permission::ViewRequisitions)?;
        self.store.get(id)
    }

    /// Active agents sorted by name, optionally only those of one unit.
    pub fn list(
        &self,
        actor: &Actor,
        unit_id: Option<&RecordId>,
        include_inactive: bool,
    ) -> CoreResult<Vec<HealthAgent>> {
        actor.require(Permission::ViewRequisitions)?;
        let mut agents: Vec<HealthAgent> = self
            .store
            .list::<HealthAgent>()
            .into_iter()
            .filter(|a| unit_id.map_or(true, |u| &a.unit_id == u))
            .filter(|a| include_inactive || a.active)
            .collect();
        agents.sort_by_key(|a| a.name.to_lowercase());
        Ok(agents)
    }

    pub fn update(
        &self,
        actor: &Actor,
        id: &RecordId,
        input: &AgentInput,
    ) -> CoreResult<HealthAgent> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            let (name, unit_id, phone) = Self::validate(tx, input)?;
            tx.modify::<HealthAgent, _>(id, |agent| {
                agent.name = name;
                agent.unit_id = unit_id;
                agent.phone = phone;
                if let Some(active) = input.active {
                    agent.active = active;
                }
                agent.updated_at = Utc::now();
                Ok(())
            })
        })
    }

    pub fn delete(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            if tx
                .list::<Requisition>()
                .iter()
                .any(|r| r.agent_id.as_ref() == Some(id))
            {
                return Err(CoreError::Conflict(format!(
                    "agent {} is referenced by requisitions",
                    id
                )));
            }
            tx.delete::<HealthAgent>(id)
        })?;
        tracing::info!(agent_id = %id, "deleted health agent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::repositories::units::{UnitInput, UnitService};
    use tempfile::TempDir;

    fn admin() -> Actor {
        Actor {
            user_id: RecordId::new(),
            role: Role::Admin,
            unit_id: None,
        }
    }

    fn setup() -> (TempDir, UnitService, AgentService) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());
        (
            temp,
            UnitService::new(store.clone()),
            AgentService::new(store),
        )
    }

    fn unit(units: &UnitService, name: &str) -> RecordId {
        units
            .create(
                &admin(),
                &UnitInput {
                    name: name.into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id
    }

    fn agent_input(name: &str, unit_id: &RecordId) -> AgentInput {
        AgentInput {
            name: name.into(),
            unit_id: unit_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn agent_requires_existing_unit() {
        let (_t, _units, agents) = setup();
        match agents.create(&admin(), &agent_input("Joana", &RecordId::new())) {
            Err(CoreError::Validation(errors)) => {
                assert_eq!(errors[0].field, "unit_id");
                assert_eq!(errors[0].message, "unknown health unit");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn list_filters_by_unit() {
        let (_t, units, agents) = setup();
        let north = unit(&units, "UBS Norte");
        let south = unit(&units, "UBS Sul");
        agents.create(&admin(), &agent_input("Bruno", &north)).unwrap();
        agents.create(&admin(), &agent_input("Alice", &north)).unwrap();
        agents.create(&admin(), &agent_input("Carla", &south)).unwrap();

        let names: Vec<_> = agents
            .list(&admin(), Some(&north), false)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alice", "Bruno"]);
        assert_eq!(agents.list(&admin(), None, false).unwrap().len(), 3);
    }

    #[test]
    fn update_can_move_agent_between_units() {
        let (_t, units, agents) = setup();
        let north = unit(&units, "UBS Norte");
        let south = unit(&units, "UBS Sul");
        let agent = agents.create(&admin(), &agent_input("Dora", &north)).unwrap();

        let moved = agents
            .update(&admin(), &agent.id, &agent_input("Dora", &south))
            .unwrap();
        assert_eq!(moved.unit_id, south);
    }

    #[test]
    fn pending_users_cannot_list_agents() {
        let (_t, _units, agents) = setup();
        let pending = Actor {
            user_id: RecordId::new(),
            role: Role::Pending,
            unit_id: None,
        };
        assert!(matches!(
            agents.list(&pending, None, false),
            Err(CoreError::Forbidden(_))
        ));
    }
}

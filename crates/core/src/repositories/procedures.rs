//! Procedure catalog: procedure groups and the procedures they contain.

use crate::access::{Actor, Permission};
use crate::error::{CoreError, CoreResult};
use crate::repositories::requisitions::Requisition;
use crate::store::{Collection, Document, DocumentStore, StoreTxn};
use crate::validation::{optional_text, record_id, required_text, FieldErrors};
use chrono::{DateTime, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureGroup {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document for ProcedureGroup {
    const COLLECTION: Collection = Collection::ProcedureGroups;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: RecordId,
    pub name: String,
    pub group_id: RecordId,
    /// Billing table code, kept as entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Procedure {
    const COLLECTION: Collection = Collection::Procedures;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureInput {
    pub name: String,
    pub group_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct ProcedureService {
    store: Arc<DocumentStore>,
}

impl ProcedureService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn create_group(&self, actor: &Actor, input: &GroupInput) -> CoreResult<ProcedureGroup> {
        actor.require(Permission::ManageCatalog)?;
        let name = required_text("name", &input.name)
            .map_err(|e| CoreError::Validation(vec![e]))?
            .into_inner();
        let group = ProcedureGroup {
            id: RecordId::new(),
            name,
            description: optional_text(input.description.as_deref()),
            created_at: Utc::now(),
        };
        self.store.transaction(|tx| {
            if tx
                .list::<ProcedureGroup>()
                .iter()
                .any(|g| g.name.eq_ignore_ascii_case(&group.name))
            {
                return Err(CoreError::Conflict(format!(
                    "procedure group '{}' already exists",
                    group.name
                )));
            }
            tx.insert(&group)
        })?;
        tracing::info!(group_id = %group.id, "created procedure group");
        Ok(group)
    }

    pub fn list_groups(&self, actor: &Actor) -> CoreResult<Vec<ProcedureGroup>> {
        actor.require(Permission::ViewRequisitions)?;
        let mut groups = self.store.list::<ProcedureGroup>();
        groups.sort_by_key(|g| g.name.to_lowercase());
        Ok(groups)
    }

    pub fn delete_group(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            let members = tx
                .list::<Procedure>()
                .iter()
                .filter(|p| &p.group_id == id)
                .count();
            if members > 0 {
                return Err(CoreError::Conflict(format!(
                    "procedure group {} still holds {} procedure(s)",
                    id, members
                )));
            }
            tx.delete::<ProcedureGroup>(id)
        })?;
        tracing::info!(group_id = %id, "deleted procedure group");
        Ok(())
    }

    /// Checks the fields; the group must exist when seen through `tx`.
    fn validate(tx: &StoreTxn<'_>, input: &ProcedureInput) -> CoreResult<(String, RecordId)> {
        let mut errors = FieldErrors::new();
        let name = errors.check(required_text("name", &input.name));
        let group_id = errors.check(record_id("group_id", &input.group_id));
        if let Some(group_id) = &group_id {
            if !tx.exists::<ProcedureGroup>(group_id) {
                errors.push("group_id", "unknown procedure group");
            }
        }
        errors.into_result()?;
        match (name, group_id) {
            (Some(name), Some(group_id)) => Ok((name.into_inner(), group_id)),
            _ => Err(CoreError::InvalidInput("incomplete procedure".into())),
        }
    }

    pub fn create(&self, actor: &Actor, input: &ProcedureInput) -> CoreResult<Procedure> {
        actor.require(Permission::ManageCatalog)?;
        let procedure = self.store.transaction(|tx| {
            let (name, group_id) = Self::validate(tx, input)?;
            let now = Utc::now();
            let procedure = Procedure {
                id: RecordId::new(),
                name,
                group_id,
                code: optional_text(input.code.as_deref()),
                active: input.active.unwrap_or(true),
                created_at: now,
                updated_at: now,
            };
            tx.insert(&procedure)?;
            Ok(procedure)
        })?;
        tracing::info!(procedure_id = %procedure.id, "created procedure");
        Ok(procedure)
    }

    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<Procedure> {
        actor.require(Permission::ViewRequisitions)?;
        self.store.get(id)
    }

    pub fn list(
        &self,
        actor: &Actor,
        group_id: Option<&RecordId>,
        include_inactive: bool,
    ) -> CoreResult<Vec<Procedure>> {
        actor.require(Permission::ViewRequisitions)?;
        let mut procedures: Vec<Procedure> = self
            .store
            .list::<Procedure>()
            .into_iter()
            .filter(|p| group_id.map_or(true, |g| &p.group_id == g))
            .filter(|p| include_inactive || p.active)
            .collect();
        procedures.sort_by_key(|p| p.name.to_lowercase());
        Ok(procedures)
    }

    pub fn update(
        &self,
        actor: &Actor,
        id: &RecordId,
        input: &ProcedureInput,
    ) -> CoreResult<Procedure> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            let (name, group_id) = Self::validate(tx, input)?;
            tx.modify::<Procedure, _>(id, |procedure| {
                procedure.name = name;
                procedure.group_id = group_id;
                procedure.code = optional_text(input.code.as_deref());
                if let Some(active) = input.active {
                    procedure.active = active;
                }
                procedure.updated_at = Utc::now();
                Ok(())
            })
        })
    }

    /// Deletes a procedure no requisition asks for. Retire used procedures with `active: false`.
    pub fn delete(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        actor.require(Permission::ManageCatalog)?;
        self.store.transaction(|tx| {
            if tx
                .list::<Requisition>()
                .iter()
                .any(|r| r.procedures.iter().any(|line| &line.procedure_id == id))
            {
                return Err(CoreError::Conflict(format!(
                    "procedure {} is referenced by requisitions",
                    id
                )));
            }
            tx.delete::<Procedure>(id)
        })?;
        tracing::info!(procedure_id = %id, "deleted procedure");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use tempfile::TempDir;

    fn admin() -> Actor {
        Actor {
            user_id: RecordId::new(),
            role: Role::Admin,
            unit_id: None,
        }
    }

    fn setup() -> (TempDir, ProcedureService) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());
        (temp, ProcedureService::new(store))
    }

    fn group(service: &ProcedureService, name: &str) -> ProcedureGroup {
        service
            .create_group(
                &admin(),
                &GroupInput {
                    name: name.into(),
                    description: None,
                },
            )
            .unwrap()
    }

    fn procedure_input(name: &str, group_id: &RecordId) -> ProcedureInput {
        ProcedureInput {
            name: name.into(),
            group_id: group_id.to_string(),
            code: Some("0205020046".into()),
            active: None,
        }
    }

    #[test]
    fn procedure_requires_existing_group() {
        let (_t, service) = setup();
        let err = service
            .create(&admin(), &procedure_input("Ultrassonografia", &RecordId::new()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ref e) if e[0].field == "group_id"));
    }

    #[test]
    fn group_delete_blocked_while_it_has_procedures() {
        let (_t, service) = setup();
        let imaging = group(&service, "Imagem");
        let procedure = service
            .create(&admin(), &procedure_input("Raio-X de tórax", &imaging.id))
            .unwrap();

        assert!(matches!(
            service.delete_group(&admin(), &imaging.id),
            Err(CoreError::Conflict(_))
        ));
        service.delete(&admin(), &procedure.id).unwrap();
        service.delete_group(&admin(), &imaging.id).unwrap();
        assert!(service.list_groups(&admin()).unwrap().is_empty());
    }

    #[test]
    fn duplicate_group_names_conflict() {
        let (_t, service) = setup();
        group(&service, "Consultas");
        let err = service
            .create_group(
                &admin(),
                &GroupInput {
                    name: "CONSULTAS".into(),
                    description: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn list_filters_by_group_and_activity() {
        let (_t, service) = setup();
        let imaging = group(&service, "Imagem");
        let labs = group(&service, "Laboratório");
        service
            .create(&admin(), &procedure_input("Tomografia", &imaging.id))
            .unwrap();
        let retired = service
            .create(&admin(), &procedure_input("Hemograma", &labs.id))
            .unwrap();
        let mut change = procedure_input("Hemograma", &labs.id);
        change.active = Some(false);
        service.update(&admin(), &retired.id, &change).unwrap();

        assert_eq!(
            service.list(&admin(), Some(&imaging.id), false).unwrap().len(),
            1
        );
        assert!(service.list(&admin(), Some(&labs.id), false).unwrap().is_empty());
        assert_eq!(service.list(&admin(), None, true).unwrap().len(), 2);
    }
}

//! Requisitions: a patient's procedure request tracked through the status workflow.
//!
//! Creation validates the form with the wizard schema, then checks references against the
//! store: the unit must exist and be active, an agent must belong to that unit, and every
//! procedure must exist and be active. Visibility follows [`Actor::unit_scope`]; a requisition
//! outside the caller's unit is reported as not found.

use crate::access::{Actor, Permission};
use crate::error::{CoreError, CoreResult};
use crate::repositories::agents::HealthAgent;
use crate::repositories::drafts::Draft;
use crate::repositories::procedures::Procedure;
use crate::repositories::units::HealthUnit;
use crate::store::{Collection, Document, DocumentStore, StoreTxn};
use crate::validation::{optional_note, FieldErrors};
use crate::wizard::schema::{validate_form, RequisitionForm};
use crate::workflow::{plan, HistoryEntry, RequisitionStatus, Schedule, Transition};
use chrono::{DateTime, NaiveDate, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Routine,
    Priority,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Routine => "routine",
            Priority::Priority => "priority",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(Priority::Routine),
            "priority" => Ok(Priority::Priority),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(CoreError::field("priority", format!("unknown priority '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    /// National health card number, digits only.
    pub cns: String,
    pub birth_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureLine {
    pub procedure_id: RecordId,
    pub quantity: u32,
}

/// An uploaded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub client_id: String,
    pub file_name: String,
    /// Backend-qualified location, e.g. `local:<folder>/<file>` or `drive:<path>`.
    pub reference: String,
}

/// A validated requisition that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequisition {
    pub patient: Patient,
    pub unit_id: RecordId,
    pub agent_id: Option<RecordId>,
    pub priority: Priority,
    pub procedures: Vec<ProcedureLine>,
    pub images: Vec<ImageRef>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RecordId,
    pub protocol: String,
    pub patient: Patient,
    pub unit_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<RecordId>,
    pub procedures: Vec<ProcedureLine>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    pub priority: Priority,
    pub status: RequisitionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
}

impl Document for Requisition {
    const COLLECTION: Collection = Collection::Requisitions;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
    pub unit_id: Option<RecordId>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring of the patient's name, or an exact CNS.
    pub patient: Option<String>,
}

impl RequisitionFilter {
    fn matches(&self, r: &Requisition) -> bool {
        if self.status.is_some_and(|s| s != r.status) {
            return false;
        }
        if self.unit_id.is_some_and(|u| u != r.unit_id) {
            return false;
        }
        if self.priority.is_some_and(|p| p != r.priority) {
            return false;
        }
        match self.patient.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(needle) => {
                r.patient.cns == needle
                    || r.patient
                        .name
                        .to_lowercase()
                        .contains(&needle.to_lowercase())
            }
            None => true,
        }
    }
}

/// Requisition counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub canceled: usize,
    pub resolicited: usize,
    pub total: usize,
}

impl StatusSummary {
    fn count(&mut self, status: RequisitionStatus) {
        let slot = match status {
            RequisitionStatus::Pending => &mut self.pending,
            RequisitionStatus::Scheduled => &mut self.scheduled,
            RequisitionStatus::Completed => &mut self.completed,
            RequisitionStatus::Canceled => &mut self.canceled,
            RequisitionStatus::Resolicited => &mut self.resolicited,
        };
        *slot += 1;
        self.total += 1;
    }
}

#[derive(Clone, Debug)]
pub struct RequisitionService {
    store: Arc<DocumentStore>,
}

impl RequisitionService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Validates `form` and stores it as a new pending requisition.
    pub fn create(&self, actor: &Actor, form: &RequisitionForm) -> CoreResult<Requisition> {
        actor.require(Permission::CreateRequisitions)?;
        let new = validate_form(form, Utc::now().date_naive()).map_err(CoreError::Validation)?;
        self.create_validated(actor, new)
    }

    /// Stores an already validated requisition after checking its references.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Forbidden`] if the actor may not create requisitions, or is bound to a
    ///   different unit.
    /// - [`CoreError::Validation`] when a referenced unit, agent or procedure is unknown,
    ///   inactive, or (for agents) belongs to another unit.
    pub fn create_validated(&self, actor: &Actor, new: NewRequisition) -> CoreResult<Requisition> {
        actor.require(Permission::CreateRequisitions)?;
        if let Some(scope) = actor.unit_scope() {
            if scope != new.unit_id {
                return Err(CoreError::Forbidden(
                    "registrars can only create requisitions for their own unit".into(),
                ));
            }
        }
        let id = RecordId::new();
        let now = Utc::now();
        let requisition = Requisition {
            id,
            protocol: id.protocol(now),
            patient: new.patient,
            unit_id: new.unit_id,
            agent_id: new.agent_id,
            procedures: new.procedures,
            images: new.images,
            priority: new.priority,
            status: RequisitionStatus::Pending,
            schedule: None,
            notes: new.notes,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
            history: vec![HistoryEntry::created(actor.user_id, now)],
        };
        self.store.transaction(|tx| {
            check_references(tx, &requisition)?;
            tx.insert(&requisition)
        })?;
        tracing::info!(
            requisition_id = %requisition.id,
            protocol = %requisition.protocol,
            unit_id = %requisition.unit_id,
            "created requisition"
        );
        Ok(requisition)
    }

    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<Requisition> {
        actor.require(Permission::ViewRequisitions)?;
        let requisition: Requisition = self.store.get(id)?;
        if !actor.can_see_unit(&requisition.unit_id) {
            return Err(not_found(id));
        }
        Ok(requisition)
    }

    /// Visible requisitions matching `filter`, newest first.
    pub fn list(&self, actor: &Actor, filter: &RequisitionFilter) -> CoreResult<Vec<Requisition>> {
        actor.require(Permission::ViewRequisitions)?;
        let mut found: Vec<Requisition> = self
            .store
            .list::<Requisition>()
            .into_iter()
            .filter(|r| actor.can_see_unit(&r.unit_id) && filter.matches(r))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    pub fn summary(&self, actor: &Actor) -> CoreResult<StatusSummary> {
        actor.require(Permission::ViewRequisitions)?;
        let mut summary = StatusSummary::default();
        for r in self.store.list::<Requisition>() {
            if actor.can_see_unit(&r.unit_id) {
                summary.count(r.status);
            }
        }
        Ok(summary)
    }

    /// Moves a requisition along the workflow and appends the history entry.
    pub fn transition(
        &self,
        actor: &Actor,
        id: &RecordId,
        transition: Transition,
    ) -> CoreResult<Requisition> {
        actor.require(Permission::TransitionRequisitions)?;
        let updated = self.store.modify::<Requisition, _>(id, |r| {
            if !actor.can_see_unit(&r.unit_id) {
                return Err(not_found(id));
            }
            let now = Utc::now();
            let entry = plan(
                r.status,
                &transition,
                r.created_at.date_naive(),
                actor.user_id,
                now,
            )?;
            if let Transition::Schedule(schedule) = &transition {
                r.schedule = Some(schedule.clone());
            }
            r.status = entry.to;
            r.history.push(entry);
            r.updated_at = now;
            Ok(())
        })?;
        tracing::info!(
            requisition_id = %id,
            status = %updated.status,
            by = %actor.user_id,
            "requisition status changed"
        );
        Ok(updated)
    }

    /// Replaces the free-text notes. Registrars and schedulers may both annotate.
    pub fn update_notes(
        &self,
        actor: &Actor,
        id: &RecordId,
        notes: Option<&str>,
    ) -> CoreResult<Requisition> {
        if !actor.role.allows(Permission::CreateRequisitions) {
            actor.require(Permission::TransitionRequisitions)?;
        }
        let notes = optional_note("notes", notes).map_err(|e| CoreError::Validation(vec![e]))?;
        self.store.modify::<Requisition, _>(id, |r| {
            if !actor.can_see_unit(&r.unit_id) {
                return Err(not_found(id));
            }
            r.notes = notes;
            r.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Records an uploaded attachment. Re-attaching the same client id replaces the old entry.
    pub fn attach_image(
        &self,
        actor: &Actor,
        id: &RecordId,
        image: ImageRef,
    ) -> CoreResult<Requisition> {
        actor.require(Permission::UploadFiles)?;
        self.store.modify::<Requisition, _>(id, |r| {
            if !actor.can_see_unit(&r.unit_id) {
                return Err(not_found(id));
            }
            if r.status.is_terminal() {
                return Err(CoreError::Conflict(format!(
                    "requisition {} is {}",
                    r.protocol, r.status
                )));
            }
            r.images.retain(|i| i.client_id != image.client_id);
            r.images.push(image);
            r.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Whether a stored attachment already belongs to some record other than one `actor` is
    /// creating: it is attached to a requisition, or it sits in the folder of an existing
    /// requisition or of another user's draft.
    pub fn attachment_claimed(&self, actor: &Actor, folder: &str, reference: &str) -> bool {
        if let Ok(owner) = RecordId::parse(folder) {
            if self.store.exists::<Requisition>(&owner) {
                return true;
            }
            if let Ok(Some(draft)) = self.store.find::<Draft>(&owner) {
                if draft.owner != actor.user_id {
                    return true;
                }
            }
        }
        self.store
            .list::<Requisition>()
            .iter()
            .any(|r| r.images.iter().any(|i| i.reference == reference))
    }

    /// Removes an attachment entry and returns it so the caller can delete the stored file.
    pub fn detach_image(&self, actor: &Actor, id: &RecordId, client_id: &str) -> CoreResult<ImageRef> {
        actor.require(Permission::UploadFiles)?;
        let mut removed = None;
        self.store.modify::<Requisition, _>(id, |r| {
            if !actor.can_see_unit(&r.unit_id) {
                return Err(not_found(id));
            }
            let position = r
                .images
                .iter()
                .position(|i| i.client_id == client_id)
                .ok_or_else(|| CoreError::NotFound {
                    collection: "images",
                    id: client_id.to_string(),
                })?;
            removed = Some(r.images.remove(position));
            r.updated_at = Utc::now();
            Ok(())
        })?;
        removed.ok_or_else(|| CoreError::NotFound {
            collection: "images",
            id: client_id.to_string(),
        })
    }
}

/// Every referenced unit, agent and procedure must exist and be active when the record lands.
fn check_references(tx: &StoreTxn<'_>, new: &Requisition) -> CoreResult<()> {
    let mut errors = FieldErrors::new();

    match tx.find::<HealthUnit>(&new.unit_id)? {
        None => errors.push("unit_id", "unknown health unit"),
        Some(unit) if !unit.active => errors.push("unit_id", "health unit is inactive"),
        Some(_) => {}
    }

    if let Some(agent_id) = &new.agent_id {
        match tx.find::<HealthAgent>(agent_id)? {
            None => errors.push("agent_id", "unknown health agent"),
            Some(agent) if agent.unit_id != new.unit_id => {
                errors.push("agent_id", "agent does not belong to the selected unit")
            }
            Some(agent) if !agent.active => errors.push("agent_id", "health agent is inactive"),
            Some(_) => {}
        }
    }

    for line in &new.procedures {
        match tx.find::<Procedure>(&line.procedure_id)? {
            None => errors.push(
                "procedures",
                format!("unknown procedure {}", line.procedure_id),
            ),
            Some(p) if !p.active => {
                errors.push("procedures", format!("procedure '{}' is inactive", p.name))
            }
            Some(_) => {}
        }
    }

    errors.into_result()
}

fn not_found(id: &RecordId) -> CoreError {
    CoreError::NotFound {
        collection: Collection::Requisitions.dir_name(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::repositories::agents::{AgentInput, AgentService};
    use crate::repositories::procedures::{GroupInput, ProcedureInput, ProcedureService};
    use crate::repositories::units::{UnitInput, UnitService};
    use crate::wizard::schema::PatientForm;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        service: RequisitionService,
        unit: RecordId,
        other_unit: RecordId,
        agent: RecordId,
        procedure: RecordId,
    }

    fn actor(role: Role, unit_id: Option<RecordId>) -> Actor {
        Actor {
            user_id: RecordId::new(),
            role,
            unit_id,
        }
    }

    fn admin() -> Actor {
        actor(Role::Admin, None)
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());
        let units = UnitService::new(store.clone());
        let unit_input = |name: &str| UnitInput {
            name: name.into(),
            ..Default::default()
        };
        let unit = units.create(&admin(), &unit_input("UBS Centro")).unwrap().id;
        let other_unit = units.create(&admin(), &unit_input("UBS Rural")).unwrap().id;

        let agent = AgentService::new(store.clone())
            .create(
                &admin(),
                &AgentInput {
                    name: "Agente Paula".into(),
                    unit_id: unit.to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;

        let procedures = ProcedureService::new(store.clone());
        let group = procedures
            .create_group(
                &admin(),
                &GroupInput {
                    name: "Imagem".into(),
                    description: None,
                },
            )
            .unwrap();
        let procedure = procedures
            .create(
                &admin(),
                &ProcedureInput {
                    name: "Ultrassom".into(),
                    group_id: group.id.to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;

        Fixture {
            _temp: temp,
            service: RequisitionService::new(store),
            unit,
            other_unit,
            agent,
            procedure,
        }
    }

    fn form(fx: &Fixture, unit: RecordId, name: &str) -> RequisitionForm {
        RequisitionForm {
            patient: PatientForm {
                name: name.into(),
                cns: "898001234567890".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 15),
                phone: None,
                mother_name: None,
            },
            unit_id: Some(unit),
            agent_id: None,
            priority: Some(Priority::Routine),
            procedures: vec![ProcedureLine {
                procedure_id: fx.procedure,
                quantity: 1,
            }],
            images: vec![],
            notes: None,
        }
    }

    fn schedule(date: NaiveDate) -> Transition {
        Transition::Schedule(Schedule {
            date,
            location: None,
            notes: None,
        })
    }

    #[test]
    fn create_sets_pending_protocol_and_history() {
        let fx = fixture();
        let creator = admin();
        let r = fx
            .service
            .create(&creator, &form(&fx, fx.unit, "Maria Souza"))
            .unwrap();

        assert_eq!(r.status, RequisitionStatus::Pending);
        assert_eq!(r.history.len(), 1);
        assert_eq!(r.history[0].from, None);
        assert_eq!(r.history[0].by, creator.user_id);
        assert_eq!(r.protocol, r.id.protocol(r.created_at));
        assert_eq!(fx.service.get(&creator, &r.id).unwrap(), r);
    }

    #[test]
    fn agent_must_belong_to_unit() {
        let fx = fixture();
        let mut f = form(&fx, fx.other_unit, "Maria Souza");
        f.agent_id = Some(fx.agent);
        match fx.service.create(&admin(), &f) {
            Err(CoreError::Validation(errors)) => assert_eq!(errors[0].field, "agent_id"),
            other => panic!("expected validation error, got {other:?}"),
        }

        f.unit_id = Some(fx.unit);
        assert!(fx.service.create(&admin(), &f).is_ok());
    }

    #[test]
    fn unknown_procedure_rejected() {
        let fx = fixture();
        let mut f = form(&fx, fx.unit, "Maria Souza");
        f.procedures[0].procedure_id = RecordId::new();
        assert!(matches!(
            fx.service.create(&admin(), &f),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn registrar_confined_to_own_unit() {
        let fx = fixture();
        let registrar = actor(Role::Registrar, Some(fx.unit));
        assert!(matches!(
            fx.service
                .create(&registrar, &form(&fx, fx.other_unit, "Ana Lima")),
            Err(CoreError::Forbidden(_))
        ));
        assert!(fx
            .service
            .create(&registrar, &form(&fx, fx.unit, "Ana Lima"))
            .is_ok());
    }

    #[test]
    fn listing_is_scoped_filtered_and_newest_first() {
        let fx = fixture();
        let first = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Carlos Dias"))
            .unwrap();
        let second = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Beatriz Reis"))
            .unwrap();
        fx.service
            .create(&admin(), &form(&fx, fx.other_unit, "Carla Nunes"))
            .unwrap();

        let viewer = actor(Role::Viewer, Some(fx.unit));
        let ids: Vec<_> = fx
            .service
            .list(&viewer, &RequisitionFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let by_name = RequisitionFilter {
            patient: Some("car".into()),
            ..Default::default()
        };
        assert_eq!(fx.service.list(&admin(), &by_name).unwrap().len(), 2);
        assert_eq!(fx.service.list(&viewer, &by_name).unwrap().len(), 1);
    }

    #[test]
    fn out_of_scope_requisition_is_not_found() {
        let fx = fixture();
        let r = fx
            .service
            .create(&admin(), &form(&fx, fx.other_unit, "Paulo Gomes"))
            .unwrap();
        let viewer = actor(Role::Viewer, Some(fx.unit));
        assert!(matches!(
            fx.service.get(&viewer, &r.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn workflow_appends_history_and_summary_counts() {
        let fx = fixture();
        let scheduler = actor(Role::Scheduler, None);
        let r = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Luiza Prado"))
            .unwrap();
        let date = r.created_at.date_naive() + chrono::Duration::days(7);

        let r = fx.service.transition(&scheduler, &r.id, schedule(date)).unwrap();
        assert_eq!(r.status, RequisitionStatus::Scheduled);
        assert_eq!(r.schedule.as_ref().map(|s| s.date), Some(date));

        let r = fx
            .service
            .transition(
                &scheduler,
                &r.id,
                Transition::Resolicit {
                    reason: "exame incompleto".into(),
                },
            )
            .unwrap();
        let r = fx.service.transition(&scheduler, &r.id, schedule(date)).unwrap();
        let r = fx
            .service
            .transition(&scheduler, &r.id, Transition::Complete { note: None })
            .unwrap();

        let path: Vec<_> = r.history.iter().map(|h| h.to).collect();
        assert_eq!(
            path,
            vec![
                RequisitionStatus::Pending,
                RequisitionStatus::Scheduled,
                RequisitionStatus::Resolicited,
                RequisitionStatus::Scheduled,
                RequisitionStatus::Completed,
            ]
        );

        let err = fx
            .service
            .transition(&scheduler, &r.id, Transition::Cancel { reason: "x".into() })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(fx.service.get(&admin(), &r.id).unwrap().history.len(), 5);

        let summary = fx.service.summary(&admin()).unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn registrars_cannot_transition() {
        let fx = fixture();
        let r = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Luiza Prado"))
            .unwrap();
        let registrar = actor(Role::Registrar, Some(fx.unit));
        assert!(matches!(
            fx.service.transition(
                &registrar,
                &r.id,
                Transition::Cancel {
                    reason: "duplicada".into()
                }
            ),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn images_attach_and_detach() {
        let fx = fixture();
        let r = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Rafael Costa"))
            .unwrap();
        let image = ImageRef {
            client_id: "abc12345".into(),
            file_name: "pedido.jpg".into(),
            reference: format!("local:{}/abc12345__pedido.jpg", r.id),
        };

        let r = fx.service.attach_image(&admin(), &r.id, image.clone()).unwrap();
        let r = fx.service.attach_image(&admin(), &r.id, image.clone()).unwrap();
        assert_eq!(r.images, vec![image.clone()]);

        let removed = fx.service.detach_image(&admin(), &r.id, "abc12345").unwrap();
        assert_eq!(removed, image);
        assert!(matches!(
            fx.service.detach_image(&admin(), &r.id, "abc12345"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn attachments_of_other_records_are_claimed() {
        let fx = fixture();
        let creator = admin();
        let r = fx
            .service
            .create(&creator, &form(&fx, fx.unit, "Rafael Costa"))
            .unwrap();
        let in_requisition = format!("local:{}/abc12345__pedido.jpg", r.id);
        assert!(fx
            .service
            .attachment_claimed(&creator, &r.id.to_string(), &in_requisition));

        let loose = "local:lote-7/abc12345__pedido.jpg";
        assert!(!fx.service.attachment_claimed(&creator, "lote-7", loose));
        fx.service
            .attach_image(
                &creator,
                &r.id,
                ImageRef {
                    client_id: "abc12345".into(),
                    file_name: "pedido.jpg".into(),
                    reference: loose.into(),
                },
            )
            .unwrap();
        assert!(fx.service.attachment_claimed(&creator, "lote-7", loose));

        let drafts = crate::repositories::drafts::DraftService::new(fx.service.store.clone());
        let draft = drafts.create(&creator).unwrap();
        let in_draft = format!("local:{}/zzzz9999__laudo.png", draft.id);
        let folder = draft.id.to_string();
        assert!(!fx.service.attachment_claimed(&creator, &folder, &in_draft));
        assert!(fx.service.attachment_claimed(&admin(), &folder, &in_draft));
    }

    #[test]
    fn notes_are_bounded_and_trimmed() {
        let fx = fixture();
        let r = fx
            .service
            .create(&admin(), &form(&fx, fx.unit, "Rafael Costa"))
            .unwrap();
        let r = fx
            .service
            .update_notes(&admin(), &r.id, Some("  ligar antes  "))
            .unwrap();
        assert_eq!(r.notes.as_deref(), Some("ligar antes"));

        let long = "x".repeat(crate::constants::MAX_NOTE_CHARS + 1);
        assert!(fx.service.update_notes(&admin(), &r.id, Some(&long)).is_err());

        let viewer = actor(Role::Viewer, None);
        assert!(matches!(
            fx.service.update_notes(&viewer, &r.id, None),
            Err(CoreError::Forbidden(_))
        ));
    }
}

//! Wire types for the HTTP API.
//!
//! Ids travel as 32-character hex strings and timestamps as RFC 3339 strings. Request types
//! convert into core inputs; core records convert into response types.

use chrono::NaiveDate;
use reqtrack_core::wizard::images::{ImageItem, ImageStatus};
use reqtrack_core::wizard::schema::{PatientForm, RequisitionForm};
use reqtrack_core::{
    AgentInput, CoreError, CoreResult, Draft, FieldError, GroupInput, HealthAgent, HealthUnit,
    HistoryEntry, ImageRef, Patient, Priority, Procedure, ProcedureGroup, ProcedureInput,
    ProcedureLine, RecordId, Requisition, RequisitionFilter, RequisitionStatus, Schedule,
    StatusSummary, Transition, UnitInput, UserProfile,
};
use reqtrack_files::{FileEntry, StoredFile};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

fn opt_id(id: &Option<RecordId>) -> Option<String> {
    id.as_ref().map(RecordId::to_string)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorDto {
    pub field: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorDto {
    fn from(e: &FieldError) -> Self {
        Self {
            field: e.field.clone(),
            message: e.message.clone(),
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `validation`, `not_found`.
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldErrorDto>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterUserReq {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRes {
    pub id: String,
    pub name: String,
    pub email: String,
    /// One of `pending`, `viewer`, `registrar`, `scheduler`, `admin`.
    pub role: String,
    pub unit_id: Option<String>,
    pub created_at: String,
}

impl From<&UserProfile> for UserRes {
    fn from(u: &UserProfile) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name.clone(),
            email: u.email.to_string(),
            role: u.role.to_string(),
            unit_id: opt_id(&u.unit_id),
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListUsersRes {
    pub users: Vec<UserRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRoleReq {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignUnitReq {
    /// `null` clears the binding.
    pub unit_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UnitReq {
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

impl From<UnitReq> for UnitInput {
    fn from(r: UnitReq) -> Self {
        UnitInput {
            name: r.name,
            cnes: r.cnes,
            address: r.address,
            phone: r.phone,
            active: r.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnitRes {
    pub id: String,
    pub name: String,
    pub cnes: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&HealthUnit> for UnitRes {
    fn from(u: &HealthUnit) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name.clone(),
            cnes: u.cnes.clone(),
            address: u.address.clone(),
            phone: u.phone.clone(),
            active: u.active,
            created_at: u.created_at.to_rfc3339(),
            updated_at: u.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListUnitsRes {
    pub units: Vec<UnitRes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AgentReq {
    pub name: String,
    pub unit_id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<AgentReq> for AgentInput {
    fn from(r: AgentReq) -> Self {
        AgentInput {
            name: r.name,
            unit_id: r.unit_id,
            phone: r.phone,
            active: r.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentRes {
    pub id: String,
    pub name: String,
    pub unit_id: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&HealthAgent> for AgentRes {
    fn from(a: &HealthAgent) -> Self {
        Self {
            id: a.id.to_string(),
            name: a.name.clone(),
            unit_id: a.unit_id.to_string(),
            phone: a.phone.clone(),
            active: a.active,
            created_at: a.created_at.to_rfc3339(),
            updated_at: a.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListAgentsRes {
    pub agents: Vec<AgentRes>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CatalogQuery {
    /// Only agents of this unit (agents listing).
    pub unit_id: Option<String>,
    /// Only procedures of this group (procedures listing).
    pub group_id: Option<String>,
    /// Include inactive records.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Parses an optional id taken from a query string or body.
pub fn parse_optional_id(field: &str, value: Option<&str>) -> CoreResult<Option<RecordId>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => RecordId::parse(v)
            .map(Some)
            .map_err(|_| CoreError::field(field, "is not a valid id")),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GroupReq {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<GroupReq> for GroupInput {
    fn from(r: GroupReq) -> Self {
        GroupInput {
            name: r.name,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupRes {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<&ProcedureGroup> for GroupRes {
    fn from(g: &ProcedureGroup) -> Self {
        Self {
            id: g.id.to_string(),
            name: g.name.clone(),
            description: g.description.clone(),
            created_at: g.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListGroupsRes {
    pub groups: Vec<GroupRes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProcedureReq {
    pub name: String,
    pub group_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<ProcedureReq> for ProcedureInput {
    fn from(r: ProcedureReq) -> Self {
        ProcedureInput {
            name: r.name,
            group_id: r.group_id,
            code: r.code,
            active: r.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcedureRes {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub code: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Procedure> for ProcedureRes {
    fn from(p: &Procedure) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            group_id: p.group_id.to_string(),
            code: p.code.clone(),
            active: p.active,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListProceduresRes {
    pub procedures: Vec<ProcedureRes>,
}

// ---------------------------------------------------------------------------
// Requisitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientDto {
    pub name: String,
    pub cns: String,
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mother_name: Option<String>,
}

impl From<&Patient> for PatientDto {
    fn from(p: &Patient) -> Self {
        Self {
            name: p.name.clone(),
            cns: p.cns.clone(),
            birth_date: Some(p.birth_date),
            phone: p.phone.clone(),
            mother_name: p.mother_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcedureLineDto {
    pub procedure_id: String,
    pub quantity: u32,
}

impl From<&ProcedureLine> for ProcedureLineDto {
    fn from(l: &ProcedureLine) -> Self {
        Self {
            procedure_id: l.procedure_id.to_string(),
            quantity: l.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImageRefDto {
    pub client_id: String,
    pub file_name: String,
    pub reference: String,
}

impl From<&ImageRef> for ImageRefDto {
    fn from(i: &ImageRef) -> Self {
        Self {
            client_id: i.client_id.clone(),
            file_name: i.file_name.clone(),
            reference: i.reference.clone(),
        }
    }
}

/// A requisition submitted in one request, without the wizard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRequisitionReq {
    pub patient: PatientDto,
    pub unit_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// `routine`, `priority` or `urgent`.
    pub priority: Option<String>,
    #[serde(default)]
    pub procedures: Vec<ProcedureLineDto>,
    /// Attachments that were already uploaded through the file endpoints.
    #[serde(default)]
    pub images: Vec<ImageRefDto>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateRequisitionReq {
    /// Converts to the wizard form, reporting every unparsable id or enum at once.
    pub fn into_form(self) -> Result<RequisitionForm, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut id = |field: String, value: Option<&str>| match parse_optional_id(&field, value) {
            Ok(id) => id,
            Err(_) => {
                errors.push(FieldError::new(field, "is not a valid id"));
                None
            }
        };

        let unit_id = id("unit_id".into(), self.unit_id.as_deref());
        let agent_id = id("agent_id".into(), self.agent_id.as_deref());
        let mut procedures = Vec::with_capacity(self.procedures.len());
        for (i, line) in self.procedures.iter().enumerate() {
            if let Some(procedure_id) =
                id(format!("procedures[{}].procedure_id", i), Some(&line.procedure_id))
            {
                procedures.push(ProcedureLine {
                    procedure_id,
                    quantity: line.quantity,
                });
            }
        }

        let priority = match self.priority.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            None => None,
            Some(p) => match p.parse::<Priority>() {
                Ok(priority) => Some(priority),
                Err(_) => {
                    errors.push(FieldError::new("priority", format!("unknown priority '{}'", p)));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(RequisitionForm {
            patient: PatientForm {
                name: self.patient.name,
                cns: self.patient.cns,
                birth_date: self.patient.birth_date,
                phone: self.patient.phone,
                mother_name: self.patient.mother_name,
            },
            unit_id,
            agent_id,
            priority,
            procedures,
            images: self
                .images
                .into_iter()
                .map(|i| ImageItem {
                    client_id: i.client_id,
                    file_name: i.file_name,
                    status: ImageStatus::Uploaded {
                        reference: i.reference,
                    },
                })
                .collect(),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleDto {
    pub date: NaiveDate,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl From<&Schedule> for ScheduleDto {
    fn from(s: &Schedule) -> Self {
        Self {
            date: s.date,
            location: s.location.clone(),
            notes: s.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryDto {
    pub from: Option<String>,
    pub to: String,
    pub at: String,
    pub by: String,
    pub note: Option<String>,
}

impl From<&HistoryEntry> for HistoryEntryDto {
    fn from(h: &HistoryEntry) -> Self {
        Self {
            from: h.from.map(|s| s.to_string()),
            to: h.to.to_string(),
            at: h.at.to_rfc3339(),
            by: h.by.to_string(),
            note: h.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequisitionRes {
    pub id: String,
    pub protocol: String,
    pub patient: PatientDto,
    pub unit_id: String,
    pub agent_id: Option<String>,
    pub procedures: Vec<ProcedureLineDto>,
    pub images: Vec<ImageRefDto>,
    pub priority: String,
    pub status: String,
    pub schedule: Option<ScheduleDto>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub history: Vec<HistoryEntryDto>,
}

impl From<&Requisition> for RequisitionRes {
    fn from(r: &Requisition) -> Self {
        Self {
            id: r.id.to_string(),
            protocol: r.protocol.clone(),
            patient: PatientDto::from(&r.patient),
            unit_id: r.unit_id.to_string(),
            agent_id: opt_id(&r.agent_id),
            procedures: r.procedures.iter().map(ProcedureLineDto::from).collect(),
            images: r.images.iter().map(ImageRefDto::from).collect(),
            priority: r.priority.as_str().to_string(),
            status: r.status.to_string(),
            schedule: r.schedule.as_ref().map(ScheduleDto::from),
            notes: r.notes.clone(),
            created_by: r.created_by.to_string(),
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
            history: r.history.iter().map(HistoryEntryDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListRequisitionsRes {
    pub requisitions: Vec<RequisitionRes>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequisitionQuery {
    pub status: Option<String>,
    pub unit_id: Option<String>,
    pub priority: Option<String>,
    /// Part of the patient's name, or the full CNS.
    pub patient: Option<String>,
}

impl RequisitionQuery {
    pub fn into_filter(self) -> CoreResult<RequisitionFilter> {
        let blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(RequisitionFilter {
            status: blank(self.status)
                .map(|s| s.parse::<RequisitionStatus>())
                .transpose()?,
            unit_id: parse_optional_id("unit_id", self.unit_id.as_deref())?,
            priority: blank(self.priority)
                .map(|p| p.parse::<Priority>())
                .transpose()?,
            patient: blank(self.patient),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SummaryRes {
    pub pending: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub canceled: usize,
    pub resolicited: usize,
    pub total: usize,
}

impl From<&StatusSummary> for SummaryRes {
    fn from(s: &StatusSummary) -> Self {
        Self {
            pending: s.pending,
            scheduled: s.scheduled,
            completed: s.completed,
            canceled: s.canceled,
            resolicited: s.resolicited,
            total: s.total,
        }
    }
}

/// A status change request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionReq {
    Schedule {
        date: NaiveDate,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    Complete {
        #[serde(default)]
        note: Option<String>,
    },
    Cancel {
        reason: String,
    },
    Resolicit {
        reason: String,
    },
}

impl From<TransitionReq> for Transition {
    fn from(r: TransitionReq) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        match r {
            TransitionReq::Schedule {
                date,
                location,
                notes,
            } => Transition::Schedule(Schedule {
                date,
                location: clean(location),
                notes: clean(notes),
            }),
            TransitionReq::Complete { note } => Transition::Complete { note },
            TransitionReq::Cancel { reason } => Transition::Cancel { reason },
            TransitionReq::Resolicit { reason } => Transition::Resolicit { reason },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotesReq {
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DraftRes {
    pub id: String,
    /// Current wizard step.
    pub step: String,
    /// Full wizard state: form fields, image statuses and the last action's errors.
    #[schema(value_type = Object)]
    pub state: serde_json::Value,
    pub errors: Vec<FieldErrorDto>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Draft> for DraftRes {
    fn from(d: &Draft) -> Self {
        Self {
            id: d.id.to_string(),
            step: d.state.step.as_str().to_string(),
            state: serde_json::to_value(&d.state).unwrap_or_default(),
            errors: d.state.errors.iter().map(FieldErrorDto::from).collect(),
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListDraftsRes {
    pub drafts: Vec<DraftRes>,
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredFileRes {
    pub folder: String,
    pub file_name: String,
    pub client_id: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub media_type: Option<String>,
    pub reference: String,
    pub stored_at: String,
}

impl From<&StoredFile> for StoredFileRes {
    fn from(f: &StoredFile) -> Self {
        Self {
            folder: f.folder.clone(),
            file_name: f.file_name.clone(),
            client_id: f.client_id.clone(),
            original_name: f.original_name.clone(),
            size_bytes: f.size_bytes,
            sha256: f.sha256.clone(),
            media_type: f.media_type.clone(),
            reference: f.reference.clone(),
            stored_at: f.stored_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileEntryRes {
    pub name: String,
    pub is_folder: bool,
    pub size_bytes: Option<u64>,
}

impl From<&FileEntry> for FileEntryRes {
    fn from(e: &FileEntry) -> Self {
        Self {
            name: e.name.clone(),
            is_folder: e.is_folder,
            size_bytes: e.size_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListFilesRes {
    pub folder: String,
    pub files: Vec<FileEntryRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileRes {
    pub deleted: bool,
    /// Whether the folder became empty and was removed too.
    pub folder_removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateRequisitionReq {
        CreateRequisitionReq {
            patient: PatientDto {
                name: "Maria".into(),
                cns: "898001234567890".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1),
                phone: None,
                mother_name: None,
            },
            unit_id: Some(RecordId::new().to_string()),
            agent_id: None,
            priority: Some("urgent".into()),
            procedures: vec![ProcedureLineDto {
                procedure_id: RecordId::new().to_string(),
                quantity: 2,
            }],
            images: vec![ImageRefDto {
                client_id: "abcd1234".into(),
                file_name: "a.jpg".into(),
                reference: "local:f/abcd1234__a.jpg".into(),
            }],
            notes: None,
        }
    }

    #[test]
    fn create_request_converts_to_form() {
        let form = request().into_form().unwrap();
        assert_eq!(form.priority, Some(Priority::Urgent));
        assert_eq!(form.procedures[0].quantity, 2);
        assert!(form.images[0].status.is_uploaded());
    }

    #[test]
    fn create_request_reports_bad_ids_and_priority() {
        let mut req = request();
        req.unit_id = Some("nope".into());
        req.procedures[0].procedure_id = "bad".into();
        req.priority = Some("whenever".into());
        let errors = req.into_form().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["unit_id", "procedures[0].procedure_id", "priority"]
        );
    }

    #[test]
    fn transition_request_is_tagged() {
        let req: TransitionReq = serde_json::from_value(serde_json::json!({
            "action": "schedule",
            "date": "2024-06-01",
            "location": "  "
        }))
        .unwrap();
        match Transition::from(req) {
            Transition::Schedule(s) => {
                assert_eq!(s.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
                assert_eq!(s.location, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_into_filter() {
        let filter = RequisitionQuery {
            status: Some("scheduled".into()),
            priority: Some("".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(RequisitionStatus::Scheduled));
        assert_eq!(filter.priority, None);

        assert!(RequisitionQuery {
            unit_id: Some("zz".into()),
            ..Default::default()
        }
        .into_filter()
        .is_err());
    }
}

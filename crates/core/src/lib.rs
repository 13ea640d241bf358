//! # Requisition tracker core
//!
//! Business logic for the municipal procedure requisition tracker:
//! - a file-backed document store with one collection per entity
//! - role-based access control
//! - health units, agents, procedure catalog and user profiles
//! - requisitions and their status workflow
//! - the new requisition wizard (a pure reducer plus its validation schema) and persisted drafts
//!
//! **No API concerns**: HTTP servers, request identity and wire formats belong in `api-rest`
//! and `api-shared`.

pub mod access;
pub mod config;
pub mod constants;
pub mod error;
pub mod repositories;
pub mod store;
pub mod validation;
pub mod wizard;
pub mod workflow;

pub use access::{Actor, Permission, Role};
pub use config::{AttachmentBackends, CoreConfig, StorageConfig};
pub use error::{CoreError, CoreResult, FieldError};
pub use repositories::agents::{AgentInput, AgentService, HealthAgent};
pub use repositories::drafts::{Draft, DraftService};
pub use repositories::procedures::{
    GroupInput, Procedure, ProcedureGroup, ProcedureInput, ProcedureService,
};
pub use repositories::requisitions::{
    ImageRef, NewRequisition, Patient, Priority, ProcedureLine, Requisition, RequisitionFilter,
    RequisitionService, StatusSummary,
};
pub use repositories::units::{HealthUnit, UnitInput, UnitService};
pub use repositories::users::{UserProfile, UserService};
pub use store::DocumentStore;
pub use wizard::{WizardAction, WizardState, WizardStep};
pub use workflow::{HistoryEntry, RequisitionStatus, Schedule, Transition};

pub use reqtrack_types::{EmailAddress, NonEmptyText};
pub use reqtrack_uuid::RecordId;

use std::sync::Arc;

/// All domain services over one store.
#[derive(Clone, Debug)]
pub struct Services {
    pub users: UserService,
    pub units: UnitService,
    pub agents: AgentService,
    pub procedures: ProcedureService,
    pub requisitions: RequisitionService,
    pub drafts: DraftService,
}

impl Services {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            users: UserService::new(store.clone()),
            units: UnitService::new(store.clone()),
            agents: AgentService::new(store.clone()),
            procedures: ProcedureService::new(store.clone()),
            requisitions: RequisitionService::new(store.clone()),
            drafts: DraftService::new(store),
        }
    }
}

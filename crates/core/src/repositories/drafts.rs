//! Persisted wizard sessions.
//!
//! A draft holds one user's [`WizardState`] between requests. Drafts are private: any other
//! user, administrators included, gets `NotFound`.

use crate::access::{Actor, Permission};
use crate::error::{CoreError, CoreResult};
use crate::repositories::requisitions::{Requisition, RequisitionService};
use crate::store::{Collection, Document, DocumentStore};
use crate::wizard::{reduce, submit, WizardAction, WizardState};
use chrono::{DateTime, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: RecordId,
    pub owner: RecordId,
    pub state: WizardState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Draft {
    const COLLECTION: Collection = Collection::Drafts;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Clone, Debug)]
pub struct DraftService {
    store: Arc<DocumentStore>,
    requisitions: RequisitionService,
}

impl DraftService {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            requisitions: RequisitionService::new(store.clone()),
            store,
        }
    }

    /// Starts a wizard. Unit-bound users get their unit preselected.
    pub fn create(&self, actor: &Actor) -> CoreResult<Draft> {
        actor.require(Permission::CreateRequisitions)?;
        let now = Utc::now();
        let draft = Draft {
            id: RecordId::new(),
            owner: actor.user_id,
            state: WizardState::new(actor.unit_scope()),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&draft)?;
        tracing::debug!(draft_id = %draft.id, owner = %draft.owner, "started requisition draft");
        Ok(draft)
    }

    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<Draft> {
        let draft: Draft = self.store.get(id)?;
        ensure_owner(actor, &draft)?;
        Ok(draft)
    }

    /// The caller's drafts, most recently touched first.
    pub fn list(&self, actor: &Actor) -> Vec<Draft> {
        let mut drafts: Vec<Draft> = self
            .store
            .list::<Draft>()
            .into_iter()
            .filter(|d| d.owner == actor.user_id)
            .collect();
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        drafts
    }

    /// Runs one wizard action against the stored state.
    ///
    /// A rejected action is not an error here: the returned draft carries the field errors.
    pub fn apply(&self, actor: &Actor, id: &RecordId, action: WizardAction) -> CoreResult<Draft> {
        actor.require(Permission::CreateRequisitions)?;
        self.store.modify::<Draft, _>(id, |draft| {
            ensure_owner(actor, draft)?;
            let now = Utc::now();
            let state = std::mem::take(&mut draft.state);
            draft.state = reduce(state, action, now.date_naive());
            draft.updated_at = now;
            Ok(())
        })
    }

    pub fn delete(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        let draft: Draft = self.store.get(id)?;
        ensure_owner(actor, &draft)?;
        self.store.delete::<Draft>(id)
    }

    /// Turns a complete draft into a requisition and discards the draft.
    ///
    /// # Errors
    ///
    /// [`CoreError::Validation`] when the form is incomplete; the errors are also saved on the
    /// draft so a later `get` shows them.
    pub fn submit(&self, actor: &Actor, id: &RecordId) -> CoreResult<Requisition> {
        actor.require(Permission::CreateRequisitions)?;
        let draft = self.get(actor, id)?;

        let new = match submit(&draft.state, Utc::now().date_naive()) {
            Ok(new) => new,
            Err(errors) => {
                let reported = errors.clone();
                self.store.modify::<Draft, _>(id, move |d| {
                    d.state.errors = reported;
                    Ok(())
                })?;
                return Err(CoreError::Validation(errors));
            }
        };

        let requisition = self.requisitions.create_validated(actor, new)?;
        if let Err(e) = self.store.delete::<Draft>(id) {
            tracing::warn!(draft_id = %id, "requisition created but draft not removed: {}", e);
        }
        Ok(requisition)
    }
}

fn ensure_owner(actor: &Actor, draft: &Draft) -> CoreResult<()> {
    if draft.owner == actor.user_id {
        Ok(())
    } else {
        Err(CoreError::NotFound {
            collection: Collection::Drafts.dir_name(),
            id: draft.id.to_string(),
        })
    }
}

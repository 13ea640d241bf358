//! The new requisition wizard.
//!
//! The wizard is a reducer: [`reduce`] takes the current [`WizardState`] and one
//! [`WizardAction`] and returns the next state. It performs no I/O; the caller supplies `today`
//! for date checks. Field errors from the last action are kept in [`WizardState::errors`] and
//! cleared by the next action.
//!
//! Steps run in order:
//!
//! ```text
//! Patient → Routing → Procedures → Attachments → Review
//! ```

pub mod images;
pub mod schema;

use crate::constants::MAX_PROCEDURE_QUANTITY;
use crate::error::FieldError;
use crate::repositories::requisitions::{NewRequisition, Priority, ProcedureLine};
use chrono::NaiveDate;
use images::ImageItem;
use reqtrack_files::ClientFileName;
use reqtrack_uuid::RecordId;
use schema::{validate_form, validate_step, PatientForm, RequisitionForm};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    Patient,
    Routing,
    Procedures,
    Attachments,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Patient,
        WizardStep::Routing,
        WizardStep::Procedures,
        WizardStep::Attachments,
        WizardStep::Review,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::Patient => "patient",
            WizardStep::Routing => "routing",
            WizardStep::Procedures => "procedures",
            WizardStep::Attachments => "attachments",
            WizardStep::Review => "review",
        }
    }

    pub fn next(self) -> WizardStep {
        Self::ALL
            .get(self.index() + 1)
            .copied()
            .unwrap_or(WizardStep::Review)
    }

    pub fn previous(self) -> WizardStep {
        self.index()
            .checked_sub(1)
            .map(|i| Self::ALL[i])
            .unwrap_or(WizardStep::Patient)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub step: WizardStep,
    pub form: RequisitionForm,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardAction {
    SetPatient {
        patient: PatientForm,
    },
    SetRouting {
        unit_id: Option<RecordId>,
        agent_id: Option<RecordId>,
    },
    SetPriority {
        priority: Priority,
    },
    AddProcedure {
        procedure_id: RecordId,
    },
    RemoveProcedure {
        procedure_id: RecordId,
    },
    SetQuantity {
        procedure_id: RecordId,
        quantity: u32,
    },
    AddImage {
        client_id: String,
        file_name: String,
    },
    ImageUploading {
        client_id: String,
    },
    ImageUploaded {
        client_id: String,
        reference: String,
    },
    ImageFailed {
        client_id: String,
        message: String,
    },
    RemoveImage {
        client_id: String,
    },
    SetNotes {
        notes: Option<String>,
    },
    Next,
    Back,
    GoTo {
        step: WizardStep,
    },
}

impl WizardAction {
    /// Upload progress reports. Only the server's own upload path may send these.
    pub fn is_upload_report(&self) -> bool {
        matches!(
            self,
            WizardAction::ImageUploading { .. }
                | WizardAction::ImageUploaded { .. }
                | WizardAction::ImageFailed { .. }
        )
    }
}

impl WizardState {
    /// A fresh wizard, optionally routed to a unit already.
    pub fn new(unit_id: Option<RecordId>) -> Self {
        let mut state = Self::default();
        state.form.unit_id = unit_id;
        state
    }

    pub fn image(&self, client_id: &str) -> Option<&ImageItem> {
        self.form.images.iter().find(|i| i.client_id == client_id)
    }

    fn image_mut(&mut self, client_id: &str) -> Result<&mut ImageItem, FieldError> {
        self.form
            .images
            .iter_mut()
            .find(|i| i.client_id == client_id)
            .ok_or_else(|| FieldError::new("images", format!("unknown image {}", client_id)))
    }

    fn line_mut(&mut self, procedure_id: &RecordId) -> Result<&mut ProcedureLine, FieldError> {
        self.form
            .procedures
            .iter_mut()
            .find(|l| &l.procedure_id == procedure_id)
            .ok_or_else(|| {
                FieldError::new("procedures", format!("procedure {} is not selected", procedure_id))
            })
    }
}

fn quantity_error() -> FieldError {
    FieldError::new(
        "procedures",
        format!("quantity must be between 1 and {}", MAX_PROCEDURE_QUANTITY),
    )
}

/// Applies `action` to `state`.
///
/// A rejected action leaves the form and step unchanged and reports why in `errors`.
pub fn reduce(mut state: WizardState, action: WizardAction, today: NaiveDate) -> WizardState {
    state.errors.clear();
    let outcome = apply(&mut state, action, today);
    if let Err(errors) = outcome {
        state.errors = errors;
    }
    state
}

fn apply(state: &mut WizardState, action: WizardAction, today: NaiveDate) -> Result<(), Vec<FieldError>> {
    let single = |e: FieldError| vec![e];

    match action {
        WizardAction::SetPatient { patient } => {
            state.form.patient = patient;
        }
        WizardAction::SetRouting { unit_id, agent_id } => {
            state.form.unit_id = unit_id;
            state.form.agent_id = agent_id;
        }
        WizardAction::SetPriority { priority } => {
            state.form.priority = Some(priority);
        }
        WizardAction::AddProcedure { procedure_id } => match state.line_mut(&procedure_id) {
            Ok(line) => {
                if line.quantity >= MAX_PROCEDURE_QUANTITY {
                    return Err(single(quantity_error()));
                }
                line.quantity += 1;
            }
            Err(_) => state.form.procedures.push(ProcedureLine {
                procedure_id,
                quantity: 1,
            }),
        },
        WizardAction::RemoveProcedure { procedure_id } => {
            state.line_mut(&procedure_id).map_err(single)?;
            state
                .form
                .procedures
                .retain(|l| l.procedure_id != procedure_id);
        }
        WizardAction::SetQuantity {
            procedure_id,
            quantity,
        } => {
            if !(1..=MAX_PROCEDURE_QUANTITY).contains(&quantity) {
                return Err(single(quantity_error()));
            }
            state.line_mut(&procedure_id).map_err(single)?.quantity = quantity;
        }
        WizardAction::AddImage {
            client_id,
            file_name,
        } => {
            let name = ClientFileName::new(&client_id, &file_name)
                .map_err(|e| single(FieldError::new("images", e.to_string())))?;
            if state.image(&client_id).is_some() {
                return Err(single(FieldError::new(
                    "images",
                    format!("image {} was already added", client_id),
                )));
            }
            state
                .form
                .images
                .push(ImageItem::new(name.client_id(), name.original()));
        }
        WizardAction::ImageUploading { client_id } => {
            state.image_mut(&client_id).and_then(|i| i.start_upload()).map_err(single)?;
        }
        WizardAction::ImageUploaded {
            client_id,
            reference,
        } => {
            state
                .image_mut(&client_id)
                .and_then(|i| i.finish_upload(reference))
                .map_err(single)?;
        }
        WizardAction::ImageFailed { client_id, message } => {
            state
                .image_mut(&client_id)
                .and_then(|i| i.fail_upload(message))
                .map_err(single)?;
        }
        WizardAction::RemoveImage { client_id } => {
            state.image_mut(&client_id).map_err(single)?;
            state.form.images.retain(|i| i.client_id != client_id);
        }
        WizardAction::SetNotes { notes } => {
            state.form.notes = notes;
        }
        WizardAction::Next => {
            let errors = validate_step(state.step, &state.form, today);
            if !errors.is_empty() {
                return Err(errors);
            }
            state.step = state.step.next();
        }
        WizardAction::Back => {
            state.step = state.step.previous();
        }
        WizardAction::GoTo { step } => {
            if step > state.step {
                let blocking: Vec<FieldError> = WizardStep::ALL
                    .into_iter()
                    .take_while(|s| *s < step)
                    .flat_map(|s| validate_step(s, &state.form, today))
                    .collect();
                if !blocking.is_empty() {
                    return Err(blocking);
                }
            }
            state.step = step;
        }
    }
    Ok(())
}

/// Turns a finished wizard into a requisition ready to be stored.
pub fn submit(state: &WizardState, today: NaiveDate) -> Result<NewRequisition, Vec<FieldError>> {
    validate_form(&state.form, today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use images::ImageStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn valid_patient() -> PatientForm {
        PatientForm {
            name: "João Pereira".into(),
            cns: "700000000000005".into(),
            birth_date: NaiveDate::from_ymd_opt(1975, 8, 20),
            phone: None,
            mother_name: None,
        }
    }

    fn run(state: WizardState, actions: Vec<WizardAction>) -> WizardState {
        actions
            .into_iter()
            .fold(state, |s, a| reduce(s, a, today()))
    }

    fn filled() -> WizardState {
        let unit = RecordId::new();
        run(
            WizardState::default(),
            vec![
                WizardAction::SetPatient {
                    patient: valid_patient(),
                },
                WizardAction::SetRouting {
                    unit_id: Some(unit),
                    agent_id: None,
                },
                WizardAction::SetPriority {
                    priority: Priority::Urgent,
                },
                WizardAction::AddProcedure {
                    procedure_id: RecordId::new(),
                },
            ],
        )
    }

    #[test]
    fn next_on_invalid_step_stays_with_errors() {
        let state = reduce(WizardState::default(), WizardAction::Next, today());
        assert_eq!(state.step, WizardStep::Patient);
        assert!(state.errors.iter().any(|e| e.field == "patient.name"));
    }

    #[test]
    fn errors_clear_on_next_action() {
        let state = reduce(WizardState::default(), WizardAction::Next, today());
        let state = reduce(
            state,
            WizardAction::SetPatient {
                patient: valid_patient(),
            },
            today(),
        );
        assert!(state.errors.is_empty());
    }

    #[test]
    fn walks_all_steps_to_review() {
        let state = run(filled(), vec![WizardAction::Next; 4]);
        assert_eq!(state.step, WizardStep::Review);
        assert!(state.errors.is_empty());
        let new = submit(&state, today()).unwrap();
        assert_eq!(new.priority, Priority::Urgent);
        assert_eq!(new.procedures.len(), 1);
    }

    #[test]
    fn back_stops_at_first_step() {
        let state = run(filled(), vec![WizardAction::Next, WizardAction::Back, WizardAction::Back]);
        assert_eq!(state.step, WizardStep::Patient);
    }

    #[test]
    fn goto_forward_requires_valid_predecessors() {
        let state = reduce(
            WizardState::default(),
            WizardAction::GoTo {
                step: WizardStep::Procedures,
            },
            today(),
        );
        assert_eq!(state.step, WizardStep::Patient);
        assert!(!state.errors.is_empty());

        let state = reduce(
            filled(),
            WizardAction::GoTo {
                step: WizardStep::Attachments,
            },
            today(),
        );
        assert_eq!(state.step, WizardStep::Attachments);

        let state = reduce(
            state,
            WizardAction::GoTo {
                step: WizardStep::Patient,
            },
            today(),
        );
        assert_eq!(state.step, WizardStep::Patient);
    }

    #[test]
    fn adding_same_procedure_increments_quantity() {
        let id = RecordId::new();
        let state = run(
            WizardState::default(),
            vec![
                WizardAction::AddProcedure { procedure_id: id },
                WizardAction::AddProcedure { procedure_id: id },
            ],
        );
        assert_eq!(state.form.procedures, vec![ProcedureLine { procedure_id: id, quantity: 2 }]);
    }

    #[test]
    fn quantity_bounds_enforced() {
        let id = RecordId::new();
        let state = run(
            WizardState::default(),
            vec![
                WizardAction::AddProcedure { procedure_id: id },
                WizardAction::SetQuantity {
                    procedure_id: id,
                    quantity: 99,
                },
            ],
        );
        let state = reduce(state, WizardAction::AddProcedure { procedure_id: id }, today());
        assert_eq!(state.form.procedures[0].quantity, 99);
        assert_eq!(state.errors[0].field, "procedures");

        let state = reduce(
            state,
            WizardAction::SetQuantity {
                procedure_id: id,
                quantity: 0,
            },
            today(),
        );
        assert_eq!(state.form.procedures[0].quantity, 99);
        assert!(!state.errors.is_empty());
    }

    #[test]
    fn image_lifecycle_through_reducer() {
        let state = run(
            WizardState::default(),
            vec![
                WizardAction::AddImage {
                    client_id: "f3a9c2e1".into(),
                    file_name: "C:\\fotos\\pedido médico.jpg".into(),
                },
                WizardAction::ImageUploading {
                    client_id: "f3a9c2e1".into(),
                },
                WizardAction::ImageFailed {
                    client_id: "f3a9c2e1".into(),
                    message: "network".into(),
                },
            ],
        );
        let image = state.image("f3a9c2e1").unwrap();
        assert!(matches!(image.status, ImageStatus::Error { .. }));

        let state = run(
            state,
            vec![
                WizardAction::ImageUploading {
                    client_id: "f3a9c2e1".into(),
                },
                WizardAction::ImageUploaded {
                    client_id: "f3a9c2e1".into(),
                    reference: "local:x/f3a9c2e1__pedido_m_dico.jpg".into(),
                },
            ],
        );
        assert!(state.errors.is_empty());
        assert!(state.image("f3a9c2e1").unwrap().status.is_uploaded());
    }

    #[test]
    fn uploaded_requires_uploading_first() {
        let state = run(
            WizardState::default(),
            vec![
                WizardAction::AddImage {
                    client_id: "f3a9c2e1".into(),
                    file_name: "a.png".into(),
                },
                WizardAction::ImageUploaded {
                    client_id: "f3a9c2e1".into(),
                    reference: "x".into(),
                },
            ],
        );
        assert_eq!(state.image("f3a9c2e1").unwrap().status, ImageStatus::Pending);
        assert_eq!(state.errors.len(), 1);
    }

    #[test]
    fn attachments_step_blocks_on_pending_images() {
        let state = run(
            filled(),
            vec![
                WizardAction::AddImage {
                    client_id: "f3a9c2e1".into(),
                    file_name: "a.png".into(),
                },
                WizardAction::Next,
                WizardAction::Next,
                WizardAction::Next,
                WizardAction::Next,
            ],
        );
        assert_eq!(state.step, WizardStep::Attachments);
        assert_eq!(state.errors[0].field, "images");

        let state = reduce(
            state,
            WizardAction::RemoveImage {
                client_id: "f3a9c2e1".into(),
            },
            today(),
        );
        let state = reduce(state, WizardAction::Next, today());
        assert_eq!(state.step, WizardStep::Review);
    }

    #[test]
    fn bad_client_id_rejected() {
        let state = reduce(
            WizardState::default(),
            WizardAction::AddImage {
                client_id: "x".into(),
                file_name: "a.png".into(),
            },
            today(),
        );
        assert!(state.form.images.is_empty());
        assert_eq!(state.errors[0].field, "images");
    }

    #[test]
    fn actions_deserialise_from_tagged_json() {
        let action: WizardAction = serde_json::from_value(serde_json::json!({
            "type": "set_quantity",
            "procedure_id": "0123456789abcdef0123456789abcdef",
            "quantity": 3
        }))
        .unwrap();
        assert!(matches!(action, WizardAction::SetQuantity { quantity: 3, .. }));

        let next: WizardAction = serde_json::from_value(serde_json::json!({"type": "next"})).unwrap();
        assert_eq!(next, WizardAction::Next);
    }

    #[test]
    fn upload_reports_are_told_apart() {
        let uploaded = WizardAction::ImageUploaded {
            client_id: "img00001".into(),
            reference: "local:x/img00001__a.png".into(),
        };
        assert!(uploaded.is_upload_report());
        assert!(!WizardAction::RemoveImage {
            client_id: "img00001".into()
        }
        .is_upload_report());
    }
}

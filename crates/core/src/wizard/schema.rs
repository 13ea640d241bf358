//! Validation schema for the new requisition form.
//!
//! Each wizard step has its own check so the reducer can refuse to advance past an invalid step,
//! and [`validate_form`] runs them all to turn a finished form into a [`NewRequisition`].
//! Referential checks (does the unit exist, does the agent belong to it) need the store and
//! happen in the requisition service instead.

use crate::constants::{MAX_PROCEDURE_QUANTITY, MIN_PATIENT_NAME_CHARS};
use crate::error::FieldError;
use crate::repositories::requisitions::{
    ImageRef, NewRequisition, Patient, Priority, ProcedureLine,
};
use crate::validation::{cns, optional_note, optional_phone, optional_text, FieldErrors};
use crate::wizard::images::ImageItem;
use crate::wizard::WizardStep;
use chrono::NaiveDate;
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cns: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mother_name: Option<String>,
}

/// Everything the wizard collects, as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionForm {
    #[serde(default)]
    pub patient: PatientForm,
    #[serde(default)]
    pub unit_id: Option<RecordId>,
    #[serde(default)]
    pub agent_id: Option<RecordId>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub procedures: Vec<ProcedureLine>,
    #[serde(default)]
    pub images: Vec<ImageItem>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn validate_patient(form: &PatientForm, today: NaiveDate) -> Result<Patient, Vec<FieldError>> {
    let mut errors = FieldErrors::new();

    let name = optional_text(Some(&form.name));
    match &name {
        None => errors.push("patient.name", "is required"),
        Some(n) if n.chars().count() < MIN_PATIENT_NAME_CHARS => errors.push(
            "patient.name",
            format!("must have at least {} characters", MIN_PATIENT_NAME_CHARS),
        ),
        Some(_) => {}
    }

    let cns = errors.check(cns("patient.cns", &form.cns));

    match form.birth_date {
        None => errors.push("patient.birth_date", "is required"),
        Some(date) if date > today => errors.push("patient.birth_date", "cannot be in the future"),
        Some(_) => {}
    }

    let phone = errors.check(optional_phone("patient.phone", form.phone.as_deref()));

    errors.finish(|| Patient {
        name: name.unwrap_or_default(),
        cns: cns.unwrap_or_default(),
        birth_date: form.birth_date.unwrap_or(today),
        phone: phone.flatten(),
        mother_name: optional_text(form.mother_name.as_deref()),
    })
}

pub fn validate_routing(
    form: &RequisitionForm,
) -> Result<(RecordId, Option<RecordId>, Priority), Vec<FieldError>> {
    let mut errors = FieldErrors::new();
    if form.unit_id.is_none() {
        errors.push("unit_id", "is required");
    }
    if form.priority.is_none() {
        errors.push("priority", "is required");
    }
    match (form.unit_id, form.priority) {
        (Some(unit_id), Some(priority)) if errors.is_empty() => {
            Ok((unit_id, form.agent_id, priority))
        }
        _ => Err(errors.into_vec()),
    }
}

/// Checks quantities and merges repeated procedures into one line.
pub fn validate_procedures(lines: &[ProcedureLine]) -> Result<Vec<ProcedureLine>, Vec<FieldError>> {
    let mut errors = FieldErrors::new();
    if lines.is_empty() {
        errors.push("procedures", "select at least one procedure");
    }

    let mut merged: Vec<ProcedureLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.procedure_id == line.procedure_id) {
            // Saturates so an oversized total still fails the range check below.
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(line.clone()),
        }
    }
    for line in &merged {
        if !(1..=MAX_PROCEDURE_QUANTITY).contains(&line.quantity) {
            errors.push(
                "procedures",
                format!(
                    "quantity for {} must be between 1 and {}",
                    line.procedure_id, MAX_PROCEDURE_QUANTITY
                ),
            );
        }
    }

    errors.finish(|| merged)
}

/// Every attachment must have finished uploading.
pub fn validate_attachments(images: &[ImageItem]) -> Result<Vec<ImageRef>, Vec<FieldError>> {
    let mut errors = FieldErrors::new();
    let mut refs = Vec::with_capacity(images.len());
    for image in images {
        match image.reference() {
            Some(reference) => refs.push(ImageRef {
                client_id: image.client_id.clone(),
                file_name: image.file_name.clone(),
                reference: reference.to_string(),
            }),
            None => errors.push(
                "images",
                format!("{} has not finished uploading", image.file_name),
            ),
        }
    }
    errors.finish(|| refs)
}

/// Field errors for one step; the review step checks the whole form.
pub fn validate_step(step: WizardStep, form: &RequisitionForm, today: NaiveDate) -> Vec<FieldError> {
    let result = match step {
        WizardStep::Patient => validate_patient(&form.patient, today).map(|_| ()),
        WizardStep::Routing => validate_routing(form).map(|_| ()),
        WizardStep::Procedures => validate_procedures(&form.procedures).map(|_| ()),
        WizardStep::Attachments => validate_attachments(&form.images).map(|_| ()),
        WizardStep::Review => validate_form(form, today).map(|_| ()),
    };
    result.err().unwrap_or_default()
}

pub fn validate_form(form: &RequisitionForm, today: NaiveDate) -> Result<NewRequisition, Vec<FieldError>> {
    let mut errors = FieldErrors::new();
    let patient = errors.check_all(validate_patient(&form.patient, today));
    let routing = errors.check_all(validate_routing(form));
    let procedures = errors.check_all(validate_procedures(&form.procedures));
    let images = errors.check_all(validate_attachments(&form.images));
    let notes = errors.check(optional_note("notes", form.notes.as_deref()));

    match (patient, routing, procedures, images, notes) {
        (Some(patient), Some((unit_id, agent_id, priority)), Some(procedures), Some(images), Some(notes))
            if errors.is_empty() =>
        {
            Ok(NewRequisition {
                patient,
                unit_id,
                agent_id,
                priority,
                procedures,
                images,
                notes,
            })
        }
        _ => Err(errors.into_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::images::ImageStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn patient() -> PatientForm {
        PatientForm {
            name: "Maria da Silva".into(),
            cns: "898 0012 3456 7890".into(),
            birth_date: NaiveDate::from_ymd_opt(1980, 3, 1),
            phone: Some("(11) 91234-5678".into()),
            mother_name: Some("  ".into()),
        }
    }

    fn complete_form() -> RequisitionForm {
        RequisitionForm {
            patient: patient(),
            unit_id: Some(RecordId::new()),
            agent_id: None,
            priority: Some(Priority::Routine),
            procedures: vec![ProcedureLine {
                procedure_id: RecordId::new(),
                quantity: 1,
            }],
            images: vec![ImageItem {
                client_id: "img00001".into(),
                file_name: "pedido.jpg".into(),
                status: ImageStatus::Uploaded {
                    reference: "local:d/img00001__pedido.jpg".into(),
                },
            }],
            notes: Some("  retorno  ".into()),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn valid_patient_is_normalised() {
        let p = validate_patient(&patient(), today()).unwrap();
        assert_eq!(p.cns, "898001234567890");
        assert_eq!(p.phone.as_deref(), Some("11912345678"));
        assert_eq!(p.mother_name, None);
    }

    #[test]
    fn patient_errors_cover_every_field() {
        let form = PatientForm {
            name: "Al".into(),
            cns: "123".into(),
            birth_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            phone: Some("123".into()),
            mother_name: None,
        };
        let errors = validate_patient(&form, today()).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec!["patient.name", "patient.cns", "patient.birth_date", "patient.phone"]
        );
    }

    #[test]
    fn birth_date_today_is_allowed() {
        let mut form = patient();
        form.birth_date = Some(today());
        assert!(validate_patient(&form, today()).is_ok());
    }

    #[test]
    fn routing_requires_unit_and_priority() {
        let errors = validate_routing(&RequisitionForm::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["unit_id", "priority"]);
    }

    #[test]
    fn procedures_merge_repeated_lines() {
        let id = RecordId::new();
        let merged = validate_procedures(&[
            ProcedureLine { procedure_id: id, quantity: 2 },
            ProcedureLine { procedure_id: id, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged, vec![ProcedureLine { procedure_id: id, quantity: 5 }]);
    }

    #[test]
    fn merged_quantity_cannot_wrap_into_range() {
        let id = RecordId::new();
        let errors = validate_procedures(&[
            ProcedureLine { procedure_id: id, quantity: u32::MAX },
            ProcedureLine { procedure_id: id, quantity: 2 },
        ])
        .unwrap_err();
        assert_eq!(fields(&errors), vec!["procedures"]);
    }

    #[test]
    fn procedures_reject_empty_and_out_of_range() {
        assert!(validate_procedures(&[]).is_err());
        assert!(validate_procedures(&[ProcedureLine {
            procedure_id: RecordId::new(),
            quantity: 0
        }])
        .is_err());
        assert!(validate_procedures(&[ProcedureLine {
            procedure_id: RecordId::new(),
            quantity: 100
        }])
        .is_err());
    }

    #[test]
    fn unfinished_uploads_block_submission() {
        let mut form = complete_form();
        form.images.push(ImageItem::new("img00002", "laudo.pdf"));
        let mut failed = ImageItem::new("img00003", "receita.png");
        failed.status = ImageStatus::Error {
            message: "timeout".into(),
        };
        form.images.push(failed);

        let errors = validate_form(&form, today()).unwrap_err();
        assert_eq!(fields(&errors), vec!["images", "images"]);
    }

    #[test]
    fn complete_form_becomes_new_requisition() {
        let form = complete_form();
        let new = validate_form(&form, today()).unwrap();
        assert_eq!(new.unit_id, form.unit_id.unwrap());
        assert_eq!(new.images.len(), 1);
        assert_eq!(new.images[0].reference, "local:d/img00001__pedido.jpg");
        assert_eq!(new.notes.as_deref(), Some("retorno"));
    }

    #[test]
    fn review_step_checks_everything() {
        let errors = validate_step(WizardStep::Review, &RequisitionForm::default(), today());
        let f = fields(&errors);
        assert!(f.contains(&"patient.name"));
        assert!(f.contains(&"unit_id"));
        assert!(f.contains(&"procedures"));
        assert!(validate_step(WizardStep::Attachments, &RequisitionForm::default(), today())
            .is_empty());
    }
}

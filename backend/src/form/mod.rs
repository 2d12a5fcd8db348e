//! Checklist form controller. Holds everything an engineer enters for one
//! maintenance visit and turns it into a single submission payload.
//!
//! The controller is UI-agnostic: a front end feeds it answers, strokes and
//! photos, and drives [`ChecklistForm::submit`] with any [`SubmissionTransport`].

use async_trait::async_trait;
use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::ClientError;
use crate::models::{
    answer_key, parse_answer_key, Attachment, ChecklistTemplate, MaintenanceType,
    NotificationRequest, SubmissionReceipt, TechnicalData,
};

pub mod enrichment;
pub mod signature;

use enrichment::{enrich_location, Geolocator, LocationEnrichment, LocationLookup};
use signature::SignaturePad;

pub const SIGNATURE_REQUIRED: &str = "Signature is required";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0}")]
    Validation(String),
    #[error("unknown checklist question: {0}")]
    UnknownQuestion(String),
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("this checklist has already been submitted")]
    AlreadySubmitted,
    #[error("{0}")]
    Submission(String),
}

#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionReceipt, ClientError>;
}

/// The unit the form is being filled in for, as resolved from its public token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    pub public_token: String,
    pub record_id: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineerDetails {
    pub maintained_by: String,
    pub engineer_name: String,
    pub engineer_phone: String,
    pub engineer_email: String,
    pub date_of_maintenance: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerField<'a> {
    pub key: String,
    pub question: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRoute {
    pub public_token: String,
    pub maintenance_type: MaintenanceType,
    pub serial_number: String,
}

impl CompletionRoute {
    pub fn path(&self) -> String {
        format!(
            "/unit/{}/{}/complete?serial={}",
            utf8_percent_encode(&self.public_token, NON_ALPHANUMERIC),
            self.maintenance_type.slug(),
            utf8_percent_encode(&self.serial_number, NON_ALPHANUMERIC),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitState {
    Idle,
    InFlight,
    Complete(CompletionRoute),
}

/// Everything one POST to the submission endpoint carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPayload {
    pub unit_record_id: String,
    pub maintenance_type: MaintenanceType,
    pub checklist_template_id: String,
    pub engineer: EngineerDetails,
    pub location_lat: String,
    pub location_lng: String,
    pub location_town: String,
    pub location_what3words: String,
    pub comments: String,
    pub answers: Vec<(String, String)>,
    pub photos: Vec<Attachment>,
    pub signature: Attachment,
    pub submission_id: Uuid,
}

impl SubmissionPayload {
    /// Text parts in wire order; answers follow the fixed fields.
    pub fn text_fields(&self) -> Vec<(String, String)> {
        let fixed = [
            ("unit_record_id", self.unit_record_id.clone()),
            ("maintenance_type", self.maintenance_type.label().to_string()),
            ("checklist_template_id", self.checklist_template_id.clone()),
            ("maintained_by", self.engineer.maintained_by.clone()),
            ("engineer_name", self.engineer.engineer_name.clone()),
            ("engineer_phone", self.engineer.engineer_phone.clone()),
            ("engineer_email", self.engineer.engineer_email.clone()),
            ("date_of_maintenance", self.engineer.date_of_maintenance.clone()),
            ("location_lat", self.location_lat.clone()),
            ("location_lng", self.location_lng.clone()),
            ("location_town", self.location_town.clone()),
            ("location_what3words", self.location_what3words.clone()),
            ("comments", self.comments.clone()),
            ("submission_id", self.submission_id.to_string()),
        ];

        fixed
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .chain(self.answers.iter().cloned())
            .collect()
    }
}

pub struct ChecklistForm {
    unit: UnitContext,
    maintenance_type: MaintenanceType,
    template: ChecklistTemplate,
    engineer: EngineerDetails,
    answers: Vec<String>,
    comments: String,
    photos: Vec<Attachment>,
    signature: SignaturePad,
    location: LocationEnrichment,
    submission_id: Uuid,
    state: SubmitState,
    error_banner: Option<String>,
}

impl ChecklistForm {
    pub fn new(
        unit: UnitContext,
        maintenance_type: MaintenanceType,
        template: ChecklistTemplate,
    ) -> Self {
        let answers = vec![String::new(); template.questions.len()];
        Self {
            unit,
            maintenance_type,
            template,
            engineer: EngineerDetails::default(),
            answers,
            comments: String::new(),
            photos: Vec::new(),
            signature: SignaturePad::default(),
            location: LocationEnrichment::default(),
            submission_id: Uuid::new_v4(),
            state: SubmitState::Idle,
            error_banner: None,
        }
    }

    pub fn unit(&self) -> &UnitContext {
        &self.unit
    }

    pub fn maintenance_type(&self) -> MaintenanceType {
        self.maintenance_type
    }

    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn answer_fields(&self) -> Vec<AnswerField<'_>> {
        self.template
            .questions
            .iter()
            .zip(&self.answers)
            .enumerate()
            .map(|(index, (question, value))| AnswerField {
                key: answer_key(index + 1),
                question,
                value,
            })
            .collect()
    }

    pub fn set_answer(&mut self, key: &str, text: impl Into<String>) -> Result<(), FormError> {
        let slot = parse_answer_key(key)
            .and_then(|position| self.answers.get_mut(position - 1))
            .ok_or_else(|| FormError::UnknownQuestion(key.to_string()))?;
        *slot = text.into();
        Ok(())
    }

    pub fn engineer(&self) -> &EngineerDetails {
        &self.engineer
    }

    pub fn engineer_mut(&mut self) -> &mut EngineerDetails {
        &mut self.engineer
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) {
        self.comments = comments.into();
    }

    pub fn attach_photo(&mut self, photo: Attachment) {
        self.photos.push(photo);
    }

    pub fn remove_photo(&mut self, index: usize) -> Option<Attachment> {
        (index < self.photos.len()).then(|| self.photos.remove(index))
    }

    pub fn photos(&self) -> &[Attachment] {
        &self.photos
    }

    pub fn signature(&self) -> &SignaturePad {
        &self.signature
    }

    pub fn signature_mut(&mut self) -> &mut SignaturePad {
        &mut self.signature
    }

    pub fn clear_signature(&mut self) {
        self.signature.clear();
    }

    pub fn location(&self) -> &LocationEnrichment {
        &self.location
    }

    pub async fn enrich(
        &mut self,
        geolocator: &dyn Geolocator,
        words: &dyn LocationLookup,
        town: &dyn LocationLookup,
    ) {
        self.location = enrich_location(geolocator, words, town).await;
    }

    pub fn state(&self) -> &SubmitState {
        &self.state
    }

    pub fn can_submit(&self) -> bool {
        self.state == SubmitState::Idle
    }

    pub fn error_banner(&self) -> Option<&str> {
        self.error_banner.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error_banner = None;
    }

    pub fn begin_submit(&mut self) -> Result<SubmissionPayload, FormError> {
        match self.state {
            SubmitState::InFlight => return Err(FormError::SubmissionInFlight),
            SubmitState::Complete(_) => return Err(FormError::AlreadySubmitted),
            SubmitState::Idle => {}
        }

        if self.signature.is_empty() {
            self.error_banner = Some(SIGNATURE_REQUIRED.to_string());
            return Err(FormError::Validation(SIGNATURE_REQUIRED.to_string()));
        }
        let signature = self.signature.to_attachment().map_err(|err| {
            let message = format!("Signature could not be encoded: {err}");
            self.error_banner = Some(message.clone());
            FormError::Validation(message)
        })?;

        let position = self.location.position.resolved();
        let payload = SubmissionPayload {
            unit_record_id: self.unit.record_id.clone(),
            maintenance_type: self.maintenance_type,
            checklist_template_id: self.template.id.clone(),
            engineer: self.engineer.clone(),
            location_lat: position
                .map(|at| at.latitude.to_string())
                .unwrap_or_default(),
            location_lng: position
                .map(|at| at.longitude.to_string())
                .unwrap_or_default(),
            location_town: self.location.town.resolved().cloned().unwrap_or_default(),
            location_what3words: self
                .location
                .what3words
                .resolved()
                .cloned()
                .unwrap_or_default(),
            comments: self.comments.clone(),
            answers: self
                .answers
                .iter()
                .enumerate()
                .map(|(index, answer)| (answer_key(index + 1), answer.clone()))
                .collect(),
            photos: self.photos.clone(),
            signature,
            submission_id: self.submission_id,
        };

        self.state = SubmitState::InFlight;
        self.error_banner = None;
        Ok(payload)
    }

    pub fn finish_submit(
        &mut self,
        outcome: Result<SubmissionReceipt, ClientError>,
    ) -> Result<CompletionRoute, FormError> {
        let message = match outcome {
            Ok(receipt) if receipt.success => {
                let route = CompletionRoute {
                    public_token: self.unit.public_token.clone(),
                    maintenance_type: self.maintenance_type,
                    serial_number: self.unit.serial_number.clone(),
                };
                info!(
                    serial_number = %self.unit.serial_number,
                    record_id = receipt.record_id.as_deref().unwrap_or_default(),
                    "checklist submitted"
                );
                self.state = SubmitState::Complete(route.clone());
                return Ok(route);
            }
            Ok(_) => "Submission was not accepted".to_string(),
            Err(err) => err.to_string(),
        };

        warn!(serial_number = %self.unit.serial_number, error = %message, "checklist submission failed");
        self.state = SubmitState::Idle;
        self.error_banner = Some(message.clone());
        Err(FormError::Submission(message))
    }

    pub async fn submit(
        &mut self,
        transport: &dyn SubmissionTransport,
    ) -> Result<CompletionRoute, FormError> {
        let payload = self.begin_submit()?;
        let outcome = transport.submit(&payload).await;
        self.finish_submit(outcome)
    }

    /// Notification body for this visit; answers keyed by question text.
    pub fn notification_request(&self) -> NotificationRequest {
        let answers: IndexMap<String, String> = self
            .template
            .questions
            .iter()
            .cloned()
            .zip(self.answers.iter().cloned())
            .collect();
        let non_empty = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());

        NotificationRequest {
            engineer_email: non_empty(&self.engineer.engineer_email),
            engineer_name: non_empty(&self.engineer.engineer_name),
            serial_number: Some(self.unit.serial_number.clone()),
            answers,
            report_type: Some(self.maintenance_type.label().to_string()),
            technical_data: TechnicalData {
                unit_record_id: Some(self.unit.record_id.clone()),
                checklist_template_id: Some(self.template.id.clone()),
                engineer_phone: non_empty(&self.engineer.engineer_phone),
                location_country: self.location.town.resolved().cloned(),
            },
        }
    }
}

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::records::Record;
use crate::utils::json::field_lines;

/// Column names in the Airtable base.
pub mod fields {
    pub mod unit {
        pub const SERIAL_NUMBER: &str = "Serial Number";
        pub const COMPANY: &str = "Company";
        pub const MODEL: &str = "Model";
        pub const PUBLIC_TOKEN: &str = "Public Token";
        pub const ACCESS_PIN: &str = "Access Pin";
        pub const LAST_ANNUAL_MAINTENANCE: &str = "Last Annual Maintenance";
        pub const ANNUAL_MAINTENANCE_DUE: &str = "Next Annual Maintenance Due";
        pub const DEPTH_MAINTENANCE_DUE: &str = "Depth Maintenance Due";
        pub const ANNUAL_FORM_ID: &str = "Annual Form ID";
        pub const DEPTH_FORM_ID: &str = "Depth Form ID";
    }

    pub mod checklist {
        pub const NAME: &str = "Name";
        pub const TYPE: &str = "Type";
        pub const QUESTIONS: &str = "Questions";
    }

    pub mod submission {
        pub const UNIT: &str = "unit";
        pub const MAINTENANCE_TYPE: &str = "maintenance_type";
        pub const CHECKLIST_TEMPLATE: &str = "checklist_template";
        pub const MAINTAINED_BY: &str = "maintained_by";
        pub const ENGINEER_NAME: &str = "engineer_name";
        pub const ENGINEER_PHONE: &str = "engineer_phone";
        pub const ENGINEER_EMAIL: &str = "engineer_email";
        pub const DATE_OF_MAINTENANCE: &str = "date_of_maintenance";
        pub const LOCATION_LAT: &str = "location_lat";
        pub const LOCATION_LNG: &str = "location_lng";
        pub const LOCATION_TOWN: &str = "location_town";
        pub const LOCATION_WHAT3WORDS: &str = "location_what3words";
        pub const CHECKLIST_JSON: &str = "checklist_json";
        pub const SUBMISSION_ID: &str = "submission_id";
        pub const SIGNATURE: &str = "signature";
        pub const PHOTOS: &str = "photos";
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaintenanceType {
    Annual,
    Depth,
}

impl MaintenanceType {
    pub const ALL: [MaintenanceType; 2] = [MaintenanceType::Annual, MaintenanceType::Depth];

    pub fn label(self) -> &'static str {
        match self {
            MaintenanceType::Annual => "Annual",
            MaintenanceType::Depth => "Depth",
        }
    }

    /// Route segment, e.g. `/unit/<token>/annual`.
    pub fn slug(self) -> &'static str {
        match self {
            MaintenanceType::Annual => "annual",
            MaintenanceType::Depth => "depth",
        }
    }
}

impl fmt::Display for MaintenanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MaintenanceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let normalized = normalized
            .strip_suffix("maintenance")
            .unwrap_or(&normalized)
            .trim();
        match normalized {
            "annual" => Ok(MaintenanceType::Annual),
            "depth" => Ok(MaintenanceType::Depth),
            _ => Err(format!("unknown maintenance type: {}", value.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub record_id: String,
    pub serial_number: String,
    pub public_token: Option<String>,
    pub company: Option<String>,
    pub model: Option<String>,
    pub last_annual_maintenance: Option<String>,
    pub annual_maintenance_due: Option<String>,
    pub depth_maintenance_due: Option<String>,
    pub annual_form_id: Option<String>,
    pub depth_form_id: Option<String>,
}

impl Unit {
    pub fn from_record(record: &Record) -> Self {
        use fields::unit;

        Self {
            record_id: record.id.clone(),
            serial_number: record.text(unit::SERIAL_NUMBER).unwrap_or_default(),
            public_token: record.text(unit::PUBLIC_TOKEN),
            company: record.text(unit::COMPANY),
            model: record.text(unit::MODEL),
            last_annual_maintenance: record.text(unit::LAST_ANNUAL_MAINTENANCE),
            annual_maintenance_due: record.text(unit::ANNUAL_MAINTENANCE_DUE),
            depth_maintenance_due: record.text(unit::DEPTH_MAINTENANCE_DUE),
            annual_form_id: record.text(unit::ANNUAL_FORM_ID),
            depth_form_id: record.text(unit::DEPTH_FORM_ID),
        }
    }

    /// External form id when this maintenance type is delegated to an embedded form.
    pub fn external_form_id(&self, maintenance_type: MaintenanceType) -> Option<&str> {
        match maintenance_type {
            MaintenanceType::Annual => self.annual_form_id.as_deref(),
            MaintenanceType::Depth => self.depth_form_id.as_deref(),
        }
    }

    pub fn due_date(&self, maintenance_type: MaintenanceType) -> Option<&str> {
        match maintenance_type {
            MaintenanceType::Annual => self.annual_maintenance_due.as_deref(),
            MaintenanceType::Depth => self.depth_maintenance_due.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistTemplate {
    pub id: String,
    pub name: String,
    pub maintenance_type: Option<MaintenanceType>,
    pub questions: Vec<String>,
}

impl ChecklistTemplate {
    pub fn from_record(record: &Record) -> Self {
        use fields::checklist;

        Self {
            id: record.id.clone(),
            name: record.text(checklist::NAME).unwrap_or_default(),
            maintenance_type: record
                .text(checklist::TYPE)
                .and_then(|value| value.parse().ok()),
            questions: field_lines(record.fields.get(checklist::QUESTIONS)),
        }
    }

    /// Position-keyed answer fields, `q1..qN` in question order.
    pub fn answer_keys(&self) -> impl Iterator<Item = (String, &str)> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, question)| (answer_key(index + 1), question.as_str()))
    }
}

pub fn answer_key(position: usize) -> String {
    format!("q{position}")
}

/// Parses `q<n>` with n >= 1.
pub fn parse_answer_key(key: &str) -> Option<usize> {
    let digits = key.strip_prefix('q')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|position| *position >= 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn encode(&self) -> EncodedAttachment {
        EncodedAttachment {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

/// Attachment cell value as the record store expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAttachment {
    pub filename: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub public_token: String,
    pub company: Option<String>,
    pub serial_number: Option<String>,
    pub last_annual_maintenance_date: Option<String>,
    pub next_annual_maintenance_due: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalData {
    #[serde(default)]
    pub unit_record_id: Option<String>,
    #[serde(default)]
    pub checklist_template_id: Option<String>,
    #[serde(default)]
    pub engineer_phone: Option<String>,
    #[serde(default)]
    pub location_country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub engineer_email: Option<String>,
    #[serde(default)]
    pub engineer_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub answers: IndexMap<String, String>,
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub technical_data: TechnicalData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::models::{fields, AccessGrant, ChecklistTemplate, MaintenanceType, Unit};
use crate::records::{RecordQuery, RecordStore, StoreResult};

pub const PIN_NOT_RECOGNISED: &str = "Code not recognised";

#[derive(Debug)]
pub enum PinLookup {
    Found(AccessGrant),
    NotRecognised,
}

/// Point lookup of a unit by access PIN. Projects only the fields handed back to the
/// caller; a PIN shared by several units resolves to whichever the store lists first.
pub async fn resolve_pin(
    records: &dyn RecordStore,
    config: &AppConfig,
    pin: &str,
) -> StoreResult<PinLookup> {
    use fields::unit;

    let query = RecordQuery::matching(unit::ACCESS_PIN, pin)
        .max_records(1)
        .fields([
            unit::PUBLIC_TOKEN,
            unit::COMPANY,
            unit::SERIAL_NUMBER,
            unit::LAST_ANNUAL_MAINTENANCE,
            unit::ANNUAL_MAINTENANCE_DUE,
        ]);
    let matches = records
        .find_records(&config.airtable_units_table, &query)
        .await?;

    let Some(record) = matches.into_iter().next() else {
        debug!("access pin not recognised");
        return Ok(PinLookup::NotRecognised);
    };

    let Some(public_token) = record.text(unit::PUBLIC_TOKEN) else {
        warn!(record_id = %record.id, "unit matched pin but has no public token");
        return Ok(PinLookup::NotRecognised);
    };

    Ok(PinLookup::Found(AccessGrant {
        public_token,
        company: record.text(unit::COMPANY),
        serial_number: record.text(unit::SERIAL_NUMBER),
        last_annual_maintenance_date: record.text(unit::LAST_ANNUAL_MAINTENANCE),
        next_annual_maintenance_due: record.text(unit::ANNUAL_MAINTENANCE_DUE),
    }))
}

pub async fn find_unit_by_token(
    records: &dyn RecordStore,
    config: &AppConfig,
    public_token: &str,
) -> StoreResult<Option<Unit>> {
    let query = RecordQuery::matching(fields::unit::PUBLIC_TOKEN, public_token).max_records(1);
    let matches = records
        .find_records(&config.airtable_units_table, &query)
        .await?;
    Ok(matches.first().map(Unit::from_record))
}

pub async fn find_unit_by_serial(
    records: &dyn RecordStore,
    config: &AppConfig,
    serial_number: &str,
) -> StoreResult<Option<Unit>> {
    let query =
        RecordQuery::matching(fields::unit::SERIAL_NUMBER, serial_number).max_records(1);
    let matches = records
        .find_records(&config.airtable_units_table, &query)
        .await?;
    Ok(matches.first().map(Unit::from_record))
}

/// Current native checklist for a maintenance type.
pub async fn find_template(
    records: &dyn RecordStore,
    config: &AppConfig,
    maintenance_type: MaintenanceType,
) -> StoreResult<Option<ChecklistTemplate>> {
    let query =
        RecordQuery::matching(fields::checklist::TYPE, maintenance_type.label()).max_records(1);
    let matches = records
        .find_records(&config.airtable_checklists_table, &query)
        .await?;
    Ok(matches.first().map(ChecklistTemplate::from_record))
}

pub async fn get_template(
    records: &dyn RecordStore,
    config: &AppConfig,
    template_id: &str,
) -> StoreResult<Option<ChecklistTemplate>> {
    let record = records
        .get_record(&config.airtable_checklists_table, template_id)
        .await?;
    Ok(record.as_ref().map(ChecklistTemplate::from_record))
}

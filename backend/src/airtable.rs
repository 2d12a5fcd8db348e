use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;

use crate::config::AppConfig;
use crate::records::AirtableStore;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const AIRTABLE_WEB_URL: &str = "https://airtable.com";

pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("swift-portal/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")
}

pub fn build_store(client: Client, config: &AppConfig) -> AirtableStore {
    AirtableStore::new(
        client,
        config.airtable_api_url.clone(),
        config.airtable_api_key.clone(),
        config.airtable_base_id.clone(),
    )
}

pub fn path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

/// Case-sensitive equality filter. `=` in Airtable formulas ignores case, `EXACT` does not.
pub fn exact_match_formula(field: &str, value: &str) -> String {
    format!("EXACT({{{field}}}, '{}')", escape_formula_string(value))
}

fn escape_formula_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '\'' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Deep link to a record in the Airtable web UI.
pub fn record_url(base_id: &str, table: &str, record_id: &str) -> String {
    format!(
        "{AIRTABLE_WEB_URL}/{}/{}/{}",
        path_segment(base_id),
        path_segment(table),
        path_segment(record_id)
    )
}

use std::env;

use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
    pub airtable_api_url: String,
    pub airtable_api_key: Option<String>,
    pub airtable_base_id: Option<String>,
    pub airtable_units_table: String,
    pub airtable_checklists_table: String,
    pub airtable_submissions_table: String,
    pub airtable_units_table_id: Option<String>,
    pub resend_api_url: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub internal_alert_recipients: Vec<String>,
    pub embed_form_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let airtable_api_url = env::var("AIRTABLE_API_URL")
            .unwrap_or_else(|_| "https://api.airtable.com/v0".to_string());
        Url::parse(&airtable_api_url).context("AIRTABLE_API_URL must be a valid URL")?;
        let airtable_api_key = non_empty_var("AIRTABLE_API_KEY");
        let airtable_base_id = non_empty_var("AIRTABLE_BASE_ID");
        let airtable_units_table =
            env::var("AIRTABLE_UNITS_TABLE").unwrap_or_else(|_| "Units".to_string());
        let airtable_checklists_table =
            env::var("AIRTABLE_CHECKLISTS_TABLE").unwrap_or_else(|_| "Checklists".to_string());
        let airtable_submissions_table = env::var("AIRTABLE_SUBMISSIONS_TABLE")
            .unwrap_or_else(|_| "Maintenance Records".to_string());
        let airtable_units_table_id = non_empty_var("AIRTABLE_UNITS_TABLE_ID");

        let resend_api_url =
            env::var("RESEND_API_URL").unwrap_or_else(|_| "https://api.resend.com".to_string());
        Url::parse(&resend_api_url).context("RESEND_API_URL must be a valid URL")?;
        let resend_api_key = non_empty_var("RESEND_API_KEY");
        let email_from = env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "SWIFT Maintenance <onboarding@resend.dev>".to_string());
        let internal_alert_recipients = env::var("INTERNAL_ALERT_RECIPIENTS")
            .map(|value| split_list(&value))
            .unwrap_or_default();

        let embed_form_base_url = env::var("EMBED_FORM_BASE_URL")
            .unwrap_or_else(|_| "https://form.jotform.com".to_string());

        Ok(Self {
            server_host,
            server_port,
            cors_allowed_origin,
            max_upload_bytes,
            airtable_api_url,
            airtable_api_key,
            airtable_base_id,
            airtable_units_table,
            airtable_checklists_table,
            airtable_submissions_table,
            airtable_units_table_id,
            resend_api_url,
            resend_api_key,
            email_from,
            internal_alert_recipients,
            embed_form_base_url,
        })
    }

    pub fn redacted_airtable_key(&self) -> String {
        redact_secret(self.airtable_api_key.as_deref())
    }

    pub fn redacted_resend_key(&self) -> String {
        redact_secret(self.resend_api_key.as_deref())
    }

    /// Table segment used when building record links into the Airtable web UI.
    pub fn units_link_table(&self) -> &str {
        self.airtable_units_table_id
            .as_deref()
            .unwrap_or(&self.airtable_units_table)
    }
}

pub(crate) fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn redact_secret(secret: Option<&str>) -> String {
    match secret {
        None => "<unset>".to_string(),
        Some(value) if value.chars().count() <= 8 => "*****".to_string(),
        Some(value) => {
            let prefix: String = value.chars().take(4).collect();
            format!("{prefix}*****")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_secret, split_list};

    #[test]
    fn redacts_all_but_prefix_of_long_secret() {
        let redacted = redact_secret(Some("patABCDEFGHIJKL"));
        assert_eq!(redacted, "patA*****");
        assert!(!redacted.contains("EFGH"));
    }

    #[test]
    fn hides_short_secrets_entirely() {
        assert_eq!(redact_secret(Some("abc")), "*****");
    }

    #[test]
    fn reports_missing_secret() {
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn splits_recipient_list_and_drops_blanks() {
        let recipients = split_list(" ops@example.com, ,alerts@example.com ");
        assert_eq!(recipients, vec!["ops@example.com", "alerts@example.com"]);
    }
}

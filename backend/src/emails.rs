use std::fmt::Write as _;

use chrono::NaiveDate;
use indexmap::IndexMap;

pub const DEFAULT_REPORT_TYPE: &str = "Maintenance";
const NOT_PROVIDED: &str = "Not provided";

/// `reportType` normalized to always end up naming a maintenance report.
pub fn display_type(report_type: Option<&str>) -> String {
    let base = report_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_REPORT_TYPE);
    if base.to_lowercase().contains("maintenance") {
        base.to_string()
    } else {
        format!("{base} Maintenance")
    }
}

pub fn engineer_subject(serial_number: &str, display_type: &str) -> String {
    format!("{serial_number} {display_type} Confirmation")
}

pub fn internal_subject(serial_number: &str, display_type: &str) -> String {
    format!("TECHNICAL ALERT: {serial_number} - {display_type}")
}

pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%-d %B %Y").to_string()
}

pub struct EngineerReceipt<'a> {
    pub engineer_name: &'a str,
    pub serial_number: &'a str,
    pub display_type: &'a str,
    pub date: NaiveDate,
    pub answers: &'a IndexMap<String, String>,
}

impl EngineerReceipt<'_> {
    pub fn subject(&self) -> String {
        engineer_subject(self.serial_number, self.display_type)
    }

    pub fn render_html(&self) -> String {
        let mut html = String::new();
        open_document(&mut html, &self.subject());
        let _ = write!(
            html,
            "<h1>{} report received</h1><p>Hi {},</p><p>Thank you for completing the {} for unit <strong>{}</strong> on {}. A copy of your answers is below.</p>",
            escape_html(self.display_type),
            escape_html(self.engineer_name),
            escape_html(&self.display_type.to_lowercase()),
            escape_html(self.serial_number),
            escape_html(&format_long_date(self.date)),
        );
        render_answers(&mut html, self.answers);
        close_document(&mut html);
        html
    }
}

pub struct InternalAlert<'a> {
    pub serial_number: &'a str,
    pub display_type: &'a str,
    pub engineer_name: &'a str,
    pub engineer_email: &'a str,
    pub unit_record_id: Option<&'a str>,
    pub checklist_template_id: Option<&'a str>,
    pub engineer_phone: Option<&'a str>,
    pub location: Option<&'a str>,
    pub record_link: Option<String>,
    pub answers: &'a IndexMap<String, String>,
}

impl InternalAlert<'_> {
    pub fn subject(&self) -> String {
        internal_subject(self.serial_number, self.display_type)
    }

    pub fn render_html(&self) -> String {
        let mut html = String::new();
        open_document(&mut html, &self.subject());
        let _ = write!(
            html,
            "<h1>{}</h1><p>{} submitted by {} ({}).</p>",
            escape_html(&self.subject()),
            escape_html(self.display_type),
            escape_html(self.engineer_name),
            escape_html(self.engineer_email),
        );

        html.push_str("<table class=\"technical\">");
        technical_row(&mut html, "Unit record", self.unit_record_id);
        technical_row(&mut html, "Checklist template", self.checklist_template_id);
        technical_row(&mut html, "Engineer phone", self.engineer_phone);
        technical_row(&mut html, "Location", self.location);
        html.push_str("</table>");

        if let Some(link) = &self.record_link {
            let _ = write!(
                html,
                "<p><a href=\"{}\">Open unit record in Airtable</a></p>",
                escape_html(link)
            );
        }

        render_answers(&mut html, self.answers);
        close_document(&mut html);
        html
    }
}

fn open_document(html: &mut String, title: &str) {
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>",
        escape_html(title)
    );
}

fn close_document(html: &mut String) {
    html.push_str("</body></html>");
}

fn technical_row(html: &mut String, label: &str, value: Option<&str>) {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NOT_PROVIDED);
    let _ = write!(
        html,
        "<tr><th>{}</th><td>{}</td></tr>",
        escape_html(label),
        escape_html(value)
    );
}

fn render_answers(html: &mut String, answers: &IndexMap<String, String>) {
    if answers.is_empty() {
        html.push_str("<p>No checklist answers were recorded.</p>");
        return;
    }
    html.push_str("<table class=\"answers\">");
    for (question, answer) in answers {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(question),
            escape_html(answer)
        );
    }
    html.push_str("</table>");
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

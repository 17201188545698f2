use chrono::{Local, NaiveDate};
use reqwest::Url;

use crate::error::ValidationError;
use crate::models::{JobApplication, NewJobApplication, Status, parse_date};

/// Text state of the create/edit form before it is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub company: String,
    pub role: String,
    pub status: Status,
    pub application_date: String,
    pub link: String,
}

impl JobDraft {
    /// Blank form dated `today`.
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            company: String::new(),
            role: String::new(),
            status: Status::Applied,
            application_date: today.format("%Y-%m-%d").to_string(),
            link: String::new(),
        }
    }

    pub fn from_record(job: &JobApplication) -> Self {
        Self {
            company: job.company.clone(),
            role: job.role.clone(),
            status: job.status,
            application_date: job.application_date.format("%Y-%m-%d").to_string(),
            link: job.link.clone(),
        }
    }

    /// Pre-populated from the record being edited, defaults otherwise.
    pub fn for_editing(record: Option<&JobApplication>) -> Self {
        match record {
            Some(job) => Self::from_record(job),
            None => Self::blank(Local::now().date_naive()),
        }
    }

    pub fn validate(&self) -> Result<NewJobApplication, ValidationError> {
        let company = required("company", &self.company)?;
        let role = required("role", &self.role)?;
        let link = required("link", &self.link)?;

        match Url::parse(&link) {
            Ok(url) if url.has_host() => {}
            _ => return Err(ValidationError::InvalidLink(link)),
        }

        let date_text = required("application date", &self.application_date)?;
        let application_date =
            parse_date(&date_text).ok_or(ValidationError::InvalidDate(date_text))?;

        Ok(NewJobApplication {
            company,
            role,
            status: self.status,
            application_date,
            link,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(trimmed.to_string())
    }
}

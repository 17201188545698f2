use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use crate::models::{JobApplication, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn matches(&self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }

    /// all -> Applied -> Interview -> Offer -> Rejected -> all
    pub fn cycle(&self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::Only(Status::Applied),
            StatusFilter::Only(Status::Applied) => StatusFilter::Only(Status::Interview),
            StatusFilter::Only(Status::Interview) => StatusFilter::Only(Status::Offer),
            StatusFilter::Only(Status::Offer) => StatusFilter::Only(Status::Rejected),
            StatusFilter::Only(Status::Rejected) => StatusFilter::All,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Only(status) => write!(f, "{}", status),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse::<Status>().map(StatusFilter::Only)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn toggle(&self) -> Self {
        match self {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Newest,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Newest => f.write_str("newest"),
            SortOrder::Oldest => f.write_str("oldest"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            other => Err(format!("unknown sort order '{}' (expected newest or oldest)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// `None` unless both bounds are set; a half-open range filters nothing.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.start.zip(self.end)
    }

    pub fn is_set(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    pub status: StatusFilter,
    pub sort: SortOrder,
    pub date_range: DateRange,
}

impl FilterCriteria {
    fn keeps(&self, job: &JobApplication) -> bool {
        let status_match = self.status.matches(job.status);

        let Some((start, end)) = self.date_range.bounds() else {
            return status_match;
        };

        // start > end is an empty interval
        status_match && start <= job.application_date && job.application_date <= end
    }
}

/// The displayable view: records passing every predicate, ordered by
/// application date. Equal dates keep their collection order.
pub fn derive(collection: &[JobApplication], criteria: &FilterCriteria) -> Vec<JobApplication> {
    let mut view: Vec<JobApplication> = collection
        .iter()
        .filter(|job| criteria.keeps(job))
        .cloned()
        .collect();

    match criteria.sort {
        SortOrder::Newest => view.sort_by(|a, b| b.application_date.cmp(&a.application_date)),
        SortOrder::Oldest => view.sort_by(|a, b| a.application_date.cmp(&b.application_date)),
    }

    view
}

/// Number of records per status, in `Status::ALL` order.
pub fn status_counts(collection: &[JobApplication]) -> [(Status, usize); 4] {
    Status::ALL.map(|status| {
        let count = collection.iter().filter(|job| job.status == status).count();
        (status, count)
    })
}

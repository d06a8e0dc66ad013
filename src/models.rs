use std::fmt;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Opaque value of the portal's `sdv` session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        SessionToken(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "Matin")]
    Morning,
    #[serde(rename = "Après-midi")]
    Afternoon,
    #[serde(rename = "")]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Closed,
    Open,
    Late,
    Present,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttendanceStatus::Closed => "Closed",
            AttendanceStatus::Open => "Open",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Present => "Present",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub day: NaiveDate,
    pub full_day: bool,
    pub morning: bool,
    pub afternoon: bool,
    pub remote: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub professor: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub course: String,
    pub subject: String,
    pub date: String,
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// Error taxonomy shared by every portal operation.

use reqwest::StatusCode;
use thiserror::Error;
use crate::models::AttendanceStatus;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username and/or password")]
    InvalidCredentials,

    #[error("Login request failed with status {0}")]
    TransportFailure(StatusCode),

    #[error("Session cookie not found in the login response")]
    TokenMissing,

    #[error("Session expired, log in again")]
    SessionExpired,
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("No courses found")]
    NoCoursesFound,

    #[error("Unable to determine attendance status")]
    StatusUndetermined,
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Course {0} is not part of the current day's courses")]
    UnknownCourseId(String),

    #[error("Invalid calendar identifier: {0:?}")]
    InvalidCalendarId(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cannot set presence while attendance is {0}")]
    SubmissionNotAllowed(AttendanceStatus),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Presence not marked for course {course_id}")]
    Rejected { course_id: String },
}

#[derive(Error, Debug)]
pub enum PortalError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortalError {
    // Stable, machine-readable name of the failure, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Auth(AuthError::InvalidCredentials) => "InvalidCredentials",
            PortalError::Auth(AuthError::TransportFailure(_)) => "TransportFailure",
            PortalError::Auth(AuthError::TokenMissing) => "TokenMissing",
            PortalError::Auth(AuthError::SessionExpired) => "SessionExpired",
            PortalError::Extraction(ExtractionError::MalformedDocument(_)) => "MalformedDocument",
            PortalError::Extraction(ExtractionError::NoCoursesFound) => "NoCoursesFound",
            PortalError::Extraction(ExtractionError::StatusUndetermined) => "StatusUndetermined",
            PortalError::Validation(ValidationError::UnknownCourseId(_)) => "UnknownCourseID",
            PortalError::Validation(ValidationError::InvalidCalendarId(_)) => "InvalidCalendarID",
            PortalError::State(StateError::SubmissionNotAllowed(_)) => "SubmissionNotAllowed",
            PortalError::Submission(SubmissionError::Rejected { .. }) => "Rejected",
            PortalError::Transport(_) | PortalError::UnexpectedStatus { .. } => "TransportError",
            PortalError::Url(_) => "InvalidUrl",
            PortalError::Io(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;

// Client for the Pepal school portal.
//
// Logs in, scrapes the course, attendance and grade pages, parses the student
// ICS calendar and serves the results as JSON over a small HTTP API.

pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod utils;

pub use config::Config;
pub use error::{PortalError, Result};
pub use models::{AttendanceStatus, CalendarEvent, Course, GradeRecord, Period, SessionToken};
pub use utils::portal::PortalClient;

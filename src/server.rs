// HTTP API. Each route performs exactly one portal operation.

use std::path::PathBuf;
use std::sync::Arc;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::config::Config;
use crate::error::{AuthError, ExtractionError, PortalError};
use crate::models::{AttendanceStatus, CalendarEvent, Course, GradeRecord, SessionToken};
use crate::utils::portal::PortalClient;
use crate::utils::{attendance, calendar, grades};

pub struct AppState {
    pub client: PortalClient,
    pub assets_dir: PathBuf,
}

impl AppState {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        Ok(AppState {
            client: PortalClient::new(config)?,
            assets_dir: config.assets_dir.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub cookie: SessionToken,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub cookie: SessionToken,
}

#[derive(Debug, Deserialize)]
pub struct CourseRequest {
    pub cookie: SessionToken,
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CalendarRequest {
    #[serde(rename = "calUUID")]
    pub calendar_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoursesResponse {
    pub courses: Vec<Course>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: AttendanceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub message: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub schedule: Vec<CalendarEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GradesResponse {
    pub grades: Vec<GradeRecord>,
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = match &self {
            PortalError::Auth(AuthError::InvalidCredentials | AuthError::SessionExpired) => StatusCode::UNAUTHORIZED,
            PortalError::Auth(_) => StatusCode::BAD_GATEWAY,
            PortalError::Extraction(ExtractionError::NoCoursesFound) => StatusCode::NOT_FOUND,
            PortalError::Extraction(ExtractionError::StatusUndetermined) => StatusCode::UNPROCESSABLE_ENTITY,
            PortalError::Extraction(ExtractionError::MalformedDocument(_)) => StatusCode::BAD_GATEWAY,
            PortalError::Validation(_) => StatusCode::BAD_REQUEST,
            PortalError::State(_) => StatusCode::CONFLICT,
            PortalError::Submission(_) | PortalError::Transport(_) | PortalError::UnexpectedStatus { .. } => StatusCode::BAD_GATEWAY,
            PortalError::Url(_) | PortalError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{}", self);
        }

        let body = json!({ "error": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/getCourseIDs", post(course_ids))
        .route("/getAttendanceStatus", post(attendance_status))
        .route("/setPresence", post(set_presence))
        .route("/fetchCalendar", post(fetch_calendar))
        .route("/getGrades", post(get_grades))
        .with_state(state)
}

pub async fn start(config: &Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config)?);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server started on http://{}", config.bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, PortalError> {
    debug!("Login requested");
    let cookie = state.client.authenticate(&request.username, &request.password).await?;
    Ok(Json(LoginResponse { cookie }))
}

async fn course_ids(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<CoursesResponse>, PortalError> {
    let courses = attendance::list_courses(&state.client, &request.cookie).await?;
    Ok(Json(CoursesResponse { courses }))
}

async fn attendance_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CourseRequest>,
) -> Result<Json<StatusResponse>, PortalError> {
    let status = attendance::get_status(&state.client, &request.cookie, &request.course_id).await?;
    Ok(Json(StatusResponse { status }))
}

async fn set_presence(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CourseRequest>,
) -> Result<Json<PresenceResponse>, PortalError> {
    let status = attendance::submit(&state.client, &request.cookie, &request.course_id).await?;
    Ok(Json(PresenceResponse {
        message: "Presence marked successfully".to_string(),
        status,
    }))
}

async fn fetch_calendar(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CalendarRequest>,
) -> Result<Json<ScheduleResponse>, PortalError> {
    let schedule = calendar::fetch_calendar(&state.client, &state.assets_dir, &request.calendar_id).await?;
    Ok(Json(ScheduleResponse { schedule }))
}

async fn get_grades(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<GradesResponse>, PortalError> {
    let grades = grades::list_grades(&state.client, &request.cookie).await?;
    Ok(Json(GradesResponse { grades }))
}

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use tracing::{debug, error, info};

use crate::{
    auth::{AuthService, LoginOutcome, Session},
    errors::{classify_database_error, ApiError, ErrorContext},
    llm::EncouragementService,
    log_service::LogService,
    message,
    models::*,
    quiz::{QuizSession, QuizView},
    quran,
    student_service::StudentService,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

const SESSION_HEADER: &str = "x-session-token";

/// A live parent quiz, pinned to the student and log it was started from.
pub struct ActiveQuiz {
    pub student_id: Uuid,
    pub log_id: Uuid,
    pub session: QuizSession,
}

#[derive(Clone)]
pub struct AppState {
    pub student_service: StudentService,
    pub log_service: LogService,
    pub auth_service: AuthService,
    pub encouragement_service: EncouragementService,
    pub sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    pub quiz_sessions: Arc<Mutex<HashMap<Uuid, ActiveQuiz>>>,
    pub whatsapp_country_code: String,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

// Request/response shapes

#[derive(Deserialize)]
pub struct ParentLoginRequest {
    pub code: String,
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct ParentLoginResponse {
    pub phone_required: bool,
    pub session: Option<Session>,
}

#[derive(Deserialize)]
pub struct TeacherLoginRequest {
    pub teacher_id: Uuid,
    pub login_code: String,
}

#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreateTeacherRequest {
    pub name: String,
    pub login_code: String,
}

#[derive(Deserialize)]
pub struct CreateStudentRequest {
    pub name: String,
    /// Required for admin callers; ignored for teachers, who always own
    /// the students they create.
    pub teacher_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct SaveLogRequest {
    pub draft: LogDraft,
    pub plan: PlanDraft,
}

#[derive(Serialize)]
pub struct TodayResponse {
    pub draft: LogDraft,
    pub plan: PlanDraft,
    pub fee_reminder_due: bool,
}

#[derive(Deserialize)]
pub struct AdabRequest {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Deserialize)]
pub struct MarkSeenRequest {
    pub log_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ParentMessageResponse {
    pub message: String,
    pub whatsapp_link: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub schedule: Vec<ScheduleDay>,
}

#[derive(Deserialize)]
pub struct EncouragementRequest {
    pub student_name: String,
    pub achievement: String,
}

#[derive(Serialize)]
pub struct EncouragementResponse {
    pub text: String,
}

#[derive(Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub body: String,
}

#[derive(Deserialize)]
pub struct QuizAnswerRequest {
    pub answer: String,
}

#[derive(Serialize)]
pub struct QuizStartResponse {
    pub session_id: Uuid,
    pub view: QuizView,
}

#[derive(Serialize)]
pub struct QuizStepResponse {
    pub view: QuizView,
    pub completed: bool,
}

// Session plumbing

fn unauthorized(operation: &str, message: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    ApiError::Unauthorized(message.to_string())
        .to_response_with_context(ErrorContext::new(operation, "session"))
}

fn require_session(
    state: &AppState,
    headers: &HeaderMap,
    operation: &str,
) -> Result<Session, (StatusCode, Json<ApiResponse<()>>)> {
    let token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| unauthorized(operation, "missing or malformed session token"))?;

    let sessions = state.sessions.lock().unwrap();
    sessions
        .get(&token)
        .cloned()
        .ok_or_else(|| unauthorized(operation, "unknown session"))
}

/// Resolve the acting teacher for a mutating log operation.
async fn require_acting_teacher(
    state: &AppState,
    session: &Session,
    operation: &str,
) -> Result<Teacher, (StatusCode, Json<ApiResponse<()>>)> {
    let teacher_id = session
        .teacher_id()
        .ok_or_else(|| unauthorized(operation, "teacher session required"))?;

    match state.student_service.get_teacher(teacher_id).await {
        Ok(Some(teacher)) => Ok(teacher),
        Ok(None) => Err(unauthorized(operation, "teacher no longer exists")),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new(operation, "teacher"))),
    }
}

/// Inline validation for every assignment a draft carries.
fn validate_assignments<'a>(
    assignments: impl Iterator<Item = &'a QuranAssignment>,
) -> Option<String> {
    for assignment in assignments {
        match assignment {
            QuranAssignment::Surah {
                name,
                ayah_from,
                ayah_to,
                ..
            } => {
                if let Some(message) = quran::validate_ayah_range(name, *ayah_from, *ayah_to) {
                    return Some(message);
                }
            }
            QuranAssignment::Juz { number, .. } => {
                if !(1..=30).contains(number) {
                    return Some(format!("رقم الجزء {} خارج النطاق", number));
                }
            }
            QuranAssignment::Multi { parts } => {
                for part in parts {
                    if let Some(message) =
                        quran::validate_ayah_range(&part.name, part.ayah_from, part.ayah_to)
                    {
                        return Some(message);
                    }
                }
            }
            QuranAssignment::Range { .. } => {}
        }
    }
    None
}

fn validate_save_request(request: &SaveLogRequest) -> Option<String> {
    validate_assignments(
        std::iter::once(&request.draft.jadeed)
            .chain(request.draft.murajaah.iter())
            .chain(std::iter::once(&request.plan.jadeed))
            .chain(request.plan.murajaah.iter()),
    )
}

// Auth endpoints

pub async fn parent_login(
    State(state): State<AppState>,
    Json(request): Json<ParentLoginRequest>,
) -> ApiResult<ParentLoginResponse> {
    log_api_start!("parent_login");

    match state
        .auth_service
        .login_parent(&request.code, request.phone.as_deref())
        .await
    {
        Ok(LoginOutcome::Granted(session)) => {
            state
                .sessions
                .lock()
                .unwrap()
                .insert(session.token, session.clone());
            log_api_success!("parent_login", "parent session granted");
            Ok(Json(ApiResponse::success(ParentLoginResponse {
                phone_required: false,
                session: Some(session),
            })))
        }
        Ok(LoginOutcome::PhoneRequired) => {
            debug!("parent login needs first-time phone capture");
            Ok(Json(ApiResponse::success(ParentLoginResponse {
                phone_required: true,
                session: None,
            })))
        }
        Ok(LoginOutcome::Rejected(message)) => {
            log_api_warn!("parent_login", "login rejected");
            Err(ApiError::Unauthorized(message)
                .to_response_with_context(ErrorContext::new("parent_login", "session")))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("parent_login", "session"))),
    }
}

pub async fn teacher_login(
    State(state): State<AppState>,
    Json(request): Json<TeacherLoginRequest>,
) -> ApiResult<Session> {
    log_api_start!("teacher_login");

    match state
        .auth_service
        .login_teacher(request.teacher_id, &request.login_code)
        .await
    {
        Ok(LoginOutcome::Granted(session)) => {
            state
                .sessions
                .lock()
                .unwrap()
                .insert(session.token, session.clone());
            log_api_success!("teacher_login", "teacher session granted");
            Ok(Json(ApiResponse::success(session)))
        }
        Ok(LoginOutcome::Rejected(message)) => {
            Err(ApiError::Unauthorized(message)
                .to_response_with_context(ErrorContext::new("teacher_login", "session")))
        }
        Ok(LoginOutcome::PhoneRequired) => {
            // Teacher logins never ask for a phone; treat as a bad code.
            Err(ApiError::Unauthorized("رمز الدخول غير صحيح".to_string())
                .to_response_with_context(ErrorContext::new("teacher_login", "session")))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("teacher_login", "session"))),
    }
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> ApiResult<Session> {
    match state.auth_service.login_admin(&request.password) {
        LoginOutcome::Granted(session) => {
            state
                .sessions
                .lock()
                .unwrap()
                .insert(session.token, session.clone());
            info!("admin session granted");
            Ok(Json(ApiResponse::success(session)))
        }
        _ => Err(ApiError::Unauthorized("كلمة المرور غير صحيحة".to_string())
            .to_response_with_context(ErrorContext::new("admin_login", "session"))),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<()> {
    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
    {
        state.sessions.lock().unwrap().remove(&token);
    }
    Ok(Json(ApiResponse::success(())))
}

// Teacher endpoints

pub async fn get_teachers(State(state): State<AppState>) -> ApiResult<Vec<Teacher>> {
    // Public: the teacher login form lists identities to pick from.
    match state.student_service.get_all_teachers().await {
        Ok(teachers) => Ok(Json(ApiResponse::success(teachers))),
        Err(e) => {
            error!(error = %e, "Error listing teachers");
            Err(ApiError::DatabaseError(e)
                .to_response_with_context(ErrorContext::new("get_teachers", "teacher")))
        }
    }
}

pub async fn create_teacher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTeacherRequest>,
) -> ApiResult<Teacher> {
    let session = require_session(&state, &headers, "create_teacher")?;
    if !session.is_admin() {
        return Err(unauthorized("create_teacher", "admin session required"));
    }

    match state
        .student_service
        .create_teacher(&request.name, &request.login_code)
        .await
    {
        Ok(teacher) => {
            info!(teacher_id = %teacher.id, "Teacher created");
            Ok(Json(ApiResponse::success(teacher)))
        }
        Err(e) => Err(ApiError::ValidationError(e.to_string())
            .to_response_with_context(ErrorContext::new("create_teacher", "teacher"))),
    }
}

pub async fn delete_teacher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let session = require_session(&state, &headers, "delete_teacher")?;
    if !session.is_admin() {
        return Err(unauthorized("delete_teacher", "admin session required"));
    }

    match state.student_service.delete_teacher(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(()))),
        Ok(false) => Err(ApiError::NotFound(format!("Teacher '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("delete_teacher", "teacher").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("delete_teacher", "teacher"))),
    }
}

// Student endpoints

pub async fn create_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateStudentRequest>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "create_student")?;
    if !session.can_manage_students() {
        return Err(unauthorized("create_student", "staff session required"));
    }

    let teacher_id = match session.teacher_id().or(request.teacher_id) {
        Some(id) => id,
        None => {
            return Err(ApiError::ValidationError(
                "teacher_id is required for admin callers".to_string(),
            )
            .to_response_with_context(ErrorContext::new("create_student", "student")))
        }
    };

    match state
        .student_service
        .create_student(&request.name, teacher_id)
        .await
    {
        Ok(student) => {
            info!(student_id = %student.id, "Student created");
            Ok(Json(ApiResponse::success(student)))
        }
        Err(e) => {
            let classified = classify_database_error(&e);
            Err(classified
                .to_response_with_context(ErrorContext::new("create_student", "student")))
        }
    }
}

pub async fn get_students(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Student>> {
    let session = require_session(&state, &headers, "get_students")?;

    let result = match session.teacher_id() {
        Some(teacher_id) => state.student_service.get_students_by_teacher(teacher_id).await,
        None if session.is_admin() => state.student_service.get_all_students().await,
        None => return Err(unauthorized("get_students", "staff session required")),
    };

    match result {
        Ok(students) => Ok(Json(ApiResponse::success(students))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_students", "student"))),
    }
}

pub async fn get_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "get_student")?;
    if !session.can_view_student(id) {
        return Err(unauthorized("get_student", "not your student"));
    }
    log_api_start!("get_student", student_id = id);

    match state.student_service.get_student(id).await {
        Ok(Some(student)) => Ok(Json(ApiResponse::success(student))),
        Ok(None) => {
            log_api_warn!("get_student", student_id = id, "student not found");
            Err(ApiError::NotFound(format!("Student '{}' not found", id))
                .to_response_with_context(
                    ErrorContext::new("get_student", "student").with_id(&id.to_string()),
                ))
        }
        Err(e) => Err(ApiError::DatabaseError(e).to_response_with_context(
            ErrorContext::new("get_student", "student").with_id(&id.to_string()),
        )),
    }
}

pub async fn delete_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let session = require_session(&state, &headers, "delete_student")?;
    if !session.can_manage_students() {
        return Err(unauthorized("delete_student", "staff session required"));
    }

    match state.student_service.delete_student(id).await {
        Ok(true) => {
            log_api_success!("delete_student", student_id = id, "student and logs deleted");
            Ok(Json(ApiResponse::success(())))
        }
        Ok(false) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("delete_student", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("delete_student", "student"))),
    }
}

// Daily log endpoints

pub async fn open_today(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<TodayResponse> {
    let session = require_session(&state, &headers, "open_today")?;
    if !session.can_manage_students() {
        return Err(unauthorized("open_today", "staff session required"));
    }
    log_api_start!("open_today", student_id = id);

    let now = Utc::now();
    match state.student_service.get_student(id).await {
        Ok(Some(student)) => {
            let (draft, plan) = crate::log_service::open_for_today(&student, now);
            let fee_reminder_due = crate::log_service::fee_reminder_due(&student, now);
            Ok(Json(ApiResponse::success(TodayResponse {
                draft,
                plan,
                fee_reminder_due,
            })))
        }
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("open_today", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("open_today", "student"))),
    }
}

pub async fn save_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveLogRequest>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "save_log")?;
    let teacher = require_acting_teacher(&state, &session, "save_log").await?;

    if let Some(message) = validate_save_request(&request) {
        return Err(ApiError::ValidationError(message)
            .to_response_with_context(ErrorContext::new("save_log", "log")));
    }

    match state
        .log_service
        .save_log(
            id,
            &request.draft,
            &request.plan,
            teacher.id,
            &teacher.name,
            Utc::now(),
        )
        .await
    {
        Ok(Some(student)) => {
            log_api_success!("save_log", student_id = id, "log saved");
            Ok(Json(ApiResponse::success(student)))
        }
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("save_log", "student").with_id(&id.to_string()),
            )),
        Err(e) => {
            // Same-day duplicate inserts surface as conflicts.
            let classified = classify_database_error(&e);
            Err(classified.to_response_with_context(
                ErrorContext::new("save_log", "log").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn record_absence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "record_absence")?;
    let teacher = require_acting_teacher(&state, &session, "record_absence").await?;

    match state
        .log_service
        .record_absence(id, teacher.id, &teacher.name, Utc::now())
        .await
    {
        Ok(Some(student)) => Ok(Json(ApiResponse::success(student))),
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("record_absence", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(classify_database_error(&e)
            .to_response_with_context(ErrorContext::new("record_absence", "log"))),
    }
}

pub async fn create_adab_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<AdabRequest>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "create_adab_session")?;
    let teacher = require_acting_teacher(&state, &session, "create_adab_session").await?;

    for question in &request.questions {
        if question.prompt.trim().is_empty() || question.correct_answer.trim().is_empty() {
            return Err(ApiError::ValidationError(
                "every question needs a prompt and a correct answer".to_string(),
            )
            .to_response_with_context(ErrorContext::new("create_adab_session", "log")));
        }
    }

    match state
        .log_service
        .create_adab_session(id, teacher.id, &teacher.name, request.questions, Utc::now())
        .await
    {
        Ok(Some(student)) => Ok(Json(ApiResponse::success(student))),
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("create_adab_session", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(classify_database_error(&e)
            .to_response_with_context(ErrorContext::new("create_adab_session", "log"))),
    }
}

pub async fn mark_logs_seen(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkSeenRequest>,
) -> ApiResult<usize> {
    let session = require_session(&state, &headers, "mark_logs_seen")?;
    if !session.parent_of(id) {
        return Err(unauthorized("mark_logs_seen", "parent session required"));
    }

    match state
        .log_service
        .mark_logs_seen(id, &request.log_ids, Utc::now())
        .await
    {
        Ok(Some(marked)) => {
            log_api_success!("mark_logs_seen", count = marked, "logs marked seen");
            Ok(Json(ApiResponse::success(marked)))
        }
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("mark_logs_seen", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("mark_logs_seen", "log"))),
    }
}

/// Save the log, then compose the hand-off text from what was persisted.
pub async fn compose_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveLogRequest>,
) -> ApiResult<ParentMessageResponse> {
    let session = require_session(&state, &headers, "compose_message")?;
    let teacher = require_acting_teacher(&state, &session, "compose_message").await?;

    if let Some(message) = validate_save_request(&request) {
        return Err(ApiError::ValidationError(message)
            .to_response_with_context(ErrorContext::new("compose_message", "log")));
    }

    let now = Utc::now();
    let student = match state
        .log_service
        .save_log(id, &request.draft, &request.plan, teacher.id, &teacher.name, now)
        .await
    {
        Ok(Some(student)) => student,
        Ok(None) => {
            return Err(ApiError::NotFound(format!("Student '{}' not found", id))
                .to_response_with_context(
                    ErrorContext::new("compose_message", "student").with_id(&id.to_string()),
                ))
        }
        Err(e) => {
            return Err(classify_database_error(&e)
                .to_response_with_context(ErrorContext::new("compose_message", "log")))
        }
    };

    let text = message::compose_parent_message(
        &student,
        &request.draft.jadeed,
        &request.draft.murajaah,
        &request.draft.attendance,
        &request.plan.jadeed,
        &request.plan.murajaah,
        now,
    );
    let whatsapp_link = student
        .parent_phone
        .as_deref()
        .map(|phone| message::whatsapp_link(&state.whatsapp_country_code, phone, &text));

    Ok(Json(ApiResponse::success(ParentMessageResponse {
        message: text,
        whatsapp_link,
    })))
}

pub async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<Payment> {
    let session = require_session(&state, &headers, "record_payment")?;
    if !session.can_manage_students() {
        return Err(unauthorized("record_payment", "staff session required"));
    }

    match state
        .student_service
        .record_payment(id, request.amount, request.note, Utc::now())
        .await
    {
        Ok(Some(payment)) => Ok(Json(ApiResponse::success(payment))),
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("record_payment", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::ValidationError(e.to_string())
            .to_response_with_context(ErrorContext::new("record_payment", "payment"))),
    }
}

pub async fn update_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Student> {
    let session = require_session(&state, &headers, "update_schedule")?;
    if !session.can_manage_students() {
        return Err(unauthorized("update_schedule", "staff session required"));
    }

    match state
        .student_service
        .update_schedule(id, request.schedule)
        .await
    {
        Ok(Some(student)) => Ok(Json(ApiResponse::success(student))),
        Ok(None) => Err(ApiError::NotFound(format!("Student '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("update_schedule", "student").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::ValidationError(e.to_string())
            .to_response_with_context(ErrorContext::new("update_schedule", "student"))),
    }
}

// Encouragement endpoint

pub async fn generate_encouragement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EncouragementRequest>,
) -> ApiResult<EncouragementResponse> {
    let session = require_session(&state, &headers, "generate_encouragement")?;
    if !session.can_manage_students() {
        return Err(unauthorized("generate_encouragement", "staff session required"));
    }

    // Never fails: the service resolves every failure to the fallback.
    let text = state
        .encouragement_service
        .generate_encouragement(&request.student_name, &request.achievement)
        .await;
    Ok(Json(ApiResponse::success(EncouragementResponse { text })))
}

// Quiz endpoints

pub async fn start_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((student_id, log_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<QuizStartResponse> {
    let session = require_session(&state, &headers, "start_quiz")?;
    if !session.parent_of(student_id) {
        return Err(unauthorized("start_quiz", "parent session required"));
    }
    log_api_start!("start_quiz", log_id = log_id);

    let student = match state.student_service.get_student(student_id).await {
        Ok(Some(student)) => student,
        Ok(None) => {
            return Err(ApiError::NotFound(format!("Student '{}' not found", student_id))
                .to_response_with_context(
                    ErrorContext::new("start_quiz", "student").with_id(&student_id.to_string()),
                ))
        }
        Err(e) => {
            return Err(ApiError::DatabaseError(e)
                .to_response_with_context(ErrorContext::new("start_quiz", "student")))
        }
    };

    let log = match student.logs.iter().find(|log| log.id == log_id) {
        Some(log) => log,
        None => {
            return Err(ApiError::NotFound(format!("Log '{}' not found", log_id))
                .to_response_with_context(
                    ErrorContext::new("start_quiz", "log").with_id(&log_id.to_string()),
                ))
        }
    };

    let seed = rand::thread_rng().gen::<u64>();
    let quiz = match QuizSession::start(log, seed) {
        Ok(quiz) => quiz,
        Err(e) => {
            return Err(ApiError::ValidationError(e.to_string())
                .to_response_with_context(ErrorContext::new("start_quiz", "quiz")))
        }
    };

    let view = quiz.view();
    let session_id = Uuid::new_v4();
    let mut quiz_sessions = state.quiz_sessions.lock().unwrap();
    // Restarting replaces any abandoned session for the same log.
    quiz_sessions.retain(|_, active| active.log_id != log_id);
    quiz_sessions.insert(
        session_id,
        ActiveQuiz {
            student_id,
            log_id,
            session: quiz,
        },
    );
    drop(quiz_sessions);

    Ok(Json(ApiResponse::success(QuizStartResponse {
        session_id,
        view,
    })))
}

fn with_quiz<T>(
    state: &AppState,
    session: &Session,
    session_id: Uuid,
    operation: &str,
    f: impl FnOnce(&mut ActiveQuiz) -> anyhow::Result<T>,
) -> Result<T, (StatusCode, Json<ApiResponse<()>>)> {
    let mut sessions = state.quiz_sessions.lock().unwrap();
    let active = sessions.get_mut(&session_id).ok_or_else(|| {
        ApiError::NotFound(format!("Quiz session '{}' not found", session_id))
            .to_response_with_context(
                ErrorContext::new(operation, "quiz").with_id(&session_id.to_string()),
            )
    })?;

    // Only the parent who started the quiz may drive it.
    if !session.parent_of(active.student_id) {
        return Err(unauthorized(
            operation,
            "quiz belongs to another student's parent",
        ));
    }

    f(active).map_err(|e| {
        ApiError::ValidationError(e.to_string())
            .to_response_with_context(ErrorContext::new(operation, "quiz"))
    })
}

pub async fn quiz_select(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<QuizAnswerRequest>,
) -> ApiResult<QuizStepResponse> {
    let session = require_session(&state, &headers, "quiz_select")?;

    let view = with_quiz(&state, &session, session_id, "quiz_select", |active| {
        active.session.select(&request.answer)?;
        Ok(active.session.view())
    })?;

    Ok(Json(ApiResponse::success(QuizStepResponse {
        view,
        completed: false,
    })))
}

pub async fn quiz_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizStepResponse> {
    let session = require_session(&state, &headers, "quiz_submit")?;

    let view = with_quiz(&state, &session, session_id, "quiz_submit", |active| {
        active.session.submit()?;
        Ok(active.session.view())
    })?;

    Ok(Json(ApiResponse::success(QuizStepResponse {
        view,
        completed: false,
    })))
}

pub async fn quiz_confirm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizStepResponse> {
    let session = require_session(&state, &headers, "quiz_confirm")?;

    let view = with_quiz(&state, &session, session_id, "quiz_confirm", |active| {
        active.session.confirm()?;
        Ok(active.session.view())
    })?;

    Ok(Json(ApiResponse::success(QuizStepResponse {
        view,
        completed: false,
    })))
}

pub async fn quiz_advance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizStepResponse> {
    let session = require_session(&state, &headers, "quiz_advance")?;

    // Advance inside the lock, persist the outcome after releasing it.
    let (view, outcome) = with_quiz(&state, &session, session_id, "quiz_advance", |active| {
        let outcome = active.session.advance()?;
        Ok((
            active.session.view(),
            outcome.map(|(score, max)| (active.student_id, active.log_id, score, max)),
        ))
    })?;

    let completed = outcome.is_some();
    if let Some((student_id, log_id, score, max)) = outcome {
        state.quiz_sessions.lock().unwrap().remove(&session_id);

        match state
            .log_service
            .record_quiz_result(student_id, log_id, score, max, Utc::now())
            .await
        {
            Ok(Some(())) => {
                log_api_success!("quiz_advance", student_id = student_id, "quiz result recorded");
            }
            Ok(None) => {
                log_api_warn!("quiz_advance", student_id = student_id, "student vanished before quiz result could be recorded");
            }
            Err(e) => {
                log_api_error!(
                    "quiz_advance",
                    student_id = student_id,
                    error = e,
                    "quiz result could not be persisted"
                );
                return Err(ApiError::DatabaseError(e)
                    .to_response_with_context(ErrorContext::new("quiz_advance", "log")))
            }
        }
    }

    Ok(Json(ApiResponse::success(QuizStepResponse {
        view,
        completed,
    })))
}

// Announcement endpoints

pub async fn get_announcements(State(state): State<AppState>) -> ApiResult<Vec<Announcement>> {
    match state.student_service.get_all_announcements().await {
        Ok(announcements) => Ok(Json(ApiResponse::success(announcements))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_announcements", "announcement"))),
    }
}

pub async fn create_announcement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    let session = require_session(&state, &headers, "create_announcement")?;
    if !session.is_admin() {
        return Err(unauthorized("create_announcement", "admin session required"));
    }

    match state
        .student_service
        .create_announcement(&request.title, &request.body, Utc::now())
        .await
    {
        Ok(announcement) => Ok(Json(ApiResponse::success(announcement))),
        Err(e) => Err(ApiError::ValidationError(e.to_string())
            .to_response_with_context(ErrorContext::new("create_announcement", "announcement"))),
    }
}

pub async fn delete_announcement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let session = require_session(&state, &headers, "delete_announcement")?;
    if !session.is_admin() {
        return Err(unauthorized("delete_announcement", "admin session required"));
    }

    match state.student_service.delete_announcement(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(()))),
        Ok(false) => Err(ApiError::NotFound(format!("Announcement '{}' not found", id))
            .to_response_with_context(
                ErrorContext::new("delete_announcement", "announcement").with_id(&id.to_string()),
            )),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("delete_announcement", "announcement"))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Auth routes
        .route("/api/auth/parent", post(parent_login))
        .route("/api/auth/teacher", post(teacher_login))
        .route("/api/auth/admin", post(admin_login))
        .route("/api/auth/logout", post(logout))
        // Teacher roster
        .route("/api/teachers", get(get_teachers))
        .route("/api/teachers", post(create_teacher))
        .route("/api/teachers/:id", delete(delete_teacher))
        // Students
        .route("/api/students", post(create_student))
        .route("/api/students", get(get_students))
        .route("/api/students/:id", get(get_student))
        .route("/api/students/:id", delete(delete_student))
        .route("/api/students/:id/today", get(open_today))
        .route("/api/students/:id/logs", post(save_log))
        .route("/api/students/:id/absence", post(record_absence))
        .route("/api/students/:id/adab", post(create_adab_session))
        .route("/api/students/:id/logs/seen", post(mark_logs_seen))
        .route("/api/students/:id/message", post(compose_message))
        .route("/api/students/:id/payments", post(record_payment))
        .route("/api/students/:id/schedule", put(update_schedule))
        // Encouragement
        .route("/api/encouragement", post(generate_encouragement))
        // Parent quiz flow
        .route("/api/students/:student_id/quiz/:log_id/start", post(start_quiz))
        .route("/api/quiz/:session_id/select", post(quiz_select))
        .route("/api/quiz/:session_id/submit", post(quiz_submit))
        .route("/api/quiz/:session_id/confirm", post(quiz_confirm))
        .route("/api/quiz/:session_id/advance", post(quiz_advance))
        // Announcements
        .route("/api/announcements", get(get_announcements))
        .route("/api/announcements", post(create_announcement))
        .route("/api/announcements/:id", delete(delete_announcement))
        .with_state(state)
}

//! Complaint handlers.
//!
//! Assignment is the SLA anchor: assigning a complaint stamps
//! `assigned_at` and derives `due_date` from the priority's SLA offset.
//! Priority changes on an assigned complaint re-derive the due date from
//! the original assignment time.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::complaint::{due_date_for, Complaint, ComplaintStatus, Priority};

const COMPLAINT_COLUMNS: &str = r#"
    id, ticket_no, subject, description, complainant_name, priority, status,
    created_by, assigned_to, assigned_at, due_date, resolved_at, created_at, updated_at
"#;

const COMPLAINT_ROW_SQL: &str = r#"
    SELECT c.id, c.ticket_no, c.subject, c.description, c.complainant_name,
           c.priority, c.status, c.created_by, c.assigned_to, c.assigned_at,
           c.due_date, c.resolved_at, c.created_at, c.updated_at,
           creator.full_name AS created_by_name,
           assignee.full_name AS assigned_to_name
    FROM complaints c
    JOIN users creator ON creator.id = c.created_by
    LEFT JOIN users assignee ON assignee.id = c.assigned_to
"#;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListComplaintsQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    /// Matches against ticket number, subject and complainant name
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComplaintRequest {
    pub subject: String,
    pub description: String,
    pub complainant_name: String,
    /// One of Urgent, High, Medium, Low; defaults to Medium
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateComplaintRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub complainant_name: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignComplaintRequest {
    pub assignee_id: Uuid,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct ComplaintRow {
    pub id: Uuid,
    pub ticket_no: String,
    pub subject: String,
    pub description: String,
    pub complainant_name: String,
    pub priority: String,
    pub status: String,
    pub created_by: Uuid,
    pub created_by_name: String,
    pub assigned_to: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComplaintListResponse {
    pub items: Vec<ComplaintRow>,
    pub pagination: Pagination,
}

/// Normalize a priority label to its stored capitalized form.
fn normalize_priority(label: &str) -> Result<String> {
    Priority::from_str_loose(label)
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown priority \"{label}\" (expected Urgent, High, Medium or Low)"
            ))
        })
}

/// Normalize a status label to its stored lowercase form.
fn normalize_status(label: &str) -> Result<ComplaintStatus> {
    ComplaintStatus::from_str_loose(label).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown status \"{label}\" (expected open, assigned, resolved or closed)"
        ))
    })
}

fn generate_ticket_no() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("CMP-{}", id[..8].to_uppercase())
}

async fn fetch_complaint(state: &SharedState, id: Uuid) -> Result<Complaint> {
    let sql = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1");
    sqlx::query_as::<_, Complaint>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Complaint not found".to_string()))
}

async fn fetch_complaint_row(state: &SharedState, id: Uuid) -> Result<ComplaintRow> {
    let sql = format!("{COMPLAINT_ROW_SQL} WHERE c.id = $1");
    sqlx::query_as::<_, ComplaintRow>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Complaint not found".to_string()))
}

/// List complaints
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    params(ListComplaintsQuery),
    responses(
        (status = 200, description = "List of complaints", body = ComplaintListResponse),
        (status = 400, description = "Unknown status or priority filter"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_complaints(
    State(state): State<SharedState>,
    Query(query): Query<ListComplaintsQuery>,
) -> Result<Json<ComplaintListResponse>> {
    let paging = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };

    let status = query
        .status
        .as_deref()
        .map(normalize_status)
        .transpose()?
        .map(|s| s.as_str().to_string());
    let priority = query
        .priority
        .as_deref()
        .map(normalize_priority)
        .transpose()?;
    let search_pattern = query.search.as_ref().map(|s| format!("%{}%", s));

    let sql = format!(
        r#"
        {COMPLAINT_ROW_SQL}
        WHERE ($1::text IS NULL OR c.status = $1)
          AND ($2::text IS NULL OR c.priority = $2)
          AND ($3::uuid IS NULL OR c.assigned_to = $3)
          AND ($4::text IS NULL OR c.ticket_no ILIKE $4 OR c.subject ILIKE $4
               OR c.complainant_name ILIKE $4)
        ORDER BY c.created_at DESC
        OFFSET $5
        LIMIT $6
        "#
    );

    let items: Vec<ComplaintRow> = sqlx::query_as(&sql)
        .bind(&status)
        .bind(&priority)
        .bind(query.assigned_to)
        .bind(&search_pattern)
        .bind(paging.offset())
        .bind(paging.limit())
        .fetch_all(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM complaints c
        WHERE ($1::text IS NULL OR c.status = $1)
          AND ($2::text IS NULL OR c.priority = $2)
          AND ($3::uuid IS NULL OR c.assigned_to = $3)
          AND ($4::text IS NULL OR c.ticket_no ILIKE $4 OR c.subject ILIKE $4
               OR c.complainant_name ILIKE $4)
        "#,
    )
    .bind(&status)
    .bind(&priority)
    .bind(query.assigned_to)
    .bind(&search_pattern)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(ComplaintListResponse {
        items,
        pagination: Pagination::from_query_and_total(&paging, total),
    }))
}

/// Create complaint
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    request_body = CreateComplaintRequest,
    responses(
        (status = 200, description = "Complaint created", body = ComplaintRow),
        (status = 400, description = "Validation error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_complaint(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateComplaintRequest>,
) -> Result<Json<ComplaintRow>> {
    if payload.subject.trim().is_empty() {
        return Err(AppError::Validation("Subject must not be empty".to_string()));
    }

    let priority = match payload.priority.as_deref() {
        Some(label) => normalize_priority(label)?,
        None => Priority::Medium.as_str().to_string(),
    };

    let sql = format!(
        r#"
        INSERT INTO complaints (ticket_no, subject, description, complainant_name, priority, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {COMPLAINT_COLUMNS}
        "#
    );

    // Ticket numbers come from a random namespace; on the rare collision
    // with the unique constraint, retry with a fresh one.
    let mut complaint: Option<Complaint> = None;
    for _ in 0..3 {
        match sqlx::query_as::<_, Complaint>(&sql)
            .bind(generate_ticket_no())
            .bind(payload.subject.trim())
            .bind(&payload.description)
            .bind(&payload.complainant_name)
            .bind(&priority)
            .bind(auth.principal.id)
            .fetch_one(&state.db)
            .await
        {
            Ok(row) => {
                complaint = Some(row);
                break;
            }
            Err(e) if e.to_string().contains("duplicate key") => continue,
            Err(e) => return Err(AppError::Database(e.to_string())),
        }
    }
    let complaint = complaint.ok_or_else(|| {
        AppError::Internal("Could not allocate a unique ticket number".to_string())
    })?;

    tracing::info!(
        ticket_no = %complaint.ticket_no,
        priority = %complaint.priority,
        created_by = %auth.principal.username,
        "Complaint created"
    );

    Ok(Json(ComplaintRow {
        id: complaint.id,
        ticket_no: complaint.ticket_no,
        subject: complaint.subject,
        description: complaint.description,
        complainant_name: complaint.complainant_name,
        priority: complaint.priority,
        status: complaint.status,
        created_by: complaint.created_by,
        created_by_name: auth.principal.full_name.clone(),
        assigned_to: None,
        assigned_to_name: None,
        assigned_at: None,
        due_date: None,
        resolved_at: None,
        created_at: complaint.created_at,
        updated_at: complaint.updated_at,
    }))
}

/// Get complaint details
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    params(
        ("id" = Uuid, Path, description = "Complaint ID"),
    ),
    responses(
        (status = 200, description = "Complaint details", body = ComplaintRow),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_complaint(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ComplaintRow>> {
    Ok(Json(fetch_complaint_row(&state, id).await?))
}

/// Update complaint
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    params(
        ("id" = Uuid, Path, description = "Complaint ID"),
    ),
    request_body = UpdateComplaintRequest,
    responses(
        (status = 200, description = "Complaint updated", body = ComplaintRow),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_complaint(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateComplaintRequest>,
) -> Result<Json<ComplaintRow>> {
    let existing = fetch_complaint(&state, id).await?;

    let priority = match payload.priority.as_deref() {
        Some(label) => Some(normalize_priority(label)?),
        None => None,
    };
    let status = match payload.status.as_deref() {
        Some(label) => Some(normalize_status(label)?),
        None => None,
    };

    // Re-derive the due date when the priority of an assigned complaint
    // changes; the assignment time stays the anchor.
    let due_date = match (&priority, existing.assigned_at) {
        (Some(new_priority), Some(assigned_at)) if *new_priority != existing.priority => {
            Some(due_date_for(assigned_at, new_priority))
        }
        _ => None,
    };

    // Stamp or clear the resolution time on status transitions.
    let (set_resolved, resolved_at) = match status {
        Some(ComplaintStatus::Resolved) => (true, existing.resolved_at.or_else(|| Some(Utc::now()))),
        Some(ComplaintStatus::Open) | Some(ComplaintStatus::Assigned) => (true, None),
        _ => (false, existing.resolved_at),
    };

    let sql = format!(
        r#"
        UPDATE complaints
        SET subject = COALESCE($2, subject),
            description = COALESCE($3, description),
            complainant_name = COALESCE($4, complainant_name),
            priority = COALESCE($5, priority),
            status = COALESCE($6, status),
            due_date = COALESCE($7, due_date),
            resolved_at = CASE WHEN $8 THEN $9 ELSE resolved_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COMPLAINT_COLUMNS}
        "#
    );

    let updated: Complaint = sqlx::query_as(&sql)
        .bind(id)
        .bind(&payload.subject)
        .bind(&payload.description)
        .bind(&payload.complainant_name)
        .bind(&priority)
        .bind(status.map(|s| s.as_str().to_string()))
        .bind(due_date)
        .bind(set_resolved)
        .bind(resolved_at)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Complaint not found".to_string()))?;

    tracing::info!(
        ticket_no = %updated.ticket_no,
        updated_by = %auth.principal.username,
        "Complaint updated"
    );

    fetch_complaint_row(&state, id).await.map(Json)
}

/// Assign complaint
#[utoipa::path(
    post,
    path = "/{id}/assign",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    params(
        ("id" = Uuid, Path, description = "Complaint ID"),
    ),
    request_body = AssignComplaintRequest,
    responses(
        (status = 200, description = "Complaint assigned; due date derived from priority", body = ComplaintRow),
        (status = 400, description = "Assignee missing or complaint not assignable"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_complaint(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignComplaintRequest>,
) -> Result<Json<ComplaintRow>> {
    let complaint = fetch_complaint(&state, id).await?;

    match ComplaintStatus::from_str_loose(&complaint.status) {
        Some(ComplaintStatus::Resolved) | Some(ComplaintStatus::Closed) => {
            return Err(AppError::Validation(
                "Cannot assign a resolved or closed complaint".to_string(),
            ));
        }
        _ => {}
    }

    let assignee: Option<(bool, String)> =
        sqlx::query_as("SELECT is_active, full_name FROM users WHERE id = $1")
            .bind(payload.assignee_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
    let (assignee_active, assignee_name) = assignee
        .ok_or_else(|| AppError::Validation("Assignee does not exist".to_string()))?;
    if !assignee_active {
        return Err(AppError::Validation(
            "Assignee account is deactivated".to_string(),
        ));
    }

    let assigned_at = Utc::now();
    let due_date = due_date_for(assigned_at, &complaint.priority);

    sqlx::query(
        r#"
        UPDATE complaints
        SET assigned_to = $2,
            assigned_at = $3,
            due_date = $4,
            status = 'assigned',
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.assignee_id)
    .bind(assigned_at)
    .bind(due_date)
    .execute(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    tracing::info!(
        ticket_no = %complaint.ticket_no,
        assignee = %assignee_name,
        due_date = %due_date,
        assigned_by = %auth.principal.username,
        "Complaint assigned"
    );

    fetch_complaint_row(&state, id).await.map(Json)
}

/// Delete complaint
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/complaints",
    tag = "complaints",
    params(
        ("id" = Uuid, Path, description = "Complaint ID"),
    ),
    responses(
        (status = 200, description = "Complaint deleted"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_complaint(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    let result = sqlx::query("DELETE FROM complaints WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Complaint not found".to_string()));
    }

    tracing::info!(complaint_id = %id, deleted_by = %auth.principal.username, "Complaint deleted");

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_complaints,
        create_complaint,
        get_complaint,
        update_complaint,
        assign_complaint,
        delete_complaint,
    ),
    components(schemas(
        CreateComplaintRequest,
        UpdateComplaintRequest,
        AssignComplaintRequest,
        ComplaintRow,
        ComplaintListResponse,
    ))
)]
pub struct ComplaintsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Ticket numbers
    // -----------------------------------------------------------------------

    #[test]
    fn test_ticket_no_shape() {
        let ticket = generate_ticket_no();
        assert!(ticket.starts_with("CMP-"));
        assert_eq!(ticket.len(), 12);
        assert!(ticket[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ticket_no_is_random() {
        assert_ne!(generate_ticket_no(), generate_ticket_no());
    }

    // -----------------------------------------------------------------------
    // Label normalization
    // -----------------------------------------------------------------------

    #[test]
    fn test_normalize_priority_canonicalizes_case() {
        assert_eq!(normalize_priority("urgent").unwrap(), "Urgent");
        assert_eq!(normalize_priority("HIGH").unwrap(), "High");
        assert_eq!(normalize_priority("critical").unwrap(), "Urgent");
    }

    #[test]
    fn test_normalize_priority_rejects_unknown() {
        assert!(normalize_priority("whenever").is_err());
        assert!(normalize_priority("").is_err());
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("OPEN").unwrap(), ComplaintStatus::Open);
        assert!(normalize_status("reopened").is_err());
    }

    // -----------------------------------------------------------------------
    // Request deserialization
    // -----------------------------------------------------------------------

    #[test]
    fn test_create_complaint_request_defaults_priority() {
        let req: CreateComplaintRequest = serde_json::from_str(
            r#"{
                "subject": "Street light broken",
                "description": "Pole 14 on Market Road",
                "complainant_name": "A. Resident"
            }"#,
        )
        .unwrap();
        assert!(req.priority.is_none());
    }

    #[test]
    fn test_update_complaint_request_partial() {
        let req: UpdateComplaintRequest =
            serde_json::from_str(r#"{"priority": "High"}"#).unwrap();
        assert_eq!(req.priority.as_deref(), Some("High"));
        assert!(req.subject.is_none());
        assert!(req.status.is_none());
    }
}

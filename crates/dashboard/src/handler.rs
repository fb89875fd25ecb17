use crate::pages::{ConfirmDeleteTemplate, IndexTemplate, MovementFormTemplate, Notice};
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use chrono::NaiveDate;
use common::AppState;
use movements::format::format_amount;
use movements::models::{MovementForm, RawMovementForm};
use movements::store::{MovementError, MovementStore};
use movements::views::Dashboard;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Movement(#[from] MovementError),
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            DashboardError::Movement(MovementError::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, msg),
            DashboardError::Movement(MovementError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Movement {} not found", id))
            }
            DashboardError::Movement(MovementError::QuotaExceeded) => {
                (StatusCode::INSUFFICIENT_STORAGE, "Storage quota exceeded".to_string())
            }
            DashboardError::Movement(MovementError::Infrastructure(_)) | DashboardError::Template(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn build_dashboard(state: &AppState, store: &MovementStore) -> Dashboard {
    Dashboard::build(store.movements(), today(), state.config.total_spent)
}

fn redirect_with(notice: Notice) -> Redirect {
    Redirect::to(&format!("/?aviso={}", notice.param()))
}

// A failed save outranks the success notice.
fn after_mutation(store: &mut MovementStore, notice: Notice) -> Redirect {
    match store.take_warning() {
        Some(_) => redirect_with(Notice::StorageWarning),
        None => redirect_with(notice),
    }
}

#[derive(Deserialize)]
pub struct IndexQuery {
    pub aviso: Option<Notice>,
}

#[derive(Deserialize)]
pub struct DeleteConfirmation {
    pub confirmar: String,
}

#[derive(Deserialize)]
pub struct ApiDeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Body of every JSON mutation: the views rebuilt after the change.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub id: i64,
    pub changed: bool,
    pub warning: Option<String>,
    pub dashboard: Dashboard,
}

pub fn dashboard_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        // Specific routes first
        .route("/movimientos", post(create_movement))
        .route("/movimientos/nuevo", get(new_movement_page))
        // Then parameterized routes
        .route("/movimientos/{id}", post(update_movement))
        .route("/movimientos/{id}/editar", get(edit_movement_page))
        .route("/movimientos/{id}/pagar", post(pay_movement))
        .route("/movimientos/{id}/eliminar", get(confirm_delete_page).post(delete_movement))
        .with_state(state)
}

pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(api_dashboard))
        .route("/movements", post(api_create_movement))
        .route("/movements/form", get(api_blank_form))
        .route("/movements/{id}", put(api_update_movement).delete(api_delete_movement))
        .route("/movements/{id}/form", get(api_movement_form))
        .route("/movements/{id}/pay", post(api_pay_movement))
        .with_state(state)
}

// --- HTML pages ---

async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, DashboardError> {
    let store = state.store.lock().await;
    let template = IndexTemplate {
        dashboard: build_dashboard(&state, &store),
        notice: query.aviso,
    };

    Ok(Html(template.render()?))
}

async fn new_movement_page() -> Result<impl IntoResponse, DashboardError> {
    let template = MovementFormTemplate::create(RawMovementForm::blank(), None);
    Ok(Html(template.render()?))
}

async fn edit_movement_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DashboardError> {
    let store = state.store.lock().await;
    let movement = store.get(id).ok_or(MovementError::NotFound(id))?;

    let template = MovementFormTemplate::edit(id, RawMovementForm::from(movement), None);
    Ok(Html(template.render()?))
}

async fn create_movement(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<RawMovementForm>,
) -> Result<Response, DashboardError> {
    let form = match MovementForm::new(payload.clone()) {
        Ok(form) => form,
        Err(msg) => {
            tracing::info!("Rejected new movement: {}", msg);
            let page = MovementFormTemplate::create(payload, Some(msg)).render()?;
            return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
        }
    };

    let mut store = state.store.lock().await;
    store.add(form).await;

    Ok(after_mutation(&mut store, Notice::Created).into_response())
}

async fn update_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Form(payload): Form<RawMovementForm>,
) -> Result<Response, DashboardError> {
    let form = match MovementForm::new(payload.clone()) {
        Ok(form) => form,
        Err(msg) => {
            tracing::info!("Rejected edit of movement {}: {}", id, msg);
            let page = MovementFormTemplate::edit(id, payload, Some(msg)).render()?;
            return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
        }
    };

    let mut store = state.store.lock().await;
    store.update(id, form).await.map_err(|e| {
        tracing::error!("update_movement error: {:?}", e);
        e
    })?;

    Ok(after_mutation(&mut store, Notice::Updated).into_response())
}

async fn pay_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Redirect, DashboardError> {
    let mut store = state.store.lock().await;
    store.mark_paid(id, today()).await.map_err(|e| {
        tracing::error!("pay_movement error: {:?}", e);
        e
    })?;

    Ok(after_mutation(&mut store, Notice::Paid))
}

async fn confirm_delete_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DashboardError> {
    let store = state.store.lock().await;
    let movement = store.get(id).ok_or(MovementError::NotFound(id))?;

    let template = ConfirmDeleteTemplate {
        id,
        description: movement.description.clone(),
        amount: format_amount(movement.amount),
    };
    Ok(Html(template.render()?))
}

async fn delete_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Form(answer): Form<DeleteConfirmation>,
) -> Result<Redirect, DashboardError> {
    if answer.confirmar != "si" {
        tracing::info!("Deletion of movement {} cancelled", id);
        return Ok(redirect_with(Notice::Cancelled));
    }

    let mut store = state.store.lock().await;
    let removed = store.remove(id).await.map_err(|e| {
        tracing::error!("delete_movement error: {:?}", e);
        e
    })?;
    tracing::info!("Deleted movement {} ({})", removed.id, removed.description);

    Ok(after_mutation(&mut store, Notice::Deleted))
}

// --- JSON API ---

async fn api_dashboard(State(state): State<Arc<AppState>>) -> Json<Dashboard> {
    let store = state.store.lock().await;
    Json(build_dashboard(&state, &store))
}

async fn api_blank_form() -> Json<RawMovementForm> {
    Json(RawMovementForm::blank())
}

async fn api_movement_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RawMovementForm>, DashboardError> {
    let store = state.store.lock().await;
    let movement = store.get(id).ok_or(MovementError::NotFound(id))?;
    Ok(Json(RawMovementForm::from(movement)))
}

fn mutation_response(state: &AppState, store: &mut MovementStore, id: i64, changed: bool) -> MutationResponse {
    MutationResponse {
        id,
        changed,
        warning: store.take_warning(),
        dashboard: build_dashboard(state, store),
    }
}

async fn api_create_movement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RawMovementForm>,
) -> Result<impl IntoResponse, DashboardError> {
    let form = MovementForm::new(payload).map_err(MovementError::InvalidInput)?;

    let mut store = state.store.lock().await;
    let id = store.add(form).await;

    Ok((StatusCode::CREATED, Json(mutation_response(&state, &mut store, id, true))))
}

async fn api_update_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<RawMovementForm>,
) -> Result<Json<MutationResponse>, DashboardError> {
    let form = MovementForm::new(payload).map_err(MovementError::InvalidInput)?;

    let mut store = state.store.lock().await;
    store.update(id, form).await?;

    Ok(Json(mutation_response(&state, &mut store, id, true)))
}

async fn api_pay_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MutationResponse>, DashboardError> {
    let mut store = state.store.lock().await;
    let changed = store.mark_paid(id, today()).await?;

    Ok(Json(mutation_response(&state, &mut store, id, changed)))
}

async fn api_delete_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ApiDeleteQuery>,
) -> Result<Json<MutationResponse>, DashboardError> {
    if !query.confirm {
        return Err(MovementError::InvalidInput("Deletion requires confirm=true".into()).into());
    }

    let mut store = state.store.lock().await;
    store.remove(id).await?;

    Ok(Json(mutation_response(&state, &mut store, id, true)))
}

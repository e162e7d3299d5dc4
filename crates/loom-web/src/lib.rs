//! Axum + Askama web surface for the pattern catalog.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Form, Path as AxumPath, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use loom_core::{Pattern, PatternDraft, PatternSlot, Profession, SlotDraft};
use loom_storage::{Page, PatternStore, StoreError};
use loom_transfer::ImportError;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "loom-web";

#[derive(Clone)]
pub struct AppState {
    pub store: PatternStore,
}

impl AppState {
    pub fn new(store: PatternStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            WebError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            WebError::Internal(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server error: {err}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for WebError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PatternNotFound(_) | StoreError::SlotNotFound(_) => {
                WebError::NotFound(err.to_string())
            }
            other => WebError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<ImportError> for WebError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::InvalidJson(_) | ImportError::NoPatterns => {
                WebError::BadRequest(err.to_string())
            }
            ImportError::Store(store_err) => store_err.into(),
        }
    }
}

// Query/form inputs

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchQuery {
    name: Option<String>,
    page: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportQuery {
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportForm {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotForm {
    name: Option<String>,
    required_tag: Option<String>,
    description_template: Option<String>,
    possible_quirks: Option<String>,
}

impl SlotForm {
    fn into_draft(self) -> SlotDraft {
        SlotDraft {
            name: self.name.unwrap_or_default(),
            required_tag: self.required_tag.and_then(non_empty),
            description_template: self.description_template.and_then(non_empty),
            possible_quirks: self.possible_quirks.and_then(non_empty),
        }
    }
}

/// Pattern form payload decoded from the raw key/value pair sequence, since
/// the professions checkbox set arrives as repeated `professions` keys.
#[derive(Debug, Default)]
struct PatternFormInput {
    draft: PatternDraft,
    profession_ids: Vec<Uuid>,
    tags: String,
}

impl PatternFormInput {
    fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut input = PatternFormInput::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => input.draft.name = value.clone(),
                "description" => input.draft.description = non_empty(value.clone()),
                "name_template" => input.draft.name_template = non_empty(value.clone()),
                "main_material_override" => {
                    input.draft.main_material_override = non_empty(value.clone())
                }
                "origin_override" => input.draft.origin_override = non_empty(value.clone()),
                "commonality" => input.draft.commonality = non_empty(value.clone()),
                "value" => input.draft.value = value.trim().parse().ok(),
                "professions" => {
                    if let Ok(id) = Uuid::parse_str(value.trim()) {
                        input.profession_ids.push(id);
                    }
                }
                "tags" => input.tags = value.clone(),
                _ => {}
            }
        }
        input
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// View models: Option-typed fields are pre-rendered to plain strings so the
// templates stay free of unwrapping logic.

#[derive(Debug, Clone)]
struct PatternRowView {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
struct PatternView {
    id: String,
    name: String,
    description: String,
    name_template: String,
    main_material_override: String,
    origin_override: String,
    commonality: String,
    value: String,
}

impl PatternView {
    fn from_pattern(pattern: &Pattern) -> Self {
        Self {
            id: pattern.id.to_string(),
            name: pattern.name.clone(),
            description: pattern.description.clone().unwrap_or_default(),
            name_template: pattern.name_template.clone().unwrap_or_default(),
            main_material_override: pattern.main_material_override.clone().unwrap_or_default(),
            origin_override: pattern.origin_override.clone().unwrap_or_default(),
            commonality: pattern.commonality.clone().unwrap_or_default(),
            value: pattern.value.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct ProfessionOptionView {
    id: String,
    name: String,
    checked: bool,
}

fn profession_options(all: &[Profession], linked: &[Profession]) -> Vec<ProfessionOptionView> {
    all.iter()
        .map(|profession| ProfessionOptionView {
            id: profession.id.to_string(),
            name: profession.name.clone(),
            checked: linked.iter().any(|l| l.id == profession.id),
        })
        .collect()
}

#[derive(Debug, Clone)]
struct SlotView {
    id: String,
    name: String,
    required_tag: String,
    description_template: String,
    possible_quirks: String,
}

impl SlotView {
    fn from_slot(slot: &PatternSlot) -> Self {
        Self {
            id: slot.id.to_string(),
            name: slot.name.clone(),
            required_tag: slot.required_tag.clone().unwrap_or_default(),
            description_template: slot.description_template.clone().unwrap_or_default(),
            possible_quirks: slot.possible_quirks.clone().unwrap_or_default(),
        }
    }
}

// Templates

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    query: String,
    patterns: Vec<PatternRowView>,
    total: i64,
    page: u32,
    total_pages: u32,
    prev_page: u32,
    next_page: u32,
}

#[derive(Template)]
#[template(path = "create.html")]
struct CreateTemplate {
    professions: Vec<ProfessionOptionView>,
}

#[derive(Template)]
#[template(path = "edit.html")]
struct EditTemplate {
    pattern: PatternView,
    professions: Vec<ProfessionOptionView>,
    tags: String,
}

#[derive(Template)]
#[template(path = "show.html")]
struct ShowTemplate {
    pattern: PatternView,
    professions_text: String,
    tags_text: String,
    slots: Vec<SlotView>,
}

#[derive(Template)]
#[template(path = "slot_create.html")]
struct SlotCreateTemplate {
    pattern_id: String,
    pattern_name: String,
}

#[derive(Template)]
#[template(path = "slot_edit.html")]
struct SlotEditTemplate {
    pattern_id: String,
    pattern_name: String,
    slot: SlotView,
}

#[derive(Template)]
#[template(path = "import.html")]
struct ImportTemplate {}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/patterns", get(index_handler).post(store_handler))
        .route("/patterns/search", get(search_handler))
        .route("/patterns/create", get(create_form_handler))
        .route(
            "/patterns/json",
            get(import_form_handler).post(import_handler),
        )
        .route("/patterns.json", get(export_handler))
        .route(
            "/patterns/{id}",
            get(show_handler).post(update_handler).put(update_handler),
        )
        .route("/patterns/{id}/edit", get(edit_form_handler))
        .route("/patterns/{id}/slots", post(store_slot_handler))
        .route("/patterns/{id}/slots/create", get(create_slot_form_handler))
        .route(
            "/patterns/{id}/slots/{slot_id}",
            post(update_slot_handler).put(update_slot_handler),
        )
        .route("/patterns/{id}/slots/{slot_id}/edit", get(edit_slot_form_handler))
        .with_state(Arc::new(state))
}

/// Bind `0.0.0.0:$LOOM_WEB_PORT` (default 3500) against `$DATABASE_URL`
/// (default `sqlite:loom.db`), migrating on boot.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("LOOM_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3500);
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:loom.db".to_string());

    let store = PatternStore::connect(&database_url).await?;
    store.migrate().await?;
    serve(store, port).await
}

pub async fn serve(store: PatternStore, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving pattern catalog");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

async fn root_handler() -> Redirect {
    Redirect::to("/patterns")
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, WebError> {
    let page = state.store.list_patterns(query.page.unwrap_or(1)).await?;
    render_index(String::new(), page)
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, WebError> {
    let fragment = query.name.unwrap_or_default();
    let page = state
        .store
        .search_patterns(&fragment, query.page.unwrap_or(1))
        .await?;
    render_index(fragment, page)
}

fn render_index(query: String, page: Page<Pattern>) -> Result<Response, WebError> {
    let patterns = page
        .items
        .iter()
        .map(|pattern| PatternRowView {
            id: pattern.id.to_string(),
            name: pattern.name.clone(),
        })
        .collect();
    render(IndexTemplate {
        query,
        patterns,
        total: page.total,
        page: page.page,
        total_pages: page.total_pages,
        prev_page: page.page.saturating_sub(1),
        next_page: page.page + 1,
    })
}

async fn create_form_handler(State(state): State<Arc<AppState>>) -> Result<Response, WebError> {
    let professions = state.store.list_professions().await?;
    render(CreateTemplate {
        professions: profession_options(&professions, &[]),
    })
}

async fn store_handler(
    State(state): State<Arc<AppState>>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    let input = PatternFormInput::from_pairs(&pairs);
    let pattern = state.store.create_pattern(&input.draft).await?;
    state
        .store
        .sync_professions(pattern.id, &input.profession_ids)
        .await?;
    state.store.update_tags(pattern.id, &input.tags).await?;
    Ok(redirect_to_pattern(pattern.id))
}

async fn show_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    let professions = state.store.professions_for_pattern(id).await?;
    let tags_text = state.store.tags_to_string(id).await?;
    let slots = state.store.slots_for_pattern(id).await?;

    render(ShowTemplate {
        pattern: PatternView::from_pattern(&pattern),
        professions_text: professions
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        tags_text,
        slots: slots.iter().map(SlotView::from_slot).collect(),
    })
}

async fn edit_form_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    let all_professions = state.store.list_professions().await?;
    let linked = state.store.professions_for_pattern(id).await?;
    let tags = state.store.tags_to_string(id).await?;

    render(EditTemplate {
        pattern: PatternView::from_pattern(&pattern),
        professions: profession_options(&all_professions, &linked),
        tags,
    })
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    let input = PatternFormInput::from_pairs(&pairs);
    let pattern = state.store.update_pattern(id, &input.draft).await?;
    state
        .store
        .sync_professions(pattern.id, &input.profession_ids)
        .await?;
    state.store.update_tags(pattern.id, &input.tags).await?;
    Ok(redirect_to_pattern(pattern.id))
}

async fn create_slot_form_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    render(SlotCreateTemplate {
        pattern_id: pattern.id.to_string(),
        pattern_name: pattern.name,
    })
}

async fn store_slot_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
    Form(form): Form<SlotForm>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    state
        .store
        .save_slot(pattern.id, None, &form.into_draft())
        .await?;
    Ok(redirect_to_pattern(pattern.id))
}

async fn edit_slot_form_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((id, slot_id)): AxumPath<(Uuid, Uuid)>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    let slot = state.store.find_slot(slot_id).await?;
    render(SlotEditTemplate {
        pattern_id: pattern.id.to_string(),
        pattern_name: pattern.name,
        slot: SlotView::from_slot(&slot),
    })
}

async fn update_slot_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((id, slot_id)): AxumPath<(Uuid, Uuid)>,
    Form(form): Form<SlotForm>,
) -> Result<Response, WebError> {
    let pattern = state.store.find_pattern(id).await?;
    state
        .store
        .save_slot(pattern.id, Some(slot_id), &form.into_draft())
        .await?;
    Ok(redirect_to_pattern(pattern.id))
}

async fn import_form_handler() -> Result<Response, WebError> {
    render(ImportTemplate {})
}

async fn import_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ImportForm>,
) -> Result<Response, WebError> {
    let raw = form.data.unwrap_or_default();
    let summary = loom_transfer::import_patterns(&state.store, &raw).await?;
    Ok(Json(summary).into_response())
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, WebError> {
    let envelope = loom_transfer::export_patterns(&state.store, query.tag.as_deref()).await?;
    Ok(Json(envelope).into_response())
}

fn redirect_to_pattern(id: Uuid) -> Response {
    Redirect::to(&format!("/patterns/{id}")).into_response()
}

fn render<T: Template>(tpl: T) -> Result<Response, WebError> {
    let html = tpl
        .render()
        .map_err(|err| WebError::Internal(anyhow::anyhow!(err)))?;
    Ok(Html(html).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app() -> (Router, PatternStore) {
        let store = PatternStore::in_memory().await.expect("in-memory pool");
        store.migrate().await.expect("migrate");
        let router = app(AppState::new(store.clone()));
        (router, store)
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn pattern_form_input_decodes_pairs() {
        let smith = Uuid::new_v4();
        let pairs = vec![
            ("name".to_string(), "Iron Blade".to_string()),
            ("description".to_string(), String::new()),
            ("commonality".to_string(), "common".to_string()),
            ("value".to_string(), "120".to_string()),
            ("professions".to_string(), smith.to_string()),
            ("professions".to_string(), "not-a-uuid".to_string()),
            ("tags".to_string(), "metal, blade".to_string()),
        ];
        let input = PatternFormInput::from_pairs(&pairs);
        assert_eq!(input.draft.name, "Iron Blade");
        assert_eq!(input.draft.description, None);
        assert_eq!(input.draft.commonality.as_deref(), Some("common"));
        assert_eq!(input.draft.value, Some(120));
        assert_eq!(input.profession_ids, vec![smith]);
        assert_eq!(input.tags, "metal, blade");
    }

    #[tokio::test]
    async fn index_lists_patterns() {
        let (router, store) = test_app().await;
        store
            .create_pattern(&PatternDraft { name: "Iron Blade".into(), ..PatternDraft::default() })
            .await
            .unwrap();

        let response = router
            .oneshot(Request::builder().uri("/patterns").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("Iron Blade"));
    }

    #[tokio::test]
    async fn root_redirects_to_patterns() {
        let (router, _store) = test_app().await;
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/patterns");
    }

    #[tokio::test]
    async fn search_filters_by_substring() {
        let (router, store) = test_app().await;
        for name in ["Steel Blade", "Oak Bow"] {
            store
                .create_pattern(&PatternDraft { name: name.into(), ..PatternDraft::default() })
                .await
                .unwrap();
        }

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/patterns/search?name=Blade")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("Steel Blade"));
        assert!(!text.contains("Oak Bow"));
    }

    #[tokio::test]
    async fn unknown_pattern_is_404() {
        let (router, _store) = test_app().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/patterns/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_form_posts_through_to_detail_redirect() {
        let (router, store) = test_app().await;
        let smith = store.create_profession("Blacksmith").await.unwrap();

        let body = serde_urlencoded::to_string([
            ("name", "Iron Blade"),
            ("description", "A plain blade."),
            ("commonality", "common"),
            ("value", "120"),
            ("professions", smith.id.to_string().as_str()),
            ("tags", "metal, blade"),
        ])
        .unwrap();

        let response = router
            .oneshot(form_request("/patterns", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        let id: Uuid = location.rsplit('/').next().unwrap().parse().unwrap();

        let pattern = store.find_pattern(id).await.unwrap();
        assert_eq!(pattern.name, "Iron Blade");
        assert_eq!(pattern.value, Some(120));
        assert_eq!(
            store.tags_to_string(id).await.unwrap(),
            "metal, blade"
        );
        assert_eq!(
            store.professions_for_pattern(id).await.unwrap(),
            vec![smith]
        );
    }

    #[tokio::test]
    async fn update_resyncs_associations_with_full_replace() {
        let (router, store) = test_app().await;
        let smith = store.create_profession("Blacksmith").await.unwrap();
        let pattern = store
            .create_pattern(&PatternDraft { name: "Before".into(), ..PatternDraft::default() })
            .await
            .unwrap();
        store.sync_professions(pattern.id, &[smith.id]).await.unwrap();
        store.update_tags(pattern.id, "metal").await.unwrap();

        // No professions keys and a different tag string: both sets replaced.
        let body = serde_urlencoded::to_string([("name", "After"), ("tags", "cloth")]).unwrap();
        let response = router
            .oneshot(form_request(&format!("/patterns/{}", pattern.id), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        assert_eq!(store.find_pattern(pattern.id).await.unwrap().name, "After");
        assert!(store.professions_for_pattern(pattern.id).await.unwrap().is_empty());
        assert_eq!(store.tags_to_string(pattern.id).await.unwrap(), "cloth");
    }

    #[tokio::test]
    async fn slot_create_is_owned_by_the_url_pattern() {
        let (router, store) = test_app().await;
        let pattern = store
            .create_pattern(&PatternDraft { name: "Owner".into(), ..PatternDraft::default() })
            .await
            .unwrap();

        let body = serde_urlencoded::to_string([
            ("name", "Grip"),
            ("required_tag", "leather"),
        ])
        .unwrap();
        let response = router
            .oneshot(form_request(&format!("/patterns/{}/slots", pattern.id), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let slots = store.slots_for_pattern(pattern.id).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, "Grip");
        assert_eq!(slots[0].pattern_id, pattern.id);
    }

    #[tokio::test]
    async fn slot_create_under_unknown_pattern_is_404() {
        let (router, _store) = test_app().await;
        let body = serde_urlencoded::to_string([("name", "Grip")]).unwrap();
        let response = router
            .oneshot(form_request(&format!("/patterns/{}/slots", Uuid::new_v4()), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn export_unknown_tag_returns_empty_envelope() {
        let (router, store) = test_app().await;
        store
            .create_pattern(&PatternDraft { name: "Visible".into(), ..PatternDraft::default() })
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/patterns.json?tag=NonexistentTag")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );
        assert_eq!(body_text(response).await, r#"{"patterns":[]}"#);
    }

    #[tokio::test]
    async fn export_includes_nested_relations() {
        let (router, store) = test_app().await;
        let pattern = store
            .create_pattern(&PatternDraft { name: "Iron Blade".into(), ..PatternDraft::default() })
            .await
            .unwrap();
        store.update_tags(pattern.id, "weapon").await.unwrap();

        let response = router
            .oneshot(Request::builder().uri("/patterns.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["patterns"][0]["name"], "Iron Blade");
        assert_eq!(value["patterns"][0]["tags"][0]["name"], "weapon");
    }

    #[tokio::test]
    async fn import_empty_patterns_is_400_with_plain_message() {
        let (router, store) = test_app().await;
        let body =
            serde_urlencoded::to_string([("data", r#"{"patterns": []}"#)]).unwrap();
        let response = router
            .oneshot(form_request("/patterns/json", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "invalid data for patterns");
        assert!(store.list_all_patterns().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_malformed_json_is_400() {
        let (router, _store) = test_app().await;
        let body = serde_urlencoded::to_string([("data", "{not json")]).unwrap();
        let response = router
            .oneshot(form_request("/patterns/json", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("invalid JSON payload"));
    }

    #[tokio::test]
    async fn import_reports_missing_professions() {
        let (router, store) = test_app().await;
        let payload = r#"{"patterns": [{"name": "Philter Flask", "professions": [{"name": "Alchemist"}]}]}"#;
        let body = serde_urlencoded::to_string([("data", payload)]).unwrap();

        let response = router
            .oneshot(form_request("/patterns/json", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["state"], "success");
        assert_eq!(value["new_records_count"], 1);
        assert_eq!(value["missing_professions"][0], "Alchemist");

        let patterns = store.list_all_patterns().await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(store
            .professions_for_pattern(patterns[0].id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn form_pages_render() {
        let (router, store) = test_app().await;
        store.create_profession("Blacksmith").await.unwrap();
        let pattern = store
            .create_pattern(&PatternDraft { name: "Editable".into(), ..PatternDraft::default() })
            .await
            .unwrap();
        store.update_tags(pattern.id, "metal, blade").await.unwrap();

        for uri in [
            "/patterns/create".to_string(),
            "/patterns/json".to_string(),
            format!("/patterns/{}", pattern.id),
            format!("/patterns/{}/edit", pattern.id),
            format!("/patterns/{}/slots/create", pattern.id),
        ] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(uri.as_str()).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        }

        let edit = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/patterns/{}/edit", pattern.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let text = body_text(edit).await;
        assert!(text.contains("metal, blade"));
        assert!(text.contains("Blacksmith"));
    }
}

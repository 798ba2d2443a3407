//! HTTP glue: login, resource views, edit sessions and file downloads.
//! Handlers stay thin; the work happens in `edit` and `storage`.
use crate::access::{AccessPolicy, AccessType, Actor};
use crate::edit::{EditView, Editor, Submission, ACTION_KEY, DISMISS_KEY};
use crate::errors::CrmError;
use crate::fields::actions::SubmittedValue;
use crate::fields::FieldValue;
use crate::resource::{self, Resource, ResourceId, VariantKind};
use crate::session::SessionCookie;
use crate::settings::Settings;
use crate::storage;
use axum::body::Body;
use axum::extract::{Form, FromRequest, FromRequestParts, Multipart, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub editor: Editor,
}

impl AppState {
    fn policy(&self) -> &AccessPolicy {
        &self.editor.policy
    }
}

// Security headers middleware
async fn security_headers(request: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; form-action 'self'"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/resources/{id}", get(resource_view))
        .route("/resources/{id}/assign", post(assign))
        .route("/resources/{id}/unassign/{user_id}", post(unassign))
        .route("/resources/{id}/delete", post(delete))
        .route("/edit/{id}", get(edit))
        .route("/create/{kind}", get(create))
        .route("/sessions/{token}", get(session_view).post(session_submit))
        .route("/files/{hash}", get(file_download))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(settings: Settings, db: DatabaseConnection, editor: Editor) -> miette::Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
        db,
        editor,
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let app = router(state);

    tracing::info!(%addr, "CRM listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

/// The logged-in user. Requests without a live login session are sent to
/// `/login`.
pub struct CurrentUser(pub Actor);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let to_login = || Redirect::to("/login").into_response();

        let cookie = SessionCookie::from_headers(&parts.headers).ok_or_else(to_login)?;
        let session = storage::get_login_session(&state.db, &cookie.session_id)
            .await
            .map_err(IntoResponse::into_response)?
            .ok_or_else(to_login)?;
        let actor = storage::load_actor(&state.db, ResourceId(session.user_id))
            .await
            .map_err(IntoResponse::into_response)?
            .ok_or_else(to_login)?;

        Ok(CurrentUser(actor))
    }
}

fn see_other(location: &str) -> Response {
    Redirect::to(location).into_response()
}

#[derive(Debug, Serialize)]
struct ResourceSummary {
    id: Option<ResourceId>,
    kind: VariantKind,
    title: String,
}

impl From<&Resource> for ResourceSummary {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id(),
            kind: resource.kind(),
            title: resource.title(),
        }
    }
}

async fn index(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<ResourceSummary>>, CrmError> {
    let mut summaries = Vec::new();
    for kind in VariantKind::ALL {
        for resource in storage::list_resources(&state.db, kind).await? {
            if state.policy().check_resource(&resource, &actor, AccessType::Read) {
                summaries.push(ResourceSummary::from(&resource));
            }
        }
    }
    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
struct FieldEntry {
    name: &'static str,
    label: String,
    value: FieldValue,
}

#[derive(Debug, Serialize)]
struct LogEntry {
    subject: ResourceId,
    timestamp: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct ResourceView {
    #[serde(flatten)]
    summary: ResourceSummary,
    fields: Vec<FieldEntry>,
    assigned_users: Vec<ResourceId>,
    log: Vec<LogEntry>,
    can_edit: bool,
    can_delete: bool,
}

/// Load a resource the actor may access with `access`.
async fn load_checked(
    state: &AppState,
    actor: &Actor,
    id: i64,
    access: AccessType,
) -> Result<Resource, CrmError> {
    let resource = storage::get_resource(&state.db, ResourceId(id)).await?;
    if !state.policy().check_resource(&resource, actor, access) {
        return Err(CrmError::AccessDenied);
    }
    Ok(resource)
}

async fn resource_view(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ResourceView>, CrmError> {
    let resource = load_checked(&state, &actor, id, AccessType::Read).await?;
    let policy = state.policy();

    let fields = resource
        .fields()
        .filter(|field| policy.check_field(&resource, field, &actor, AccessType::Read))
        .map(|field| FieldEntry {
            name: field.name,
            label: field.label.clone(),
            value: resource.value(field.name).unwrap_or(FieldValue::Empty),
        })
        .collect();

    let log = storage::resource_log(&state.db, ResourceId(id))
        .await?
        .into_iter()
        .map(|entry| LogEntry {
            subject: ResourceId(entry.subject),
            timestamp: entry.timestamp,
            message: entry.message,
        })
        .collect();

    Ok(Json(ResourceView {
        summary: ResourceSummary::from(&resource),
        fields,
        assigned_users: crate::access::AccessTarget::assigned_users(&resource).to_vec(),
        log,
        can_edit: policy.check_resource(&resource, &actor, AccessType::Write),
        can_delete: policy.check_resource(&resource, &actor, AccessType::Delete),
    }))
}

#[derive(Debug, Deserialize)]
struct AssignForm {
    user_id: i64,
}

async fn assign(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<AssignForm>,
) -> Result<Response, CrmError> {
    let mut resource = load_checked(&state, &actor, id, AccessType::Write).await?;
    storage::assign_to(&state.db, &mut resource, ResourceId(form.user_id), &actor).await?;
    Ok(see_other(&format!("/resources/{id}")))
}

async fn unassign(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<Response, CrmError> {
    let mut resource = load_checked(&state, &actor, id, AccessType::Write).await?;
    storage::unassign_from(&state.db, &mut resource, ResourceId(user_id), &actor).await?;
    Ok(see_other(&format!("/resources/{id}")))
}

async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, CrmError> {
    let mut resource = storage::get_resource(&state.db, ResourceId(id)).await?;
    storage::soft_delete(&state.db, state.policy(), &mut resource, &actor).await?;
    Ok(see_other("/"))
}

async fn edit(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, CrmError> {
    let session = state.editor.start_edit(&actor, ResourceId(id)).await?;
    Ok(see_other(&session.form_url()))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(kind): Path<String>,
) -> Result<Response, CrmError> {
    let kind = resource::get_type(&kind).ok_or_else(|| CrmError::not_found(&kind))?;
    let session = state
        .editor
        .start_create(&actor, kind, Default::default(), None)
        .await?;
    Ok(see_other(&session.form_url()))
}

async fn session_view(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<EditView>, CrmError> {
    Ok(Json(state.editor.view(&actor, &token).await?))
}

async fn session_submit(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(token): Path<String>,
    request: Request,
) -> Result<Response, CrmError> {
    let submission = read_submission(&state, request).await?;
    let outcome = state.editor.submit(&actor, &token, submission).await?;
    Ok(see_other(outcome.redirect()))
}

/// Collect a url-encoded or multipart form into a submission.
async fn read_submission(state: &AppState, request: Request) -> Result<Submission, CrmError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let mut entries: Vec<(String, SubmittedValue)> = Vec::new();
    if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| CrmError::BadRequest(e.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| CrmError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let value = match field.file_name().map(str::to_string) {
                Some(filename) => SubmittedValue::File {
                    filename,
                    content: field
                        .bytes()
                        .await
                        .map_err(|e| CrmError::BadRequest(e.body_text()))?
                        .to_vec(),
                },
                None => SubmittedValue::Text(
                    field
                        .text()
                        .await
                        .map_err(|e| CrmError::BadRequest(e.body_text()))?,
                ),
            };
            entries.push((name, value));
        }
    } else {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state)
            .await
            .map_err(|e| CrmError::BadRequest(e.body_text()))?;
        entries.extend(
            pairs
                .into_iter()
                .map(|(k, v)| (k, SubmittedValue::Text(v))),
        );
    }

    let mut submission = Submission::default();
    for (key, value) in entries {
        match (key.as_str(), value) {
            (ACTION_KEY, SubmittedValue::Text(action)) => submission.action = Some(action),
            (DISMISS_KEY, SubmittedValue::Text(id)) => submission.dismissed.push(id),
            (_, value) => {
                submission.values.insert(key, value);
            }
        }
    }
    Ok(submission)
}

async fn file_download(
    State(state): State<AppState>,
    CurrentUser(_actor): CurrentUser,
    Path(hash): Path<String>,
) -> Result<Response, CrmError> {
    let file = storage::retrieve_file(&state.db, &hash)
        .await?
        .ok_or_else(|| CrmError::not_found(format!("file {hash}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, file.size.to_string()),
        ],
        Body::from(file.content),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    return_to: Option<String>,
    error: Option<String>,
}

async fn login_page(Query(q): Query<LoginQuery>) -> impl IntoResponse {
    let error_html = if q.error.is_some() {
        "<p style='color: red;'>Invalid username or password</p>"
    } else {
        ""
    };
    let return_to = html_escape(&q.return_to.unwrap_or_default());

    Html(format!(
        r#"<!doctype html>
<html><head><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
{error_html}
<form method="post" action="/login">
  <input type="hidden" name="return_to" value="{return_to}">
  <label>Username <input name="username" autocomplete="username"></label>
  <label>Password <input name="password" type="password" autocomplete="current-password"></label>
  <button type="submit">Sign in</button>
</form>
</body></html>"#
    ))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    return_to: Option<String>,
}

/// Only same-site paths are followed after login.
fn local_path(return_to: Option<String>) -> String {
    return_to
        .filter(|p| p.starts_with('/') && !p.starts_with("//") && !p.starts_with("/\\"))
        .unwrap_or_else(|| "/".to_string())
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, CrmError> {
    let Some(actor) = storage::verify_login(&state.db, &form.username, &form.password).await? else {
        tracing::info!(username = %form.username, "Failed login");
        return Ok(see_other("/login?error=invalid"));
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let session = storage::create_login_session(
        &state.db,
        actor.id,
        state.settings.login.session_ttl_secs,
        user_agent,
    )
    .await?;
    tracing::info!(user_id = %actor.id, "Logged in");

    let cookie = SessionCookie::new(session.session_id).to_cookie_header(&state.settings);
    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, local_path(form.return_to)),
        ],
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(cookie) = SessionCookie::from_headers(&headers) {
        if let Err(e) = storage::delete_login_session(&state.db, &cookie.session_id).await {
            tracing::warn!(error = %e, "Failed to delete login session");
        }
    }

    (
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, SessionCookie::delete_cookie_header()),
            (header::LOCATION, "/login".to_string()),
        ],
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

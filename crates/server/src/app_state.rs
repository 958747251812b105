use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use presentation::{SessionHandle, SessionRegistry};
use shared::{
    domain::SessionName,
    error::{ApiError, ErrorCode},
};

pub(crate) type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) sessions: SessionRegistry,
}

impl AppState {
    /// Opens the session, starting it on first use. For mutations and `/ws`.
    pub(crate) async fn session(&self, raw_name: &str) -> ApiResult<SessionHandle> {
        let name = parse_name(raw_name)?;
        self.sessions.open(&name).await.map_err(unavailable)
    }

    /// Read-only lookup: unknown sessions are `404` and stay unknown.
    pub(crate) async fn existing_session(&self, raw_name: &str) -> ApiResult<SessionHandle> {
        let name = parse_name(raw_name)?;
        match self.sessions.get(&name).await.map_err(unavailable)? {
            Some(handle) => Ok(handle),
            None => Err(reject(ApiError::new(
                ErrorCode::NotFound,
                format!("no session named '{name}'"),
            ))),
        }
    }
}

fn parse_name(raw_name: &str) -> ApiResult<SessionName> {
    SessionName::parse(raw_name).map_err(|e| reject(e.into()))
}

fn unavailable(e: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    reject(ApiError::new(ErrorCode::Unavailable, format!("{e:#}")))
}

pub(crate) fn internal(e: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    reject(ApiError::internal(format!("{e:#}")))
}

/// Keeps axum's status for a body it could not extract, with an `ApiError`
/// body in place of its plain-text one.
pub(crate) fn bad_body(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    (
        rejection.status(),
        Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
    )
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = StatusCode::from_u16(error.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error))
}

//! Page, file, history, and upload handlers

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use spage_core::{read_archive_lite, read_history_archive, write_archive};
use spage_store::{parse_cid, PageStore};

use crate::commands::valid_name;
use crate::error::ApiError;
use crate::state::AppState;

/// Content type of a content-addressed archive
const CAR_CONTENT_TYPE: &str = "application/vnd.ipld.car";

/// Content type of a raw block
const RAW_CONTENT_TYPE: &str = "application/vnd.ipld.raw";

#[derive(Debug, Deserialize)]
pub struct CidQuery {
    cid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    name: Option<String>,
}

/// GET /page?cid= - reduced archive of one page version
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CidQuery>,
) -> Result<Response, ApiError> {
    let cid_str = query.cid.ok_or(ApiError::MissingParam("cid"))?;
    let cid = parse_cid(&cid_str).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let archive = read_archive_lite(state.store.as_ref(), &cid).await?;
    Ok(([(header::CONTENT_TYPE, CAR_CONTENT_TYPE)], archive).into_response())
}

/// GET /file?cid= - raw block bytes
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CidQuery>,
) -> Result<Response, ApiError> {
    let cid_str = query.cid.ok_or(ApiError::MissingParam("cid"))?;
    let cid = parse_cid(&cid_str).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let block = state.store.get_block(&cid).await?;
    Ok(([(header::CONTENT_TYPE, RAW_CONTENT_TYPE)], block).into_response())
}

/// GET /history?name= - archive of the full finalization history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NameQuery>,
) -> Result<Response, ApiError> {
    let name = query.name.ok_or(ApiError::MissingParam("name"))?;

    let archive = read_history_archive(state.store.as_ref(), &state.finals, &name).await?;
    Ok(([(header::CONTENT_TYPE, CAR_CONTENT_TYPE)], archive).into_response())
}

/// POST /page?name= - stage an uploaded archive for a name
///
/// Ownership is not checked here; the matching on-chain event authorizes the
/// upload, and unmatched uploads age out.
pub async fn post_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NameQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let name = query
        .name
        .ok_or(ApiError::MissingParam("name"))?
        .to_lowercase();
    if !valid_name(&name) {
        return Err(ApiError::BadRequest(format!("invalid name: {name}")));
    }

    let mut archive = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            archive = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            );
            break;
        }
    }
    let archive = archive.ok_or(ApiError::BadRequest("missing multipart field 'file'".to_string()))?;

    let root = write_archive(
        state.store.as_ref(),
        &name,
        archive,
        state.config.max_upload_bytes,
    )
    .await?;
    Ok(Json(json!({ "cid": root.to_string() })).into_response())
}

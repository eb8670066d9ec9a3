//! Document ingest routes (§6): upload (extract → blind → chunk/embed →
//! persist) and listing, composed from the crates already built for each
//! pipeline stage.

use std::collections::{BTreeMap, HashSet};

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use blinder_core::{BlinderResult, Chunk, CryptoError, Document, Session};
use blinder_pipeline::BlinderPipeline;
use blinder_vault::Vault;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::extractor::extract_text;
use crate::state::AppState;
use crate::types::{DocumentResponse, DocumentUploadResponse};

/// Extensions `blinder-api` accepts for upload (§6), independent of
/// whether an extractor is actually configured for all of them - a
/// deployment without PDF/DOCX/XLSX support still rejects those uploads
/// from [`crate::extractor::extract_text`], just with a validation error
/// instead of at this earlier content-type gate.
const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "xlsx", "xls", "csv", "txt", "tsv"];

fn file_extension(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Maps an accepted extension to its canonical content type. Only covers
/// [`ACCEPTED_EXTENSIONS`] - every other extension is rejected before
/// this is consulted.
fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        _ => "text/plain",
    }
}

async fn load_vault(state: &AppState, session: &Session) -> BlinderResult<Vault> {
    let key = blinder_crypto::derive_key(&state.master_key, &session.salt);
    let mut vault = Vault::new(session.salt, key);
    let rows = state.storage.vault_entries_list(session.session_id).await?;
    let mut decrypted = Vec::with_capacity(rows.len());
    for row in rows {
        let nonce: [u8; 12] = row
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let real_value = vault.decrypt_value(&row.ciphertext, &nonce)?;
        decrypted.push((row, real_value));
    }
    vault.load_entries(decrypted);
    Ok(vault)
}

/// POST /api/sessions/{id}/documents
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/sessions/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 201, description = "Document processed", body = DocumentUploadResponse),
        (status = 400, description = "Invalid or unsupported file", body = ApiError),
        (status = 404, description = "Session not found", body = ApiError),
        (status = 413, description = "File too large", body = ApiError),
        (status = 422, description = "Blocked by threat sanitiser", body = ApiError),
    ),
))]
pub async fn upload_document(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .storage
        .session_get(session_id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(session_id))?;

    let mut filename = None;
    let mut bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::invalid_input(format!("failed to read upload: {e}")))?
                    .to_vec(),
            );
        }
    }
    let filename = filename.ok_or_else(|| ApiError::missing_field("file"))?;
    let bytes = bytes.ok_or_else(|| ApiError::missing_field("file"))?;

    if bytes.len() > state.api_config.max_upload_bytes {
        return Err(ApiError::payload_too_large());
    }
    let extension = file_extension(&filename)
        .filter(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| ApiError::invalid_input(format!("unsupported file extension in '{filename}'")))?;
    let content_type = content_type_for_extension(&extension).to_string();

    let raw_text = extract_text(&extension, &bytes, state.document_extractor.as_deref())?;

    let mut vault = load_vault(&state, &session).await?;
    let known_pseudonyms_before: HashSet<String> =
        vault.get_all_entries().iter().map(|e| e.pseudonym.clone()).collect();

    let pipeline = BlinderPipeline::new(state.ner.clone());
    let (blinded_text, pii_count, threats) = pipeline
        .process_document(&raw_text, false, &mut vault)
        .await
        .map_err(blinder_core::BlinderError::from)?;

    let document = Document {
        document_id: Uuid::now_v7(),
        session_id,
        filename,
        content_type,
        raw_text: Some(raw_text),
        blinded_text: None,
        pii_count: 0,
        processed: false,
        created_at: chrono::Utc::now(),
    };
    state.storage.document_insert(&document).await?;
    state
        .storage
        .document_mark_processed(
            document.document_id,
            blinder_storage::DocumentProcessed {
                blinded_text: blinded_text.clone(),
                pii_count: pii_count as i32,
            },
        )
        .await?;

    let chunk_count = if !blinder_retrieval::is_tabular(&blinded_text) {
        let texts = blinder_retrieval::chunk_document(
            &blinded_text,
            state.chunk_config.chunk_size,
            state.chunk_config.chunk_overlap,
        );
        let embeddings: Vec<Option<Vec<f32>>> = if let Some(embedder) = &state.embedder {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder
                .embed_batch(&refs)
                .await
                .map(|v| v.into_iter().map(Some).collect())
                .unwrap_or_else(|_| vec![None; texts.len()])
        } else {
            vec![None; texts.len()]
        };
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| Chunk {
                chunk_id: Uuid::now_v7(),
                session_id,
                document_id: document.document_id,
                index: index as i32,
                content,
                embedding,
                token_count: blinder_llm::estimate_tokens(&content) as i32,
            })
            .collect();
        let count = chunks.len();
        if !chunks.is_empty() {
            state.storage.chunk_insert_batch(&chunks).await?;
        }
        count
    } else {
        0
    };

    let new_rows = vault
        .dump_for_persistence(session_id)
        .into_iter()
        .filter(|row| !known_pseudonyms_before.contains(&row.pseudonym));
    let mut pii_summary: BTreeMap<String, usize> = BTreeMap::new();
    for row in new_rows {
        *pii_summary.entry(row.entity_type.as_str().to_string()).or_insert(0) += 1;
        state.storage.vault_entry_insert(&row).await?;
    }

    let processed_document = state
        .storage
        .document_get(document.document_id)
        .await?
        .ok_or_else(|| ApiError::document_not_found(document.document_id))?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentUploadResponse {
            document: DocumentResponse::from(processed_document),
            pii_summary,
            threats,
            chunk_count,
        }),
    ))
}

/// GET /api/sessions/{id}/documents
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sessions/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Session id")),
    responses((status = 200, description = "Documents in session", body = [DocumentResponse])),
))]
pub async fn list_documents(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .session_get(session_id)
        .await?
        .ok_or_else(|| ApiError::session_not_found(session_id))?;
    let documents = state.storage.document_list(session_id).await?;
    let response: Vec<DocumentResponse> = documents.into_iter().map(DocumentResponse::from).collect();
    Ok(Json(response))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(upload_document).get(list_documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use blinder_core::Session;
    use tower::ServiceExt;

    fn multipart_body(boundary: &str, filename: &str, content: &str) -> Vec<u8> {
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--\r\n"
        )
        .into_bytes()
    }

    async fn seed_session(state: &AppState) -> Uuid {
        let session = Session {
            session_id: Uuid::now_v7(),
            title: None,
            domain: None,
            salt: blinder_crypto::generate_salt(),
            created_at: chrono::Utc::now(),
        };
        state.storage.session_insert(&session).await.unwrap();
        session.session_id
    }

    #[tokio::test]
    async fn uploading_a_txt_file_blinds_and_persists_it() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/documents", create_router()).with_state(state.clone());

        let boundary = "X-BOUNDARY";
        let body = multipart_body(boundary, "notes.txt", "Contact Jane Smith at jane@example.com");
        let response = app
            .oneshot(
                Request::post(format!("/api/sessions/{session_id}/documents"))
                    .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: DocumentUploadResponse = serde_json::from_slice(&body).unwrap();
        assert!(created.document.blinded_text.unwrap().contains("[PERSON_1]"));
        assert!(created.pii_summary.contains_key("EMAIL"));
    }

    #[tokio::test]
    async fn uploading_an_unsupported_extension_is_rejected() {
        let state = test_state();
        let session_id = seed_session(&state).await;
        let app = Router::new().nest("/api/sessions/:id/documents", create_router()).with_state(state);

        let boundary = "X-BOUNDARY";
        let body = multipart_body(boundary, "scan.exe", "binary");
        let response = app
            .oneshot(
                Request::post(format!("/api/sessions/{session_id}/documents"))
                    .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

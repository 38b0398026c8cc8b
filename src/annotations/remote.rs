//! REST client for a remote annotation service
//!
//! Requests are camelCase; the service answers with snake_case rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::service::{AnnotationService, CreateContext, ServiceError};
use super::types::{AnnotationPatch, AnnotationPosition, AnnotationType, CreateAnnotation, PdfAnnotation};
use crate::config::ViewerConfig;

/// [`AnnotationService`] speaking the document annotations REST API
#[derive(Clone)]
pub struct RemoteAnnotationService {
    client: Client,
    base_url: String,
}

/// A `pdf_annotations` row as the service returns it
#[derive(Debug, Deserialize)]
struct AnnotationRow {
    id: String,
    organization_id: String,
    document_id: String,
    #[serde(default)]
    requirement_id: Option<String>,
    #[serde(default)]
    supplier_id: Option<String>,
    annotation_type: AnnotationType,
    page_number: u32,
    position: AnnotationPosition,
    #[serde(default)]
    highlighted_text: Option<String>,
    #[serde(default)]
    note_content: Option<String>,
    color: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
}

impl From<AnnotationRow> for PdfAnnotation {
    fn from(row: AnnotationRow) -> Self {
        PdfAnnotation {
            id: row.id,
            organization_id: row.organization_id,
            document_id: row.document_id,
            requirement_id: row.requirement_id,
            supplier_id: row.supplier_id,
            annotation_type: row.annotation_type,
            page_number: row.page_number,
            position: row.position,
            highlighted_text: row.highlighted_text,
            note_content: row.note_content,
            color: row.color,
            tags: row.tags,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Body of `201 Created`
#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Body of a successful delete
#[derive(Deserialize)]
struct Deleted {
    success: bool,
}

impl RemoteAnnotationService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(config.api_base_url.clone())
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, document_id: &str) -> String {
        format!(
            "{}/api/documents/{}/annotations",
            self.base_url,
            urlencoding::encode(document_id)
        )
    }

    fn item_url(&self, document_id: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(document_id),
            urlencoding::encode(id)
        )
    }

    /// Every row the service lists for a document
    async fn fetch_rows(&self, document_id: &str) -> Result<Vec<PdfAnnotation>, ServiceError> {
        let response = self
            .client
            .get(self.collection_url(document_id))
            .send()
            .await
            .map_err(transport)?;
        let rows: Vec<AnnotationRow> = check(response).await?.json().await.map_err(transport)?;
        Ok(rows.into_iter().map(PdfAnnotation::from).collect())
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

/// Map a non-success status to the service taxonomy
fn status_error(status: StatusCode, body: String) -> ServiceError {
    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(body),
        StatusCode::CONFLICT => ServiceError::Conflict(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ServiceError::Invalid(body),
        other => ServiceError::Transport(format!("HTTP {}: {}", other.as_u16(), body)),
    }
}

async fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("Annotation service returned {}: {}", status, body);
    Err(status_error(status, body))
}

#[async_trait]
impl AnnotationService for RemoteAnnotationService {
    /// The service only answers with the new id; the record is rebuilt
    /// from the request
    async fn create_annotation(
        &self,
        dto: &CreateAnnotation,
        ctx: &CreateContext,
    ) -> Result<PdfAnnotation, ServiceError> {
        let response = self
            .client
            .post(self.collection_url(&dto.document_id))
            .json(dto)
            .send()
            .await
            .map_err(transport)?;
        let created: Created = check(response).await?.json().await.map_err(transport)?;

        let now = Utc::now();
        Ok(PdfAnnotation {
            id: created.id,
            organization_id: ctx.organization_id.clone(),
            document_id: dto.document_id.clone(),
            requirement_id: dto.requirement_id.clone(),
            supplier_id: dto.supplier_id.clone(),
            annotation_type: dto.annotation_type,
            page_number: dto.page_number,
            position: dto.position.clone(),
            highlighted_text: dto.highlighted_text.clone(),
            note_content: dto.note_content.clone(),
            color: dto.resolved_color(),
            tags: dto.tags.clone(),
            created_by: ctx.user_id.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn update_annotation(
        &self,
        document_id: &str,
        id: &str,
        patch: &AnnotationPatch,
    ) -> Result<PdfAnnotation, ServiceError> {
        let response = self
            .client
            .put(self.item_url(document_id, id))
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        let row: AnnotationRow = check(response).await?.json().await.map_err(transport)?;
        Ok(row.into())
    }

    async fn soft_delete_annotation(&self, document_id: &str, id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.item_url(document_id, id))
            .send()
            .await
            .map_err(transport)?;
        let deleted: Deleted = check(response).await?.json().await.map_err(transport)?;
        if !deleted.success {
            return Err(ServiceError::Transport(format!("delete of {} not acknowledged", id)));
        }
        Ok(())
    }

    async fn list_annotations(&self, document_id: &str) -> Result<Vec<PdfAnnotation>, ServiceError> {
        let mut list = self.fetch_rows(document_id).await?;
        list.retain(|a| !a.is_deleted());
        Ok(list)
    }

    /// Looked up in the document listing; the API has no per-record read
    async fn get_annotation(&self, document_id: &str, id: &str) -> Result<Option<PdfAnnotation>, ServiceError> {
        Ok(self
            .fetch_rows(document_id)
            .await?
            .into_iter()
            .find(|a| a.id == id))
    }
}

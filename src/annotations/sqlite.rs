//! SQLite persistence for annotations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::service::{AnnotationService, CreateContext, ServiceError};
use super::types::{AnnotationPatch, AnnotationPosition, AnnotationType, CreateAnnotation, PdfAnnotation};

type Result<T> = std::result::Result<T, ServiceError>;

/// Repository over the `pdf_annotations` table
pub struct AnnotationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AnnotationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the annotations table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pdf_annotations (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                requirement_id TEXT,
                supplier_id TEXT,
                annotation_type TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                position TEXT NOT NULL,
                highlighted_text TEXT,
                note_content TEXT,
                color TEXT NOT NULL,
                tags TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pdf_annotations_document ON pdf_annotations(document_id);
            CREATE INDEX IF NOT EXISTS idx_pdf_annotations_requirement ON pdf_annotations(requirement_id);
            "#,
        )
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get an annotation by ID, soft-deleted or not
    pub async fn get(&self, id: &str) -> Result<Option<PdfAnnotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, organization_id, document_id, requirement_id, supplier_id,
                   annotation_type, page_number, position, highlighted_text,
                   note_content, color, tags, created_by, created_at, updated_at, deleted_at
            FROM pdf_annotations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.into_annotation()).transpose()
    }

    /// Active annotations for a document, by page then creation time
    pub async fn list_for_document(&self, document_id: &str) -> Result<Vec<PdfAnnotation>> {
        let rows = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, organization_id, document_id, requirement_id, supplier_id,
                   annotation_type, page_number, position, highlighted_text,
                   note_content, color, tags, created_by, created_at, updated_at, deleted_at
            FROM pdf_annotations
            WHERE document_id = ? AND deleted_at IS NULL
            ORDER BY page_number ASC, created_at ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    /// Insert a full record
    pub async fn insert(&self, annotation: &PdfAnnotation) -> Result<()> {
        let position = serde_json::to_string(&annotation.position)?;
        let tags = annotation
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO pdf_annotations (
                id, organization_id, document_id, requirement_id, supplier_id,
                annotation_type, page_number, position, highlighted_text,
                note_content, color, tags, created_by, created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&annotation.id)
        .bind(&annotation.organization_id)
        .bind(&annotation.document_id)
        .bind(&annotation.requirement_id)
        .bind(&annotation.supplier_id)
        .bind(annotation.annotation_type.as_str())
        .bind(annotation.page_number as i64)
        .bind(&position)
        .bind(&annotation.highlighted_text)
        .bind(&annotation.note_content)
        .bind(&annotation.color)
        .bind(&tags)
        .bind(&annotation.created_by)
        .bind(annotation.created_at.to_rfc3339())
        .bind(annotation.updated_at.to_rfc3339())
        .bind(annotation.deleted_at.map(|d| d.to_rfc3339()))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Write the patched columns of a live record
    ///
    /// Returns `false` when the record is missing or soft-deleted.
    pub async fn update(&self, id: &str, patch: &AnnotationPatch) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        // Build dynamic update query
        let mut set_clauses = vec!["updated_at = ?"];
        let mut binds: Vec<String> = vec![now];

        if let Some(ref note) = patch.note_content {
            set_clauses.push("note_content = ?");
            binds.push(note.clone());
        }

        if let Some(ref color) = patch.color {
            set_clauses.push("color = ?");
            binds.push(color.clone());
        }

        if let Some(ref tags) = patch.tags {
            set_clauses.push("tags = ?");
            binds.push(serde_json::to_string(tags)?);
        }

        if let Some(ref position) = patch.position {
            set_clauses.push("position = ?");
            binds.push(serde_json::to_string(position)?);
        }

        let query = format!(
            "UPDATE pdf_annotations SET {} WHERE id = ? AND deleted_at IS NULL",
            set_clauses.join(", ")
        );

        let mut sql_query = sqlx::query(&query);
        for bind in binds {
            sql_query = sql_query.bind(bind);
        }
        let result = sql_query.bind(id).execute(self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set `deleted_at` on a live record
    ///
    /// Returns `false` when the record is missing or already deleted.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE pdf_annotations
            SET deleted_at = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Explain why a guarded write touched no row
    async fn not_live(&self, id: &str) -> ServiceError {
        match self.get(id).await {
            Ok(Some(_)) => ServiceError::Conflict(format!("annotation {} is deleted", id)),
            Ok(None) => ServiceError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: String,
    organization_id: String,
    document_id: String,
    requirement_id: Option<String>,
    supplier_id: Option<String>,
    annotation_type: String,
    page_number: i64,
    position: String,
    highlighted_text: Option<String>,
    note_content: Option<String>,
    color: String,
    tags: Option<String>,
    created_by: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ServiceError::Database(sqlx::Error::Decode(Box::new(e))))
}

impl AnnotationRow {
    fn into_annotation(self) -> Result<PdfAnnotation> {
        let annotation_type = AnnotationType::parse(&self.annotation_type).ok_or_else(|| {
            ServiceError::Database(sqlx::Error::Decode(
                format!("unknown annotation type '{}'", self.annotation_type).into(),
            ))
        })?;
        let position: AnnotationPosition = serde_json::from_str(&self.position)?;
        let tags: Option<Vec<String>> = self
            .tags
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(PdfAnnotation {
            id: self.id,
            organization_id: self.organization_id,
            document_id: self.document_id,
            requirement_id: self.requirement_id,
            supplier_id: self.supplier_id,
            annotation_type,
            page_number: self.page_number.max(0) as u32,
            position,
            highlighted_text: self.highlighted_text,
            note_content: self.note_content,
            color: self.color,
            tags,
            created_by: self.created_by,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// [`AnnotationService`] backed by a local SQLite database
#[derive(Clone)]
pub struct SqliteAnnotationService {
    pool: SqlitePool,
}

impl SqliteAnnotationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if needed
    pub async fn init(&self) -> Result<()> {
        AnnotationRepository::new(&self.pool).init().await
    }

    fn repo(&self) -> AnnotationRepository<'_> {
        AnnotationRepository::new(&self.pool)
    }
}

#[async_trait]
impl AnnotationService for SqliteAnnotationService {
    async fn create_annotation(
        &self,
        dto: &CreateAnnotation,
        ctx: &CreateContext,
    ) -> Result<PdfAnnotation> {
        dto.validate().map_err(ServiceError::Invalid)?;

        let now = Utc::now();
        let annotation = PdfAnnotation {
            id: Uuid::new_v4().to_string(),
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
        };

        self.repo().insert(&annotation).await?;
        tracing::debug!("Stored annotation {} on page {}", annotation.id, annotation.page_number);
        Ok(annotation)
    }

    async fn update_annotation(
        &self,
        _document_id: &str,
        id: &str,
        patch: &AnnotationPatch,
    ) -> Result<PdfAnnotation> {
        patch.validate().map_err(ServiceError::Invalid)?;

        let repo = self.repo();
        if !patch.is_empty() && !repo.update(id, patch).await? {
            return Err(repo.not_live(id).await);
        }

        match repo.get(id).await? {
            Some(record) if patch.is_empty() && record.is_deleted() => Err(repo.not_live(id).await),
            Some(record) => Ok(record),
            None => Err(ServiceError::NotFound(id.to_string())),
        }
    }

    async fn soft_delete_annotation(&self, _document_id: &str, id: &str) -> Result<()> {
        let repo = self.repo();
        if !repo.soft_delete(id).await? {
            return Err(repo.not_live(id).await);
        }
        tracing::debug!("Soft-deleted annotation {}", id);
        Ok(())
    }

    async fn list_annotations(&self, document_id: &str) -> Result<Vec<PdfAnnotation>> {
        self.repo().list_for_document(document_id).await
    }

    async fn get_annotation(&self, _document_id: &str, id: &str) -> Result<Option<PdfAnnotation>> {
        self.repo().get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::types::DEFAULT_HIGHLIGHT_COLOR;
    use crate::geometry::AnnotationRect;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_service() -> SqliteAnnotationService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let service = SqliteAnnotationService::new(pool);
        service.init().await.unwrap();
        service
    }

    fn ctx() -> CreateContext {
        CreateContext {
            organization_id: "org-1".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    fn highlight(document_id: &str, page: u32) -> CreateAnnotation {
        CreateAnnotation {
            document_id: document_id.to_string(),
            requirement_id: Some("REQ-7".to_string()),
            supplier_id: None,
            annotation_type: AnnotationType::Highlight,
            page_number: page,
            position: AnnotationPosition {
                annotation_type: AnnotationType::Highlight,
                page_width: 612.0,
                page_height: 792.0,
                rects: vec![AnnotationRect::new(72.0, 100.0, 200.0, 14.0)],
                text_range: None,
            },
            highlighted_text: Some("The supplier shall".to_string()),
            note_content: None,
            color: None,
            tags: Some(vec!["safety".to_string(), "review".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = setup_service().await;
        let created = service.create_annotation(&highlight("doc-1", 2), &ctx()).await.unwrap();

        assert_eq!(created.color, DEFAULT_HIGHLIGHT_COLOR);
        assert_eq!(created.created_by, "user-1");

        let loaded = service.get_annotation("doc-1", &created.id).await.unwrap().unwrap();
        assert_eq!(loaded.position, created.position);
        assert_eq!(loaded.tags, created.tags);
        assert_eq!(loaded.requirement_id.as_deref(), Some("REQ-7"));
    }

    #[tokio::test]
    async fn test_list_orders_by_page_and_excludes_deleted() {
        let service = setup_service().await;
        let p3 = service.create_annotation(&highlight("doc-1", 3), &ctx()).await.unwrap();
        let p1 = service.create_annotation(&highlight("doc-1", 1), &ctx()).await.unwrap();
        let gone = service.create_annotation(&highlight("doc-1", 2), &ctx()).await.unwrap();
        service.create_annotation(&highlight("doc-2", 1), &ctx()).await.unwrap();

        service.soft_delete_annotation("doc-1", &gone.id).await.unwrap();

        let ids: Vec<String> = service
            .list_annotations("doc-1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![p1.id, p3.id]);

        let tombstone = service.get_annotation("doc-1", &gone.id).await.unwrap().unwrap();
        assert!(tombstone.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let service = setup_service().await;
        let created = service.create_annotation(&highlight("doc-1", 1), &ctx()).await.unwrap();

        let patch = AnnotationPatch {
            note_content: Some("Check torque values".to_string()),
            ..Default::default()
        };
        let updated = service.update_annotation("doc-1", &created.id, &patch).await.unwrap();

        assert_eq!(updated.note_content.as_deref(), Some("Check torque values"));
        assert_eq!(updated.color, created.color);
        assert_eq!(updated.tags, created.tags);
        assert_eq!(updated.position, created.position);
    }

    #[tokio::test]
    async fn test_update_deleted_or_missing() {
        let service = setup_service().await;
        let created = service.create_annotation(&highlight("doc-1", 1), &ctx()).await.unwrap();
        service.soft_delete_annotation("doc-1", &created.id).await.unwrap();

        let patch = AnnotationPatch {
            color: Some("#000000".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_annotation("doc-1", &created.id, &patch).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.update_annotation("doc-1", "missing", &patch).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("annotations.db").display());
        let service = SqliteAnnotationService::new(crate::db::create_pool(&url).await.unwrap());

        for round in 0..20 {
            let created = service.create_annotation(&highlight("doc-1", 1), &ctx()).await.unwrap();
            let note = format!("round {round}");
            let patch = AnnotationPatch {
                note_content: Some(note.clone()),
                ..Default::default()
            };

            let (updated, deleted) = tokio::join!(
                service.update_annotation("doc-1", &created.id, &patch),
                service.soft_delete_annotation("doc-1", &created.id),
            );
            deleted.unwrap();

            let stored = service.get_annotation("doc-1", &created.id).await.unwrap().unwrap();
            assert!(stored.is_deleted(), "round {round}: record came back after delete");
            match updated {
                Ok(_) => assert_eq!(stored.note_content.as_deref(), Some(note.as_str())),
                Err(e) => assert!(matches!(e, ServiceError::Conflict(_)), "round {round}: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_patch_leaves_record_untouched() {
        let service = setup_service().await;
        let created = service.create_annotation(&highlight("doc-1", 1), &ctx()).await.unwrap();

        let same = service
            .update_annotation("doc-1", &created.id, &AnnotationPatch::default())
            .await
            .unwrap();
        assert_eq!(same.updated_at, created.updated_at);
        assert_eq!(same.note_content, created.note_content);

        service.soft_delete_annotation("doc-1", &created.id).await.unwrap();
        assert!(matches!(
            service.update_annotation("doc-1", &created.id, &AnnotationPatch::default()).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.soft_delete_annotation("doc-1", &created.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_color_rejected() {
        let service = setup_service().await;
        let mut dto = highlight("doc-1", 1);
        dto.color = Some("yellow".to_string());
        assert!(matches!(
            service.create_annotation(&dto, &ctx()).await,
            Err(ServiceError::Invalid(_))
        ));
    }
}

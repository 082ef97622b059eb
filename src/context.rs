use crate::config::Collections;
use crate::db::DbError;
use crate::error::AppError;
use crate::images::ImagePipeline;
use crate::ocr::TextDetector;
use crate::types::DeviceSource;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ingestion policies that change client-visible behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    /// Reject sensor payloads missing required fields instead of zero-filling.
    pub strict_validation: bool,
    /// Fail plate requests on OCR errors instead of storing an empty plate.
    pub fail_on_ocr_error: bool,
}

/// Collaborators and settings shared by every request handler.
pub struct Context {
    pub db: Arc<Mutex<Connection>>,
    pub detector: Arc<dyn TextDetector>,
    pub pipeline: ImagePipeline,
    pub collections: Collections,
    pub source: DeviceSource,
    pub policy: Policy,
}

impl Context {
    pub fn new(
        conn: Connection,
        detector: Arc<dyn TextDetector>,
        pipeline: ImagePipeline,
        collections: Collections,
        source: DeviceSource,
        policy: Policy,
    ) -> Arc<Self> {
        Arc::new(Context {
            db: Arc::new(Mutex::new(conn)),
            detector,
            pipeline,
            collections,
            source,
            policy,
        })
    }

    /// Runs `f` against the store on the blocking pool, holding the lock
    /// until it returns.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.db.clone().lock_owned().await;
        let result = tokio::task::spawn_blocking(move || f(&*conn))
            .await
            .map_err(|e| AppError::Internal(format!("Database worker failed: {}", e)))?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::ocr::testing::StubDetector;
    use serde_json::json;
    use std::time::Duration;

    fn context() -> Arc<Context> {
        let collections = Collections::default();
        let conn = db::open(":memory:", Duration::from_secs(1), &collections.names()).unwrap();
        Context::new(
            conn,
            Arc::new(StubDetector::nothing()),
            ImagePipeline::new(false, 90, None),
            collections,
            DeviceSource::Camera,
            Policy {
                strict_validation: false,
                fail_on_ocr_error: true,
            },
        )
    }

    #[tokio::test]
    async fn store_calls_run_off_the_async_workers() {
        let ctx = context();
        let id = ctx
            .with_db(|conn| db::insert_document(conn, "plates_data", &json!({"plate": "ABC-123"})))
            .await
            .unwrap();
        assert_eq!(id, 1);

        let docs = ctx
            .with_db(|conn| db::all_documents(conn, "plates_data"))
            .await
            .unwrap();
        assert_eq!(docs, vec![json!({"plate": "ABC-123"})]);
    }

    #[tokio::test]
    async fn store_errors_become_database_errors() {
        let ctx = context();
        let err = ctx
            .with_db(|conn| db::all_documents(conn, "missing_collection"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}

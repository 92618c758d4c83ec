//! In-process engine instances
//!
//! Runs an audit function on its own task behind the same message-passing
//! connection as a child process. Useful for embedding and for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

use parade_common::{AuditError, AuditReport, AuditSettings};

use crate::connection::{EngineConnection, EngineSpawner};
use crate::protocol::{EngineRequest, EngineResponse};
use crate::shutdown::EngineContext;

pub type AuditFuture = Pin<Box<dyn Future<Output = Result<AuditReport, String>> + Send>>;

type AuditFn = dyn Fn(usize, String, AuditSettings) -> AuditFuture + Send + Sync;

/// Spawns engine tasks that call `audit(runner_id, url, settings)` per request.
#[derive(Clone)]
pub struct LocalSpawner {
    audit: Arc<AuditFn>,
}

impl LocalSpawner {
    pub fn new<F, Fut>(audit: F) -> Self
    where
        F: Fn(usize, String, AuditSettings) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AuditReport, String>> + Send + 'static,
    {
        Self {
            audit: Arc::new(move |id, url, settings| Box::pin(audit(id, url, settings))),
        }
    }
}

impl std::fmt::Debug for LocalSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSpawner").finish_non_exhaustive()
    }
}

impl EngineSpawner for LocalSpawner {
    fn spawn(&self, mut ctx: EngineContext) -> Result<EngineConnection, AuditError> {
        let id = ctx.id();
        let audit = Arc::clone(&self.audit);
        let (request_tx, mut request_rx) = mpsc::channel::<EngineRequest>(4);
        let (event_tx, event_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    request = request_rx.recv() => request,
                    _ = ctx.shutdown_requested() => None,
                };
                let Some(EngineRequest::RunAudit { url, settings }) = request else {
                    break;
                };
                let response = tokio::select! {
                    outcome = audit(id, url, settings) => match outcome {
                        Ok(report) => EngineResponse::Report { report: Box::new(report) },
                        Err(message) => EngineResponse::Error { message },
                    },
                    _ = ctx.shutdown_requested() => break,
                };
                if event_tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
            drop(ctx);
        });

        Ok(EngineConnection::new(id, request_tx, event_rx))
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn empty_report(version: &str) -> AuditReport {
        AuditReport {
            lighthouse_version: version.to_string(),
            requested_url: None,
            final_url: None,
            categories: vec![parade_common::report::Category {
                id: "seo".into(),
                title: "SEO".into(),
                score: Some(1.0),
                audit_refs: Vec::new(),
            }],
            audits: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn local_engine_answers_requests() {
        let controller = ShutdownController::new();
        let spawner = LocalSpawner::new(|_, url, _| async move {
            if url.contains("broken") {
                Err("boom".to_string())
            } else {
                Ok(empty_report("1"))
            }
        });
        let mut conn = spawner.spawn(controller.context(0).unwrap()).unwrap();
        let settings = AuditSettings::default();
        let limit = Duration::from_secs(1);

        assert!(conn.audit("https://a.example/", &settings, limit).await.is_ok());
        assert_eq!(
            conn.audit("https://broken.example/", &settings, limit).await,
            Err(AuditError::Engine("boom".into()))
        );
        assert!(conn.close(limit).await);
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let controller = ShutdownController::new();
        let spawner = LocalSpawner::new(|_, _, _| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(empty_report("1"))
        });
        let mut conn = spawner.spawn(controller.context(0).unwrap()).unwrap();
        let limit = Duration::from_millis(20);
        assert_eq!(
            conn.audit("https://a.example/", &AuditSettings::default(), limit).await,
            Err(AuditError::Timeout(limit))
        );
    }
}

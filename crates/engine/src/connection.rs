//! Message-passing connection to one isolated engine instance

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use parade_common::{AuditError, AuditReport, AuditSettings};

use crate::protocol::{EngineRequest, EngineResponse};
use crate::shutdown::EngineContext;

/// Item delivered by a driver: a decoded response, or why decoding failed.
pub type EngineEvent = Result<EngineResponse, AuditError>;

/// Starts isolated engine instances.
///
/// Implementations spawn a driver that owns `ctx` until the engine has exited
/// and that terminates the engine when the connection's request sender is
/// dropped or shutdown is triggered.
pub trait EngineSpawner: Send + Sync {
    fn spawn(&self, ctx: EngineContext) -> Result<EngineConnection, AuditError>;

    fn name(&self) -> &str;
}

/// Parent side of an engine instance. No state is shared with the engine.
#[derive(Debug)]
pub struct EngineConnection {
    id: usize,
    requests: mpsc::Sender<EngineRequest>,
    events: mpsc::Receiver<EngineEvent>,
}

impl EngineConnection {
    #[must_use]
    pub fn new(
        id: usize,
        requests: mpsc::Sender<EngineRequest>,
        events: mpsc::Receiver<EngineEvent>,
    ) -> Self {
        Self {
            id,
            requests,
            events,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Send one audit request and wait for its report, error or timeout.
    pub async fn audit(
        &mut self,
        url: &str,
        settings: &AuditSettings,
        limit: Duration,
    ) -> Result<AuditReport, AuditError> {
        let runner = self.id;
        let request = EngineRequest::RunAudit {
            url: url.to_string(),
            settings: settings.clone(),
        };
        self.requests
            .send(request)
            .await
            .map_err(|_| AuditError::EngineExited { runner })?;

        let events = &mut self.events;
        let outcome = async move {
            loop {
                match events.recv().await {
                    Some(Ok(EngineResponse::Report { report })) => {
                        return if report.is_well_formed() {
                            Ok(*report)
                        } else {
                            Err(AuditError::MalformedResponse(
                                "report contains no categories".to_string(),
                            ))
                        };
                    }
                    Some(Ok(EngineResponse::Error { message })) => {
                        return Err(AuditError::Engine(message))
                    }
                    Some(Ok(EngineResponse::Log { level, message })) => {
                        trace!(runner, %level, "{message}");
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(AuditError::EngineExited { runner }),
                }
            }
        };

        tokio::time::timeout(limit, outcome)
            .await
            .map_err(|_| AuditError::Timeout(limit))?
    }

    /// Ask the engine to exit and wait up to `grace` for it to confirm.
    ///
    /// Confirmation is the driver closing the event channel after the engine
    /// exited. Dropping `self` afterwards kills anything still running.
    pub async fn close(mut self, grace: Duration) -> bool {
        if self.requests.send(EngineRequest::Close).await.is_err() {
            return true;
        }
        let events = &mut self.events;
        let exited = tokio::time::timeout(grace, async move {
            while events.recv().await.is_some() {}
        })
        .await
        .is_ok();
        debug!(runner = self.id, exited, "engine close");
        exited
    }
}

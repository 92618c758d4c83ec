//! Engine-side loop run inside each isolated worker process
//!
//! Reads requests from `input`, answers on `output`, one audit at a time.
//! Logging must go to stderr: `output` carries only protocol lines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::lighthouse::AuditBackend;
use crate::protocol::{decode_request, encode_line, EngineRequest, EngineResponse};

/// Serve requests until `close` or end of input.
pub async fn run_worker<R, W, B>(input: R, mut output: W, backend: &B) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    B: AuditBackend + ?Sized,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match decode_request(&line) {
            Ok(EngineRequest::Close) => {
                info!("close requested, worker exiting");
                return Ok(());
            }
            Ok(EngineRequest::RunAudit { url, settings }) => {
                info!(%url, "running audit");
                match backend.audit(&url, &settings).await {
                    Ok(report) => EngineResponse::Report {
                        report: Box::new(report),
                    },
                    Err(message) => {
                        warn!(%url, "audit failed: {message}");
                        EngineResponse::Error { message }
                    }
                }
            }
            Err(e) => EngineResponse::Error {
                message: format!("unrecognised request: {e}"),
            },
        };
        output.write_all(encode_line(&response)?.as_bytes()).await?;
        output.flush().await?;
    }
    info!("input closed, worker exiting");
    Ok(())
}

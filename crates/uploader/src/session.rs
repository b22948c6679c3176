//! Session initiation and completion.

use capystore_protocol::{CompleteSessionRequest, InitSessionRequest};
use capystore_transfer::{ChunkPlan, UploadSession};
use tracing::{debug, info};

use crate::connection::{ClientError, StorageConnection};
use crate::error::UploadError;
use crate::types::Payload;

/// Opens a session for `payload` and validates the returned geometry.
pub async fn init_session(
    conn: &dyn StorageConnection,
    payload: &Payload,
    uid: &str,
) -> Result<UploadSession, UploadError> {
    let req = InitSessionRequest {
        file_name: payload.name.clone(),
        file_size: payload.size,
        file_digest: payload.digest.clone(),
        is_directory: payload.is_directory,
        uid: uid.to_string(),
    };

    let resp = conn
        .init_session(&req)
        .await
        .map_err(|e| session_error("session init", "init rejected", e))?;

    if resp.session_id.is_empty() {
        return Err(UploadError::Session("service returned an empty session id".into()));
    }

    let plan = ChunkPlan::verify(payload.size, resp.chunk_size, resp.total_chunks)
        .map_err(|e| UploadError::Session(e.to_string()))?;

    info!(
        session = %resp.session_id,
        chunks = plan.total_chunks(),
        chunk_size = plan.chunk_size(),
        "session opened"
    );
    Ok(UploadSession::new(resp.session_id, plan))
}

/// Requests finalization and returns the trace id of the finalize job.
///
/// Refuses to call the service unless every chunk is acknowledged, and moves
/// the session into `Completing` so completion happens at most once.
pub async fn complete_session(
    conn: &dyn StorageConnection,
    session: &UploadSession,
    uid: &str,
    import_as_archive: bool,
) -> Result<String, UploadError> {
    session
        .begin_completing()
        .map_err(|e| UploadError::Session(e.to_string()))?;

    let req = CompleteSessionRequest {
        session_id: session.id(),
        uid: uid.to_string(),
        import_as_archive,
    };
    let resp = conn
        .complete_session(&req)
        .await
        .map_err(|e| session_error("session completion", "completion rejected", e))?;

    if resp.trace_id.is_empty() {
        return Err(UploadError::Session("service returned an empty trace id".into()));
    }

    debug!(session = %req.session_id, trace = %resp.trace_id, "finalize job accepted");
    Ok(resp.trace_id)
}

fn session_error(during: &'static str, context: &str, err: ClientError) -> UploadError {
    if err.is_timeout() {
        UploadError::RequestTimeout(during)
    } else {
        UploadError::Session(format!("{context}: {err}"))
    }
}

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a chunked upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSessionRequest {
    pub file_name: String,
    pub file_size: u64,
    /// Hex SHA-256 of the payload bytes.
    pub file_digest: String,
    pub is_directory: bool,
    pub uid: String,
}

/// Query parameters for a chunk upload. The chunk bytes travel as the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadChunkQuery {
    pub session_id: String,
    pub chunk_index: u32,
    pub uid: String,
}

/// Finalizes a session once every chunk has been acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteSessionRequest {
    pub session_id: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub import_as_archive: bool,
}

/// Query parameters for a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusQuery {
    pub trace_id: String,
    pub uid: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Session geometry chosen by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSessionResponse {
    pub session_id: String,
    pub total_chunks: u32,
    pub chunk_size: u64,
}

/// Acknowledgement of one stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub chunk_index: u32,
    pub chunk_size: u64,
}

/// Identifier of the asynchronous finalize-and-store job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteSessionResponse {
    pub trace_id: String,
}

/// Content hash produced by the finalize job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
}

/// State of the finalize job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub is_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StatusResult>,
    /// Set when the job failed server-side; `error` carries the reason.
    #[serde(default, skip_serializing_if = "is_false")]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// A not-ready response.
    pub fn pending() -> Self {
        Self {
            is_ready: false,
            result: None,
            failed: false,
            error: None,
        }
    }

    /// A ready response carrying `hash`.
    pub fn ready(hash: impl Into<String>, short_url: Option<String>) -> Self {
        Self {
            is_ready: true,
            result: Some(StatusResult {
                hash: hash.into(),
                short_url,
            }),
            failed: false,
            error: None,
        }
    }

    /// A failed response with a reason.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            is_ready: false,
            result: None,
            failed: true,
            error: Some(reason.into()),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_request_omits_default_flag() {
        let req = CompleteSessionRequest {
            session_id: "s1".into(),
            uid: "u1".into(),
            import_as_archive: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("import_as_archive"));

        let req = CompleteSessionRequest {
            import_as_archive: true,
            ..req
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""import_as_archive":true"#));
    }

    #[test]
    fn init_request_wire_names() {
        let req = InitSessionRequest {
            file_name: "site".into(),
            file_size: 42,
            file_digest: "ab".into(),
            is_directory: true,
            uid: "u1".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["file_name"], "site");
        assert_eq!(value["file_size"], 42);
        assert_eq!(value["is_directory"], true);
    }

    #[test]
    fn status_not_ready_minimal_json() {
        let resp: StatusResponse = serde_json::from_str(r#"{"is_ready":false}"#).unwrap();
        assert_eq!(resp, StatusResponse::pending());
    }

    #[test]
    fn status_ready_with_short_url() {
        let json = r#"{"is_ready":true,"result":{"hash":"bafy123","short_url":"https://x.y/a"}}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert!(resp.is_ready);
        let result = resp.result.unwrap();
        assert_eq!(result.hash, "bafy123");
        assert_eq!(result.short_url.as_deref(), Some("https://x.y/a"));
    }

    #[test]
    fn status_failure_carries_reason() {
        let json = r#"{"is_ready":false,"failed":true,"error":"pin rejected"}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert!(resp.failed);
        assert_eq!(resp.error.as_deref(), Some("pin rejected"));
    }
}

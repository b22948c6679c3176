use serde::{Deserialize, Serialize};

/// Envelope `code` reported by the storage service on success.
pub const SUCCESS_CODE: i32 = 200;

/// Envelope wrapping every response from the storage service.
///
/// The `data` field uses `serde_json::value::RawValue` to defer deserialization
/// until the caller knows which payload type the call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Envelope {
    /// Returns `true` if the service reported success.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Deserializes the data payload into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) if raw.get() != "null" => Ok(Some(serde_json::from_str(raw.get())?)),
            _ => Ok(None),
        }
    }
}

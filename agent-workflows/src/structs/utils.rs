use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractJsonError {
    #[error("No JSON object found in response")]
    NotFound,
    #[error("Invalid JSON in response: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// The span between the first `{` and the last `}` of an LLM response.
pub fn json_object_span(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// Deserialize the JSON object embedded in an LLM response.
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T, ExtractJsonError> {
    let span = json_object_span(response).ok_or(ExtractJsonError::NotFound)?;
    Ok(serde_json::from_str(span)?)
}

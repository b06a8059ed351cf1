//! Shared utility functions for provider adapters.

use mcx_domain::error::{Error, Result};
use serde_json::Value;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Send a prepared request and return the JSON body of a successful reply.
///
/// 401/403 map to [`Error::Auth`]; any other non-2xx status to
/// [`Error::Provider`] carrying the provider's own error message when the
/// body has one.
pub(crate) async fn send_json(provider: &str, builder: reqwest::RequestBuilder, body: &Value) -> Result<Value> {
    let resp = builder.json(body).send().await.map_err(from_reqwest)?;
    let status = resp.status();
    let text = resp.text().await.map_err(from_reqwest)?;

    if !status.is_success() {
        let detail = error_message(&text).unwrap_or(text);
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Auth(format!("{provider}: HTTP {} - {detail}", status.as_u16())));
        }
        return Err(Error::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {} - {detail}", status.as_u16()),
        });
    }

    Ok(serde_json::from_str(&text)?)
}

/// Pull `error.message` out of a JSON error body (both Anthropic and
/// OpenAI-style APIs use that shape).
fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_extracts_nested_message() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(error_message(body).as_deref(), Some("invalid x-api-key"));
    }

    #[test]
    fn error_message_ignores_other_shapes() {
        assert!(error_message("Bad Gateway").is_none());
        assert!(error_message(r#"{"message":"x"}"#).is_none());
    }
}

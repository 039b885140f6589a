use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const CONFIG_READ_FAILED: &str = "CONFIG_READ_FAILED";
pub const CONFIG_PARSE_FAILED: &str = "CONFIG_PARSE_FAILED";
pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
pub const FONT_LOAD_FAILED: &str = "FONT_LOAD_FAILED";
pub const FONT_HASH_MISMATCH: &str = "FONT_HASH_MISMATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedErrorKind {
    Config,
    Font,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Config,
        }
    }

    pub fn font(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Font,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                kind: self.kind,
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub kind: CodedErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::json;

    use super::{find_coded_error, CodedError, CONFIG_INVALID};

    #[test]
    fn coded_error_survives_added_context() {
        let result: anyhow::Result<()> = Err(CodedError::config(CONFIG_INVALID, "col_size must be >= 1").into());
        let error = result.context("failed loading rain.yaml").unwrap_err();
        let coded = find_coded_error(&error).expect("coded error should be in chain");
        assert_eq!(coded.code, CONFIG_INVALID);
    }

    #[test]
    fn envelope_serializes_without_empty_details() {
        let envelope = CodedError::config(CONFIG_INVALID, "bad").envelope();
        let value = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert_eq!(
            value,
            json!({"ok": false, "error": {"code": "CONFIG_INVALID", "kind": "config", "message": "bad"}})
        );
    }
}

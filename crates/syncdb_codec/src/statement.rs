//! Logged statement encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A SQL statement together with its positional parameters.
///
/// This is the unit recorded in the statement log and replayed on peers.
/// The encoded form is `{"sql": <text>, "params": [<value>...]}`; the
/// upper-case `SQL`/`Params` keys written by older nodes are accepted on
/// decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    #[serde(alias = "SQL")]
    pub sql: String,
    /// Positional parameters, in placeholder order.
    #[serde(default, alias = "Params", deserialize_with = "nullable_params")]
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a new statement.
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Encodes to the canonical JSON text stored in the log.
    pub fn encode(&self) -> CodecResult<String> {
        if self
            .params
            .iter()
            .any(|p| matches!(p, Value::Real(f) if !f.is_finite()))
        {
            return Err(CodecError::NonFiniteFloat);
        }
        serde_json::to_string(self).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Decodes from the JSON text stored in the log.
    pub fn decode(text: &str) -> CodecResult<Self> {
        let stmt: Statement = serde_json::from_str(text)?;
        if stmt.sql.trim().is_empty() {
            return Err(CodecError::invalid_structure("statement has empty sql"));
        }
        Ok(stmt)
    }
}

// Older nodes write `"Params": null` for statements without parameters.
fn nullable_params<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

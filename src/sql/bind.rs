//! Bind parameters carried alongside SQL text

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::emitter::EmitError;

/// Named bind parameters in first-use order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlBindParameters {
    params: Vec<SqlBindParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlBindParameter {
    pub key: String,
    pub value: Value,
}

impl SqlBindParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let mut out = Self::default();
        for (key, value) in pairs {
            out.params.push(SqlBindParameter { key: key.into(), value });
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &SqlBindParameter> {
        self.params.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Combine, failing if one key is bound to two different values
    pub fn combine(&self, other: &SqlBindParameters) -> Result<SqlBindParameters, EmitError> {
        let mut out = self.clone();
        for param in &other.params {
            match out.get(&param.key) {
                Some(existing) if existing != &param.value => {
                    return Err(EmitError::ConflictingBindParameter { key: param.key.clone() });
                }
                Some(_) => {}
                None => out.params.push(param.clone()),
            }
        }
        Ok(out)
    }
}

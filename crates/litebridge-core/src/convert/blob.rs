use super::{Convert, Options, mismatch};
use crate::Result;
use crate::value::{SqlValue, Value};

/// Binary data. Encoded text bytes are accepted as a blob.
#[derive(Debug, Clone)]
pub struct BlobConverter {
    attr: Option<String>,
}

impl BlobConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        Ok(Self {
            attr: opts.attr_name(),
        })
    }
}

impl Convert for BlobConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        match value {
            Value::Blob(bytes) | Value::EncodedText(bytes) => Ok(Value::Blob(bytes)),
            other => Err(mismatch("blob", &other, self.attr.as_ref())),
        }
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value.as_bytes() {
            Some(bytes) => Ok(SqlValue::Blob(bytes.to_vec())),
            None => Err(mismatch("blob", value, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        Value::from(value)
    }

    fn storage_type_name(&self) -> String {
        "BLOB".to_string()
    }
}

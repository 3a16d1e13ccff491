//! Record flattening and the DUMP file writer
//!
//! Store values carry a type tag (`S`, `N`, `M`, ...). A dumped record drops the tags and
//! keeps plain JSON: numbers stay the decimal strings the store returns, binary values are
//! base64 encoded and `NULL` becomes `true`.

use crate::client::Item;
use crate::config::OutputFormat;
use crate::error::{Error, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};
use std::io::Write;

/// Converts one typed value into plain JSON
pub fn flatten_value(value: &AttributeValue) -> Result<Value> {
    let flat = match value {
        AttributeValue::S(s) | AttributeValue::N(s) => Value::String(s.clone()),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(null) => Value::Bool(*null),
        AttributeValue::B(blob) => Value::String(general_purpose::STANDARD.encode(blob.as_ref())),
        AttributeValue::Ss(set) | AttributeValue::Ns(set) => {
            Value::Array(set.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Bs(set) => Value::Array(
            set.iter()
                .map(|blob| Value::String(general_purpose::STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        AttributeValue::L(list) => Value::Array(
            list.iter()
                .map(flatten_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(flatten_map(map)?),
        other => {
            return Err(Error::Internal(format!(
                "unsupported attribute value: {:?}",
                other
            )))
        }
    };

    Ok(flat)
}

fn flatten_map(item: &Item) -> Result<Map<String, Value>> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), flatten_value(value)?)))
        .collect()
}

/// Converts a whole record into a JSON object
pub fn flatten_item(item: &Item) -> Result<Value> {
    Ok(Value::Object(flatten_map(item)?))
}

/// Streams flattened records into an output in the configured format.
///
/// The delimiter goes before every record except the first, so neither page boundaries
/// nor skipped records can leave a stray delimiter behind.
pub struct DumpWriter<W: Write> {
    out: W,
    format: OutputFormat,
    written: u64,
    skipped: u64,
}

impl<W: Write> DumpWriter<W> {
    /// Writes the format prefix and returns the writer
    pub fn begin(mut out: W, format: OutputFormat) -> Result<Self> {
        out.write_all(format.prefix())?;
        Ok(Self {
            out,
            format,
            written: 0,
            skipped: 0,
        })
    }

    /// Writes one record.
    ///
    /// Returns `Ok(false)` when the record could not be flattened; it is logged and left
    /// out of the output. I/O failures are returned as errors.
    pub fn write_item(&mut self, item: &Item) -> Result<bool> {
        let flat = match flatten_item(item) {
            Ok(flat) => flat,
            Err(e) => {
                log::warn!("skipping record that cannot be dumped: {}", e);
                self.skipped += 1;
                return Ok(false);
            }
        };

        let bytes = serde_json::to_vec(&flat)?;
        if self.written > 0 {
            self.out.write_all(self.format.delimiter())?;
        }
        self.out.write_all(&bytes)?;
        self.written += 1;

        Ok(true)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Writes the format suffix, flushes and hands the output back
    pub fn finish(mut self) -> Result<W> {
        self.out.write_all(self.format.suffix())?;
        self.out.flush()?;
        Ok(self.out)
    }
}

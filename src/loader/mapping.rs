//! Record → element builder.

use serde_json::{Map, Value};

use super::source::RawRecord;
use crate::error::{Error, Result};
use crate::model::{Content, Element, Key, Record, Scalar};

/// Builds a [`Record`] from a [`RawRecord`] by picking fields.
///
/// The key is the tuple of `key_fields`, in order. Content is either the
/// listed `content_fields` or, when none are listed, every non-key field.
/// Listed content fields missing from a record are left out of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    key_fields: Vec<String>,
    content_fields: Vec<String>,
}

impl FieldMapping {
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if no key field is given or a field
    /// is both a key and a content field.
    pub fn new<K, C>(key_fields: K, content_fields: C) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let key_fields: Vec<String> = key_fields.into_iter().map(Into::into).collect();
        let content_fields: Vec<String> = content_fields.into_iter().map(Into::into).collect();
        if key_fields.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one key field is required".to_string(),
            ));
        }
        if let Some(both) = content_fields.iter().find(|f| key_fields.contains(f)) {
            return Err(Error::InvalidArgument(format!(
                "field `{both}` cannot be both key and content"
            )));
        }
        Ok(Self {
            key_fields,
            content_fields,
        })
    }

    #[must_use]
    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    #[must_use]
    pub fn content_fields(&self) -> &[String] {
        &self.content_fields
    }

    /// Build the element for one raw record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Build` carrying the record if a key field is missing
    /// or does not hold a scalar (null, bool, integer or string).
    pub fn build(&self, mut raw: RawRecord) -> Result<Record> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let scalar = match raw.fields.get(field) {
                None => Err(format!("missing key field `{field}`")),
                Some(value) => Scalar::from_json(value)
                    .ok_or_else(|| format!("key field `{field}` is not a scalar: {value}")),
            };
            match scalar {
                Ok(scalar) => parts.push(scalar),
                Err(reason) => {
                    return Err(Error::Build {
                        record: raw.to_string(),
                        reason,
                    });
                }
            }
        }

        let content: Content = if self.content_fields.is_empty() {
            for field in &self.key_fields {
                raw.fields.remove(field);
            }
            raw.fields.into_iter().collect()
        } else {
            self.content_fields
                .iter()
                .filter_map(|field| {
                    raw.fields
                        .remove(field)
                        .map(|value: Value| (field.clone(), value))
                })
                .collect()
        };

        Ok(Record::new(Key::new(parts), content))
    }

    /// Lay a record back out as flat fields, the inverse of [`build`].
    ///
    /// Key parts beyond the mapped key fields are dropped.
    ///
    /// [`build`]: FieldMapping::build
    #[must_use]
    pub fn flatten(&self, record: &Record) -> Map<String, Value> {
        let mut fields: Map<String, Value> = self
            .key_fields
            .iter()
            .zip(record.key().parts())
            .map(|(field, part)| (field.clone(), part.to_json()))
            .collect();
        for (name, value) in record.content() {
            fields.insert(name.clone(), value.clone());
        }
        fields
    }
}

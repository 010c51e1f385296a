//! Shape validation of raw records against the registered scalar fields.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    data::{RawRecord, describe_kind, is_scalar},
    error::ConfigError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid { field: String, found: &'static str },
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    fields: Vec<String>,
}

impl SchemaValidator {
    pub fn new<I, S>(fields: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect::<Vec<String>>();
        if fields.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        Ok(Self { fields })
    }

    /// Absent fields pass; a present field holding a sequence or mapping fails.
    pub fn check(&self, record: &RawRecord) -> Validity {
        for field in &self.fields {
            if let Some(value) = record.get(field)
                && !is_scalar(value)
            {
                return Validity::Invalid {
                    field: field.clone(),
                    found: describe_kind(value),
                };
            }
        }
        Validity::Valid
    }

    /// Splits `records` into the valid ones, in arrival order, and the number
    /// of dropped records per offending field.
    pub fn retain_valid(
        &self,
        records: Vec<RawRecord>,
    ) -> (Vec<RawRecord>, BTreeMap<String, usize>) {
        let mut rejected = BTreeMap::new();
        let mut valid = Vec::with_capacity(records.len());
        for (row, record) in records.into_iter().enumerate() {
            match self.check(&record) {
                Validity::Valid => valid.push(record),
                Validity::Invalid { field, found } => {
                    debug!("Row {row}: field '{field}' holds a {found}");
                    *rejected.entry(field).or_insert(0) += 1;
                }
            }
        }
        (valid, rejected)
    }
}

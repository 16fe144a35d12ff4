// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction buffer: the records a recipe run accumulates.
//!
//! Records are index-addressable and sparse: an `extract` block writes the
//! value of its i-th matched element into record `watermark + i`, creating
//! the slot if needed. The watermark is the record count at the last
//! pagination checkpoint, so every page appends after the previous ones.

use serde_json::{Map, Value};

/// A single extracted record (field name → value).
pub type Record = Map<String, Value>;

/// Outcome of a pagination checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// New records arrived since the previous checkpoint; the loop continues.
    Advanced,
    /// Nothing new was extracted; the loop is exhausted.
    Exhausted,
}

/// Ordered, sparse sequence of records plus the crawled-so-far watermark.
#[derive(Debug, Default, Clone)]
pub struct ExtractionBuffer {
    records: Vec<Option<Record>>,
    watermark: usize,
}

impl ExtractionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record slots, holes included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record count at the last pagination checkpoint.
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Write one value per matched element under `name`, offset by the watermark.
    pub fn write_column(&mut self, name: &str, values: Vec<Value>) {
        for (i, value) in values.into_iter().enumerate() {
            self.slot(self.watermark + i)
                .insert(name.to_string(), value);
        }
    }

    /// Replace the record at `index` wholesale.
    pub fn set_record(&mut self, index: usize, record: Record) {
        self.ensure_len(index + 1);
        self.records[index] = Some(record);
    }

    /// Compare the record count against the previous checkpoint and advance
    /// the watermark when the count grew.
    pub fn checkpoint(&mut self) -> Checkpoint {
        if self.records.len() == self.watermark {
            return Checkpoint::Exhausted;
        }
        self.watermark = self.records.len();
        Checkpoint::Advanced
    }

    /// The records as a JSON array; holes become `null`.
    pub fn into_list(self) -> Value {
        Value::Array(
            self.records
                .into_iter()
                .map(|r| r.map(Value::Object).unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Fold every record into record 0.
    ///
    /// For each field of a later record, the value held by record 0 is
    /// promoted to a one-element list (unless it already is a list) and the
    /// later value is appended. With zero records the result is `null`; with
    /// one record it is that record unchanged.
    pub fn into_item(self) -> Value {
        let mut records = self.records.into_iter();
        let Some(first) = records.next() else {
            return Value::Null;
        };
        let mut item = first.unwrap_or_default();

        for record in records.flatten() {
            for (key, value) in record {
                let slot = item.entry(key).or_insert(Value::Null);
                if !slot.is_array() {
                    *slot = Value::Array(vec![slot.take()]);
                }
                if let Value::Array(values) = slot {
                    values.push(value);
                }
            }
        }

        Value::Object(item)
    }

    fn ensure_len(&mut self, len: usize) {
        if self.records.len() < len {
            self.records.resize(len, None);
        }
    }

    fn slot(&mut self, index: usize) -> &mut Record {
        self.ensure_len(index + 1);
        self.records[index].get_or_insert_with(Record::new)
    }
}

//! The record threaded through the pipeline stages.
//!
//! A [`PipelineState`] is created per invocation, passed by value into each
//! stage and returned transformed. Once [`PipelineState::fail`] has been
//! called the state is frozen: every later mutation is a no-op, so a failed
//! invocation reports exactly the first error.

use crate::output::{DocumentExtraction, ExtractedTable, ExtractionResult, PageReport};
use std::collections::BTreeMap;

/// Metadata key holding the original file name.
pub const FILENAME_KEY: &str = "filename";
/// Metadata key holding the path or URL the bytes came from.
pub const SOURCE_KEY: &str = "source";

/// Where an invocation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Parsed,
    Structured,
    Done,
    Failed,
}

/// Free-form string metadata attached to an invocation.
///
/// Only `filename` and `source` are interpreted, and only as prompt and log
/// context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata with just a file name.
    pub fn with_filename(filename: impl Into<String>) -> Self {
        Self::new().insert(FILENAME_KEY, filename)
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The `filename` entry, if set and non-blank.
    pub fn filename(&self) -> Option<&str> {
        self.get(FILENAME_KEY).filter(|s| !s.trim().is_empty())
    }

    pub fn source(&self) -> Option<&str> {
        self.get(SOURCE_KEY)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// State of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub input: Vec<u8>,
    pub metadata: Metadata,
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    pub pages: Vec<PageReport>,
    pub structured_output: String,
    pub error: Option<String>,
    pub phase: Phase,
}

impl PipelineState {
    pub fn new(input: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            input,
            metadata,
            text: String::new(),
            tables: Vec::new(),
            pages: Vec::new(),
            structured_output: String::new(),
            error: None,
            phase: Phase::Created,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    /// Record the Parse stage's result.
    pub fn with_extraction(mut self, extraction: DocumentExtraction) -> Self {
        if self.is_failed() {
            return self;
        }
        self.text = extraction.text;
        self.tables = extraction.tables;
        self.pages = extraction.pages;
        self.phase = Phase::Parsed;
        self
    }

    /// Record the Structure stage's result.
    pub fn with_output(mut self, output: String) -> Self {
        if self.is_failed() {
            return self;
        }
        self.structured_output = output;
        self.phase = Phase::Structured;
        self
    }

    /// Mark the invocation failed. Only the first failure is kept.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        if self.is_failed() {
            return self;
        }
        self.error = Some(error.into());
        self.phase = Phase::Failed;
        self
    }

    /// Mark a successful run complete.
    pub fn finish(mut self) -> Self {
        if !self.is_failed() {
            self.phase = Phase::Done;
        }
        self
    }

    /// Project the state onto the caller-facing result.
    pub fn into_result(self) -> ExtractionResult {
        match self.error {
            Some(error) => ExtractionResult::Failure { error },
            None => ExtractionResult::Success {
                text: self.text,
                tables: self.tables,
                structured_output: self.structured_output,
            },
        }
    }
}

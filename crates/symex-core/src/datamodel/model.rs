//! The frozen result of one symbolic run

use super::node::DataNode;
use super::{render, xml};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conditional output of a whole program
///
/// Built once when a run finishes; the tree is never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    root: DataNode,
}

impl DataModel {
    pub fn new(root: DataNode) -> Self {
        Self { source: None, root }
    }

    /// Record the root source file the model was produced from
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn root(&self) -> &DataNode {
        &self.root
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn into_root(self) -> DataNode {
        self.root
    }

    /// Text rendering with `#ifdef` markers around conditional output
    pub fn to_ifdef_string(&self) -> String {
        render::render_ifdef(&self.root)
    }

    /// Structured export that reads back into an equal model
    pub fn to_xml(&self) -> Result<String> {
        xml::write_model(self)
    }

    pub fn from_xml(text: &str) -> Result<DataModel> {
        xml::read_model(text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_xml(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_xml()?)?;
        Ok(())
    }
}

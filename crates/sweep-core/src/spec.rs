//! Batch spec definition types.
//!
//! These types represent the user-authored batch change specification.
//! Parsing and validating the YAML document itself happens upstream; the
//! execution core only consumes the resulting structure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub on: Vec<OnSelector>,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceConfiguration>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One `on:` entry identifying target repositories, either by explicit
/// name (plus optional branch) or by a search query. Empty fields mean
/// "not given"; an entry with neither a repository nor a query is
/// malformed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnSelector {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, rename = "repositoriesMatchingQuery")]
    pub repositories_matching_query: String,
}

impl fmt::Display for OnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repositories_matching_query.is_empty() {
            write!(f, "{}", self.repositories_matching_query)
        } else if !self.branch.is_empty() {
            write!(f, "{}@{}", self.repository, self.branch)
        } else {
            write!(f, "{}", self.repository)
        }
    }
}

/// A workspace-selection rule: repositories whose name matches `in_` get
/// one workspace per directory containing `root_at_location_of`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfiguration {
    #[serde(rename = "in")]
    pub in_: String,
    #[serde(rename = "rootAtLocationOf")]
    pub root_at_location_of: String,
    #[serde(default, rename = "onlyFetchWorkspace")]
    pub only_fetch_workspace: bool,
}

/// One command step of the batch spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub run: String,
    pub container: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,
}

impl Step {
    /// The step's conditional expression, empty when none was given.
    pub fn if_condition(&self) -> &str {
        self.if_condition.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_display() {
        let query = OnSelector {
            repositories_matching_query: "lang:go f:go.mod".into(),
            ..Default::default()
        };
        assert_eq!(query.to_string(), "lang:go f:go.mod");

        let with_branch = OnSelector {
            repository: "foo/bar".into(),
            branch: "main".into(),
            ..Default::default()
        };
        assert_eq!(with_branch.to_string(), "foo/bar@main");

        let name_only = OnSelector {
            repository: "foo/bar".into(),
            ..Default::default()
        };
        assert_eq!(name_only.to_string(), "foo/bar");
    }

    #[test]
    fn test_spec_deserializes_yaml_field_names() {
        let raw = r#"{
            "name": "upgrade",
            "on": [{"repositoriesMatchingQuery": "f:go.mod"}],
            "workspaces": [{"in": "foo/*", "rootAtLocationOf": "go.mod", "onlyFetchWorkspace": true}],
            "steps": [{"run": "go get -u", "container": "golang:1.22", "if": "true"}]
        }"#;
        let spec: BatchSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.workspaces[0].in_, "foo/*");
        assert!(spec.workspaces[0].only_fetch_workspace);
        assert_eq!(spec.steps[0].if_condition(), "true");
    }
}

//! Artifact kinds and their natural keys
//!
//! Every row belongs to one of four tables. The natural key of a row decides
//! which rows compete for the single `active` slot.

use crate::ids::RowId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The four artifact tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Extracted requirement (`req_code` keyed)
    Requirement,
    /// Test design flows for one testing type
    TestDesign,
    /// Test viewpoint attached to a requirement
    Viewpoint,
    /// Test cases for one requirement
    TestCase,
}

impl ArtifactKind {
    /// All kinds in dependency order (referenced kinds first)
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Requirement,
        ArtifactKind::TestDesign,
        ArtifactKind::Viewpoint,
        ArtifactKind::TestCase,
    ];

    /// Backing table name
    #[inline]
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Requirement => "requirements",
            Self::TestDesign => "test_designs",
            Self::Viewpoint => "viewpoints",
            Self::TestCase => "test_cases",
        }
    }

    /// Stable lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::TestDesign => "test_design",
            Self::Viewpoint => "viewpoint",
            Self::TestCase => "test_case",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a row within its kind
///
/// Compared component-wise; viewpoint keys keep code and name apart so no
/// text inside either can make two keys equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NaturalKey {
    /// Single-column key (`req_code` or `testing_type`)
    Code(String),
    /// Viewpoint key
    Viewpoint {
        /// Owning requirement code, if any
        req_code: Option<String>,
        /// Viewpoint name
        name: String,
    },
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => f.write_str(code),
            Self::Viewpoint { req_code, name } => {
                write!(f, "{}::{}", req_code.as_deref().unwrap_or("*"), name)
            }
        }
    }
}

/// Identifying columns of a row, per kind
///
/// `requirement_id` / `test_design_id` are lineage links to the rows an
/// artifact was derived from. They never participate in the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactKey {
    /// Requirement row
    Requirement {
        /// Stable code, e.g. `REQ-3`
        req_code: String,
    },
    /// Test design row
    TestDesign {
        /// Testing focus, e.g. `integration`
        testing_type: String,
    },
    /// Viewpoint row
    Viewpoint {
        /// Owning requirement code, if any
        req_code: Option<String>,
        /// Viewpoint name
        name: String,
        /// Link to the requirement row
        requirement_id: Option<RowId>,
        /// Link to the test design row
        test_design_id: Option<RowId>,
    },
    /// Test case row (all cases of one requirement)
    TestCase {
        /// Owning requirement code
        req_code: String,
        /// Link to the requirement row
        requirement_id: Option<RowId>,
    },
}

impl ArtifactKey {
    /// Requirement key
    #[must_use]
    pub fn requirement(req_code: impl Into<String>) -> Self {
        Self::Requirement {
            req_code: req_code.into(),
        }
    }

    /// Test design key
    #[must_use]
    pub fn test_design(testing_type: impl Into<String>) -> Self {
        Self::TestDesign {
            testing_type: testing_type.into(),
        }
    }

    /// Viewpoint key without links
    #[must_use]
    pub fn viewpoint(req_code: Option<String>, name: impl Into<String>) -> Self {
        Self::Viewpoint {
            req_code,
            name: name.into(),
            requirement_id: None,
            test_design_id: None,
        }
    }

    /// Test case key without links
    #[must_use]
    pub fn test_case(req_code: impl Into<String>) -> Self {
        Self::TestCase {
            req_code: req_code.into(),
            requirement_id: None,
        }
    }

    /// Attach a requirement link (ignored for kinds without one)
    #[must_use]
    pub fn with_requirement_link(mut self, id: Option<RowId>) -> Self {
        match &mut self {
            Self::Viewpoint { requirement_id, .. } | Self::TestCase { requirement_id, .. } => {
                *requirement_id = id;
            }
            _ => {}
        }
        self
    }

    /// Attach a test design link (viewpoints only)
    #[must_use]
    pub fn with_test_design_link(mut self, id: Option<RowId>) -> Self {
        if let Self::Viewpoint { test_design_id, .. } = &mut self {
            *test_design_id = id;
        }
        self
    }

    /// Kind this key belongs to
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Requirement { .. } => ArtifactKind::Requirement,
            Self::TestDesign { .. } => ArtifactKind::TestDesign,
            Self::Viewpoint { .. } => ArtifactKind::Viewpoint,
            Self::TestCase { .. } => ArtifactKind::TestCase,
        }
    }

    /// Natural key used for the single-active rule
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Self::Requirement { req_code } | Self::TestCase { req_code, .. } => {
                NaturalKey::Code(req_code.clone())
            }
            Self::TestDesign { testing_type } => NaturalKey::Code(testing_type.clone()),
            Self::Viewpoint { req_code, name, .. } => NaturalKey::Viewpoint {
                req_code: req_code.clone(),
                name: name.clone(),
            },
        }
    }

    /// Requirement code this row belongs to
    #[must_use]
    pub fn req_code(&self) -> Option<&str> {
        match self {
            Self::Requirement { req_code } | Self::TestCase { req_code, .. } => Some(req_code),
            Self::Viewpoint { req_code, .. } => req_code.as_deref(),
            Self::TestDesign { .. } => None,
        }
    }

    /// Rewrite lineage links through an old → new row id map
    ///
    /// Links whose target is not in the map are left untouched.
    pub fn remap_links(&mut self, map: &HashMap<RowId, RowId>) {
        let remap = |link: &mut Option<RowId>| {
            if let Some(new_id) = link.as_ref().and_then(|id| map.get(id)) {
                *link = Some(*new_id);
            }
        };
        match self {
            Self::Viewpoint {
                requirement_id,
                test_design_id,
                ..
            } => {
                remap(requirement_id);
                remap(test_design_id);
            }
            Self::TestCase { requirement_id, .. } => remap(requirement_id),
            _ => {}
        }
    }
}

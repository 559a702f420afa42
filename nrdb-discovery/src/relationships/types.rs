use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{DiscoveryError, Result};

/// Kind of link between two attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Join,
    Correlation,
    Temporal,
    Hierarchy,
    Derived,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Join => "join",
            Self::Correlation => "correlation",
            Self::Temporal => "temporal",
            Self::Hierarchy => "hierarchy",
            Self::Derived => "derived",
        })
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Attribute names and types.
    Structural,
    /// Values sampled from the remote store.
    Sample,
    /// Statistics computed over sampled series.
    Statistical,
    /// Composition of other relationships.
    Inferred,
}

/// One fact supporting a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_type: EvidenceType,
    pub key: String,
    pub value: Value,
    pub confidence: f64,
}

impl Evidence {
    pub fn new(
        evidence_type: EvidenceType,
        key: impl Into<String>,
        value: impl Into<Value>,
        confidence: f64,
    ) -> Self {
        Self {
            evidence_type,
            key: key.into(),
            value: value.into(),
            confidence: clamp_unit(confidence),
        }
    }
}

/// Distinct-value shape of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl JoinCardinality {
    /// How much a join of this shape is trusted relative to a clean
    /// one-to-one key.
    pub fn consistency(&self) -> f64 {
        match self {
            Self::OneToOne => 1.0,
            Self::OneToMany => 0.9,
            Self::ManyToMany => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToMany => "many_to_many",
        }
    }
}

/// An attribute of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeRef {
    pub schema: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(schema: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.attribute)
    }
}

/// A confidence-scored link between two attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub relationship_type: RelationshipType,
    pub source: AttributeRef,
    pub target: AttributeRef,
    /// In [0, 1] and backed by at least one evidence entry.
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Relationship {
    /// Fails when `evidence` is empty.
    pub fn new(
        relationship_type: RelationshipType,
        source: AttributeRef,
        target: AttributeRef,
        confidence: f64,
        evidence: Vec<Evidence>,
    ) -> Result<Self> {
        if evidence.is_empty() {
            return Err(DiscoveryError::analysis(format!(
                "{relationship_type} relationship {source} -> {target} has no evidence"
            )));
        }
        Ok(Self {
            id: Self::id_for(relationship_type, &source, &target),
            relationship_type,
            source,
            target,
            confidence: clamp_unit(confidence),
            evidence,
            metadata: HashMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Order-independent id for the pair and type.
    pub fn id_for(relationship_type: RelationshipType, a: &AttributeRef, b: &AttributeRef) -> String {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let digest = Sha256::digest(format!("{relationship_type}|{first}|{second}").as_bytes());
        hex::encode(&digest[..8])
    }

    /// Whether the relationship links `a` and `b` in either direction.
    pub fn connects(&self, a: &AttributeRef, b: &AttributeRef) -> bool {
        (&self.source == a && &self.target == b) || (&self.source == b && &self.target == a)
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: &AttributeRef) -> Option<&AttributeRef> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

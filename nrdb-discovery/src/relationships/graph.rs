//! Relationship graph and transitive derivation.

use std::collections::{BTreeMap, HashSet};

use super::types::{AttributeRef, Evidence, EvidenceType, Relationship, RelationshipType};
use crate::error::Result;

/// Undirected graph of attributes linked by relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: Vec<Relationship>,
    adjacency: BTreeMap<AttributeRef, Vec<usize>>,
}

impl RelationshipGraph {
    pub fn new(relationships: Vec<Relationship>) -> Self {
        let mut graph = Self::default();
        for relationship in relationships {
            graph.add(relationship);
        }
        graph
    }

    /// Adds an edge unless one with the same id is already present.
    pub fn add(&mut self, relationship: Relationship) -> bool {
        if self.edges.iter().any(|e| e.id == relationship.id) {
            return false;
        }
        let index = self.edges.len();
        self.adjacency
            .entry(relationship.source.clone())
            .or_default()
            .push(index);
        self.adjacency
            .entry(relationship.target.clone())
            .or_default()
            .push(index);
        self.edges.push(relationship);
        true
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.edges
    }

    pub fn into_relationships(self) -> Vec<Relationship> {
        self.edges
    }

    /// Edges touching `node`.
    pub fn edges_of<'a>(&'a self, node: &AttributeRef) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.adjacency
            .get(node)
            .into_iter()
            .flatten()
            .map(move |i| &self.edges[*i])
    }

    fn linked(&self, a: &AttributeRef, b: &AttributeRef) -> bool {
        self.edges_of(a).any(|e| e.connects(a, b))
    }

    /// Composes pairs of edges sharing a node, both at or above
    /// `min_confidence`, into `derived` edges between their far ends.
    ///
    /// The derived confidence is the product of the two, so it never exceeds
    /// either. Pairs already linked directly are skipped, and derived edges
    /// are not composed further. Returns the number of edges added.
    pub fn derive_transitive(&mut self, min_confidence: f64) -> Result<usize> {
        let mut derived = Vec::new();
        let mut seen = HashSet::new();

        for (via, indices) in &self.adjacency {
            let strong: Vec<&Relationship> = indices
                .iter()
                .map(|i| &self.edges[*i])
                .filter(|e| e.relationship_type != RelationshipType::Derived)
                .filter(|e| e.confidence >= min_confidence)
                .collect();

            for (i, first) in strong.iter().enumerate() {
                for second in &strong[i + 1..] {
                    let (Some(a), Some(c)) = (first.other_end(via), second.other_end(via)) else {
                        continue;
                    };
                    if a == c || a.schema == c.schema || self.linked(a, c) {
                        continue;
                    }
                    let id = Relationship::id_for(RelationshipType::Derived, a, c);
                    if !seen.insert(id) {
                        continue;
                    }

                    let confidence = first.confidence * second.confidence;
                    let evidence = vec![
                        Evidence::new(EvidenceType::Inferred, "via", via.to_string(), confidence),
                        Evidence::new(EvidenceType::Inferred, "first_edge", first.id.clone(), first.confidence),
                        Evidence::new(EvidenceType::Inferred, "second_edge", second.id.clone(), second.confidence),
                    ];
                    let (source, target) = if a <= c { (a, c) } else { (c, a) };
                    derived.push(
                        Relationship::new(
                            RelationshipType::Derived,
                            source.clone(),
                            target.clone(),
                            confidence,
                            evidence,
                        )?
                        .with_metadata("via", via.to_string())
                        .with_metadata(
                            "composed_types",
                            vec![
                                first.relationship_type.to_string(),
                                second.relationship_type.to_string(),
                            ],
                        ),
                    );
                }
            }
        }

        let added = derived.len();
        for relationship in derived {
            self.add(relationship);
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: (&str, &str), b: (&str, &str), confidence: f64) -> Relationship {
        Relationship::new(
            RelationshipType::Join,
            AttributeRef::new(a.0, a.1),
            AttributeRef::new(b.0, b.1),
            confidence,
            vec![Evidence::new(EvidenceType::Sample, "match_ratio", confidence, confidence)],
        )
        .unwrap()
    }

    #[test]
    fn test_derives_edge_through_shared_node() {
        let mut graph = RelationshipGraph::new(vec![
            edge(("Transaction", "sessionId"), ("PageView", "sessionId"), 0.9),
            edge(("PageView", "sessionId"), ("BrowserInteraction", "sessionId"), 0.85),
        ]);
        assert_eq!(graph.derive_transitive(0.8).unwrap(), 1);
        assert_eq!(graph.len(), 3);

        let derived = graph
            .relationships()
            .iter()
            .find(|r| r.relationship_type == RelationshipType::Derived)
            .unwrap();
        assert!(derived.connects(
            &AttributeRef::new("Transaction", "sessionId"),
            &AttributeRef::new("BrowserInteraction", "sessionId")
        ));
        assert!((derived.confidence - 0.765).abs() < 1e-9);
        assert!(derived.confidence <= 0.85);
        assert!(!derived.evidence.is_empty());
    }

    #[test]
    fn test_weak_or_existing_edges_are_not_composed() {
        let mut graph = RelationshipGraph::new(vec![
            edge(("A", "id"), ("B", "id"), 0.9),
            edge(("B", "id"), ("C", "id"), 0.5),
        ]);
        assert_eq!(graph.derive_transitive(0.8).unwrap(), 0);

        let mut graph = RelationshipGraph::new(vec![
            edge(("A", "id"), ("B", "id"), 0.9),
            edge(("B", "id"), ("C", "id"), 0.9),
            edge(("A", "id"), ("C", "id"), 0.9),
        ]);
        assert_eq!(graph.derive_transitive(0.8).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let mut graph = RelationshipGraph::default();
        assert!(graph.add(edge(("A", "id"), ("B", "id"), 0.9)));
        assert!(!graph.add(edge(("B", "id"), ("A", "id"), 0.7)));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node_count(), 2);
    }
}

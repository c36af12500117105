//! Action graph compiled from a scenario.
//!
//! Vertices are stage names (`given`, `when`, `then`) and unique thesis names
//! (`story.scenario.thesis`). Edges point from a prerequisite to the vertex
//! that waits on it:
//!
//! - explicit `after` dependencies: `dependency → thesis`
//! - implicit stage ordering: `stage → thesis`
//! - given/when theses nobody consumes: `thesis → next stage`
//! - a given/when stage with no dependents: `stage → next stage`
//!
//! The last two close the chain into `then`, so a stage made only of leaf
//! theses still orders the stages after it. A compiled graph is guaranteed
//! acyclic.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use thesis_types::{Scenario, Stage};
use tracing::trace;

use crate::errors::PerformanceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionGraph {
    edges: IndexMap<String, IndexSet<String>>,
}

impl ActionGraph {
    /// Compiles `scenario` and rejects it when its dependencies form a cycle.
    pub fn build(scenario: &Scenario) -> Result<Self, PerformanceError> {
        let mut graph = ActionGraph::default();
        for stage in Stage::ALL {
            graph.add_vertex(stage.as_str());
        }

        for thesis in scenario.theses() {
            let vertex = thesis.slug().to_string();
            for dependency in thesis.after() {
                graph.add_edge(&dependency.to_string(), &vertex);
            }
            graph.add_edge(thesis.stage().as_str(), &vertex);
        }

        for thesis in scenario.theses() {
            let vertex = thesis.slug().to_string();
            if let Some(next) = thesis.stage().next()
                && graph.is_leaf(&vertex)
            {
                graph.add_edge(&vertex, next.as_str());
            }
        }
        for stage in [Stage::Given, Stage::When] {
            if let Some(next) = stage.next()
                && graph.is_leaf(stage.as_str())
            {
                graph.add_edge(stage.as_str(), next.as_str());
            }
        }

        graph.ensure_acyclic()?;
        trace!(scenario = %scenario.slug(), vertices = graph.edges.len(), "compiled action graph");
        Ok(graph)
    }

    /// Direct dependents of `vertex`.
    pub fn dependents(&self, vertex: &str) -> impl Iterator<Item = &str> {
        self.edges.get(vertex).into_iter().flatten().map(String::as_str)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|targets| targets.contains(to))
    }

    fn add_vertex(&mut self, vertex: &str) {
        if !self.edges.contains_key(vertex) {
            self.edges.insert(vertex.to_string(), IndexSet::new());
        }
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.add_vertex(to);
        self.add_vertex(from);
        if let Some(targets) = self.edges.get_mut(from) {
            targets.insert(to.to_string());
        }
    }

    fn is_leaf(&self, vertex: &str) -> bool {
        self.edges.get(vertex).is_none_or(IndexSet::is_empty)
    }

    /// Three-colour depth-first search rooted at `given`, then at any vertex
    /// the root does not reach.
    fn ensure_acyclic(&self) -> Result<(), PerformanceError> {
        let mut colors: HashMap<&str, Color> = self.edges.keys().map(|vertex| (vertex.as_str(), Color::White)).collect();

        let roots = std::iter::once(Stage::Given.as_str()).chain(self.edges.keys().map(String::as_str));
        for root in roots {
            if colors.get(root) == Some(&Color::White) {
                self.visit(root, &mut colors)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(&'a self, vertex: &'a str, colors: &mut HashMap<&'a str, Color>) -> Result<(), PerformanceError> {
        colors.insert(vertex, Color::Gray);
        for next in self.dependents(vertex) {
            match colors.get(next).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    return Err(PerformanceError::CyclicGraph {
                        from: vertex.to_string(),
                        to: next.to_string(),
                    });
                }
                Color::White => self.visit(next, colors)?,
                Color::Black => {}
            }
        }
        colors.insert(vertex, Color::Black);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

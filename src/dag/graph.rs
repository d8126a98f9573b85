// src/dag/graph.rs

//! Static dependency graph of a resolved pipeline.
//!
//! For every job the graph holds:
//! - its *wait-set*: the jobs that must be terminal before it may start
//!   (its `needs`, or every job of every earlier stage when it has none);
//! - its *producers*: the jobs whose artifacts it consumes;
//! - its dependents (reverse of the wait-set), for diagnostics.
//!
//! The scheduling invariants are checked once, here.

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::job::{JobSpec, ResolvedPipeline};
use crate::errors::{LocalCiError, Result};
use crate::types::When;

/// A job whose artifacts another job consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub job: String,
    /// Whether artifacts are fetched from this producer.
    pub artifacts: bool,
}

/// One `needs` edge that entered the wait-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedEdge {
    pub consumer: String,
    pub producer: String,
    pub optional: bool,
    pub artifacts: bool,
}

#[derive(Debug, Clone, Default)]
struct GraphNode {
    stage_index: usize,
    wait_set: Vec<String>,
    producers: Vec<Producer>,
    dependents: Vec<String>,
    edges: Vec<NeedEdge>,
    uses_needs: bool,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: IndexMap<String, GraphNode>,
}

impl DependencyGraph {
    /// Build the graph and validate it.
    ///
    /// Fails with a `SchedulingInvariantError` when a job needs a job that
    /// will never run (unless the need is optional) or when `needs` form a
    /// cycle.
    pub fn build(pipeline: &ResolvedPipeline) -> Result<Self> {
        let mut nodes: IndexMap<String, GraphNode> = IndexMap::new();

        for job in pipeline.jobs.values() {
            let stage_index = pipeline.stage_index(&job.stage).ok_or_else(|| {
                LocalCiError::scheduling(format!(
                    "job '{}' is in undeclared stage '{}'",
                    job.name, job.stage
                ))
            })?;

            let node = match &job.needs {
                Some(_) => needs_node(job, pipeline, stage_index)?,
                None => stage_node(job, pipeline, stage_index),
            };
            nodes.insert(job.name.clone(), node);
        }

        // Second pass: dependents.
        let names: Vec<String> = nodes.keys().cloned().collect();
        for name in names {
            let wait_set = nodes
                .get(&name)
                .map(|n| n.wait_set.clone())
                .unwrap_or_default();
            for upstream in wait_set {
                if let Some(node) = nodes.get_mut(&upstream) {
                    node.dependents.push(name.clone());
                }
            }
        }

        let graph = Self { nodes };
        graph.ensure_acyclic()?;
        Ok(graph)
    }

    /// All job names, in declaration order.
    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Jobs that must be terminal before `job` may start.
    pub fn wait_set(&self, job: &str) -> &[String] {
        self.nodes
            .get(job)
            .map(|n| n.wait_set.as_slice())
            .unwrap_or(&[])
    }

    /// Jobs whose artifacts `job` consumes.
    pub fn producers(&self, job: &str) -> &[Producer] {
        self.nodes
            .get(job)
            .map(|n| n.producers.as_slice())
            .unwrap_or(&[])
    }

    /// Jobs that wait on `job`.
    pub fn dependents_of(&self, job: &str) -> &[String] {
        self.nodes
            .get(job)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn stage_index(&self, job: &str) -> Option<usize> {
        self.nodes.get(job).map(|n| n.stage_index)
    }

    /// Whether `job` declared `needs:` (possibly empty).
    pub fn uses_needs(&self, job: &str) -> bool {
        self.nodes.get(job).is_some_and(|n| n.uses_needs)
    }

    /// Every `needs` edge that entered a wait-set.
    pub fn need_edges(&self) -> impl Iterator<Item = &NeedEdge> {
        self.nodes.values().flat_map(|n| n.edges.iter())
    }

    fn ensure_acyclic(&self) -> Result<()> {
        // Edge direction: upstream -> job.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for upstream in &node.wait_set {
                graph.add_edge(upstream.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(LocalCiError::scheduling(format!(
                "cycle detected in `needs` involving job '{}'",
                cycle.node_id()
            ))),
        }
    }
}

fn needs_node(job: &JobSpec, pipeline: &ResolvedPipeline, stage_index: usize) -> Result<GraphNode> {
    let mut node = GraphNode {
        stage_index,
        uses_needs: true,
        ..GraphNode::default()
    };

    for need in job.needs.iter().flatten() {
        if need.is_qualified() {
            debug!(job = %job.name, need = %need, "cross-pipeline need is advisory only");
            continue;
        }

        let Some(producer) = pipeline.job(&need.job) else {
            if need.optional {
                continue;
            }
            return Err(LocalCiError::scheduling(format!(
                "job '{}' needs undefined job '{}'",
                job.name, need.job
            )));
        };

        if producer.when == When::Never {
            if need.optional {
                debug!(job = %job.name, need = %need.job, "optional need on a job that never runs; dropped");
                continue;
            }
            return Err(LocalCiError::scheduling(format!(
                "job '{}' needs '{}', which will never run in this pipeline",
                job.name, need.job
            )));
        }

        if node.wait_set.contains(&need.job) {
            continue;
        }
        node.wait_set.push(need.job.clone());
        node.edges.push(NeedEdge {
            consumer: job.name.clone(),
            producer: need.job.clone(),
            optional: need.optional,
            artifacts: need.artifacts,
        });

        let wanted = job
            .dependencies
            .as_ref()
            .is_none_or(|deps| deps.contains(&need.job));
        if wanted {
            node.producers.push(Producer {
                job: need.job.clone(),
                artifacts: need.artifacts,
            });
        }
    }

    Ok(node)
}

fn stage_node(job: &JobSpec, pipeline: &ResolvedPipeline, stage_index: usize) -> GraphNode {
    let earlier: Vec<&JobSpec> = pipeline
        .jobs
        .values()
        .filter(|other| pipeline.stage_index(&other.stage).is_some_and(|i| i < stage_index))
        .collect();

    let producers = match &job.dependencies {
        Some(deps) => deps
            .iter()
            .map(|dep| Producer {
                job: dep.clone(),
                artifacts: true,
            })
            .collect(),
        None => earlier
            .iter()
            .filter(|other| other.declares_artifacts())
            .map(|other| Producer {
                job: other.name.clone(),
                artifacts: true,
            })
            .collect(),
    };

    GraphNode {
        stage_index,
        wait_set: earlier.iter().map(|other| other.name.clone()).collect(),
        producers,
        dependents: Vec::new(),
        edges: Vec::new(),
        uses_needs: false,
    }
}

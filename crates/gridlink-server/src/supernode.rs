//! Registry of the configured nodes and paths, and their lifecycle.
//!
//! Nodes are started before the paths using them and stopped after every
//! path has drained.

use dashmap::DashMap;
use futures_util::future::join_all;
use gridlink_core::{
    Context, NodeError, NodeRef, Path, PathConfig, PathError, PathHandle, PathSnapshot, ShutdownReport, State,
};
use gridlink_nodes::{BuildError, NodeConfig, NodeRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that prevent the process from running.
#[derive(Debug, Error)]
pub enum SuperNodeError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Node name '{0}' is used more than once")]
    DuplicateNode(String),

    #[error("Failed to start node '{node}': {source}")]
    Start {
        node: String,
        #[source]
        source: NodeError,
    },
}

/// Status of one path, as served by the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct PathInfo {
    pub name: String,
    pub state: &'static str,
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    /// Why the path did not start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<PathSnapshot>,
}

/// Description of one node, as served by the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub input_signals: Vec<String>,
    pub output_enabled: bool,
}

struct PathEntry {
    sources: Vec<String>,
    destinations: Vec<String>,
    error: Option<String>,
    handle: Option<PathHandle>,
    report: Option<ShutdownReport>,
}

impl PathEntry {
    fn info(&self, name: &str) -> PathInfo {
        let state = match (&self.handle, &self.error) {
            (Some(handle), _) => handle.state(),
            (None, Some(_)) => State::Error,
            (None, None) if self.report.is_some() => State::Stopped,
            (None, None) => State::Prepared,
        };
        PathInfo {
            name: name.to_string(),
            state: state.as_str(),
            sources: self.sources.clone(),
            destinations: self.destinations.clone(),
            error: self.error.clone(),
            stats: self.handle.as_ref().map(|h| h.stats().snapshot()),
        }
    }
}

/// All nodes and paths of one process.
pub struct SuperNode {
    nodes: Vec<NodeRef>,
    /// Path names in configuration order.
    order: Vec<String>,
    paths: DashMap<String, PathEntry>,
    prepared: Mutex<Vec<Path>>,
}

impl SuperNode {
    /// Create all nodes, then create and prepare all enabled paths.
    ///
    /// Paths with configuration errors are logged and reported by
    /// [`SuperNode::paths`]; they do not keep the others from running.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be built.
    pub fn build(
        ctx: &Context,
        registry: &NodeRegistry,
        nodes: &[NodeConfig],
        paths: &[PathConfig],
    ) -> Result<Self, SuperNodeError> {
        let mut names = HashSet::new();
        let mut built = Vec::with_capacity(nodes.len());
        for config in nodes {
            if !names.insert(config.name.as_str()) {
                return Err(SuperNodeError::DuplicateNode(config.name.clone()));
            }
            built.push(registry.build(config)?);
        }

        let supernode = Self {
            nodes: built,
            order: Vec::new(),
            paths: DashMap::new(),
            prepared: Mutex::new(Vec::new()),
        };
        supernode.add_paths(ctx, paths)
    }

    fn add_paths(mut self, ctx: &Context, configs: &[PathConfig]) -> Result<Self, SuperNodeError> {
        for (index, config) in configs.iter().enumerate() {
            if !config.enabled {
                info!(index, "Skipping disabled path");
                continue;
            }

            let mut path = match Path::new(config.clone()) {
                Ok(path) => path,
                Err(err) => {
                    let name = config.name.clone().unwrap_or_else(|| format!("path{index}"));
                    error!(path = %name, error = %err, "Invalid path");
                    self.insert(name, Vec::new(), Vec::new(), Some(err.to_string()));
                    continue;
                }
            };

            let name = path.name().to_string();
            if self.paths.contains_key(&name) {
                error!(path = %name, "Path name is used more than once");
                continue;
            }

            let sources = path.source_names().map(str::to_string).collect();
            let destinations = path.destination_names().collect();
            match path.prepare(ctx, &self.nodes) {
                Ok(()) => {
                    self.insert(name, sources, destinations, None);
                    self.prepared.lock().push(path);
                }
                Err(err) => {
                    error!(path = %name, error = %err, "Failed to prepare path");
                    self.insert(name, sources, destinations, Some(err.to_string()));
                }
            }
        }
        Ok(self)
    }

    fn insert(&mut self, name: String, sources: Vec<String>, destinations: Vec<String>, error: Option<String>) {
        self.order.push(name.clone());
        self.paths.insert(
            name,
            PathEntry {
                sources,
                destinations,
                error,
                handle: None,
                report: None,
            },
        );
    }

    /// Start all nodes, then all prepared paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a node fails to start. Nodes started before it
    /// are stopped again.
    pub async fn start(&self) -> Result<(), SuperNodeError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Err(source) = node.start().await {
                for started in self.nodes[..i].iter().rev() {
                    if let Err(err) = started.stop().await {
                        warn!(node = %started.name(), error = %err, "Failed to stop node");
                    }
                }
                return Err(SuperNodeError::Start {
                    node: node.name().to_string(),
                    source,
                });
            }
            info!(node = %node.name(), kind = %node.kind(), "Started node");
        }

        let prepared = std::mem::take(&mut *self.prepared.lock());
        for path in prepared {
            let name = path.name().to_string();
            let result = path.start();
            if let Some(mut entry) = self.paths.get_mut(&name) {
                match result {
                    Ok(handle) => entry.handle = Some(handle),
                    Err(err) => {
                        error!(path = %name, error = %err, "Failed to start path");
                        entry.error = Some(err.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop all paths, draining their queues, then stop all nodes.
    pub async fn stop(&self) -> Vec<(String, ShutdownReport)> {
        let handles: Vec<PathHandle> = self
            .order
            .iter()
            .filter_map(|name| self.paths.get_mut(name).and_then(|mut e| e.handle.take()))
            .collect();

        let results = join_all(handles.into_iter().map(|handle| async move {
            let name = handle.name().to_string();
            (name, handle.stop().await)
        }))
        .await;

        let mut reports = Vec::with_capacity(results.len());
        for (name, result) in results {
            match result {
                Ok(report) => {
                    info!(path = %name, written = report.written, dropped = report.dropped, "Stopped path");
                    if let Some(mut entry) = self.paths.get_mut(&name) {
                        entry.report = Some(report);
                    }
                    reports.push((name, report));
                }
                Err(err) => error!(path = %name, error = %err, "Path ended abnormally"),
            }
        }

        for node in self.nodes.iter().rev() {
            if let Err(err) = node.stop().await {
                warn!(node = %node.name(), error = %err, "Failed to stop node");
            }
        }
        reports
    }

    /// Pause a running path.
    ///
    /// Returns `None` if no running path has that name.
    pub fn pause(&self, name: &str) -> Option<Result<(), PathError>> {
        let entry = self.paths.get(name)?;
        let result = entry.handle.as_ref().map(PathHandle::pause);
        result
    }

    /// Resume a paused path.
    pub fn resume(&self, name: &str) -> Option<Result<(), PathError>> {
        let entry = self.paths.get(name)?;
        let result = entry.handle.as_ref().map(PathHandle::resume);
        result
    }

    /// Status of every path, in configuration order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathInfo> {
        self.order
            .iter()
            .filter_map(|name| self.paths.get(name).map(|e| e.info(name)))
            .collect()
    }

    /// Status of one path.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<PathInfo> {
        self.paths.get(name).map(|e| e.info(name))
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .map(|node| NodeInfo {
                name: node.name().to_string(),
                kind: node.kind().to_string(),
                input_signals: node.input().signals.iter().map(|s| s.name.clone()).collect(),
                output_enabled: node.output().enabled,
            })
            .collect()
    }
}

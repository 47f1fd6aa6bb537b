//! Service topology input loading.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TopologyError, TopologyResult};
use crate::graph::ServiceGraph;

/// A single service's descriptor as read from the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub health: f64,
}

/// Load a topology file and build the graph it describes.
pub fn load(path: &Path) -> TopologyResult<ServiceGraph> {
    let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let descriptors: Vec<ServiceDescriptor> =
        serde_json::from_str(&text).map_err(|source| TopologyError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    Ok(ServiceGraph::build(descriptors)?)
}

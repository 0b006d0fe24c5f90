use std::fmt;

/// Container to create through the container engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub binds: Vec<String>,
    pub privileged: bool,
    pub network_mode: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

/// A single prune operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PruneTarget {
    Containers,
    Images { dangling_only: bool },
    Volumes,
    Networks,
}

impl fmt::Display for PruneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneTarget::Containers => f.write_str("containers"),
            PruneTarget::Images { dangling_only: true } => f.write_str("dangling images"),
            PruneTarget::Images { dangling_only: false } => f.write_str("images"),
            PruneTarget::Volumes => f.write_str("volumes"),
            PruneTarget::Networks => f.write_str("networks"),
        }
    }
}

//! Docker command-line collaborators: the raw container engine and the
//! Compose / Swarm orchestration backends.

pub mod cli;
pub mod compose;
pub mod engine;
pub mod swarm;

pub use cli::DockerCli;
pub use compose::ComposeBackend;
pub use engine::DockerEngine;
pub use swarm::SwarmBackend;

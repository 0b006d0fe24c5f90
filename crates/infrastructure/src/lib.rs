//! Concrete collaborators: the HTTP backend client and the Docker command
//! line engine and orchestration backends.

pub mod backend_client;
pub mod docker;

pub use backend_client::HttpBackendClient;
pub use docker::{ComposeBackend, DockerCli, DockerEngine, SwarmBackend};

mod client;
mod remote;

pub use client::{GitClient, RemoteRef, RepositoryInfo, SystemGit};
pub use remote::{fetch_states, RemoteState, RemoteStateRequest};

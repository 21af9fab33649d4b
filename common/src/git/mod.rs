// Git working-tree access

pub mod repository;
pub mod runner;
pub mod status;

pub use repository::{CommitIdentity, GitRepository, GitRepositoryOpener, Repository, RepositoryOpener};
pub use runner::GitRunner;

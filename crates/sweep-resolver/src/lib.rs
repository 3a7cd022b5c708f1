//! Workspace resolution for Sweep.
//!
//! Turns a batch spec plus live repository state into a deduplicated,
//! deterministically ordered list of per-repository workspaces, each
//! annotated with the command steps that apply to it.

pub mod http;
pub mod ignore;
pub mod limit;
pub mod partition;
pub mod resolver;

pub use http::HttpSearchClient;
pub use partition::{DirectoryFinder, find_workspaces};
pub use resolver::WorkspaceResolver;

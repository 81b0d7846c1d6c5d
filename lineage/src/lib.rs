//! Git-like project lineage (§4.11): traces a project's research/patent
//! ancestry backward through the graph, topologically orders it into
//! "commits", and groups those commits into branches.

pub mod branches;
pub mod commit;

pub use branches::{extract_branches, Branches};
pub use commit::{build_git_history, Commit};

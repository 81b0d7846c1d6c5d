//! Branch grouping over a commit list (§4.11 step 4), grounded on
//! `extract_branches` in `git_graph.py`: research papers open branches,
//! patents record which research branches they merge from, and projects
//! are the branch heads.

use crate::commit::Commit;
use pipeline_core::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Branches {
    pub research: Vec<String>,
    pub patent: Vec<String>,
    pub project: Vec<String>,
    pub branch_commits: HashMap<String, Vec<String>>,
}

/// Groups `commits` (already in timestamp order from `build_git_history`'s
/// topological sort) into research/patent/project branches.
pub fn extract_branches(commits: &[Commit]) -> Branches {
    let mut sorted: Vec<&Commit> = commits.iter().collect();
    sorted.sort_by_key(|c| c.timestamp);

    let mut branches = Branches::default();

    for commit in &sorted {
        if commit.node_type == NodeType::ResearchPaper {
            let branch_name = format!("research/{}", commit.id);
            branches.branch_commits.insert(branch_name.clone(), vec![commit.id.clone()]);
            branches.research.push(branch_name);
        }
    }

    for commit in &sorted {
        if commit.node_type != NodeType::Patent {
            continue;
        }
        let branch_name = format!("patent/{}", commit.id);
        branches.branch_commits.insert(branch_name.clone(), vec![commit.id.clone()]);
        branches.patent.push(branch_name);

        let parent_branches: Vec<String> = commit
            .parents
            .iter()
            .filter_map(|parent| branches.branch_commits.iter().find(|(_, commits)| commits.contains(parent)).map(|(name, _)| name.clone()))
            .collect();
        for parent_branch in parent_branches {
            branches.branch_commits.get_mut(&parent_branch).unwrap().push(commit.id.clone());
        }
    }

    for commit in &sorted {
        if commit.node_type == NodeType::Project {
            let branch_name = format!("project/{}", commit.id);
            branches.branch_commits.insert(branch_name.clone(), vec![commit.id.clone()]);
            branches.project.push(branch_name);
        }
    }

    branches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn commit(id: &str, node_type: NodeType, parents: &[&str]) -> Commit {
        Commit {
            id: id.to_string(),
            timestamp: Utc::now(),
            node_type,
            message: id.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            cid: None,
            author: "Unknown".to_string(),
            locality: String::new(),
            localities: Vec::new(),
            coordinates: None,
            in_seven_cities: false,
        }
    }

    #[test]
    fn patent_branch_records_its_research_parent_as_a_merge() {
        let commits =
            vec![commit("research_a", NodeType::ResearchPaper, &[]), commit("patent_b", NodeType::Patent, &["research_a"])];
        let branches = extract_branches(&commits);

        assert_eq!(branches.research, vec!["research/research_a".to_string()]);
        assert_eq!(branches.patent, vec!["patent/patent_b".to_string()]);
        assert_eq!(
            branches.branch_commits["research/research_a"],
            vec!["research_a".to_string(), "patent_b".to_string()]
        );
    }

    #[test]
    fn project_commit_opens_its_own_branch() {
        let commits = vec![commit("proj_c", NodeType::Project, &["patent_b"])];
        let branches = extract_branches(&commits);
        assert_eq!(branches.project, vec!["project/proj_c".to_string()]);
        assert_eq!(branches.branch_commits["project/proj_c"], vec!["proj_c".to_string()]);
    }
}

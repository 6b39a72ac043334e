use std::path::Path;

use git2::Repository;

/// Resolve the HEAD commit hash and current branch for a project path.
///
/// The path may be anywhere inside a working tree. Every failure mode
/// (no repository, detached/unborn HEAD, permission errors) maps to
/// `None`; capture must not depend on VCS state being readable.
pub fn probe_git_state(path: &Path) -> (Option<String>, Option<String>) {
    let Ok(repo) = Repository::discover(path) else {
        return (None, None);
    };

    let Ok(head) = repo.head() else {
        return (None, None);
    };

    let commit = head.peel_to_commit().ok().map(|c| c.id().to_string());
    let branch = head.shorthand().map(String::from);

    (commit, branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_repository_path_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(probe_git_state(dir.path()), (None, None));
    }
}

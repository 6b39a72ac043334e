use crate::records::StoredSnapshot;

/// Metadata-completeness score, 0-10.
///
/// Must stay in lockstep with the `snapshot_quality` view: ten binary
/// indicators, one point each. Dashboards depend on the exact rubric.
pub fn quality_score(snapshot: &StoredSnapshot) -> i32 {
    let summary_chars = snapshot
        .summary
        .as_deref()
        .map(|s| s.chars().count())
        .unwrap_or(0);

    let indicators = [
        summary_chars > 50,
        snapshot.embedding.is_some(),
        !snapshot.tags.is_empty(),
        !snapshot.mentioned_files.is_empty(),
        !snapshot.key_decisions.is_empty(),
        !snapshot.bugs_fixed.is_empty(),
        snapshot.git_commit_hash.is_some(),
        snapshot.session_id.is_some(),
        snapshot.message_count >= 5,
        summary_chars > 200,
    ];

    indicators.iter().filter(|&&hit| hit).count() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engram_types::Conversation;

    fn bare_snapshot() -> StoredSnapshot {
        StoredSnapshot {
            id: 1,
            project_path: "Code/demo".to_string(),
            session_id: None,
            transcript_path: None,
            captured_at: Utc::now(),
            trigger_event: "manual".to_string(),
            message_count: 0,
            raw_context: Conversation::default(),
            summary: None,
            embedding: None,
            tags: vec![],
            mentioned_files: vec![],
            key_decisions: vec![],
            bugs_fixed: vec![],
            git_commit_hash: None,
            git_branch: None,
            size_bytes: 0,
        }
    }

    #[test]
    fn test_empty_snapshot_scores_zero() {
        assert_eq!(quality_score(&bare_snapshot()), 0);
    }

    #[test]
    fn test_complete_snapshot_scores_ten() {
        let mut snapshot = bare_snapshot();
        snapshot.summary = Some("x".repeat(201));
        snapshot.embedding = Some(vec![0.0; 384]);
        snapshot.tags = vec!["bug-fix".to_string()];
        snapshot.mentioned_files = vec!["src/auth.js".to_string()];
        snapshot.key_decisions = vec!["use upserts".to_string()];
        snapshot.bugs_fixed = vec!["race".to_string()];
        snapshot.git_commit_hash = Some("abc123".to_string());
        snapshot.session_id = Some("S".to_string());
        snapshot.message_count = 5;
        assert_eq!(quality_score(&snapshot), 10);
    }

    #[test]
    fn test_short_summary_earns_one_point_not_two() {
        let mut snapshot = bare_snapshot();
        snapshot.summary = Some("x".repeat(100));
        assert_eq!(quality_score(&snapshot), 1);
    }

    #[test]
    fn test_summary_at_boundaries() {
        let mut snapshot = bare_snapshot();
        snapshot.summary = Some("x".repeat(50));
        assert_eq!(quality_score(&snapshot), 0);
        snapshot.summary = Some("x".repeat(200));
        assert_eq!(quality_score(&snapshot), 1);
    }

    #[test]
    fn test_message_count_boundary() {
        let mut snapshot = bare_snapshot();
        snapshot.message_count = 4;
        assert_eq!(quality_score(&snapshot), 0);
        snapshot.message_count = 5;
        assert_eq!(quality_score(&snapshot), 1);
    }
}

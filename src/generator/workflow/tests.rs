#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::generator::workflow::{TimingKeys, TimingScope, describe_report};
    use crate::scheduler::{TaskOutcome, TaskReport};

    #[test]
    fn test_timing_scope_records_phases_in_end_order() {
        let mut timing = TimingScope::new();
        timing.start_phase("outer");
        timing.start_phase(TimingKeys::FOLLOW_UP);
        std::thread::sleep(Duration::from_millis(5));
        assert!(timing.end_phase(TimingKeys::FOLLOW_UP).is_some());
        assert!(timing.end_phase("outer").is_some());

        let names: Vec<_> = timing
            .get_phase_durations()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["follow_up", "outer"]);
        assert!(timing.get_phase_durations()[0].1 >= Duration::from_millis(5));
        assert!(timing.get_total_duration() >= Duration::from_millis(5));
    }

    #[test]
    fn test_ending_unknown_phase() {
        let mut timing = TimingScope::default();
        assert!(timing.end_phase(TimingKeys::OUTPUT).is_none());
        assert!(timing.get_phase_durations().is_empty());
    }

    #[test]
    fn test_repeated_phase_names() {
        let mut timing = TimingScope::new();
        timing.start_phase("QuestionsGenerated");
        timing.end_phase("QuestionsGenerated");
        timing.start_phase("QuestionsGenerated");
        timing.end_phase("QuestionsGenerated");
        assert_eq!(timing.get_phase_durations().len(), 2);
    }

    #[test]
    fn test_timing_report() {
        let mut timing = TimingScope::new();
        assert!(!timing.generate_timing_report().contains("各阶段执行时间"));

        timing.start_phase(TimingKeys::OUTPUT);
        timing.end_phase(TimingKeys::OUTPUT);
        let report = timing.generate_timing_report();
        assert!(report.starts_with("总执行时间: "));
        assert!(report.contains("各阶段执行时间:"));
        assert!(report.contains("- output: "));
    }

    #[test]
    fn test_describe_report() {
        let completed = TaskReport {
            node_id: "search_1".to_string(),
            query: "What is X?".to_string(),
            outcome: TaskOutcome::Completed {
                reference_ids: vec!["a".to_string(), "b".to_string()],
            },
        };
        assert_eq!(describe_report(&completed), "   ✅ What is X? (2 条结果)");

        let failed = TaskReport {
            outcome: TaskOutcome::Failed {
                error: "cancelled".to_string(),
            },
            ..completed.clone()
        };
        assert_eq!(describe_report(&failed), "   ❌ What is X? (cancelled)");

        let skipped = TaskReport {
            outcome: TaskOutcome::Skipped,
            ..completed
        };
        assert_eq!(describe_report(&skipped), "   ⏭️ 已跳过: What is X?");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::generator::conversation::Conversation;
    use crate::generator::outlet::{
        CONVERSATION_FILE, DiskOutlet, GRAPH_FILE, Outlet, REPORT_FILE, ResearchArtifacts,
    };
    use crate::generator::research::ResearchOutcome;
    use crate::graph::{GraphStore, ROOT_NODE_ID, serializer};
    use crate::test_support::ScriptedGenerator;

    fn outcome() -> ResearchOutcome {
        let graph = Arc::new(GraphStore::new());
        graph.add_root_node("topic").unwrap();
        ResearchOutcome {
            final_report: "# Report\n\nBody.".to_string(),
            graph,
        }
    }

    #[tokio::test]
    async fn test_saves_report_and_graph() {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = temp_dir.path().join("nested").join("out");
        let outlet = DiskOutlet::new(&output_dir);
        assert_eq!(outlet.output_dir(), output_dir.as_path());

        let outcome = outcome();
        outlet
            .save(&ResearchArtifacts {
                outcome: &outcome,
                conversation: None,
            })
            .await
            .unwrap();

        let report = std::fs::read_to_string(output_dir.join(REPORT_FILE)).unwrap();
        assert_eq!(report, "# Report\n\nBody.");

        let graph = serializer::load_from_file(&output_dir.join(GRAPH_FILE))
            .await
            .unwrap();
        assert_eq!(graph.root().unwrap().id, ROOT_NODE_ID);
        assert!(!output_dir.join(CONVERSATION_FILE).exists());
    }

    #[tokio::test]
    async fn test_saves_conversation_when_present() {
        let temp_dir = TempDir::new().unwrap();
        let outlet = DiskOutlet::new(temp_dir.path());
        let outcome = outcome();
        let generator = Arc::new(ScriptedGenerator::new());
        let mut conversation = Conversation::from_outcome(generator.clone(), &outcome);
        conversation.ask("Why?").await.unwrap();

        outlet
            .save(&ResearchArtifacts {
                outcome: &outcome,
                conversation: Some(&conversation),
            })
            .await
            .unwrap();

        let restored =
            Conversation::load_from_file(generator, &temp_dir.path().join(CONVERSATION_FILE))
                .await
                .unwrap();
        assert_eq!(restored.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let outlet = DiskOutlet::new(blocker.join("out"));
        let outcome = outcome();
        let result = outlet
            .save(&ResearchArtifacts {
                outcome: &outcome,
                conversation: None,
            })
            .await;
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::errors::GraphError;
    use crate::graph::{EdgeState, GraphStore, NodeKind, ROOT_NODE_ID};
    use crate::scheduler::{CANCELLED_MARKER, SearchTask, TaskOutcome, TaskScheduler};
    use crate::search::SearchOptions;
    use crate::test_support::FakeSearcher;

    /// 根节点下挂若干Search节点，返回对应任务
    fn graph_with_queries(queries: &[&str]) -> (Arc<GraphStore>, Vec<SearchTask>) {
        let graph = Arc::new(GraphStore::new());
        graph.add_root_node("topic").unwrap();
        let tasks = queries
            .iter()
            .map(|q| {
                let id = graph
                    .add_child_node(ROOT_NODE_ID, NodeKind::Search, q)
                    .unwrap();
                SearchTask::new(id, *q)
            })
            .collect();
        (graph, tasks)
    }

    fn scheduler(graph: &Arc<GraphStore>, searcher: &Arc<FakeSearcher>) -> TaskScheduler {
        TaskScheduler::new(
            Arc::clone(graph),
            Arc::clone(searcher) as Arc<dyn crate::search::WebSearcher>,
            SearchOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_batch_completes_every_task() {
        let (graph, tasks) = graph_with_queries(&["a?", "b?", "c?"]);
        let searcher = Arc::new(FakeSearcher::new(2));

        let summary = scheduler(&graph, &searcher)
            .run_batch(tasks.clone(), 3)
            .await
            .unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded(), 3);
        assert!(!summary.all_failed());
        assert_eq!(graph.reference_count(), 6);

        for task in tasks {
            let node = graph.get_node(&task.node_id).unwrap();
            let response = node.result.as_ref().unwrap().as_search().unwrap();
            assert_eq!(response.query, task.query);
            assert_eq!(node.reference_ids.len(), 2);
            assert_eq!(
                graph.edge_into(&task.node_id).unwrap().state,
                EdgeState::Completed
            );
            // 引用按搜索结果顺序登记
            let titles: Vec<_> = graph
                .get_references_of(&task.node_id)
                .unwrap()
                .into_iter()
                .map(|r| r.title)
                .collect();
            assert_eq!(
                titles,
                vec![format!("{} result 1", task.query), format!("{} result 2", task.query)]
            );
        }
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let queries = ["q1?", "q2?", "q3?", "q4?", "q5?", "q6?", "q7?"];
        for max_parallel in [1, 2, 3] {
            let (graph, tasks) = graph_with_queries(&queries);
            let searcher = Arc::new(FakeSearcher::new(1).with_delay(Duration::from_millis(20)));

            let summary = scheduler(&graph, &searcher)
                .run_batch(tasks, max_parallel)
                .await
                .unwrap();

            assert_eq!(summary.succeeded(), queries.len());
            assert_eq!(searcher.max_in_flight(), max_parallel);
        }
    }

    #[tokio::test]
    async fn test_zero_parallelism_still_runs() {
        let (graph, tasks) = graph_with_queries(&["a?", "b?"]);
        let searcher = Arc::new(FakeSearcher::new(1));
        let summary = scheduler(&graph, &searcher)
            .run_batch(tasks, 0)
            .await
            .unwrap();
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(searcher.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_serial_batch_starts_in_fifo_order() {
        let queries = ["first?", "second?", "third?", "fourth?"];
        let (graph, tasks) = graph_with_queries(&queries);
        let searcher = Arc::new(FakeSearcher::new(1));

        scheduler(&graph, &searcher)
            .run_batch(tasks, 1)
            .await
            .unwrap();

        assert_eq!(searcher.started(), queries.to_vec());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (graph, _) = graph_with_queries(&[]);
        let searcher = Arc::new(FakeSearcher::new(1));
        let summary = scheduler(&graph, &searcher)
            .run_batch(Vec::new(), 4)
            .await
            .unwrap();
        assert_eq!(summary.total(), 0);
        assert!(!summary.all_failed());
        assert!(searcher.started().is_empty());
    }

    #[tokio::test]
    async fn test_progress_follows_completion_order() {
        let (graph, tasks) = graph_with_queries(&["slow?", "fast?"]);
        let searcher = Arc::new(
            FakeSearcher::new(1).with_query_delay("slow?", Duration::from_millis(100)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = scheduler(&graph, &searcher)
            .with_progress(tx)
            .run_batch(tasks, 2)
            .await
            .unwrap();

        let mut streamed = Vec::new();
        while let Ok(report) = rx.try_recv() {
            streamed.push(report.query);
        }
        assert_eq!(streamed, vec!["fast?", "slow?"]);
        let summarized: Vec<_> = summary.reports.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(summarized, vec!["fast?", "slow?"]);
    }

    #[tokio::test]
    async fn test_failed_search_is_marked_and_batch_continues() {
        let (graph, tasks) = graph_with_queries(&["good?", "bad?", "fine?"]);
        let searcher = Arc::new(FakeSearcher::new(1).failing_on("bad?"));

        let summary = scheduler(&graph, &searcher)
            .run_batch(tasks.clone(), 2)
            .await
            .unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_failed());

        let bad = &tasks[1];
        let node = graph.get_node(&bad.node_id).unwrap();
        let error = node.result.as_ref().unwrap().error().unwrap();
        assert!(error.contains("upstream error for bad?"));
        assert!(node.reference_ids.is_empty());
        assert_eq!(
            graph.edge_into(&bad.node_id).unwrap().state,
            EdgeState::Completed
        );
        assert_eq!(graph.reference_count(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_batch() {
        let (graph, tasks) = graph_with_queries(&["a?", "b?"]);
        let searcher = Arc::new(FakeSearcher::new(1).failing_always());

        let summary = scheduler(&graph, &searcher)
            .run_batch(tasks, 2)
            .await
            .unwrap();
        assert_eq!(summary.failed(), 2);
        assert!(summary.all_failed());
    }

    #[tokio::test]
    async fn test_cancellation_marks_in_flight_and_skips_queued() {
        let (graph, tasks) = graph_with_queries(&["running?", "queued-1?", "queued-2?"]);
        let searcher = Arc::new(FakeSearcher::new(1).with_delay(Duration::from_secs(5)));
        let token = CancellationToken::new();
        let scheduler = scheduler(&graph, &searcher).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let summary = scheduler.run_batch(tasks.clone(), 1).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 2);
        // 跳过的任务不计入失败比例
        assert!(summary.all_failed());

        let running = graph.get_node(&tasks[0].node_id).unwrap();
        assert_eq!(running.result.unwrap().error(), Some(CANCELLED_MARKER));
        assert_eq!(
            graph.edge_into(&tasks[0].node_id).unwrap().state,
            EdgeState::Completed
        );

        for queued in &tasks[1..] {
            assert!(graph.get_node(&queued.node_id).unwrap().result.is_none());
            assert_eq!(
                graph.edge_into(&queued.node_id).unwrap().state,
                EdgeState::Pending
            );
        }
        assert_eq!(searcher.started(), vec!["running?"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let (graph, tasks) = graph_with_queries(&["a?", "b?"]);
        let searcher = Arc::new(FakeSearcher::new(1));
        let scheduler = scheduler(&graph, &searcher);
        scheduler.cancellation_token().cancel();

        let summary = scheduler.run_batch(tasks, 2).await.unwrap();
        assert_eq!(summary.skipped(), 2);
        assert!(!summary.all_failed());
        assert!(searcher.started().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_task_rejected_before_start() {
        let (graph, tasks) = graph_with_queries(&["a?"]);
        let searcher = Arc::new(FakeSearcher::new(1));
        let duplicated = vec![tasks[0].clone(), tasks[0].clone()];

        let err = scheduler(&graph, &searcher)
            .run_batch(duplicated, 2)
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask(tasks[0].node_id.clone()));
        assert!(searcher.started().is_empty());
        assert_eq!(
            graph.edge_into(&tasks[0].node_id).unwrap().state,
            EdgeState::Pending
        );
    }

    #[tokio::test]
    async fn test_non_search_and_unknown_nodes_rejected() {
        let (graph, mut tasks) = graph_with_queries(&["a?"]);
        let response_id = graph
            .add_child_node(&tasks[0].node_id, NodeKind::Response, "a?")
            .unwrap();
        let searcher = Arc::new(FakeSearcher::new(1));

        tasks.push(SearchTask::new(response_id.clone(), "a?"));
        let err = scheduler(&graph, &searcher)
            .run_batch(tasks, 2)
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::NotSearchNode(response_id));

        let err = scheduler(&graph, &searcher)
            .run_batch(vec![SearchTask::new("ghost", "?")], 1)
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownNode("ghost".to_string()));
        assert!(searcher.started().is_empty());
    }

    #[tokio::test]
    async fn test_completed_task_cannot_run_again() {
        let (graph, tasks) = graph_with_queries(&["a?"]);
        let searcher = Arc::new(FakeSearcher::new(1));
        scheduler(&graph, &searcher)
            .run_batch(tasks.clone(), 1)
            .await
            .unwrap();

        let err = scheduler(&graph, &searcher)
            .run_batch(tasks.clone(), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::EdgeNotPending {
                node_id: tasks[0].node_id.clone(),
                state: EdgeState::Completed,
            }
        );
        assert_eq!(searcher.started().len(), 1);
    }

    #[tokio::test]
    async fn test_task_outcome_carries_reference_ids() {
        let (graph, tasks) = graph_with_queries(&["a?"]);
        let searcher = Arc::new(FakeSearcher::new(3));
        let summary = scheduler(&graph, &searcher)
            .run_batch(tasks.clone(), 1)
            .await
            .unwrap();

        match &summary.reports[0].outcome {
            TaskOutcome::Completed { reference_ids } => {
                assert_eq!(
                    reference_ids,
                    &graph.get_node(&tasks[0].node_id).unwrap().reference_ids
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

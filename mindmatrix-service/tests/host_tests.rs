//! Integration tests for the MindMatrix host

#[cfg(test)]
mod tests {
    use mindmatrix_service::demo::{FIXED_ANSWER, SIMPLE_WORKFLOW, THINKING_NOTE};
    use mindmatrix_service::{
        relay, ChatRequest, DemoPlugin, HandlerKind, HostFrame, Message, MindMatrix,
    };
    use futures::stream;
    use mm_core::{Error, Event, MindMatrixConfig, StepInput};
    use mm_plugins::{EchoAgent, EchoConfig, FactoryContext};
    use mm_workflows::{executor_fn, RunEvent, RunStatus, Step, Workflow};
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const LIMIT: Duration = Duration::from_secs(10);

    fn host_with_demo(seed: u64) -> MindMatrix {
        let mut config = MindMatrixConfig::default();
        config.plugins.enable_plugins = true;
        config.service.default_workflow = Some(SIMPLE_WORKFLOW.to_string());
        let mm = MindMatrix::new(config).with_plugin(Arc::new(DemoPlugin::seeded(seed)));
        mm.start().unwrap();
        mm
    }

    async fn frames_of(mm: &MindMatrix, kind: HandlerKind, name: &str, input: &str) -> Vec<HostFrame> {
        let handle = mm.run(kind, name, input).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let relay_task = tokio::spawn(relay(handle, tx));

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        relay_task.await.unwrap();
        frames
    }

    fn deltas(frames: &[HostFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                HostFrame::Stream { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_agent_run_streams_deltas() {
        let mm = host_with_demo(1);
        let frames = timeout(
            LIMIT,
            frames_of(&mm, HandlerKind::Agent, "echo", "stream me please"),
        )
        .await
        .unwrap();

        assert_eq!(deltas(&frames), "stream me please");
        match frames.last() {
            Some(HostFrame::Done {
                status, content, ..
            }) => {
                assert_eq!(*status, RunStatus::Completed);
                assert_eq!(content, "stream me please");
            }
            other => panic!("expected done frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_simple_workflow_takes_both_branches() {
        let mm = host_with_demo(42);
        let mut stopped = 0;
        let mut chatted = 0;

        for _ in 0..40 {
            let frames = timeout(
                LIMIT,
                frames_of(&mm, HandlerKind::Workflow, SIMPLE_WORKFLOW, "hello there"),
            )
            .await
            .unwrap();

            match frames.last() {
                Some(HostFrame::Done {
                    status: RunStatus::Stopped,
                    content,
                    ..
                }) => {
                    assert_eq!(content, FIXED_ANSWER);
                    assert_eq!(deltas(&frames), THINKING_NOTE);
                    stopped += 1;
                }
                Some(HostFrame::Done {
                    status: RunStatus::Completed,
                    content,
                    ..
                }) => {
                    assert_eq!(content, "hello there");
                    assert_eq!(deltas(&frames), "hello there");
                    chatted += 1;
                }
                other => panic!("unexpected final frame {:?}", other),
            }
        }

        assert!(stopped > 0, "stop branch never taken");
        assert!(chatted > 0, "chat branch never taken");
    }

    #[tokio::test]
    async fn test_chat_request_uses_last_user_message() {
        let mm = host_with_demo(7);
        let request = ChatRequest::new(
            "echo",
            vec![
                Message::user("old question"),
                Message::assistant("old answer"),
                Message::user("new question"),
            ],
        );

        let run = mm.chat(HandlerKind::Workflow, request).unwrap();
        assert!(!run.session_id.is_empty());
        let (events, outcome) = timeout(LIMIT, run.handle.collect()).await.unwrap();

        assert_eq!(outcome.content_text(), "new question");
        assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
        assert!(events.last().unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_chat_falls_back_to_default_workflow() {
        let mm = host_with_demo(7);
        let mut request = ChatRequest::new("", vec![Message::user("hi")]);
        request.session_id = Some("session-1".to_string());

        let run = mm.chat(HandlerKind::Workflow, request).unwrap();
        assert_eq!(run.session_id, "session-1");
        assert_eq!(run.handle.workflow(), SIMPLE_WORKFLOW);
        let outcome = timeout(LIMIT, run.handle.wait()).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_chat_without_user_message_rejected() {
        let mm = host_with_demo(7);
        let request = ChatRequest::new("echo", vec![Message::assistant("nothing to answer")]);
        assert!(matches!(
            mm.chat(HandlerKind::Workflow, request),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_workflow_not_found() {
        let mm = host_with_demo(7);
        assert!(matches!(
            mm.run(HandlerKind::Workflow, "ghost", "x"),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_sink_cancels_run() {
        let mut config = MindMatrixConfig::default();
        config.plugins.enable_builtins = false;
        let mm = MindMatrix::new(config);
        mm.register_agent_factory(
            "slow_echo",
            |ctx: &FactoryContext<'_>, config: &EchoConfig| {
                Ok(Arc::new(EchoAgent::new(ctx.name(), config)) as Arc<dyn mm_core::Agent>)
            },
            EchoConfig { delay_ms: 20 },
        )
        .unwrap();
        mm.start().unwrap();

        let input = vec!["word"; 100].join(" ");
        let handle = mm.run(HandlerKind::Agent, "slow_echo", input).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let relay_task = tokio::spawn(relay(handle, tx));

        let first = timeout(LIMIT, rx.recv()).await.unwrap();
        assert!(matches!(first, Some(HostFrame::Stream { .. })));
        drop(rx);

        let outcome = timeout(LIMIT, relay_task).await.unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error.unwrap().kind, "cancelled");
    }

    #[tokio::test]
    async fn test_closed_sink_cancels_silent_run() {
        let mut config = MindMatrixConfig::default();
        config.plugins.enable_builtins = false;
        let mm = MindMatrix::new(config);
        mm.register_workflow_factory("waiting", |ctx| {
            let step = Step::executor(
                "await_model",
                executor_fn(|_input: StepInput| stream::pending::<mm_core::Result<Event>>()),
            )?;
            Workflow::new(ctx.name(), vec![step])
        })
        .unwrap();
        mm.start().unwrap();

        let handle = mm.run(HandlerKind::Workflow, "waiting", "hello").unwrap();
        let (tx, rx) = mpsc::channel(8);
        let relay_task = tokio::spawn(relay(handle, tx));
        drop(rx);

        let outcome = timeout(Duration::from_secs(2), relay_task)
            .await
            .expect("relay should return once the client is gone")
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error.unwrap().kind, "cancelled");
    }

    #[tokio::test]
    async fn test_config_file_drives_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[plugins]\nenable_builtins = false\nenable_plugins = true\n\n[engine]\nstep_timeout_secs = 30"
        )
        .unwrap();
        let config = MindMatrixConfig::load(file.path()).unwrap();

        let mm = MindMatrix::new(config).with_plugin(Arc::new(DemoPlugin::seeded(1)));
        mm.start().unwrap();
        assert_eq!(mm.engine().step_timeout(), Duration::from_secs(30));
        assert_eq!(mm.registry().agent_names(), vec!["chatter"]);
        assert_eq!(mm.registry().workflow_names(), vec![SIMPLE_WORKFLOW]);
    }
}

//! End-to-end behavior of a provider behind the tool-use interceptor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use toolstream::{ToolUseConfig, ToolUseInterceptor};
use toolstream_core::intercept::{NoOp, Retry, Timeout};
use toolstream_core::mock::{MockError, MockProvider};
use toolstream_core::test_helpers::{
    collect_result, collect_stream_results, done_chunk, joined_text, mock_provider, sample_tool,
    text_chunks,
};
use toolstream_core::{
    Chunk, CompletionContext, CompletionParams, CompletionPipeline, LlmError, Provider,
    ToolCallDescriptor,
};

fn params_with(tools: &[&str]) -> CompletionParams {
    CompletionParams {
        system: Some("You are helpful.".into()),
        tools: Some(tools.iter().map(|id| sample_tool(id)).collect()),
        ..Default::default()
    }
}

fn pipeline(mock: &Arc<MockProvider>) -> CompletionPipeline {
    CompletionPipeline::new(mock.clone()).with(ToolUseInterceptor::default())
}

fn tool_calls(chunks: &[Chunk]) -> Vec<&ToolCallDescriptor> {
    chunks
        .iter()
        .filter_map(|chunk| match chunk {
            Chunk::ToolCallsCreated { calls } => Some(calls),
            _ => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn ordering_is_preserved() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&[
        "a",
        r#"<tool_call>{"name":"x","arguments":{}}</tool_call>"#,
        "b",
    ]));

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    assert!(result.is_streamed());
    let chunks = collect_result(result).await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], Chunk::text("a"));
    let Chunk::ToolCallsCreated { calls } = &chunks[1] else {
        panic!("expected tool calls, got {:?}", chunks[1]);
    };
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool_id, "x");
    assert_eq!(calls[0].arguments, json!({}));
    assert_eq!(chunks[2], Chunk::text("b"));
}

#[tokio::test]
async fn no_tools_passes_chunks_through_byte_identical() {
    let input = vec![
        Chunk::text("keep <tool_call>{\"name\":\"x\"}</tool_call> as is"),
        Chunk::text(""),
        done_chunk(),
    ];
    let mock = Arc::new(mock_provider());
    mock.queue_stream(input.clone());

    let params = CompletionParams {
        system: Some("plain".into()),
        ..Default::default()
    };
    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params)
        .await
        .unwrap();

    assert_eq!(collect_result(result).await, input);
    assert_eq!(mock.recorded_calls(), vec![params]);
}

#[tokio::test]
async fn unknown_tool_dropped_and_valid_tool_kept() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&[
        "<tool_call>\n",
        r#"[{"name":"missing","arguments":{}},"#,
        r#"{"name":"weather","arguments":{"city":"Oslo"}}]"#,
        "\n</tool_call>",
    ]));

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["weather"]))
        .await
        .unwrap();
    let chunks = collect_result(result).await;

    let calls = tool_calls(&chunks);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool_id, "weather");
    assert_eq!(calls[0].arguments, json!({"city": "Oslo"}));
    assert_eq!(calls[0].raw_matched_tool, sample_tool("weather"));
    assert_eq!(joined_text(&chunks), "");
}

#[tokio::test]
async fn fragmented_tags_never_leak_into_text() {
    let text = "Checking.<tool_call>{\"name\":\"x\",\"arguments\":{\"n\":1}}</tool_call>Done.";
    let fragments: Vec<&str> = text
        .char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect();
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&fragments));

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    let chunks = collect_result(result).await;

    assert_eq!(joined_text(&chunks), "Checking.Done.");
    assert_eq!(tool_calls(&chunks).len(), 1);
    let texts: Vec<&str> = chunks.iter().filter_map(Chunk::as_text).collect();
    assert!(texts.iter().all(|t| !t.contains('<')), "{texts:?}");
}

#[tokio::test]
async fn system_prompt_injected_and_tools_stripped() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(Vec::new());

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x", "y"]))
        .await
        .unwrap();
    let _ = collect_result(result).await;

    let sent = mock.recorded_calls();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].tools.is_none());
    let system = sent[0].system.as_deref().unwrap();
    assert!(system.contains("<tool_call>"));
    assert!(system.contains(r#""name":"x""#));
    assert!(system.contains(r#""name":"y""#));
    assert!(system.ends_with("You are helpful."));
}

#[tokio::test]
async fn tools_forwarded_when_injection_disabled() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(Vec::new());
    let interceptor = ToolUseInterceptor::new(ToolUseConfig {
        inject_system_prompt: false,
        ..Default::default()
    })
    .unwrap();

    let params = params_with(&["x"]);
    let _ = CompletionPipeline::new(mock.clone())
        .with(interceptor)
        .complete(&CompletionContext::new(), &params)
        .await
        .unwrap();

    assert_eq!(mock.recorded_calls(), vec![params]);
}

#[tokio::test]
async fn materialized_results_are_transformed() {
    let mock = Arc::new(mock_provider());
    mock.queue_materialized(vec![
        Chunk::text("Sure.<tool_call>{\"name\":\"x\"}</tool_call>"),
        done_chunk(),
    ]);

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    assert!(!result.is_streamed());

    let chunks = collect_result(result).await;
    assert_eq!(chunks[0], Chunk::text("Sure."));
    assert_eq!(tool_calls(&chunks).len(), 1);
    assert_eq!(chunks.last(), Some(&done_chunk()));
}

#[tokio::test]
async fn unterminated_tag_recovered_on_clean_end() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&[
        "ok <tool_call>{\"name\":\"x\",",
        "\"arguments\":{}}",
    ]));

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    let chunks = collect_result(result).await;

    assert_eq!(chunks[0], Chunk::text("ok "));
    assert_eq!(tool_calls(&chunks).len(), 1);
}

#[tokio::test]
async fn mid_stream_error_propagates_without_partial_calls() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream_results(vec![
        Ok(Chunk::text("start <tool_call>{\"name\":\"x\"}")),
        Err(MockError::Http {
            status: None,
            message: "bad gateway".into(),
            retryable: true,
        }),
    ]);

    let result = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    let items = collect_stream_results(result.into_stream()).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), &Chunk::text("start "));
    assert!(matches!(items[1], Err(LlmError::Http { .. })));
}

#[tokio::test]
async fn setup_error_reaches_caller() {
    let mock = Arc::new(mock_provider());
    mock.queue_error(MockError::Auth("expired".into()));

    let err = pipeline(&mock)
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Auth(_)));
}

#[tokio::test]
async fn cancellation_stops_the_stream() {
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&["first", " second", " third"]));

    let ctx = CompletionContext::new();
    let mut stream = pipeline(&mock)
        .complete(&ctx, &params_with(&["x"]))
        .await
        .unwrap()
        .into_stream();

    assert_eq!(stream.next().await.unwrap().unwrap(), Chunk::text("first"));
    ctx.cancellation.cancel();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn retry_wraps_setup_then_extraction_runs() {
    let mock = Arc::new(mock_provider());
    mock.queue_error(MockError::Provider {
        code: "overloaded".into(),
        message: "try again".into(),
        retryable: true,
    });
    mock.queue_stream(text_chunks(&["<tool_call>{\"name\":\"x\"}</tool_call>"]));

    let pipeline = CompletionPipeline::new(mock.clone())
        .with(Retry::new(3, Duration::from_millis(1)))
        .with(Timeout::new(Duration::from_secs(5)))
        .with(ToolUseInterceptor::default());

    let result = pipeline
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();
    let chunks = collect_result(result).await;

    assert_eq!(mock.recorded_calls().len(), 2);
    assert_eq!(tool_calls(&chunks).len(), 1);
}

#[tokio::test]
async fn outer_interceptors_see_the_transformed_result() {
    use std::future::Future;
    use std::pin::Pin;
    use toolstream_core::CompletionResult;
    use toolstream_core::intercept::{CompletionCall, Interceptor, Next};

    struct CountToolEvents(Arc<AtomicUsize>);

    impl Interceptor<CompletionCall> for CountToolEvents {
        fn intercept<'a>(
            &'a self,
            ctx: &'a CompletionContext,
            params: &'a CompletionParams,
            next: Next<'a, CompletionCall>,
        ) -> Pin<Box<dyn Future<Output = Result<CompletionResult, LlmError>> + Send + 'a>> {
            Box::pin(async move {
                let chunks = next.run(ctx, params).await?.collect().await?;
                let found = chunks
                    .iter()
                    .filter(|c| matches!(c, Chunk::ToolCallsCreated { .. }))
                    .count();
                self.0.fetch_add(found, Ordering::SeqCst);
                Ok(CompletionResult::Materialized(chunks))
            })
        }
    }

    let seen = Arc::new(AtomicUsize::new(0));
    let mock = Arc::new(mock_provider());
    mock.queue_stream(text_chunks(&["<tool_call>{\"name\":\"x\"}</tool_call>"]));

    let pipeline = CompletionPipeline::new(mock)
        .with(CountToolEvents(Arc::clone(&seen)))
        .with(NoOp)
        .with(ToolUseInterceptor::default());
    let _ = pipeline
        .complete(&CompletionContext::new(), &params_with(&["x"]))
        .await
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

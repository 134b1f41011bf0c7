mod common;

use analysis_relay::{
    AttemptOutcome, CallError, CallKind, InvocationEvent, MemorySink, RecordingSleeper,
    ResilientInvoker, RetryPolicyBuilder, SentimentAnalysisRequest, StockAnalysisRequest,
    WireResponse,
};
use common::{minimal_config, refused, scripted, sentiment_body, stock_body, TestTransport};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn invoker(transport: TestTransport, sleeper: RecordingSleeper, sink: MemorySink) -> ResilientInvoker<TestTransport> {
    let config = Arc::new(minimal_config("http://analysis.test:5000"));
    let retry = RetryPolicyBuilder::from_settings(config.retry())
        .unwrap()
        .with_sleeper(sleeper)
        .with_events(sink)
        .build()
        .unwrap();
    ResilientInvoker::with_transport(config, transport).unwrap().with_retry_policy(retry)
}

#[tokio::test]
async fn three_transport_failures_wait_one_then_two_seconds() {
    let (transport, calls) = scripted(|_| Err(refused(CallKind::AnalyzeStock)));
    let sleeper = RecordingSleeper::new();
    let invoker = invoker(transport, sleeper.clone(), MemorySink::new());

    let err = invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
    match err {
        CallError::ServiceUnavailable { kind, attempts, last } => {
            assert_eq!(kind, CallKind::AnalyzeStock);
            assert_eq!(attempts, 3);
            assert!(last.is_retryable());
        }
        other => panic!("expected ServiceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn recovers_when_a_later_attempt_succeeds() {
    let (transport, calls) = scripted(|attempt| {
        if attempt == 1 {
            Err(refused(CallKind::AnalyzeSentiment))
        } else {
            Ok(WireResponse::new(200, sentiment_body()))
        }
    });
    let sleeper = RecordingSleeper::new();
    let invoker = invoker(transport, sleeper.clone(), MemorySink::new());

    let response = invoker
        .analyze_sentiment(&SentimentAnalysisRequest::new("白酒板块今日放量上涨"))
        .await
        .unwrap();

    assert_eq!(response.overall_sentiment, "POSITIVE");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
}

#[tokio::test]
async fn server_error_is_fatal_on_first_attempt() {
    let (transport, calls) = scripted(|_| Ok(WireResponse::new(500, "Internal Server Error")));
    let sleeper = RecordingSleeper::new();
    let invoker = invoker(transport, sleeper.clone(), MemorySink::new());

    let err = invoker.analyze_stock(&StockAnalysisRequest::quick("000001")).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn empty_object_for_stock_is_fatal_without_retry() {
    let (transport, calls) = scripted(|_| Ok(WireResponse::new(200, "{}")));
    let sink = MemorySink::new();
    let invoker = invoker(transport, RecordingSleeper::new(), sink.clone());

    let err = invoker.analyze_stock(&StockAnalysisRequest::quick("000001")).await.unwrap_err();

    assert!(matches!(err, CallError::InvalidBody { kind: CallKind::AnalyzeStock, .. }), "{err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        sink.events().iter().filter(|e| matches!(e, InvocationEvent::Backoff { .. })).count(),
        0
    );
}

#[tokio::test]
async fn empty_body_is_fatal() {
    let (transport, calls) = scripted(|_| Ok(WireResponse::new(200, "")));
    let invoker = invoker(transport, RecordingSleeper::new(), MemorySink::new());

    let err = invoker
        .analyze_sentiment(&SentimentAnalysisRequest::new("content"))
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::InvalidBody { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn null_lists_in_a_2xx_answer_still_decode() {
    let (transport, calls) = scripted(|attempt| {
        let body = if attempt == 1 {
            serde_json::json!({
                "stockCode": "600519",
                "currentPrice": 10.0,
                "analysisResult": {"recommendation": "HOLD", "keyFactors": null},
                "technicalIndicators": null,
                "predictions": null
            })
        } else {
            serde_json::json!({
                "overallSentiment": "POSITIVE",
                "sentimentScore": 0.3,
                "keywordSentiments": null,
                "hotTopics": null,
                "sentimentTrends": null
            })
        };
        Ok(WireResponse::new(200, body.to_string()))
    });
    let invoker = invoker(transport, RecordingSleeper::new(), MemorySink::new());

    let stock = invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await.unwrap();
    assert!(stock.analysis_result.key_factors.is_empty());
    assert!(stock.predictions.is_empty());

    let sentiment = invoker
        .analyze_sentiment(&SentimentAnalysisRequest::new("content"))
        .await
        .unwrap();
    assert!(sentiment.keyword_sentiments.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pool_exhaustion_is_retried_like_a_transport_failure() {
    let (transport, calls) = scripted(|attempt| {
        if attempt < 3 {
            Err(CallError::PoolExhausted { kind: CallKind::AnalyzeStock, waited: Duration::from_millis(500) })
        } else {
            Ok(WireResponse::new(200, stock_body()))
        }
    });
    let invoker = invoker(transport, RecordingSleeper::new(), MemorySink::new());

    let response = invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await.unwrap();

    assert_eq!(response.stock_name.as_deref(), Some("贵州茅台"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn encode_failure_never_reaches_the_transport() {
    let (transport, calls) = scripted(|_| Ok(WireResponse::new(200, stock_body())));
    let invoker = invoker(transport, RecordingSleeper::new(), MemorySink::new());

    let mut bad = std::collections::HashMap::new();
    bad.insert(vec![1u8], "non-string keys cannot be JSON object keys");

    let err = invoker
        .invoke::<_, serde_json::Value>(CallKind::AnalyzeStock, &bad)
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Encode { .. }), "{err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn attempt_events_carry_outcome_and_delay() {
    let (transport, _) = scripted(|attempt| {
        if attempt == 1 {
            Err(refused(CallKind::AnalyzeStock))
        } else {
            Ok(WireResponse::new(200, stock_body()))
        }
    });
    let sink = MemorySink::new();
    let invoker = invoker(transport, RecordingSleeper::new(), sink.clone());

    invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await.unwrap();

    let attempts: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            InvocationEvent::Attempt { attempt, delay_before, outcome, .. } => {
                Some((attempt, delay_before, outcome))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        attempts,
        vec![
            (1, Duration::ZERO, AttemptOutcome::Retryable),
            (2, Duration::from_millis(1000), AttemptOutcome::Success),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn call_deadline_cuts_off_a_failing_call() {
    let config = Arc::new(
        analysis_relay::TransportConfig::builder("http://analysis.test:5000")
            .retry(analysis_relay::RetrySettings { max_attempts: 10, ..Default::default() })
            .call_deadline(Duration::from_millis(2500))
            .build()
            .unwrap(),
    );
    let (transport, calls) = scripted(|_| Err(refused(CallKind::AnalyzeStock)));
    // default policy sleeps on the (paused) tokio clock: 1s, 2s, 4s, ...
    let invoker = ResilientInvoker::with_transport(config, transport).unwrap();

    let err = invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await.unwrap_err();

    assert_eq!(
        err,
        CallError::DeadlineExceeded { kind: CallKind::AnalyzeStock, deadline: Duration::from_millis(2500) }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2, "attempts at t=0s and t=1s; t=3s is past the deadline");
}

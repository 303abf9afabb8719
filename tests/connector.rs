use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamenrich::{
    Aspect, AsyncFunction, CallState, ColumnNameManager, ConnectorConfig, DataType, Datum,
    Emission, EnrichError, FieldDescriptor, HttpAsyncConnector, HttpRequest, HttpResponse,
    HttpTransport, InMemorySchemaRegistry, Record, ResultFuture, TransportError,
};

type Outcome = Result<HttpResponse, TransportError>;
type Responder = dyn Fn(&HttpRequest) -> (Duration, Outcome) + Send + Sync;

struct StubTransport {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl StubTransport {
    fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> (Duration, Outcome) + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        })
    }

    fn replying(delay: Duration, outcome: Outcome) -> Arc<Self> {
        Self::new(move |_| (delay, outcome.clone()))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn post(&self, request: HttpRequest) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, outcome) = (self.responder)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

fn ok(body: &str) -> Outcome {
    Ok(HttpResponse {
        status: 200,
        body: body.to_string(),
    })
}

fn registry() -> Arc<InMemorySchemaRegistry> {
    let registry = InMemorySchemaRegistry::new();
    registry.register(
        "Enrichment",
        vec![
            FieldDescriptor::new("out1", DataType::Boolean),
            FieldDescriptor::new("out2", DataType::String),
        ],
    );
    registry.register("Flag", vec![FieldDescriptor::new("flag", DataType::Boolean)]);
    registry.register("Echo", vec![FieldDescriptor::new("echo", DataType::Long)]);
    registry.register(
        "Mixed",
        vec![
            FieldDescriptor::new("seen_at", DataType::Timestamp),
            FieldDescriptor::new("out1", DataType::Boolean),
        ],
    );
    registry.register(
        "Nested",
        vec![FieldDescriptor::new("m", DataType::Message).with_fields(vec![
            FieldDescriptor::new("raw", DataType::Bytes),
            FieldDescriptor::new("n", DataType::Long),
        ])],
    );
    Arc::new(registry)
}

async fn open(
    config: ConnectorConfig,
    input: &[&str],
    output: &[&str],
    transport: Arc<StubTransport>,
) -> HttpAsyncConnector {
    let columns = ColumnNameManager::new(input.iter().copied(), output.iter().copied()).unwrap();
    let mut connector =
        HttpAsyncConnector::new(config, columns, registry()).with_transport(transport);
    connector.open().await.unwrap();
    connector
}

fn enrichment_config(fail_on_errors: bool) -> ConnectorConfig {
    ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0},{1}", ["a", "b"])
        .with_output_schema("Enrichment")
        .with_fail_on_errors(fail_on_errors)
        .with_stream_timeout(Duration::from_millis(50))
}

async fn run_one(connector: &HttpAsyncConnector, record: Record) -> Emission {
    let (result, completion) = ResultFuture::channel();
    connector.invoke(record, result);
    completion.wait().await.unwrap()
}

fn input_record() -> Record {
    // The stale single-column output segment comes from an upstream stage.
    Record::new(vec![Datum::Int(1), Datum::from("x")], vec![Datum::from("stale")])
}

fn failing_transports() -> Vec<(&'static str, Arc<StubTransport>, Aspect)> {
    vec![
        (
            "slow",
            StubTransport::replying(Duration::from_millis(500), ok("{}")),
            Aspect::Timeouts,
        ),
        (
            "transport timeout",
            StubTransport::replying(Duration::ZERO, Err(TransportError::Timeout("read".into()))),
            Aspect::Timeouts,
        ),
        (
            "server error",
            StubTransport::replying(
                Duration::ZERO,
                Err(TransportError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
            ),
            Aspect::Failure5xx,
        ),
        (
            "not found",
            StubTransport::replying(
                Duration::ZERO,
                Err(TransportError::Status {
                    status: 404,
                    body: String::new(),
                }),
            ),
            Aspect::Failure4xx,
        ),
        (
            "refused",
            StubTransport::replying(
                Duration::ZERO,
                Err(TransportError::Connection("refused".into())),
            ),
            Aspect::OtherErrors,
        ),
        (
            "garbage body",
            StubTransport::replying(Duration::ZERO, ok("<html>")),
            Aspect::DecodeFailure,
        ),
    ]
}

#[tokio::test]
async fn enriches_record_from_response() {
    let transport = StubTransport::new(|request| {
        assert_eq!(request.body, "1,x");
        (Duration::ZERO, ok(r#"{"out1": true, "out2": "42"}"#))
    });
    let connector = open(enrichment_config(false), &["a", "b"], &["out1", "out2"], transport).await;

    let record = run_one(&connector, Record::from_input(vec![Datum::Int(1), Datum::from("x")]))
        .await
        .into_result()
        .unwrap();

    assert_eq!(record.input(), &[Datum::Int(1), Datum::from("x")]);
    assert_eq!(record.output(), &[Datum::Bool(true), Datum::from("42")]);
    let metrics = connector.metrics();
    assert_eq!(metrics.count(Aspect::TotalCalls), 1);
    assert_eq!(metrics.count(Aspect::SuccessResponse), 1);
    assert!(metrics.mean_response_time().is_some());
}

#[tokio::test]
async fn missing_boolean_field_defaults_to_false() {
    let transport = StubTransport::replying(Duration::ZERO, ok("{}"));
    let config = ConnectorConfig::new("http://feature-store.local/flag")
        .with_request("{0}", ["a"])
        .with_output_schema("Flag");
    let connector = open(config, &["a"], &["flag"], transport).await;

    let record = run_one(&connector, Record::from_input(vec![Datum::Long(3)]))
        .await
        .into_result()
        .unwrap();

    assert_eq!(record.output(), &[Datum::Bool(false)]);
}

#[tokio::test]
async fn failures_pass_through_with_full_output_shape() {
    for (label, transport, aspect) in failing_transports() {
        let connector = open(
            enrichment_config(false),
            &["a", "b"],
            &["previous", "out1", "out2"],
            transport,
        )
        .await;

        let emission = run_one(&connector, input_record()).await;

        let record = match emission {
            Emission::Record(record) => record,
            other => panic!("{label}: expected pass-through, got {other:?}"),
        };
        assert_eq!(record.input(), input_record().input(), "{label}");
        assert_eq!(record.output(), &[Datum::Null, Datum::Null, Datum::Null], "{label}");
        assert_eq!(connector.metrics().count(aspect), 1, "{label}");
    }
}

#[tokio::test]
async fn failures_emit_errors_when_enrichment_is_mandatory() {
    for (label, transport, aspect) in failing_transports() {
        let connector = open(
            enrichment_config(true),
            &["a", "b"],
            &["previous", "out1", "out2"],
            transport,
        )
        .await;

        let emission = run_one(&connector, input_record()).await;

        let Emission::Failed { record, error } = emission else {
            panic!("{label}: expected an error emission");
        };
        assert_eq!(record.output_arity(), 3, "{label}");
        assert_eq!(connector.metrics().count(aspect), 1, "{label}");
        match aspect {
            Aspect::Timeouts => assert!(matches!(error, EnrichError::Timeout(_)), "{label}"),
            Aspect::DecodeFailure => assert!(matches!(error, EnrichError::Decode(_)), "{label}"),
            _ => assert!(matches!(error, EnrichError::Transport(_)), "{label}"),
        }
    }
}

#[tokio::test]
async fn unknown_request_variable_is_a_configuration_error() {
    let transport = StubTransport::replying(Duration::ZERO, ok("{}"));
    let config = ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0},{1}", ["a", "missing_col"])
        .with_output_schema("Enrichment");
    let connector = open(config, &["a", "b"], &["out1", "out2"], transport.clone()).await;

    let original = Record::from_input(vec![Datum::Int(1), Datum::from("x")]);
    let emission = run_one(&connector, original.clone()).await;

    let Emission::Record(record) = emission else {
        panic!("expected pass-through");
    };
    assert_eq!(record.input(), original.input());
    assert_eq!(record.output(), &[Datum::Null, Datum::Null]);
    assert_eq!(connector.metrics().count(Aspect::InvalidConfiguration), 1);
    assert_eq!(connector.metrics().count(Aspect::TotalCalls), 0);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn template_arity_mismatch_fails_record_when_mandatory() {
    let transport = StubTransport::replying(Duration::ZERO, ok("{}"));
    let config = ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0},{1}", ["a"])
        .with_output_schema("Enrichment")
        .with_fail_on_errors(true);
    let connector = open(config, &["a", "b"], &["out1", "out2"], transport.clone()).await;

    let emission = run_one(&connector, input_record()).await;

    assert!(matches!(
        emission,
        Emission::Failed { error: EnrichError::Configuration(_), .. }
    ));
    assert_eq!(connector.metrics().count(Aspect::InvalidConfiguration), 1);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn no_request_variables_is_an_inert_stage() {
    let transport = StubTransport::replying(Duration::ZERO, ok("{}"));
    let config = ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0}", Vec::<String>::new())
        .with_fail_on_errors(true);
    let connector = open(config, &["a", "b"], &["out1", "out2"], transport.clone()).await;

    let emission = run_one(&connector, input_record()).await;

    assert!(matches!(emission, Emission::Record(_)));
    assert_eq!(connector.metrics().count(Aspect::EmptyInput), 1);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn unsupported_output_types_are_counted_and_left_empty() {
    let transport = StubTransport::replying(
        Duration::ZERO,
        ok(r#"{"seen_at": "2024-05-01T00:00:00Z", "out1": "true"}"#),
    );
    let config = ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0}", ["a"])
        .with_output_schema("Mixed");
    let connector = open(config, &["a"], &["seen_at", "out1"], transport).await;

    let record = run_one(&connector, Record::from_input(vec![Datum::Long(1)]))
        .await
        .into_result()
        .unwrap();

    assert_eq!(record.output(), &[Datum::Null, Datum::Bool(true)]);
    assert_eq!(connector.metrics().count(Aspect::InvalidDataType), 1);
}

#[tokio::test]
async fn unsupported_nested_types_are_counted_and_left_empty() {
    let transport =
        StubTransport::replying(Duration::ZERO, ok(r#"{"m": {"raw": "AA==", "n": 2}}"#));
    let config = ConnectorConfig::new("http://feature-store.local/enrich")
        .with_request("{0}", ["a"])
        .with_output_schema("Nested");
    let connector = open(config, &["a"], &["m"], transport).await;

    let record = run_one(&connector, Record::from_input(vec![Datum::Long(1)]))
        .await
        .into_result()
        .unwrap();

    assert_eq!(
        record.output(),
        &[Datum::Struct(vec![
            ("raw".to_string(), Datum::Null),
            ("n".to_string(), Datum::Long(2)),
        ])]
    );
    assert_eq!(connector.metrics().count(Aspect::InvalidDataType), 1);
    assert_eq!(connector.metrics().count(Aspect::SuccessResponse), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn out_of_order_completions_stay_correlated() {
    let transport = StubTransport::new(|request| {
        let id: u64 = request.body.parse().unwrap();
        let delay = Duration::from_millis((id * 37) % 11);
        (delay, ok(&format!(r#"{{"echo": {id}}}"#)))
    });
    let config = ConnectorConfig::new("http://feature-store.local/echo")
        .with_request("{0}", ["id"])
        .with_output_schema("Echo");
    let connector = open(config, &["id"], &["echo"], transport.clone()).await;

    let completions: Vec<_> = (0..64_i64)
        .map(|id| {
            let (result, completion) = ResultFuture::channel();
            connector.invoke(Record::from_input(vec![Datum::Long(id)]), result);
            completion.wait()
        })
        .collect();
    let emissions = join_all(completions).await;

    assert_eq!(emissions.len(), 64);
    for emission in emissions {
        let record = emission.unwrap().into_result().unwrap();
        assert_eq!(record.output(), &[record.input()[0].clone()]);
    }
    assert_eq!(transport.calls(), 64);
    assert_eq!(connector.metrics().count(Aspect::SuccessResponse), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_timeouts_and_responses_complete_once() {
    let transport = StubTransport::new(|request| {
        let id: u64 = request.body.parse().unwrap();
        (Duration::from_millis(id % 10), ok(r#"{"echo": 1}"#))
    });
    let config = ConnectorConfig::new("http://feature-store.local/echo")
        .with_request("{0}", ["id"])
        .with_output_schema("Echo")
        .with_stream_timeout(Duration::from_millis(5));
    let connector = Arc::new(open(config, &["id"], &["echo"], transport).await);

    let mut pending = Vec::new();
    for id in 0..100_i64 {
        let record = Record::from_input(vec![Datum::Long(id)]);
        let (result, completion) = ResultFuture::channel();
        connector.invoke(record.clone(), result.clone());

        // The engine's own timeout signal races the connector's timer and the response.
        let engine = connector.clone();
        let signal = result.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis((id as u64 * 7) % 9)).await;
            engine.timeout(record, &signal);
        });
        pending.push((result, completion));
    }

    let mut emitted = 0;
    for (result, completion) in pending {
        let emission = completion.wait().await.unwrap();
        assert!(!emission.is_failure());
        assert_eq!(emission.record().output_arity(), 1);
        assert_ne!(result.state(), CallState::Pending);
        emitted += 1;
    }
    assert_eq!(emitted, 100);

    // Let every late response and signal land, then check nothing was applied twice.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let metrics = connector.metrics();
    assert_eq!(
        metrics.count(Aspect::SuccessResponse) + metrics.count(Aspect::Timeouts),
        100
    );
}

#[tokio::test]
async fn late_timeout_signal_is_ignored() {
    let transport = StubTransport::replying(Duration::ZERO, ok(r#"{"out1": true, "out2": "ok"}"#));
    let connector = open(enrichment_config(true), &["a", "b"], &["out1", "out2"], transport).await;

    let record = Record::from_input(vec![Datum::Int(1), Datum::from("x")]);
    let (result, completion) = ResultFuture::channel();
    connector.invoke(record.clone(), result.clone());
    let emission = completion.wait().await.unwrap();

    connector.timeout(record, &result);

    assert!(!emission.is_failure());
    assert_eq!(result.state(), CallState::Completed);
    assert_eq!(connector.metrics().count(Aspect::Timeouts), 0);
}

#[tokio::test]
async fn response_after_timeout_is_discarded() {
    let transport = StubTransport::replying(
        Duration::from_millis(80),
        ok(r#"{"out1": true, "out2": "late"}"#),
    );
    let config = enrichment_config(false).with_stream_timeout(Duration::from_millis(10));
    let connector = open(config, &["a", "b"], &["out1", "out2"], transport.clone()).await;

    let (result, completion) = ResultFuture::channel();
    connector.invoke(input_record(), result.clone());
    let emission = completion.wait().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(emission.record().output(), &[Datum::Null, Datum::Null]);
    assert_eq!(result.state(), CallState::TimedOut);
    assert_eq!(transport.calls(), 1);
    assert_eq!(connector.metrics().count(Aspect::SuccessResponse), 0);
    assert_eq!(connector.metrics().count(Aspect::Timeouts), 1);
}

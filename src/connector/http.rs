use crate::connector::columns::ColumnNameManager;
use crate::connector::config::ConnectorConfig;
use crate::connector::decoder::ResponseDecoder;
use crate::connector::metrics::{Aspect, ConnectorMetrics};
use crate::connector::row::RowManager;
use crate::connector::template::RequestTemplate;
use crate::connector::transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};
use crate::core::{
    AsyncFunction, CallState, Datum, Emission, EnrichError, OutputSchema, Record, Result,
    ResultFuture, SchemaRegistry,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Enriches each record with the response of an HTTP POST.
///
/// The request body is rendered from the configured input columns; the JSON
/// response is decoded against the output schema into the output segment.
/// Every record is completed exactly once: enriched, passed through with a
/// defaulted output segment, or failed when `fail_on_errors` is set.
pub struct HttpAsyncConnector {
    config: Arc<ConnectorConfig>,
    columns: Arc<ColumnNameManager>,
    registry: Arc<dyn SchemaRegistry>,
    transport: Option<Arc<dyn HttpTransport>>,
    metrics: Arc<ConnectorMetrics>,
    context: Option<Arc<CallContext>>,
}

impl HttpAsyncConnector {
    pub fn new(
        config: ConnectorConfig,
        columns: ColumnNameManager,
        registry: Arc<dyn SchemaRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            columns: Arc::new(columns),
            registry,
            transport: None,
            metrics: Arc::new(ConnectorMetrics::default()),
            context: None,
        }
    }

    /// Uses `transport` instead of building a `reqwest` client on open.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ConnectorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<ConnectorMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }
}

#[async_trait]
impl AsyncFunction for HttpAsyncConnector {
    async fn open(&mut self) -> Result<()> {
        self.config.validate()?;

        let schema = match &self.config.output_schema_name {
            Some(name) => self.registry.resolve(name).await?,
            None => Arc::new(OutputSchema::empty()),
        };

        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(self.config.connect_timeout())?),
        };
        self.transport = Some(transport.clone());

        let mut headers: Vec<(String, String)> = self
            .config
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.sort();

        // A malformed pattern is reported per record, so `open` still succeeds.
        let template = if self.config.request_pattern.is_empty() {
            Ok(None)
        } else {
            RequestTemplate::parse(&self.config.request_pattern)
                .map(Some)
                .map_err(|err| match err {
                    EnrichError::Configuration(message) => message,
                    other => other.to_string(),
                })
        };
        if let Err(message) = &template {
            warn!(error = %message, "Every record will fail request rendering");
        }

        info!(
            endpoint = %self.config.endpoint,
            schema = %schema.name,
            output_fields = schema.fields.len(),
            "HTTP connector opened"
        );

        self.context = Some(Arc::new(CallContext {
            config: self.config.clone(),
            columns: self.columns.clone(),
            decoder: ResponseDecoder::new(schema),
            transport,
            metrics: self.metrics.clone(),
            headers,
            template,
            runtime: Handle::current(),
        }));
        Ok(())
    }

    fn invoke(&self, record: Record, result: ResultFuture) {
        let Some(context) = self.context.clone() else {
            self.metrics.mark(Aspect::InvalidConfiguration);
            result.complete_exceptionally(
                record,
                EnrichError::configuration("HTTP connector invoked before open"),
            );
            return;
        };

        let row = RowManager::new(record, context.columns.output_size());
        match context.request_body(&row) {
            Err(err) => {
                context.fail(
                    &result,
                    CallState::Failed,
                    row.into_record(),
                    err,
                    Aspect::InvalidConfiguration,
                );
            }
            Ok(None) => {
                result.complete_with(CallState::Completed, || {
                    context.metrics.mark(Aspect::EmptyInput);
                    Emission::Record(row.into_record())
                });
            }
            Ok(Some(body)) => context.dispatch(row.into_record(), body, result),
        }
    }

    fn timeout(&self, record: Record, result: &ResultFuture) {
        match &self.context {
            Some(context) => {
                context.time_out(record, result);
            }
            None => {
                result.complete_with(CallState::TimedOut, || Emission::Failed {
                    record,
                    error: EnrichError::Timeout("Timeout in HTTP call".to_string()),
                });
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.context = None;
        self.transport = None;
        self.metrics.mark(Aspect::CloseConnection);
        info!(endpoint = %self.config.endpoint, "HTTP connector: connection closed");
        Ok(())
    }
}

/// State shared by all calls of an opened connector.
struct CallContext {
    config: Arc<ConnectorConfig>,
    columns: Arc<ColumnNameManager>,
    decoder: ResponseDecoder,
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<ConnectorMetrics>,
    headers: Vec<(String, String)>,
    /// Parsed once on open; the error message of a malformed pattern.
    template: std::result::Result<Option<RequestTemplate>, String>,
    runtime: Handle,
}

impl CallContext {
    fn body_variables(&self, row: &RowManager) -> Result<Vec<Datum>> {
        self.config
            .request_variables
            .iter()
            .map(|name| {
                let index = self.columns.input_index(name).ok_or_else(|| {
                    EnrichError::configuration(format!(
                        "Column '{}' not found as configured in the request variable",
                        name
                    ))
                })?;
                Ok(row.get_from_input(index).cloned().unwrap_or_default())
            })
            .collect()
    }

    /// `Ok(None)` when there is nothing to send.
    fn request_body(&self, row: &RowManager) -> Result<Option<String>> {
        let variables = self.body_variables(row)?;
        if variables.is_empty() {
            return Ok(None);
        }
        match &self.template {
            Ok(Some(template)) => template.render(&variables).map(Some),
            Ok(None) => Ok(None),
            Err(message) => Err(EnrichError::Configuration(message.clone())),
        }
    }

    fn dispatch(self: Arc<Self>, record: Record, body: String, result: ResultFuture) {
        let request = HttpRequest {
            url: self.config.endpoint.clone(),
            body,
            headers: self.headers.clone(),
            timeout: self.config.stream_timeout(),
        };
        let transport = self.transport.clone();
        let timeout = self.config.stream_timeout();
        let runtime = self.runtime.clone();

        self.metrics.mark(Aspect::TotalCalls);
        debug!(endpoint = %request.url, body = %request.body, "Dispatching HTTP call");

        let call = PendingCall {
            context: self,
            record,
            result,
            started: Instant::now(),
        };
        runtime.spawn(async move {
            // The request keeps running if the timer wins; its result is dropped.
            let in_flight = tokio::spawn(async move { transport.post(request).await });
            tokio::select! {
                joined = in_flight => match joined {
                    Ok(Ok(response)) => call.on_success(response),
                    Ok(Err(err)) => call.on_failure(err),
                    Err(join_err) => call.on_failure(TransportError::Other(join_err.to_string())),
                },
                () = tokio::time::sleep(timeout) => call.on_timeout(),
            }
        });
    }

    fn pass_through(&self, record: Record) -> Record {
        RowManager::new(record, self.columns.output_size()).into_record()
    }

    fn fail(
        &self,
        result: &ResultFuture,
        state: CallState,
        record: Record,
        err: EnrichError,
        aspect: Aspect,
    ) -> bool {
        result.complete_with(state, || {
            self.metrics.mark(aspect);
            let record = self.pass_through(record);
            if self.config.fail_on_errors {
                error!(endpoint = %self.config.endpoint, error = %err, "HTTP enrichment failed");
                Emission::Failed { record, error: err }
            } else {
                warn!(
                    endpoint = %self.config.endpoint,
                    error = %err,
                    "HTTP enrichment failed, passing record through"
                );
                Emission::Record(record)
            }
        })
    }

    fn time_out(&self, record: Record, result: &ResultFuture) -> bool {
        let err = EnrichError::Timeout(format!(
            "HTTP call did not complete within {}ms",
            self.config.stream_timeout_ms
        ));
        self.fail(result, CallState::TimedOut, record, err, Aspect::Timeouts)
    }
}

/// One dispatched request awaiting its single completion.
struct PendingCall {
    context: Arc<CallContext>,
    record: Record,
    result: ResultFuture,
    started: Instant,
}

impl PendingCall {
    fn on_success(self, response: HttpResponse) {
        let PendingCall {
            context,
            record,
            result,
            started,
        } = self;

        let decoded = match context.decoder.decode(&response.body) {
            Ok(decoded) => decoded,
            Err(err) => {
                context.fail(&result, CallState::Failed, record, err, Aspect::DecodeFailure);
                return;
            }
        };

        result.complete_with(CallState::Completed, || {
            context.metrics.mark(Aspect::SuccessResponse);
            context.metrics.record_response_time(started.elapsed());
            for _ in &decoded.invalid_fields {
                context.metrics.mark(Aspect::InvalidDataType);
            }
            let mut row = RowManager::new(record, context.columns.output_size());
            decoded.apply(&context.columns, &mut row);
            Emission::Record(row.into_record())
        });
    }

    fn on_failure(self, err: TransportError) {
        let aspect = match &err {
            TransportError::Timeout(_) => {
                let err = EnrichError::Timeout(err.to_string());
                self.context
                    .fail(&self.result, CallState::TimedOut, self.record, err, Aspect::Timeouts);
                return;
            }
            TransportError::Status { status, .. } if (400..500).contains(status) => {
                Aspect::Failure4xx
            }
            TransportError::Status { status, .. } if *status >= 500 => Aspect::Failure5xx,
            _ => Aspect::OtherErrors,
        };
        self.context
            .fail(&self.result, CallState::Failed, self.record, err.into(), aspect);
    }

    fn on_timeout(self) {
        self.context.time_out(self.record, &self.result);
    }
}

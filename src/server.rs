//! gRPC server for the provider protocol.
//!
//! [`ProviderService`] is the JSON-valued interface the provider implements;
//! [`serve`] wraps it in the generated `Provider` gRPC service, prints the
//! handshake line and runs until SIGTERM or SIGINT.
//!
//! # Shutdown
//!
//! On a shutdown signal the server stops accepting connections and gives
//! in-flight requests up to [`ServeOptions::shutdown_timeout`] to finish.
//! The provider's `stop()` runs afterwards in either case.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ProviderError, Result};
use crate::generated as pb;
use crate::schema::{Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{decode_json, encode_json, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};

/// The provider side of the protocol, with states and configs as JSON.
///
/// Errors returned from any method reach the host as error diagnostics.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Schemas for the provider block, every resource and every data source.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names, derived from [`schema`](Self::schema).
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        let mut resources: Vec<String> = schema.resources.into_keys().collect();
        let mut data_sources: Vec<String> = schema.data_sources.into_keys().collect();
        resources.sort();
        data_sources.sort();
        ProviderMetadata {
            resources,
            data_sources,
            capabilities: Default::default(),
        }
    }

    /// Check the provider block without configuring anything.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let _ = config;
        Ok(vec![])
    }

    /// Apply the provider block. Error diagnostics leave the provider unconfigured.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>>;

    /// Release provider resources before exit.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Check a resource configuration.
    async fn validate_resource_config(&self, resource_type: &str, config: Value) -> Result<Vec<Diagnostic>> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Migrate state written by an older schema version.
    async fn upgrade_resource_state(&self, resource_type: &str, version: i64, state: Value) -> Result<Value> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Compute the planned state. A `None` prior plans a create, a null
    /// proposed state plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult>;

    /// Create a resource from its planned state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value>;

    /// Refresh a resource. Null means the resource no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value>;

    /// Update a resource in place.
    async fn update(&self, resource_type: &str, prior_state: Value, planned_state: Value) -> Result<Value>;

    /// Remove the remote object. Already gone counts as success.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()>;

    /// Import an existing object by its ID.
    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    /// Check a data source configuration.
    async fn validate_data_source_config(&self, data_source_type: &str, config: Value) -> Result<Vec<Diagnostic>> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read a data source.
    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value> {
        let _ = config;
        Err(ProviderError::UnknownDataSource(data_source_type.to_string()))
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

/// Decode a JSON payload; empty bytes decode to null.
fn decode(bytes: &[u8], field: &str) -> Result<Value> {
    decode_json(bytes)
        .map(Option::unwrap_or_default)
        .map_err(|e| ProviderError::InvalidRequest(format!("decoding `{}`: {}", field, e)))
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<pb::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| pb::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => pb::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => pb::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: ProviderError) -> Vec<pb::Diagnostic> {
    vec![pb::Diagnostic {
        severity: pb::diagnostic::Severity::Error as i32,
        summary: err.to_string(),
        detail: String::new(),
        attribute: String::new(),
    }]
}

/// Turn a diagnostics result into wire diagnostics, logging the outcome.
fn report(rpc: &str, kind: &str, result: Result<Vec<Diagnostic>>) -> Vec<pb::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            if diagnostics.iter().any(Diagnostic::is_error) {
                warn!(rpc, kind, diagnostics = diagnostics.len(), "completed with errors");
            } else {
                debug!(rpc, kind, "completed");
            }
            diagnostics_to_proto(diagnostics)
        }
        Err(e) => {
            error!(rpc, kind, error = %e, "failed");
            error_to_diagnostics(e)
        }
    }
}

fn schema_to_proto(schema: &Schema) -> pb::Schema {
    pb::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> pb::Block {
    pb::Block {
        attributes: block
            .attributes
            .iter()
            .map(|(name, attr)| pb::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(encode_json).unwrap_or_default(),
            })
            .collect(),
        block_types: block
            .blocks
            .iter()
            .map(|(name, nested)| pb::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting_mode: match nested.nesting_mode {
                    BlockNestingMode::Single => pb::nested_block::NestingMode::Single as i32,
                    BlockNestingMode::List => pb::nested_block::NestingMode::List as i32,
                },
                min_items: nested.min_items as i32,
                max_items: nested.max_items as i32,
            })
            .collect(),
        description: block.description.clone().unwrap_or_default(),
    }
}

type GrpcResult<T> = std::result::Result<tonic::Response<T>, tonic::Status>;

#[tonic::async_trait]
impl<P: ProviderService> pb::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(&self, _request: tonic::Request<pb::GetMetadataRequest>) -> GrpcResult<pb::GetMetadataResponse> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(pb::GetMetadataResponse {
            server_capabilities: Some(pb::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(&self, _request: tonic::Request<pb::GetSchemaRequest>) -> GrpcResult<pb::GetSchemaResponse> {
        let schema = self.provider.schema();
        debug!(
            resources = schema.resources.len(),
            data_sources = schema.data_sources.len(),
            "GetSchema completed"
        );
        Ok(tonic::Response::new(pb::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<pb::ValidateProviderConfigRequest>,
    ) -> GrpcResult<pb::ValidateProviderConfigResponse> {
        let req = request.into_inner();
        let result = async {
            let config = decode(&req.config, "config")?;
            self.provider.validate_provider_config(config).await
        }
        .await;
        Ok(tonic::Response::new(pb::ValidateProviderConfigResponse {
            diagnostics: report("ValidateProviderConfig", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(&self, request: tonic::Request<pb::ConfigureRequest>) -> GrpcResult<pb::ConfigureResponse> {
        let req = request.into_inner();
        let result = async {
            let config = decode(&req.config, "config")?;
            self.provider.configure(config).await
        }
        .await;
        Ok(tonic::Response::new(pb::ConfigureResponse {
            diagnostics: report("Configure", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(&self, _request: tonic::Request<pb::StopRequest>) -> GrpcResult<pb::StopResponse> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(tonic::Response::new(pb::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type))]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<pb::ValidateResourceConfigRequest>,
    ) -> GrpcResult<pb::ValidateResourceConfigResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = async {
            let config = decode(&req.config, "config")?;
            self.provider.validate_resource_config(&req.resource_type, config).await
        }
        .await;
        Ok(tonic::Response::new(pb::ValidateResourceConfigResponse {
            diagnostics: report("ValidateResourceConfig", &req.resource_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type))]
    async fn upgrade_resource_state(
        &self,
        request: tonic::Request<pb::UpgradeResourceStateRequest>,
    ) -> GrpcResult<pb::UpgradeResourceStateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = async {
            let state = decode(&req.raw_state, "raw_state")?;
            self.provider
                .upgrade_resource_state(&req.resource_type, req.version, state)
                .await
        }
        .await;

        let response = match result {
            Ok(upgraded) => {
                debug!(from_version = req.version, "UpgradeResourceState completed");
                pb::UpgradeResourceStateResponse {
                    upgraded_state: encode_json(&upgraded),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                pb::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type))]
    async fn plan(&self, request: tonic::Request<pb::PlanRequest>) -> GrpcResult<pb::PlanResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = async {
            let prior = decode_json(&req.prior_state)
                .map_err(|e| ProviderError::InvalidRequest(format!("decoding `prior_state`: {}", e)))?
                .filter(|v| !v.is_null());
            let proposed = decode(&req.proposed_state, "proposed_state")?;
            let config = decode(&req.config, "config")?;
            self.provider.plan(&req.resource_type, prior, proposed, config).await
        }
        .await;

        let response = match result {
            Ok(plan) => {
                info!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                pb::PlanResponse {
                    planned_state: encode_json(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                    replace_paths: plan.replace_paths,
                }
            }
            Err(e) => {
                error!(error = %e, "Plan failed");
                pb::PlanResponse {
                    diagnostics: error_to_diagnostics(e),
                    ..Default::default()
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type))]
    async fn create(&self, request: tonic::Request<pb::CreateRequest>) -> GrpcResult<pb::CreateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        info!("Create called");
        let result = async {
            let planned = decode(&req.planned_state, "planned_state")?;
            self.provider.create(&req.resource_type, planned).await
        }
        .await;

        let response = match result {
            Ok(state) => {
                info!("Create completed");
                pb::CreateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Create failed");
                pb::CreateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type))]
    async fn read(&self, request: tonic::Request<pb::ReadRequest>) -> GrpcResult<pb::ReadResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = async {
            let current = decode(&req.current_state, "current_state")?;
            self.provider.read(&req.resource_type, current).await
        }
        .await;

        let response = match result {
            Ok(state) => {
                if state.is_null() {
                    info!("Read found the resource gone");
                }
                pb::ReadResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Read failed");
                pb::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type))]
    async fn update(&self, request: tonic::Request<pb::UpdateRequest>) -> GrpcResult<pb::UpdateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        info!("Update called");
        let result = async {
            let prior = decode(&req.prior_state, "prior_state")?;
            let planned = decode(&req.planned_state, "planned_state")?;
            self.provider.update(&req.resource_type, prior, planned).await
        }
        .await;

        let response = match result {
            Ok(state) => {
                info!("Update completed");
                pb::UpdateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Update failed");
                pb::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type))]
    async fn delete(&self, request: tonic::Request<pb::DeleteRequest>) -> GrpcResult<pb::DeleteResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        info!("Delete called");
        let result = async {
            let current = decode(&req.current_state, "current_state")?;
            self.provider.delete(&req.resource_type, current).await
        }
        .await;

        let diagnostics = match result {
            Ok(()) => {
                info!("Delete completed");
                vec![]
            }
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_to_diagnostics(e)
            }
        };
        Ok(tonic::Response::new(pb::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type))]
    async fn import_resource_state(
        &self,
        request: tonic::Request<pb::ImportResourceStateRequest>,
    ) -> GrpcResult<pb::ImportResourceStateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        info!(id = %req.id, "ImportResourceState called");

        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(id = %req.id, imported = imported.len(), "ImportResourceState completed");
                pb::ImportResourceStateResponse {
                    imported: imported
                        .into_iter()
                        .map(|r| pb::ImportedResource {
                            resource_type: r.resource_type,
                            state: encode_json(&r.state),
                        })
                        .collect(),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(id = %req.id, error = %e, "ImportResourceState failed");
                pb::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(data_source_type))]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<pb::ValidateDataSourceConfigRequest>,
    ) -> GrpcResult<pb::ValidateDataSourceConfigResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = async {
            let config = decode(&req.config, "config")?;
            self.provider
                .validate_data_source_config(&req.data_source_type, config)
                .await
        }
        .await;
        Ok(tonic::Response::new(pb::ValidateDataSourceConfigResponse {
            diagnostics: report("ValidateDataSourceConfig", &req.data_source_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(data_source_type))]
    async fn read_data_source(
        &self,
        request: tonic::Request<pb::ReadDataSourceRequest>,
    ) -> GrpcResult<pb::ReadDataSourceResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = async {
            let config = decode(&req.config, "config")?;
            self.provider.read_data_source(&req.data_source_type, config).await
        }
        .await;

        let response = match result {
            Ok(state) => {
                debug!("ReadDataSource completed");
                pb::ReadDataSourceResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                pb::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }
}

/// Tuning for [`serve_with_options`].
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Drain period for in-flight requests after SIGTERM, 30s unless set.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Resolve on SIGTERM or SIGINT (CTRL+C on Windows).
///
/// If the handlers cannot be installed the server keeps running until it is
/// killed.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("received CTRL+C, shutting down");
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve `provider` on an ephemeral localhost port.
///
/// Prints `HEMMER_PROVIDER|<protocol_version>|<address>` to stdout once the
/// listener is bound, then serves until a shutdown signal.
pub async fn serve<P: ProviderService>(provider: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Like [`serve`], with custom [`ServeOptions`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options, wait_for_shutdown_signal()).await
}

async fn serve_on_listener<P, S>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: S,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "provider server starting");

    let provider = Arc::new(provider);
    let service = pb::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        },
    );
    tokio::pin!(server);

    // The timeout only bounds the drain that follows a shutdown signal.
    tokio::select! {
        result = &mut server => result?,
        Ok(()) = signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(timeout = ?options.shutdown_timeout, "shutdown timeout exceeded, dropping in-flight requests"),
            }
        }
    }
    info!("server stopped");

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop failed");
    }
    info!("provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::provider_server::Provider;
    use crate::schema::Attribute;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Echo {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ProviderService for Echo {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_resource(
                    "echo_b",
                    Schema::v0().with_attribute("name", Attribute::required_string().with_force_new()),
                )
                .with_resource("echo_a", Schema::v0())
        }

        async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
            if config.get("fail").is_some() {
                return Ok(vec![Diagnostic::error("bad config").with_attribute("fail")]);
            }
            Ok(vec![])
        }

        async fn stop(&self) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn plan(&self, _: &str, prior: Option<Value>, proposed: Value, _: Value) -> Result<PlanResult> {
            let mut plan = PlanResult::no_change(proposed.clone());
            if prior.is_some_and(|p| p["name"] != proposed["name"]) {
                plan.force_replace("name");
            }
            Ok(plan)
        }

        async fn create(&self, _: &str, planned: Value) -> Result<Value> {
            Ok(planned)
        }

        async fn read(&self, _: &str, current: Value) -> Result<Value> {
            if current["gone"] == json!(true) {
                return Ok(Value::Null);
            }
            Ok(current)
        }

        async fn update(&self, _: &str, _: Value, planned: Value) -> Result<Value> {
            Ok(planned)
        }

        async fn delete(&self, resource_type: &str, _: Value) -> Result<()> {
            Err(ProviderError::NotFound(format!("{} is missing", resource_type)))
        }
    }

    fn service() -> ProviderGrpcService<Echo> {
        ProviderGrpcService {
            provider: Arc::new(Echo::default()),
        }
    }

    #[tokio::test]
    async fn test_metadata_is_sorted() {
        let response = service()
            .get_metadata(tonic::Request::new(pb::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.resources, vec!["echo_a", "echo_b"]);
    }

    #[tokio::test]
    async fn test_schema_conversion() {
        let response = service()
            .get_schema(tonic::Request::new(pb::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();
        let block = response.resources["echo_b"].block.as_ref().unwrap();
        assert_eq!(block.attributes.len(), 1);
        assert!(block.attributes[0].required);
        assert!(block.attributes[0].force_new);
    }

    #[tokio::test]
    async fn test_configure_diagnostics() {
        let response = service()
            .configure(tonic::Request::new(pb::ConfigureRequest {
                config: br#"{"fail": true}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].attribute, "fail");
        assert_eq!(response.diagnostics[0].severity, pb::diagnostic::Severity::Error as i32);
    }

    #[tokio::test]
    async fn test_invalid_json_becomes_diagnostic() {
        let response = service()
            .create(tonic::Request::new(pb::CreateRequest {
                resource_type: "echo_a".to_string(),
                planned_state: b"{not json".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.state.is_empty());
        assert!(response.diagnostics[0].summary.contains("planned_state"));
    }

    #[tokio::test]
    async fn test_plan_carries_replace_paths() {
        let response = service()
            .plan(tonic::Request::new(pb::PlanRequest {
                resource_type: "echo_b".to_string(),
                prior_state: br#"{"name":"a"}"#.to_vec(),
                proposed_state: br#"{"name":"b"}"#.to_vec(),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.requires_replace);
        assert_eq!(response.replace_paths, vec!["name"]);
        assert_eq!(decode_json(&response.planned_state).unwrap(), Some(json!({"name": "b"})));
    }

    #[tokio::test]
    async fn test_read_gone_is_empty_state() {
        let response = service()
            .read(tonic::Request::new(pb::ReadRequest {
                resource_type: "echo_a".to_string(),
                current_state: br#"{"gone":true}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.state.is_empty());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_errors_become_diagnostics() {
        let svc = service();
        let response = svc
            .delete(tonic::Request::new(pb::DeleteRequest {
                resource_type: "echo_a".to_string(),
                current_state: b"{}".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics[0].summary.contains("echo_a is missing"));

        let response = svc
            .import_resource_state(tonic::Request::new(pb::ImportResourceStateRequest {
                resource_type: "echo_a".to_string(),
                id: "x".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.imported.is_empty());
        assert!(response.diagnostics[0].summary.starts_with("Unimplemented"));

        let response = svc
            .read_data_source(tonic::Request::new(pb::ReadDataSourceRequest {
                data_source_type: "echo_ds".to_string(),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics[0].summary.contains("echo_ds"));
    }

    #[tokio::test]
    async fn test_shutdown_calls_stop() {
        let provider = Echo::default();
        let stopped = Arc::clone(&provider.stopped);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            serve_on_listener(provider, listener, ServeOptions::new(), async move {
                let _ = rx.await;
            })
            .await
            .map_err(|e| e.to_string())
        });

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }
}

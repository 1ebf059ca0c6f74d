//! Runtime plugin for the HavenKit plugin system

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use havenkit_config::ServerConfig;
use havenkit_core::plugin::{
    HavenPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use utoipa::{openapi::OpenApi, OpenApi as UtoipaOpenApi};

use crate::cli::CliRuntime;
use crate::handlers::{self, RuntimeState};
use crate::runtime::ContainerRuntime;

/// Plugin providing container runtime access and the relay lifecycle routes
pub struct RuntimePlugin;

impl RuntimePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuntimePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HavenPlugin for RuntimePlugin {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let runtime = CliRuntime::detect();
            tracing::info!("Detected container runtime: {}", runtime.kind());

            let runtime: Arc<dyn ContainerRuntime> = Arc::new(runtime);
            context.register_service::<dyn ContainerRuntime>(runtime);

            tracing::debug!("Runtime plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let runtime = context.require_service::<dyn ContainerRuntime>();
        let server_config = context.require_service::<ServerConfig>();

        let state = Arc::new(RuntimeState {
            runtime,
            relay_container: server_config.relay_container.clone(),
        });
        let routes = handlers::configure_routes().with_state(state);

        Some(PluginRoutes { router: routes })
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(<handlers::RuntimeApiDoc as UtoipaOpenApi>::openapi())
    }
}

//! Logs plugin for the HavenKit plugin system

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use havenkit_config::ServerConfig;
use havenkit_core::plugin::{
    HavenPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use havenkit_runtime::detect_runtime;
use utoipa::{openapi::OpenApi, OpenApi as UtoipaOpenApi};

use crate::follow::LogFollowService;
use crate::handlers::{self, LogsState};

/// Plugin providing the live relay log viewer
pub struct LogsPlugin;

impl LogsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HavenPlugin for LogsPlugin {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let follow_service = Arc::new(LogFollowService::new(detect_runtime()));
            context.register_service(follow_service);

            tracing::debug!("Logs plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let follow_service = context.require_service::<LogFollowService>();
        let server_config = context.require_service::<ServerConfig>();

        let state = Arc::new(LogsState {
            follow_service,
            relay_container: server_config.relay_container.clone(),
        });
        let routes = handlers::configure_routes().with_state(state);

        Some(PluginRoutes { router: routes })
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(<handlers::LogsApiDoc as UtoipaOpenApi>::openapi())
    }
}

//! Import plugin for the HavenKit plugin system

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use havenkit_config::{ConfigService, ServerConfig};
use havenkit_core::plugin::{
    HavenPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use havenkit_runtime::ContainerRuntime;
use utoipa::{openapi::OpenApi, OpenApi as UtoipaOpenApi};

use crate::handlers::{self, types::AppState};
use crate::services::{ImportJobService, ImportSettings};

/// Plugin providing the import job orchestrator and its routes
pub struct ImportPlugin;

impl ImportPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImportPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HavenPlugin for ImportPlugin {
    fn name(&self) -> &'static str {
        "import"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let server_config = context.require_service::<ServerConfig>();
            let config_service = context.require_service::<ConfigService>();
            let runtime = context.require_service::<dyn ContainerRuntime>();

            let settings = ImportSettings::from_server_config(&server_config);
            let import_service = Arc::new(ImportJobService::new(
                runtime,
                config_service,
                settings,
            ));
            context.register_service(import_service);

            tracing::debug!("Import plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let import_service = context.require_service::<ImportJobService>();
        let config_service = context.require_service::<ConfigService>();

        let state = Arc::new(AppState {
            import_service,
            config_service,
        });
        let routes = handlers::configure_routes().with_state(state);

        Some(PluginRoutes { router: routes })
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(<handlers::ImportApiDoc as UtoipaOpenApi>::openapi())
    }
}

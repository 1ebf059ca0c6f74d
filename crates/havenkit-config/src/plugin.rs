//! Configuration plugin for the HavenKit plugin system

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use havenkit_core::plugin::{
    HavenPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use utoipa::{openapi::OpenApi, OpenApi as UtoipaOpenApi};

use crate::handler::{self, ConfigState};
use crate::service::{ConfigService, ServerConfig};

/// Plugin providing the relay configuration file services and routes
pub struct ConfigPlugin;

impl ConfigPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConfigPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HavenPlugin for ConfigPlugin {
    fn name(&self) -> &'static str {
        "config"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let server_config = context.require_service::<ServerConfig>();

            let config_service = Arc::new(ConfigService::new(server_config.config_dir.clone()));
            config_service.ensure_config_files().await.map_err(|e| {
                PluginError::InitializationFailed(format!(
                    "could not create default config files: {}",
                    e
                ))
            })?;
            context.register_service(config_service);

            tracing::debug!("Config plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let config_service = context.require_service::<ConfigService>();

        let state = Arc::new(ConfigState { config_service });
        let routes = handler::configure_routes().with_state(state);

        Some(PluginRoutes { router: routes })
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(<handler::ConfigApiDoc as UtoipaOpenApi>::openapi())
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Args;
use havenkit_config::{ConfigPlugin, ServerConfig};
use havenkit_core::plugin::PluginManager;
use havenkit_import::ImportPlugin;
use havenkit_logs::LogsPlugin;
use havenkit_runtime::RuntimePlugin;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use utoipa_swagger_ui::SwaggerUi;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the console to
    #[arg(long, default_value = "0.0.0.0:8080", env = "HAVENKIT_ADDRESS")]
    pub address: String,

    /// Directory holding the relay's configuration files (shared volume)
    #[arg(long, default_value = "/haven-config", env = "HAVEN_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Base data directory with the config/, blossom/ and db/ subdirectories
    /// mounted into the import container
    #[arg(long, default_value = "./data", env = "APP_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Name of the relay container under administration
    #[arg(long, default_value = "haven_relay_1", env = "RELAY_CONTAINER")]
    pub relay_container: String,

    /// Explicit image for the import container (defaults to the relay's own
    /// image)
    #[arg(long, env = "IMPORT_IMAGE")]
    pub import_image: Option<String>,

    /// Explicit network for the import container (defaults to the relay's
    /// own network)
    #[arg(long, env = "IMPORT_NETWORK")]
    pub import_network: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.serve())
    }

    async fn serve(self) -> anyhow::Result<()> {
        let config = Arc::new(ServerConfig::new(
            self.address.clone(),
            self.config_dir.clone(),
            self.data_dir.clone(),
            self.relay_container.clone(),
            self.import_image.clone(),
            self.import_network.clone(),
        )?);

        info!(
            "Starting HavenKit console for relay container '{}' (config: {}, data: {})",
            config.relay_container,
            config.config_dir.display(),
            config.data_dir.display()
        );

        let mut plugin_manager = PluginManager::new();
        plugin_manager
            .service_context()
            .register_service(config.clone());

        // Registration order matters: later plugins depend on earlier ones
        plugin_manager.register_plugin(Box::new(ConfigPlugin::new()));
        plugin_manager.register_plugin(Box::new(RuntimePlugin::new()));
        plugin_manager.register_plugin(Box::new(LogsPlugin::new()));
        plugin_manager.register_plugin(Box::new(ImportPlugin::new()));

        plugin_manager
            .initialize_plugins()
            .await
            .map_err(|e| anyhow::anyhow!("Plugin initialization failed: {}", e))?;
        debug!("All plugins initialized successfully");

        let app = plugin_manager
            .build_application()
            .map_err(|e| anyhow::anyhow!("Failed to build application: {}", e))?
            .merge(create_swagger_router(&plugin_manager)?)
            // The console is a single-operator LAN tool served without a
            // reverse proxy; keep the browser side unconstrained
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(&config.address).await?;
        info!("HavenKit console listening on {}", config.address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("HavenKit console exited");
        Ok(())
    }
}

fn create_swagger_router(plugin_manager: &PluginManager) -> anyhow::Result<Router> {
    let api_doc = plugin_manager
        .get_unified_openapi()
        .map_err(|e| anyhow::anyhow!("Failed to build unified OpenAPI schema: {}", e))?;
    Ok(Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc)))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c signal");
    info!("Received Ctrl+C, shutting down...");
}

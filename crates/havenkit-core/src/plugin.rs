//! Plugin system for modular service registration and route configuration
//!
//! Each feature crate exposes a [`HavenPlugin`] that registers its services
//! in a type-keyed registry and contributes its routes and OpenAPI schema.
//! The [`PluginManager`] initializes plugins in registration order (order
//! matters for dependencies) and assembles the final axum application.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use axum::Router;
use thiserror::Error;
use tracing::debug;
use utoipa::openapi::OpenApi;

// Re-export for plugin implementations
pub use axum;
pub use utoipa;

/// Errors that can occur during plugin operations
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin registration failed for '{plugin_name}': {error}")]
    PluginRegistrationFailed { plugin_name: String, error: String },

    #[error("Service '{service_type}' is required but not registered")]
    ServiceNotFound { service_type: String },

    #[error("Failed to initialize plugin system: {0}")]
    InitializationFailed(String),

    #[error("OpenAPI schema merge failed: {0}")]
    OpenApiMergeFailed(String),
}

/// Core plugin trait that defines the plugin interface
pub trait HavenPlugin: Send + Sync {
    /// Unique identifier for this plugin
    fn name(&self) -> &'static str;

    /// Register services that this plugin provides
    ///
    /// Use `context.require_service::<T>()` to get dependencies.
    /// Use `context.register_service(service)` to provide services for other plugins.
    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;

    /// Configure HTTP routes for this plugin
    ///
    /// Return None if this plugin doesn't provide HTTP endpoints.
    fn configure_routes(&self, _context: &PluginContext) -> Option<PluginRoutes> {
        None
    }

    /// Provide OpenAPI schema for this plugin's endpoints
    ///
    /// Return None if this plugin doesn't have API documentation.
    fn openapi_schema(&self) -> Option<OpenApi> {
        None
    }
}

/// Route configuration returned by plugins
pub struct PluginRoutes {
    /// The actual router with handlers
    pub router: Router,
}

impl PluginRoutes {
    /// Create plugin routes with no path prefix
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

/// Type-safe service registry for dependency injection
pub struct ServiceRegistry {
    services: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Create a new service registry
    pub fn new() -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Register a service for other plugins to use
    pub fn register<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        debug!("Registering service: {}", std::any::type_name::<T>());
        self.services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Get a service if it's registered
    pub fn get<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.services
            .lock()
            .unwrap()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Require a service - panics with helpful error if not available
    pub fn require<T: Send + Sync + 'static + ?Sized>(&self) -> Arc<T> {
        self.get::<T>().unwrap_or_else(|| {
            panic!(
                "Service '{}' is required but not registered. \
                 Make sure the plugin providing this service is registered before plugins that depend on it.",
                std::any::type_name::<T>()
            )
        })
    }
}

/// Registry for plugin-specific state (used for routing)
pub struct PluginStateRegistry {
    states: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Default for PluginStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginStateRegistry {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Register plugin state for route configuration
    pub fn register_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
        state: Arc<T>,
    ) {
        debug!("Registering plugin state for: {}", plugin_name);
        self.states
            .lock()
            .unwrap()
            .insert(plugin_name.to_string(), Box::new(state));
    }

    /// Get plugin state for route configuration
    pub fn get_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
    ) -> Option<Arc<T>> {
        self.states
            .lock()
            .unwrap()
            .get(plugin_name)
            .and_then(|any| any.downcast_ref::<Arc<T>>())
            .cloned()
    }
}

/// Context provided to plugins for read-only service access
pub struct PluginContext {
    service_registry: Arc<ServiceRegistry>,
    state_registry: Arc<PluginStateRegistry>,
}

impl PluginContext {
    pub fn new(registry: Arc<ServiceRegistry>, state_registry: Arc<PluginStateRegistry>) -> Self {
        Self {
            service_registry: registry,
            state_registry,
        }
    }

    /// Get a service if it's available (for optional dependencies)
    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.service_registry.get::<T>()
    }

    /// Require a service - panics with clear error if not available
    pub fn require_service<T: Send + Sync + 'static + ?Sized>(&self) -> Arc<T> {
        self.service_registry.require::<T>()
    }

    /// Get plugin state for route configuration
    pub fn get_plugin_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
    ) -> Option<Arc<T>> {
        self.state_registry.get_state::<T>(plugin_name)
    }
}

/// Context for service registration that allows mutable access
pub struct ServiceRegistrationContext {
    service_registry: Arc<ServiceRegistry>,
    state_registry: Arc<PluginStateRegistry>,
}

impl Default for ServiceRegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistrationContext {
    pub fn new() -> Self {
        Self {
            service_registry: Arc::new(ServiceRegistry::new()),
            state_registry: Arc::new(PluginStateRegistry::new()),
        }
    }

    /// Register a service for other plugins to use
    pub fn register_service<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        self.service_registry.register(service);
    }

    /// Register plugin state for route configuration
    pub fn register_plugin_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
        state: Arc<T>,
    ) {
        self.state_registry.register_state(plugin_name, state);
    }

    /// Get a service if it's available (for dependencies)
    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.service_registry.get::<T>()
    }

    /// Require a service - panics with clear error if not available
    pub fn require_service<T: Send + Sync + 'static + ?Sized>(&self) -> Arc<T> {
        self.service_registry.require::<T>()
    }

    /// Create a read-only context for plugin operations
    pub fn create_plugin_context(&self) -> PluginContext {
        PluginContext::new(self.service_registry.clone(), self.state_registry.clone())
    }
}

/// Main plugin manager that handles plugin registration, initialization, and application building
pub struct PluginManager {
    plugins: Vec<Box<dyn HavenPlugin>>,
    context: ServiceRegistrationContext,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            context: ServiceRegistrationContext::new(),
        }
    }

    /// Register a plugin (order matters for dependencies)
    pub fn register_plugin(&mut self, plugin: Box<dyn HavenPlugin>) {
        debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Initialize all plugins in registration order
    pub async fn initialize_plugins(&mut self) -> Result<(), PluginError> {
        debug!("Initializing {} plugins", self.plugins.len());

        for plugin in &self.plugins {
            debug!("Initializing plugin: {}", plugin.name());

            plugin.register_services(&self.context).await.map_err(|e| {
                PluginError::PluginRegistrationFailed {
                    plugin_name: plugin.name().to_string(),
                    error: e.to_string(),
                }
            })?;

            debug!("Successfully initialized plugin: {}", plugin.name());
        }

        Ok(())
    }

    /// Build the complete application with routes and OpenAPI
    pub fn build_application(&self) -> Result<Router, PluginError> {
        debug!("Building application with {} plugins", self.plugins.len());

        let plugin_context = self.context.create_plugin_context();
        let mut api_router = Router::new();

        // Collect routes from all plugins
        for plugin in &self.plugins {
            if let Some(plugin_routes) = plugin.configure_routes(&plugin_context) {
                debug!("Adding routes for plugin: {}", plugin.name());
                api_router = api_router.merge(plugin_routes.router);
            }
        }

        Ok(Router::new().nest("/api", api_router))
    }

    /// Get the unified OpenAPI schema from all plugins
    pub fn get_unified_openapi(&self) -> Result<OpenApi, PluginError> {
        self.build_unified_openapi()
    }

    /// Build unified OpenAPI schema from all plugins
    fn build_unified_openapi(&self) -> Result<OpenApi, PluginError> {
        use utoipa::openapi::*;

        let mut combined_openapi = OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title("HavenKit Console")
                    .description(Some(
                        "Administration API for a self-hosted HAVEN relay: configuration \
                         editing, relay lifecycle, log streaming, and bulk import supervision",
                    ))
                    .version("1.0.0")
                    .build(),
            )
            .servers(Some(vec![ServerBuilder::new()
                .url("/api")
                .description(Some("Base path for all API endpoints"))
                .build()]))
            .build();

        // Merge OpenAPI schemas from all plugins
        for plugin in &self.plugins {
            if let Some(plugin_openapi) = plugin.openapi_schema() {
                debug!("Merging OpenAPI schema for plugin: {}", plugin.name());
                combined_openapi = self.merge_openapi_schemas(combined_openapi, plugin_openapi)?;
            }
        }

        Ok(combined_openapi)
    }

    /// Merge two OpenAPI schemas
    fn merge_openapi_schemas(
        &self,
        mut base: OpenApi,
        plugin_schema: OpenApi,
    ) -> Result<OpenApi, PluginError> {
        use utoipa::openapi::ComponentsBuilder;

        // Merge paths
        for (path, path_item) in plugin_schema.paths.paths {
            base.paths.paths.insert(path, path_item);
        }

        // Merge components
        if let Some(plugin_components) = plugin_schema.components {
            let base_components = base
                .components
                .get_or_insert_with(|| ComponentsBuilder::new().build());

            for (name, schema) in plugin_components.schemas {
                base_components.schemas.insert(name, schema);
            }

            for (name, response) in plugin_components.responses {
                base_components.responses.insert(name, response);
            }
        }

        // Merge tags
        if let Some(plugin_tags) = plugin_schema.tags {
            let base_tags = base.tags.get_or_insert_with(Vec::new);
            base_tags.extend(plugin_tags);
        }

        Ok(base)
    }

    /// Get access to the service registration context for manual service registration
    /// This is typically used before plugin initialization to register core services
    pub fn service_context(&self) -> &ServiceRegistrationContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StringService(String);

    #[test]
    fn registry_round_trips_typed_services() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(StringService("relay".to_string())));

        let service = registry.get::<StringService>().expect("service registered");
        assert_eq!(service.0, "relay");
        assert!(registry.get::<Vec<u8>>().is_none());
    }

    #[test]
    fn registry_supports_trait_objects() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> &'static str;
        }
        struct Hello;
        impl Greeter for Hello {
            fn greet(&self) -> &'static str {
                "hello"
            }
        }

        let registry = ServiceRegistry::new();
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        registry.register::<dyn Greeter>(greeter);

        assert_eq!(registry.require::<dyn Greeter>().greet(), "hello");
    }

    struct RecordingPlugin {
        name: &'static str,
    }

    impl HavenPlugin for RecordingPlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn register_services<'a>(
            &'a self,
            context: &'a ServiceRegistrationContext,
        ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
            Box::pin(async move {
                let order = match context.get_service::<Mutex<Vec<&'static str>>>() {
                    Some(order) => order,
                    None => {
                        let order = Arc::new(Mutex::new(Vec::new()));
                        context.register_service(order.clone());
                        order
                    }
                };
                order.lock().unwrap().push(self.name);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn plugins_initialize_in_registration_order() {
        let mut manager = PluginManager::new();
        manager.register_plugin(Box::new(RecordingPlugin { name: "first" }));
        manager.register_plugin(Box::new(RecordingPlugin { name: "second" }));

        manager.initialize_plugins().await.unwrap();

        let order = manager
            .service_context()
            .require_service::<Mutex<Vec<&'static str>>>();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}

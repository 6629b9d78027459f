//! Type-erased client assembled from a base transport and middleware layers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::middleware::{FixedRetryLayer, LoggingLayer, RateLimitLayer, ReliableBodyLayer};
use crate::{
    Cancel, ClientConfig, Error, HyperTransport, Request, Response, Result,
    config::ClientConfigBuilder,
};

// ============================================================================
// Type-Erased Service for Middleware Composition
// ============================================================================

/// Type-erased service for middleware composition.
///
/// This type allows storing and composing arbitrary Tower layers without
/// exposing complex generic types to users.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future type for Tower Service implementation.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

type Canceller = Arc<dyn Cancel + Send + Sync>;

type LayerFn = Box<dyn FnOnce(BoxedService) -> BoxedService + Send + Sync>;

/// Thread-safe wrapper for `BoxedService`.
///
/// `BoxCloneService` is `Send` but not `Sync`; the mutex makes the client
/// shareable, and is only held long enough to clone the service.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move {
            std::future::poll_fn(|cx| service.poll_ready(cx)).await?;
            service.call(request).await
        })
    }
}

// ============================================================================
// Public Client
// ============================================================================

/// HTTP client: a base transport wrapped in middleware, behind one type.
///
/// The client is a [`Transport`](crate::Transport) and always exposes
/// [`Cancel`]: cancellation reaches the base transport when it was registered
/// as cancellable, and does nothing otherwise.
///
/// # Example
///
/// ```ignore
/// use mediate::Client;
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .with_rate_limit(100, Duration::from_secs(1))
///     .with_fixed_retries(3)
///     .with_reliable_body()
///     .build()?;
/// ```
#[derive(Clone)]
pub struct Client {
    service: SyncService,
    canceller: Option<Canceller>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("cancellable", &self.canceller.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client over the default hyper transport, without middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client over a hyper transport with custom configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let transport = HyperTransport::new(config.clone());
        Self {
            canceller: Some(Arc::new(transport.clone())),
            service: SyncService::new(BoxCloneService::new(transport)),
            config,
        }
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns `true` when cancellation reaches the base transport.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.canceller.is_some()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel for Client {
    fn cancel_request(&self, request: &Request) {
        if let Some(canceller) = &self.canceller {
            canceller.cancel_request(request);
        }
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

impl Service<Request> for Client {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // The wrapped service is polled for readiness on each call.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.service.call(request)
    }
}

// ============================================================================
// Builder
// ============================================================================

struct Base {
    service: BoxedService,
    canceller: Option<Canceller>,
}

/// Builder for [`Client`].
///
/// Layers are applied in order: the first added is the outermost and sees
/// each request first, as with [`tower::ServiceBuilder`]. Invalid decorator
/// parameters are reported by [`build`](Self::build).
///
/// # Example
///
/// ```ignore
/// use mediate::Client;
/// use mediate::middleware::LoggingLayer;
/// use std::time::Duration;
///
/// // Rate limit every attempt, not every logical call
/// let client = Client::builder()
///     .timeout(Duration::from_secs(10))
///     .with_fixed_retries(3)
///     .with_rate_limit(10, Duration::from_secs(1))
///     .layer(LoggingLayer::debug())
///     .build()?;
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    base: Option<Base>,
    layers: Vec<LayerFn>,
    error: Option<Error>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.base.is_some())
            .field("layers_count", &self.layers.len())
            .field("error", &self.error)
            .finish()
    }
}

impl ClientBuilder {
    // ========================================================================
    // Core Configuration
    // ========================================================================

    /// Set the request timeout of the default transport.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout of the default transport.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Set the default `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config = self.config.user_agent(agent);
        self
    }

    // ========================================================================
    // Base Transport
    // ========================================================================

    /// Use `transport` as the base instead of [`HyperTransport`].
    ///
    /// The resulting client cannot cancel in-flight requests.
    #[must_use]
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        T::Future: Send + 'static,
    {
        self.base = Some(Base {
            service: BoxCloneService::new(transport),
            canceller: None,
        });
        self
    }

    /// Use a cancellable `transport` as the base instead of [`HyperTransport`].
    #[must_use]
    pub fn cancellable_transport<T>(mut self, transport: T) -> Self
    where
        T: Service<Request, Response = Response, Error = Error>
            + Cancel
            + Clone
            + Send
            + Sync
            + 'static,
        T::Future: Send + 'static,
    {
        self.base = Some(Base {
            canceller: Some(Arc::new(transport.clone())),
            service: BoxCloneService::new(transport),
        });
        self
    }

    // ========================================================================
    // Generic Middleware API
    // ========================================================================

    /// Add a Tower layer to the client.
    ///
    /// Layers are applied in order: first added = outermost (processes requests first).
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers.push(Box::new(move |service| {
            BoxCloneService::new(layer.layer(service))
        }));
        self
    }

    fn layer_or_error<L>(mut self, layer: Result<L>) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        match layer {
            Ok(layer) => self.layer(layer),
            Err(err) => {
                self.error.get_or_insert(err);
                self
            }
        }
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Retry failed requests, making at most `attempts` calls in total.
    ///
    /// An `attempts` of zero makes [`build`](Self::build) fail.
    #[must_use]
    pub fn with_fixed_retries(self, attempts: u32) -> Self {
        self.layer_or_error(FixedRetryLayer::try_new(attempts))
    }

    /// Buffer every response body in memory.
    #[must_use]
    pub fn with_reliable_body(self) -> Self {
        self.layer(ReliableBodyLayer::new())
    }

    /// Admit at most `limit` calls in any rolling `window`.
    #[must_use]
    pub fn with_rate_limit(self, limit: u32, window: Duration) -> Self {
        self.layer_or_error(RateLimitLayer::new(limit, window))
    }

    /// Admit `limit` calls per `window`, evenly spaced.
    #[must_use]
    pub fn with_paced_rate_limit(self, limit: u32, window: Duration) -> Self {
        self.layer_or_error(RateLimitLayer::paced(limit, window))
    }

    /// Add request/response logging.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.layer(LoggingLayer::new())
    }

    /// Add debug-level logging (includes headers and more detail).
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.layer(LoggingLayer::debug())
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the client with all configured middleware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for the first invalid decorator
    /// parameter or transport setting.
    pub fn build(self) -> Result<Client> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let config = self.config.build();
        config.validate()?;

        let Base {
            mut service,
            canceller,
        } = self.base.unwrap_or_else(|| {
            let transport = HyperTransport::new(config.clone());
            Base {
                canceller: Some(Arc::new(transport.clone())),
                service: BoxCloneService::new(transport),
            }
        });

        // Wrap from the innermost layer outwards
        for layer_fn in self.layers.into_iter().rev() {
            service = layer_fn(service);
        }

        Ok(Client {
            service: SyncService::new(service),
            canceller,
            config,
        })
    }
}

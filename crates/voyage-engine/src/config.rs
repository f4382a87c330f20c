//! Engine-wide configuration (spec section 6's configuration table).

use std::sync::Arc;
use std::time::Duration;

use voyage_core::{
    ApplicationContext, ExceptionSerializer, JsonValueSerializer, PlainTextExceptionSerializer,
    ValueSerializer,
};
use voyage_core::constants::{DEFAULT_MAX_PARALLEL, DEFAULT_MAX_QUEUED};
use voyage_queue::WorkQueue;

pub struct EngineConfig {
    pub max_parallel: usize,
    pub max_queued: usize,
    pub instance_name: String,
    pub cluster_name: Option<String>,
    pub work_queue: Option<Arc<dyn WorkQueue>>,
    pub application_context: ApplicationContext,
    pub exception_serializer: Arc<dyn ExceptionSerializer>,
    pub value_serializer: Arc<dyn ValueSerializer>,
    pub retention_check_interval: Duration,
    pub completed_flight_retention: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            max_queued: DEFAULT_MAX_QUEUED,
            instance_name: uuid::Uuid::new_v4().to_string(),
            cluster_name: None,
            work_queue: None,
            application_context: Arc::new(()),
            exception_serializer: Arc::new(PlainTextExceptionSerializer),
            value_serializer: Arc::new(JsonValueSerializer),
            retention_check_interval: Duration::from_secs(24 * 60 * 60),
            completed_flight_retention: None,
        }
    }
}

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self { config: EngineConfig::default() }
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel = if max_parallel == 0 { DEFAULT_MAX_PARALLEL } else { max_parallel };
        self
    }

    pub fn max_queued(mut self, max_queued: usize) -> Self {
        self.config.max_queued = max_queued.max(1);
        self
    }

    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.config.instance_name = instance_name.into();
        self
    }

    pub fn cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.config.cluster_name = Some(cluster_name.into());
        self
    }

    pub fn work_queue(mut self, work_queue: Arc<dyn WorkQueue>) -> Self {
        self.config.work_queue = Some(work_queue);
        self
    }

    pub fn application_context(mut self, application_context: ApplicationContext) -> Self {
        self.config.application_context = application_context;
        self
    }

    pub fn exception_serializer(mut self, serializer: Arc<dyn ExceptionSerializer>) -> Self {
        self.config.exception_serializer = serializer;
        self
    }

    pub fn value_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.config.value_serializer = serializer;
        self
    }

    pub fn retention_check_interval(mut self, interval: Duration) -> Self {
        self.config.retention_check_interval = interval;
        self
    }

    pub fn completed_flight_retention(mut self, retention: Duration) -> Self {
        self.config.completed_flight_retention = Some(retention);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

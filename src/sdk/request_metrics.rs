use std::sync::{Arc, OnceLock};

use prometheus::{Histogram, IntGauge, Registry};

use super::interceptor::{ExecutionAttributes, ExecutionInterceptor, SdkHttpRequest, SdkHttpResponse};
use crate::errors::{BinderError, BinderResult};
use crate::internals::InstrumentCache;
use crate::prometheus_metrics::{MetricDescriptor, Tags, LABEL_CLIENT_TYPE, LABEL_OPERATION, LABEL_STATUS};

/// Instruments, created on attach.
struct Attached {
    request_seconds: InstrumentCache<Histogram>,
    active_requests: IntGauge,
    request_size_bytes: InstrumentCache<IntGauge>,
    response_size_bytes: InstrumentCache<IntGauge>,
}

/// An [`ExecutionInterceptor`] that times the calls of a cloud SDK client, and tracks their sizes.
///
/// Until [`Self::attach`]-ed to a [`Registry`], it intercepts calls without recording anything.
pub struct SdkRequestMetrics {
    service: String,
    tags: Tags,
    attached: OnceLock<Attached>,
}

impl SdkRequestMetrics {
    /// # Arguments
    ///
    /// * `service` - Name of the service the client talks to, used as metric name prefix
    /// * `tags` - Static tags added to every instrument
    pub fn new(service: impl Into<String>, tags: Tags) -> Self {
        Self {
            service: service.into(),
            tags,
            attached: OnceLock::new(),
        }
    }

    pub fn s3(tags: Tags) -> Self {
        Self::new("s3", tags)
    }

    pub fn dynamodb(tags: Tags) -> Self {
        Self::new("dynamodb", tags)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get().is_some()
    }

    /// Registers the instruments.
    ///
    /// Can be done only once: further calls fail with [`BinderError::AlreadyAttached`].
    /// Calls already in flight when this happens are not counted as active.
    pub fn attach(&self, registry: Arc<Registry>) -> BinderResult<()> {
        let descriptor = |suffix: &str, help: String| {
            MetricDescriptor::new(format!("{}_{suffix}", self.service), help, self.tags.clone())
        };
        let service = &self.service;

        let active_descriptor = descriptor("active_requests", format!("Number of {service} requests in flight"));
        let active_requests = active_descriptor.build::<IntGauge>(&[])?;
        let attached = Attached {
            request_seconds: InstrumentCache::new(
                descriptor("request_seconds", format!("Duration of {service} requests")),
                &[LABEL_OPERATION, LABEL_CLIENT_TYPE, LABEL_STATUS],
                registry.clone(),
            ),
            active_requests: active_requests.clone(),
            request_size_bytes: InstrumentCache::new(
                descriptor("request_size_bytes", format!("Body size of the last {service} request")),
                &[LABEL_OPERATION, LABEL_CLIENT_TYPE],
                registry.clone(),
            ),
            response_size_bytes: InstrumentCache::new(
                descriptor("response_size_bytes", format!("Body size of the last {service} response")),
                &[LABEL_OPERATION, LABEL_CLIENT_TYPE],
                registry.clone(),
            ),
        };

        // Only the attach that wins the cell registers anything
        self.attached.set(attached).map_err(|_| BinderError::AlreadyAttached(self.service.clone()))?;
        registry.register(Box::new(active_requests)).map_err(|e| active_descriptor.registration_error(e))
    }

    /// Marks the calls that incremented `active_requests`, so that only they decrement it.
    fn active_marker(&self) -> String {
        format!("{}.active_requests", self.service)
    }

    fn with_attached(&self, hook: &str, f: impl FnOnce(&Attached) -> BinderResult<()>) {
        if let Some(attached) = self.attached.get() {
            if let Err(e) = f(attached) {
                warn!("Failed to record {} request metrics in '{hook}': {e}", self.service);
            }
        }
    }
}

impl ExecutionInterceptor for SdkRequestMetrics {
    fn before_execution(&self, attributes: &mut ExecutionAttributes) {
        if let Some(attached) = self.attached.get() {
            attached.active_requests.inc();
            attributes.mark(self.active_marker());
        }
    }

    fn before_transmission(&self, request: &SdkHttpRequest, attributes: &ExecutionAttributes) {
        let Some(size) = request.content_length else {
            return;
        };
        self.with_attached("before_transmission", |a| {
            let labels = [attributes.operation.as_str(), attributes.client_type.as_str()];
            a.request_size_bytes.get_or_create(&labels)?.set(size as i64);
            Ok(())
        });
    }

    fn after_unmarshalling(&self, response: &SdkHttpResponse, attributes: &ExecutionAttributes) {
        let Some(size) = response.first_matching_header("Content-Length").and_then(|v| v.trim().parse::<i64>().ok())
        else {
            return;
        };
        self.with_attached("after_unmarshalling", |a| {
            let labels = [attributes.operation.as_str(), attributes.client_type.as_str()];
            a.response_size_bytes.get_or_create(&labels)?.set(size);
            Ok(())
        });
    }

    fn after_execution(&self, response: &SdkHttpResponse, attributes: &ExecutionAttributes) {
        let counted = attributes.is_marked(&self.active_marker());
        self.with_attached("after_execution", |a| {
            if counted {
                a.active_requests.dec();
            }

            if let Some(started_at) = attributes.started_at {
                let status = response.status.to_string();
                let labels = [attributes.operation.as_str(), attributes.client_type.as_str(), status.as_str()];
                a.request_seconds.get_or_create(&labels)?.observe(started_at.elapsed().as_secs_f64());
            }
            Ok(())
        });
    }

    fn on_execution_failure(&self, error: &dyn std::error::Error, attributes: &ExecutionAttributes) {
        debug!("{} '{}' failed: {error}", self.service, attributes.operation);
        if attributes.is_marked(&self.active_marker()) {
            self.with_attached("on_execution_failure", |a| {
                a.active_requests.dec();
                Ok(())
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prometheus_metrics::testing::{gauge_value, histogram_count, instrument_count};
    use crate::sdk::{ClientType, InterceptorChain};

    async fn call(chain: &InterceptorChain, operation: &str, status: u16, body: Option<u64>) {
        let request = SdkHttpRequest {
            method: "PUT".to_string(),
            uri: "https://bucket.s3.amazonaws.com/key".to_string(),
            content_length: body,
        };
        let res: Result<(), std::io::Error> = chain
            .execute(ExecutionAttributes::new(operation, ClientType::Sync), request, |_| async move {
                Ok((SdkHttpResponse::new(status).with_header("content-length", "128"), ()))
            })
            .await;
        res.unwrap();
    }

    #[tokio::test]
    async fn should_time_and_size_requests() {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(SdkRequestMetrics::s3(Tags::new()));
        metrics.attach(registry.clone()).unwrap();
        let chain = InterceptorChain::new().with(metrics.clone());

        call(&chain, "PutObject", 200, Some(1024)).await;
        call(&chain, "PutObject", 200, None).await;
        call(&chain, "GetObject", 404, None).await;

        let put_ok = [(LABEL_OPERATION, "PutObject"), (LABEL_CLIENT_TYPE, "SYNC"), (LABEL_STATUS, "200")];
        let get_missing = [(LABEL_OPERATION, "GetObject"), (LABEL_CLIENT_TYPE, "SYNC"), (LABEL_STATUS, "404")];
        assert_eq!(histogram_count(&registry, "s3_request_seconds", &put_ok), Some(2));
        assert_eq!(histogram_count(&registry, "s3_request_seconds", &get_missing), Some(1));

        assert_eq!(gauge_value(&registry, "s3_request_size_bytes", &[(LABEL_OPERATION, "PutObject")]), Some(1024.0));
        assert_eq!(instrument_count(&registry, "s3_request_size_bytes"), 1);
        assert_eq!(gauge_value(&registry, "s3_response_size_bytes", &[(LABEL_OPERATION, "GetObject")]), Some(128.0));
        assert_eq!(gauge_value(&registry, "s3_active_requests", &[]), Some(0.0));
    }

    #[tokio::test]
    async fn should_not_record_before_attach() {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(SdkRequestMetrics::dynamodb(Tags::new()));
        let chain = InterceptorChain::new().with(metrics.clone());

        call(&chain, "GetItem", 200, Some(10)).await;
        assert!(registry.gather().is_empty());

        metrics.attach(registry.clone()).unwrap();
        call(&chain, "GetItem", 200, Some(10)).await;
        assert_eq!(
            histogram_count(&registry, "dynamodb_request_seconds", &[(LABEL_OPERATION, "GetItem")]),
            Some(1)
        );
    }

    #[tokio::test]
    async fn call_in_flight_at_attach_should_not_be_counted() {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(SdkRequestMetrics::s3(Tags::new()));
        let chain = InterceptorChain::new().with(metrics.clone());

        let attach_registry = registry.clone();
        let attaching = metrics.clone();
        let res: Result<(), std::io::Error> = chain
            .execute(ExecutionAttributes::new("GetObject", ClientType::Async), SdkHttpRequest::default(), |_| async move {
                attaching.attach(attach_registry).unwrap();
                Ok((SdkHttpResponse::new(200), ()))
            })
            .await;
        res.unwrap();
        assert_eq!(gauge_value(&registry, "s3_active_requests", &[]), Some(0.0));

        let res: Result<(), std::io::Error> = chain
            .execute(ExecutionAttributes::new("GetObject", ClientType::Async), SdkHttpRequest::default(), |_| async {
                Err(std::io::Error::other("timed out"))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(gauge_value(&registry, "s3_active_requests", &[]), Some(0.0));
    }

    #[test]
    fn concurrent_attaches_should_register_once() {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(SdkRequestMetrics::dynamodb(Tags::new()));

        let outcomes: Vec<BinderResult<()>> = std::thread::scope(|scope| {
            let attaching: Vec<_> = (0..8)
                .map(|_| {
                    let registry = registry.clone();
                    let metrics = metrics.clone();
                    scope.spawn(move || metrics.attach(registry))
                })
                .collect();
            attaching.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().all(|o| matches!(o, Ok(()) | Err(BinderError::AlreadyAttached(_)))));
        assert_eq!(instrument_count(&registry, "dynamodb_active_requests"), 1);
    }

    #[test]
    fn should_attach_only_once() {
        let metrics = SdkRequestMetrics::dynamodb(Tags::new());
        metrics.attach(Arc::new(Registry::new())).unwrap();

        let res = metrics.attach(Arc::new(Registry::new()));
        assert!(matches!(res, Err(BinderError::AlreadyAttached(s)) if s == "dynamodb"));
        assert!(metrics.is_attached());
    }
}

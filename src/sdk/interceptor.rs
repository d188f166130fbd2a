use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// How the SDK client issuing a request is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    Sync,
    Async,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Sync => "SYNC",
            ClientType::Async => "ASYNC",
        }
    }
}

impl Display for ClientType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single SDK call, shared by all the hooks invoked for it.
#[derive(Debug, Clone)]
pub struct ExecutionAttributes {
    pub operation: String,
    pub client_type: ClientType,
    /// Set by the chain, right before the `before_execution` hooks.
    pub started_at: Option<Instant>,
    markers: HashSet<String>,
}

impl ExecutionAttributes {
    pub fn new(operation: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            operation: operation.into(),
            client_type,
            started_at: None,
            markers: HashSet::new(),
        }
    }

    /// Records that something happened to this call, for later hooks to find out.
    pub fn mark(&mut self, marker: impl Into<String>) {
        self.markers.insert(marker.into());
    }

    pub fn is_marked(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }
}

/// The HTTP request an SDK call is about to transmit.
#[derive(Debug, Clone, Default)]
pub struct SdkHttpRequest {
    pub method: String,
    pub uri: String,
    /// Length of the body, if known upfront.
    pub content_length: Option<u64>,
}

/// The HTTP response an SDK call received.
#[derive(Debug, Clone, Default)]
pub struct SdkHttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl SdkHttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of the first header called `name` (case insensitive).
    pub fn first_matching_header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Hooks invoked around every call made by an SDK client.
///
/// All hooks default to doing nothing: implementors override only what they need.
pub trait ExecutionInterceptor: Send + Sync {
    /// Called before anything else, once per call.
    ///
    /// The only hook allowed to [`ExecutionAttributes::mark`] the call.
    fn before_execution(&self, attributes: &mut ExecutionAttributes) {
        let _ = attributes;
    }

    /// Called right before the request is sent over the wire.
    fn before_transmission(&self, request: &SdkHttpRequest, attributes: &ExecutionAttributes) {
        let _ = (request, attributes);
    }

    /// Called once the response has been received and decoded.
    fn after_unmarshalling(&self, response: &SdkHttpResponse, attributes: &ExecutionAttributes) {
        let _ = (response, attributes);
    }

    /// Called last, when the call succeeded.
    fn after_execution(&self, response: &SdkHttpResponse, attributes: &ExecutionAttributes) {
        let _ = (response, attributes);
    }

    /// Called last, when the call failed without producing a response.
    fn on_execution_failure(&self, error: &dyn std::error::Error, attributes: &ExecutionAttributes) {
        let _ = (error, attributes);
    }
}

/// Ordered list of [`ExecutionInterceptor`]s, driven around each call.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn ExecutionInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: Arc<dyn ExecutionInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Executes a call, invoking the hooks of every interceptor, in order, around it.
    ///
    /// # Arguments
    ///
    /// * `attributes` - Identity of the call
    /// * `request` - What is about to be sent
    /// * `send` - Performs the call, resolving to the received response and its decoded content
    pub async fn execute<T, E, Fut>(
        &self,
        mut attributes: ExecutionAttributes,
        request: SdkHttpRequest,
        send: impl FnOnce(SdkHttpRequest) -> Fut,
    ) -> Result<T, E>
    where
        E: std::error::Error,
        Fut: Future<Output = Result<(SdkHttpResponse, T), E>>,
    {
        attributes.started_at = Some(Instant::now());
        for i in &self.interceptors {
            i.before_execution(&mut attributes);
        }
        for i in &self.interceptors {
            i.before_transmission(&request, &attributes);
        }

        match send(request).await {
            Ok((response, content)) => {
                for i in &self.interceptors {
                    i.after_unmarshalling(&response, &attributes);
                }
                for i in &self.interceptors {
                    i.after_execution(&response, &attributes);
                }
                Ok(content)
            },
            Err(e) => {
                for i in &self.interceptors {
                    i.on_execution_failure(&e, &attributes);
                }
                Err(e)
            },
        }
    }
}

//! Request metrics for cloud SDK clients, collected by intercepting every call a client makes.

// Inner modules
mod interceptor;
mod request_metrics;

// Exports
pub use interceptor::{
    ClientType, ExecutionAttributes, ExecutionInterceptor, InterceptorChain, SdkHttpRequest, SdkHttpResponse,
};
pub use request_metrics::SdkRequestMetrics;

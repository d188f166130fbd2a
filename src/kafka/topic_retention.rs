use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::admin::{BrokerAdmin, TopicSelector};
use super::clients::TopicClient;
use super::KAFKA_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, ClientFactory, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_TOPIC};

const MET_NAME: &str = formatcp!("{KAFKA_METRIC_PREFIX}_topic_retention_milliseconds");
const MET_HELP: &str = "Kafka topic retention (retention.ms)";

/// Publishes the configured retention of each Topic, in milliseconds.
///
/// `-1` means "infinite retention", as configured on the Topic.
pub struct TopicRetentionMetric<F> {
    topics: TopicSelector,
    config: BinderConfig,
    factory: F,
}

impl<F> TopicRetentionMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    pub fn new(topics: TopicSelector, config: BinderConfig, factory: F) -> Self {
        Self {
            topics,
            config,
            factory,
        }
    }
}

#[async_trait]
impl<F> MeterBinder for TopicRetentionMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshRetentions {
            topics: self.topics,
            factory: self.factory,
            gauges: InstrumentCache::new(
                MetricDescriptor::new(MET_NAME, MET_HELP, self.config.tags),
                &[LABEL_TOPIC],
                registry,
            ),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshRetentions<F> {
    topics: TopicSelector,
    factory: F,
    gauges: InstrumentCache<IntGauge>,
}

#[async_trait]
impl<F> RefreshAction for RefreshRetentions<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    fn name(&self) -> &str {
        MET_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let admin = self.factory.open_client().await?;
        let topics = self.topics.resolve(&admin).await?;

        for (topic, retention) in TopicClient::new(&admin).retentions(&topics).await? {
            self.gauges.get_or_create(&[topic.as_str()])?.set(retention);
        }
        Ok(())
    }
}

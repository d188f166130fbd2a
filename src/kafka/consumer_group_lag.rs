use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::admin::{BrokerAdmin, TopicSelector};
use super::clients::{lags, OffsetsClient};
use super::KAFKA_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, ClientFactory, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_CONSUMER_GROUP, LABEL_TOPIC};

const MET_NAME: &str = formatcp!("{KAFKA_METRIC_PREFIX}_consumer_group_lag");
const MET_HELP: &str = "Kafka consumer group lag, summed across the partitions of a topic";

/// Publishes the lag of Consumer Groups, per Topic.
///
/// The lag of a Group on a Topic is the sum of `end offset - committed offset`
/// of each Partition. Partitions where the Group has never committed are left out:
/// if that's the case for all the Partitions, the gauge is not updated.
pub struct ConsumerGroupLagMetric<F> {
    groups: Vec<String>,
    topics: TopicSelector,
    config: BinderConfig,
    factory: F,
}

impl<F> ConsumerGroupLagMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    /// Create a new [`ConsumerGroupLagMetric`]
    ///
    /// # Arguments
    ///
    /// * `groups` - Consumer Groups to measure the lag of
    /// * `topics` - Topics consumed by the Groups
    /// * `config` - Static tags and refresh schedule
    /// * `factory` - Opens the Kafka admin client at every refresh
    pub fn new<I, S>(groups: I, topics: TopicSelector, config: BinderConfig, factory: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            topics,
            config,
            factory,
        }
    }
}

#[async_trait]
impl<F> MeterBinder for ConsumerGroupLagMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshLags {
            groups: self.groups,
            topics: self.topics,
            factory: self.factory,
            gauges: InstrumentCache::new(
                MetricDescriptor::new(MET_NAME, MET_HELP, self.config.tags),
                &[LABEL_CONSUMER_GROUP, LABEL_TOPIC],
                registry,
            ),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshLags<F> {
    groups: Vec<String>,
    topics: TopicSelector,
    factory: F,
    gauges: InstrumentCache<IntGauge>,
}

#[async_trait]
impl<F> RefreshAction for RefreshLags<F>
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
        let client = OffsetsClient::new(&admin);

        for group in &self.groups {
            let offsets = client.offsets(&topics, Some(group.as_str())).await?;
            for (topic, lag) in lags(&offsets) {
                trace!("Lag of '{group}' on '{topic}': {lag}");
                self.gauges.get_or_create(&[group.as_str(), topic.as_str()])?.set(lag);
            }
        }
        Ok(())
    }
}

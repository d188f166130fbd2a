use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::admin::{BrokerAdmin, TopicSelector};
use super::clients::{record_counts, OffsetsClient};
use super::KAFKA_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, ClientFactory, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_TOPIC};

const MET_NAME: &str = formatcp!("{KAFKA_METRIC_PREFIX}_topic_records_count");
const MET_HELP: &str = "Kafka topic estimated record count";

/// Publishes the estimated amount of records of each Topic.
///
/// The count for a Topic is the sum of `end offset - start offset` of each of its Partitions.
/// It's an estimate: compacted Topics and transaction markers make it larger than the real count.
pub struct TopicRecordCountMetric<F> {
    topics: TopicSelector,
    config: BinderConfig,
    factory: F,
}

impl<F> TopicRecordCountMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    /// Create a new [`TopicRecordCountMetric`]
    ///
    /// # Arguments
    ///
    /// * `topics` - Topics to count records of: each one gets a separate gauge
    /// * `config` - Static tags and refresh schedule
    /// * `factory` - Opens the Kafka admin client at every refresh
    pub fn new(topics: TopicSelector, config: BinderConfig, factory: F) -> Self {
        Self {
            topics,
            config,
            factory,
        }
    }
}

#[async_trait]
impl<F> MeterBinder for TopicRecordCountMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshRecordCounts {
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

struct RefreshRecordCounts<F> {
    topics: TopicSelector,
    factory: F,
    gauges: InstrumentCache<IntGauge>,
}

#[async_trait]
impl<F> RefreshAction for RefreshRecordCounts<F>
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
        let offsets = OffsetsClient::new(&admin).offsets(&topics, None).await?;

        for (topic, count) in record_counts(&offsets) {
            self.gauges.get_or_create(&[topic.as_str()])?.set(count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use regex::Regex;
    use tokio::time::{sleep, Duration};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::internals::Schedule;
    use crate::kafka::mock::MockCluster;
    use crate::prometheus_metrics::testing::{gauge_value, instrument_count};

    fn cluster() -> MockCluster {
        let cluster = MockCluster::default();
        cluster.add_partition("orders", 0, (0, 10), &[1, 2, 3], &[1, 2, 3]);
        cluster.add_partition("orders", 1, (5, 5), &[2, 3, 1], &[2, 3, 1]);
        cluster.add_partition("payments", 0, (100, 142), &[1], &[1]);
        cluster.add_partition("__consumer_offsets", 0, (0, 1000), &[1], &[1]);
        cluster
    }

    fn records(registry: &Registry, topic: &str) -> Option<f64> {
        gauge_value(registry, MET_NAME, &[(LABEL_TOPIC, topic)])
    }

    #[tokio::test]
    async fn should_sum_partition_counts() {
        let registry = Arc::new(Registry::new());
        let scheduler = Scheduler::current(CancellationToken::new());

        let binder = TopicRecordCountMetric::new(
            TopicSelector::names(["orders"]),
            BinderConfig::new(Schedule::Once).with_tag("cluster", "test"),
            cluster(),
        );
        let handle = binder.attach(registry.clone(), &scheduler).await.unwrap();
        assert!(handle.is_finished());

        assert_eq!(records(&registry, "orders"), Some(10.0));
        assert_eq!(gauge_value(&registry, MET_NAME, &[("cluster", "test")]), Some(10.0));
        assert_eq!(records(&registry, "payments"), None);
    }

    #[tokio::test]
    async fn pattern_should_skip_consumer_offsets() {
        let registry = Arc::new(Registry::new());
        let scheduler = Scheduler::current(CancellationToken::new());

        let binder = TopicRecordCountMetric::new(
            TopicSelector::Pattern(Regex::new(".*").unwrap()),
            BinderConfig::new(Schedule::Once),
            cluster(),
        );
        binder.attach(registry.clone(), &scheduler).await.unwrap();

        assert_eq!(instrument_count(&registry, MET_NAME), 2);
        assert_eq!(records(&registry, "payments"), Some(42.0));
        assert_eq!(records(&registry, "__consumer_offsets"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_should_keep_last_values() {
        let registry = Arc::new(Registry::new());
        let scheduler = Scheduler::current(CancellationToken::new());
        let cluster = cluster();

        let binder = TopicRecordCountMetric::new(
            TopicSelector::names(["orders"]),
            BinderConfig::new(Schedule::Fixed(Duration::from_secs(10))),
            cluster.clone(),
        );
        let handle = binder.attach(registry.clone(), &scheduler).await.unwrap();

        // Nothing observed before the first interval elapses
        assert_eq!(records(&registry, "orders"), None);

        sleep(Duration::from_secs(11)).await;
        assert_eq!(records(&registry, "orders"), Some(10.0));

        cluster.set_offsets("orders", 0, (0, 20));
        sleep(Duration::from_secs(10)).await;
        assert_eq!(records(&registry, "orders"), Some(20.0));

        handle.cancel();
        handle.join().await;

        cluster.set_offsets("orders", 0, (0, 30));
        sleep(Duration::from_secs(60)).await;
        assert_eq!(records(&registry, "orders"), Some(20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn should_recover_when_cluster_becomes_reachable() {
        let registry = Arc::new(Registry::new());
        let scheduler = Scheduler::current(CancellationToken::new());
        let cluster = cluster();
        cluster.set_unreachable(true);

        let binder = TopicRecordCountMetric::new(
            TopicSelector::names(["orders"]),
            BinderConfig::new(Schedule::Fixed(Duration::from_secs(10))),
            cluster.clone(),
        );
        let handle = binder.attach(registry.clone(), &scheduler).await.unwrap();

        sleep(Duration::from_secs(25)).await;
        assert_eq!(cluster.opened_clients(), 2);
        assert_eq!(records(&registry, "orders"), None);

        cluster.set_unreachable(false);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(records(&registry, "orders"), Some(10.0));

        scheduler.shutdown();
        handle.join().await;
    }
}

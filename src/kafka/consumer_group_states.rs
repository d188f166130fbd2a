use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::admin::BrokerAdmin;
use super::clients::ConsumerGroupClient;
use super::KAFKA_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, ClientFactory, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::kafka_types::ConsumerGroupState;
use crate::prometheus_metrics::{MetricDescriptor, LABEL_STATE};

const MET_NAME: &str = formatcp!("{KAFKA_METRIC_PREFIX}_consumer_group_states");
const MET_HELP: &str = "Kafka consumer group states count";

/// Publishes how many of the given Consumer Groups are in each [`ConsumerGroupState`].
///
/// A gauge for every state is registered on attach, so that states no Group
/// is in are reported as `0` rather than missing.
pub struct ConsumerGroupStatesMetric<F> {
    groups: Vec<String>,
    config: BinderConfig,
    factory: F,
}

impl<F> ConsumerGroupStatesMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    pub fn new<I, S>(groups: I, config: BinderConfig, factory: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            config,
            factory,
        }
    }
}

#[async_trait]
impl<F> MeterBinder for ConsumerGroupStatesMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let gauges = InstrumentCache::new(
            MetricDescriptor::new(MET_NAME, MET_HELP, self.config.tags),
            &[LABEL_STATE],
            registry,
        );
        for state in ConsumerGroupState::ALL {
            gauges.get_or_create(&[state.as_str()])?;
        }

        let refresh = RefreshStates {
            groups: self.groups,
            factory: self.factory,
            gauges,
        };
        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshStates<F> {
    groups: Vec<String>,
    factory: F,
    gauges: InstrumentCache<IntGauge>,
}

#[async_trait]
impl<F> RefreshAction for RefreshStates<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    fn name(&self) -> &str {
        MET_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let admin = self.factory.open_client().await?;

        for (state, count) in ConsumerGroupClient::new(&admin).states(&self.groups).await? {
            self.gauges.get_or_create(&[state.as_str()])?.set(count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tokio::time::{sleep, Duration};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::prometheus_metrics::testing::{gauge_value, instrument_count};
    use crate::internals::Schedule;
    use crate::kafka::mock::MockCluster;

    fn state_count(registry: &Registry, state: ConsumerGroupState) -> Option<f64> {
        gauge_value(registry, MET_NAME, &[(LABEL_STATE, state.as_str())])
    }

    #[tokio::test(start_paused = true)]
    async fn should_count_groups_per_state() {
        let cluster = MockCluster::default();
        cluster.set_group("billing", ConsumerGroupState::Stable, 3);
        cluster.set_group("shipping", ConsumerGroupState::Stable, 1);
        cluster.set_group("audit", ConsumerGroupState::Empty, 0);

        let registry = Arc::new(Registry::new());
        let binder = ConsumerGroupStatesMetric::new(
            ["billing", "shipping", "audit"],
            BinderConfig::new(Schedule::Fixed(Duration::from_secs(60))),
            cluster.clone(),
        );
        let handle = binder.attach(registry.clone(), &Scheduler::current(CancellationToken::new())).await.unwrap();

        // Every state is there from the start
        assert_eq!(instrument_count(&registry, MET_NAME), ConsumerGroupState::ALL.len());
        assert_eq!(state_count(&registry, ConsumerGroupState::Stable), Some(0.0));

        sleep(Duration::from_secs(61)).await;
        assert_eq!(state_count(&registry, ConsumerGroupState::Stable), Some(2.0));
        assert_eq!(state_count(&registry, ConsumerGroupState::Empty), Some(1.0));
        assert_eq!(state_count(&registry, ConsumerGroupState::Dead), Some(0.0));

        // A state no longer observed goes back to zero
        cluster.set_group("audit", ConsumerGroupState::PreparingRebalance, 2);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(state_count(&registry, ConsumerGroupState::Empty), Some(0.0));
        assert_eq!(state_count(&registry, ConsumerGroupState::PreparingRebalance), Some(1.0));

        handle.cancel();
        handle.join().await;
    }
}

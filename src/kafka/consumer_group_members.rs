use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::admin::BrokerAdmin;
use super::clients::ConsumerGroupClient;
use super::KAFKA_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, ClientFactory, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_CONSUMER_GROUP};

const MET_NAME: &str = formatcp!("{KAFKA_METRIC_PREFIX}_consumer_group_members");
const MET_HELP: &str = "Kafka consumer group member count";

/// Publishes the amount of members of each of the given Consumer Groups.
pub struct ConsumerGroupMemberCountMetric<F> {
    groups: Vec<String>,
    config: BinderConfig,
    factory: F,
}

impl<F> ConsumerGroupMemberCountMetric<F>
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
impl<F> MeterBinder for ConsumerGroupMemberCountMetric<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshMembers {
            groups: self.groups,
            factory: self.factory,
            gauges: InstrumentCache::new(
                MetricDescriptor::new(MET_NAME, MET_HELP, self.config.tags),
                &[LABEL_CONSUMER_GROUP],
                registry,
            ),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshMembers<F> {
    groups: Vec<String>,
    factory: F,
    gauges: InstrumentCache<IntGauge>,
}

#[async_trait]
impl<F> RefreshAction for RefreshMembers<F>
where
    F: ClientFactory,
    F::Client: BrokerAdmin,
{
    fn name(&self) -> &str {
        MET_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let admin = self.factory.open_client().await?;

        for (group, members) in ConsumerGroupClient::new(&admin).members(&self.groups).await? {
            self.gauges.get_or_create(&[group.as_str()])?.set(members);
        }
        Ok(())
    }
}

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, OwnedResourceSpecifier, ResourceSpecifier};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::time::Duration;

use super::admin::{BrokerAdmin, OffsetSpec, TopicConfig};
use crate::errors::{BinderError, BinderResult};
use crate::internals::ClientFactory;
use crate::kafka_types::{
    ConsumerGroupState, GroupDescription, PartitionStatus, TopicDescription, TopicPartition,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates [`RdKafkaAdmin`] clients out of a [`ClientConfig`].
#[derive(Clone)]
pub struct RdKafkaAdminFactory {
    config: ClientConfig,
}

impl RdKafkaAdminFactory {
    /// Create a new [`RdKafkaAdminFactory`]
    ///
    /// # Arguments
    ///
    /// * `config` - Kafka client configuration (`bootstrap.servers`, `client.id`, security...)
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
        }
    }
}

#[async_trait]
impl ClientFactory for RdKafkaAdminFactory {
    type Client = RdKafkaAdmin;

    async fn open_client(&self) -> BinderResult<Self::Client> {
        let admin: AdminClient<DefaultClientContext> = self
            .config
            .create()
            .map_err(|e| BinderError::Connection(format!("Failed to allocate Admin Client: {e}")))?;

        Ok(RdKafkaAdmin {
            admin: Arc::new(admin),
            config: self.config.clone(),
        })
    }
}

/// [`BrokerAdmin`] backed by `librdkafka`.
///
/// Metadata, watermarks and group requests are blocking in `librdkafka`:
/// they are executed via [`tokio::task::spawn_blocking`].
pub struct RdKafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    config: ClientConfig,
}

impl RdKafkaAdmin {
    async fn blocking<T, F>(&self, call: &'static str, f: F) -> BinderResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&AdminClient<DefaultClientContext>) -> BinderResult<T> + Send + 'static,
    {
        let admin = self.admin.clone();
        tokio::task::spawn_blocking(move || f(admin.as_ref())).await.map_err(|e| BinderError::call(call, e))?
    }
}

#[async_trait]
impl BrokerAdmin for RdKafkaAdmin {
    async fn list_topics(&self) -> BinderResult<Vec<String>> {
        self.blocking("list_topics", |admin| {
            let metadata =
                admin.inner().fetch_metadata(None, FETCH_TIMEOUT).map_err(|e| BinderError::call("list_topics", e))?;
            Ok(metadata.topics().iter().map(|t| t.name().to_string()).collect())
        })
        .await
    }

    async fn describe_topics(&self, topics: &[String]) -> BinderResult<Vec<TopicDescription>> {
        let wanted: BTreeSet<String> = topics.iter().cloned().collect();

        self.blocking("describe_topics", move |admin| {
            let metadata = admin
                .inner()
                .fetch_metadata(None, FETCH_TIMEOUT)
                .map_err(|e| BinderError::call("describe_topics", e))?;

            let mut res = Vec::with_capacity(wanted.len());
            for mt in metadata.topics().iter().filter(|mt| wanted.contains(mt.name())) {
                if let Some(e) = mt.error() {
                    return Err(BinderError::call("describe_topics", format!("topic '{}': {e:?}", mt.name())));
                }

                res.push(TopicDescription {
                    name: mt.name().to_string(),
                    partitions: mt
                        .partitions()
                        .iter()
                        .map(|p| PartitionStatus {
                            id: p.id() as u32,
                            leader_broker: p.leader() as u32,
                            replica_brokers: p.replicas().iter().map(|r| *r as u32).collect(),
                            in_sync_replica_brokers: p.isr().iter().map(|isr| *isr as u32).collect(),
                        })
                        .collect(),
                });
            }

            if res.len() != wanted.len() {
                let missing: Vec<&String> =
                    wanted.iter().filter(|t| !res.iter().any(|td| &td.name == *t)).collect();
                return Err(BinderError::call("describe_topics", format!("unknown topics {missing:?}")));
            }

            Ok(res)
        })
        .await
    }

    async fn list_offsets(
        &self,
        partitions: &[TopicPartition],
        spec: OffsetSpec,
    ) -> BinderResult<HashMap<TopicPartition, i64>> {
        let partitions = partitions.to_vec();

        self.blocking("list_offsets", move |admin| {
            let mut res = HashMap::with_capacity(partitions.len());
            for tp in partitions {
                let (low, high) = admin
                    .inner()
                    .fetch_watermarks(&tp.topic, tp.partition as i32, FETCH_TIMEOUT)
                    .map_err(|e| BinderError::call("list_offsets", format!("{tp}: {e}")))?;

                let offset = match spec {
                    OffsetSpec::Earliest => low,
                    OffsetSpec::Latest => high,
                };
                res.insert(tp, offset);
            }
            Ok(res)
        })
        .await
    }

    async fn committed_offsets(
        &self,
        group: &str,
        partitions: &[TopicPartition],
    ) -> BinderResult<HashMap<TopicPartition, i64>> {
        let mut consumer_config = self.config.clone();
        consumer_config.set("group.id", group).set("enable.auto.commit", "false");

        let mut tpl = TopicPartitionList::with_capacity(partitions.len());
        for tp in partitions {
            tpl.add_partition(&tp.topic, tp.partition as i32);
        }

        // Committed offsets are only available via a Consumer that is part of the Group
        self.blocking("committed_offsets", move |_| {
            let consumer: BaseConsumer = consumer_config
                .create()
                .map_err(|e| BinderError::Connection(format!("Failed to allocate Consumer: {e}")))?;

            let committed = consumer
                .committed_offsets(tpl, FETCH_TIMEOUT)
                .map_err(|e| BinderError::call("committed_offsets", e))?;

            Ok(committed
                .elements()
                .iter()
                .filter_map(|elem| match elem.offset() {
                    Offset::Offset(o) => Some((TopicPartition::new(elem.topic(), elem.partition() as u32), o)),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    async fn describe_consumer_groups(&self, groups: &[String]) -> BinderResult<Vec<GroupDescription>> {
        let groups = groups.to_vec();

        self.blocking("describe_consumer_groups", move |admin| {
            let mut res = Vec::with_capacity(groups.len());
            for g in groups {
                let group_list = admin
                    .inner()
                    .fetch_group_list(Some(g.as_str()), FETCH_TIMEOUT)
                    .map_err(|e| BinderError::call("describe_consumer_groups", format!("group '{g}': {e}")))?;

                match group_list.groups().iter().find(|gi| gi.name() == g) {
                    Some(gi) => res.push(GroupDescription {
                        name: g.clone(),
                        state: gi.state().parse().unwrap_or(ConsumerGroupState::Unknown),
                        members: gi.members().len(),
                    }),
                    None => warn!("Consumer Group '{g}' not found"),
                }
            }
            Ok(res)
        })
        .await
    }

    async fn describe_topic_configs(&self, topics: &[String]) -> BinderResult<HashMap<String, TopicConfig>> {
        let specifiers: Vec<ResourceSpecifier> = topics.iter().map(|t| ResourceSpecifier::Topic(t.as_str())).collect();
        let opts = AdminOptions::new().request_timeout(Some(FETCH_TIMEOUT));

        let results =
            self.admin.describe_configs(&specifiers, &opts).await.map_err(|e| BinderError::call("describe_configs", e))?;

        let mut res = HashMap::with_capacity(results.len());
        for result in results {
            let resource = result.map_err(|code| BinderError::call("describe_configs", code))?;
            let OwnedResourceSpecifier::Topic(topic) = &resource.specifier else {
                return Err(BinderError::Mapping(format!("expected a topic resource, got {:?}", resource.specifier)));
            };

            let config: TopicConfig = resource.entries.iter().map(|e| (e.name.clone(), e.value.clone())).collect();
            res.insert(topic.clone(), config);
        }
        Ok(res)
    }
}

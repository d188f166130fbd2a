use std::collections::{BTreeMap, HashMap};

use super::admin::{BrokerAdmin, OffsetSpec};
use crate::errors::BinderResult;
use crate::kafka_types::{ConsumerGroupState, TopicDescription, TopicPartition, TopicPartitionOffsets};

/// Retention configuration key of a Topic.
const RETENTION_MS_CONFIG: &str = "retention.ms";

/// Combines [`BrokerAdmin`] calls to get the offsets of Topic Partitions.
pub struct OffsetsClient<'a, A: BrokerAdmin + ?Sized> {
    admin: &'a A,
}

impl<'a, A: BrokerAdmin + ?Sized> OffsetsClient<'a, A> {
    pub fn new(admin: &'a A) -> Self {
        Self {
            admin,
        }
    }

    /// Returns the [`TopicPartitionOffsets`] for each Partition of the given Topics.
    ///
    /// If `group` is `None`, no committed offsets are fetched.
    ///
    /// # Arguments
    ///
    /// * `topics` - Topics to fetch the offsets of
    /// * `group` - Consumer Group to fetch the committed offsets of
    pub async fn offsets(&self, topics: &[String], group: Option<&str>) -> BinderResult<Vec<TopicPartitionOffsets>> {
        let tps: Vec<TopicPartition> =
            self.admin.describe_topics(topics).await?.iter().flat_map(TopicDescription::topic_partitions).collect();

        let end_offsets = self.admin.list_offsets(&tps, OffsetSpec::Latest).await?;
        let start_offsets = self.admin.list_offsets(&tps, OffsetSpec::Earliest).await?;
        let consumer_offsets = match group {
            Some(g) => self.admin.committed_offsets(g, &tps).await?,
            None => HashMap::new(),
        };

        Ok(tps
            .into_iter()
            .map(|tp| TopicPartitionOffsets {
                group: group.map(str::to_string),
                // Negative offsets are "invalid" markers, not actual offsets
                consumer_offset: consumer_offsets.get(&tp).copied().filter(|o| *o >= 0),
                start_offset: start_offsets.get(&tp).copied().unwrap_or_default(),
                end_offset: end_offsets.get(&tp).copied().unwrap_or_default(),
                topic: tp.topic,
                partition: tp.partition,
            })
            .collect())
    }
}

/// Combines [`BrokerAdmin`] calls to describe Topics.
pub struct TopicClient<'a, A: BrokerAdmin + ?Sized> {
    admin: &'a A,
}

impl<'a, A: BrokerAdmin + ?Sized> TopicClient<'a, A> {
    pub fn new(admin: &'a A) -> Self {
        Self {
            admin,
        }
    }

    /// Retention in milliseconds of each of the given Topics.
    ///
    /// Topics where `retention.ms` is not set (or is not a number) are absent from the result.
    pub async fn retentions(&self, topics: &[String]) -> BinderResult<BTreeMap<String, i64>> {
        let configs = self.admin.describe_topic_configs(topics).await?;

        let mut res = BTreeMap::new();
        for (topic, config) in configs {
            match config.get(RETENTION_MS_CONFIG).and_then(|v| v.as_deref()).map(str::parse::<i64>) {
                Some(Ok(retention)) => {
                    res.insert(topic, retention);
                },
                Some(Err(e)) => {
                    warn!("Topic '{topic}' has an invalid '{RETENTION_MS_CONFIG}': {e}");
                },
                None => {
                    debug!("Topic '{topic}' has no '{RETENTION_MS_CONFIG}'");
                },
            }
        }
        Ok(res)
    }

    /// Count of out-of-sync replicas of each of the given Topics, summed across Partitions.
    pub async fn out_of_sync_replicas(&self, topics: &[String]) -> BinderResult<BTreeMap<String, i64>> {
        let descriptions = self.admin.describe_topics(topics).await?;
        Ok(out_of_sync_counts(&descriptions))
    }

    /// Count of Partitions not led by their preferred leader, for each of the given Topics.
    pub async fn non_preferred_leaders(&self, topics: &[String]) -> BinderResult<BTreeMap<String, i64>> {
        let descriptions = self.admin.describe_topics(topics).await?;
        Ok(descriptions
            .iter()
            .map(|td| {
                let count = td.partitions.iter().filter(|p| p.has_non_preferred_leader()).count();
                (td.name.clone(), count as i64)
            })
            .collect())
    }
}

/// Combines [`BrokerAdmin`] calls to describe Consumer Groups.
pub struct ConsumerGroupClient<'a, A: BrokerAdmin + ?Sized> {
    admin: &'a A,
}

impl<'a, A: BrokerAdmin + ?Sized> ConsumerGroupClient<'a, A> {
    pub fn new(admin: &'a A) -> Self {
        Self {
            admin,
        }
    }

    /// Amount of members of each of the given Consumer Groups.
    pub async fn members(&self, groups: &[String]) -> BinderResult<BTreeMap<String, i64>> {
        Ok(self.admin.describe_consumer_groups(groups).await?.into_iter().map(|g| (g.name, g.members as i64)).collect())
    }

    /// Amount of the given Consumer Groups in each [`ConsumerGroupState`].
    ///
    /// Every state is present in the result, even when no Group is in it.
    pub async fn states(&self, groups: &[String]) -> BinderResult<BTreeMap<ConsumerGroupState, i64>> {
        let mut res: BTreeMap<ConsumerGroupState, i64> = ConsumerGroupState::ALL.iter().map(|s| (*s, 0)).collect();
        for g in self.admin.describe_consumer_groups(groups).await? {
            *res.entry(g.state).or_default() += 1;
        }
        Ok(res)
    }
}

/// Sum of [`TopicPartitionOffsets::count`] for each Topic.
pub fn record_counts(offsets: &[TopicPartitionOffsets]) -> BTreeMap<String, i64> {
    let mut res = BTreeMap::new();
    for tpo in offsets {
        *res.entry(tpo.topic.clone()).or_default() += tpo.count();
    }
    res
}

/// Sum of [`TopicPartitionOffsets::lag`] for each Topic.
///
/// Only Partitions with a committed offset contribute:
/// Topics where none was committed are absent from the result.
pub fn lags(offsets: &[TopicPartitionOffsets]) -> BTreeMap<String, i64> {
    let mut res = BTreeMap::new();
    for tpo in offsets {
        if let Some(lag) = tpo.lag() {
            *res.entry(tpo.topic.clone()).or_default() += lag;
        }
    }
    res
}

/// Sum of out-of-sync replicas across the Partitions of each Topic.
pub fn out_of_sync_counts(descriptions: &[TopicDescription]) -> BTreeMap<String, i64> {
    descriptions
        .iter()
        .map(|td| {
            let count: usize = td.partitions.iter().map(|p| p.out_of_sync_count()).sum();
            (td.name.clone(), count as i64)
        })
        .collect()
}

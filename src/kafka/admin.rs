use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use regex::Regex;

use crate::constants::CONSUMER_OFFSETS_TOPIC;
use crate::errors::BinderResult;
use crate::kafka_types::{GroupDescription, TopicDescription, TopicPartition};

/// Which offset of a Partition to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSpec {
    /// First offset still available (a.k.a. low watermark).
    Earliest,
    /// Offset the next produced record will get (a.k.a. high watermark).
    Latest,
}

/// Configuration entries of a Topic, by name. A `None` value means "not set".
pub type TopicConfig = HashMap<String, Option<String>>;

/// The subset of the Kafka Admin API used by binders.
///
/// Every call can fail with [`crate::BinderError::Call`].
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Names of all the Topics in the cluster.
    async fn list_topics(&self) -> BinderResult<Vec<String>>;

    /// Describes the given Topics. Fails if any of them doesn't exist.
    async fn describe_topics(&self, topics: &[String]) -> BinderResult<Vec<TopicDescription>>;

    /// Lists the `spec` offset of each of the given Partitions.
    async fn list_offsets(
        &self,
        partitions: &[TopicPartition],
        spec: OffsetSpec,
    ) -> BinderResult<HashMap<TopicPartition, i64>>;

    /// Offsets committed by `group` for the given Partitions.
    ///
    /// Partitions for which the Group has not committed an offset are absent from the result.
    async fn committed_offsets(
        &self,
        group: &str,
        partitions: &[TopicPartition],
    ) -> BinderResult<HashMap<TopicPartition, i64>>;

    /// Describes the given Consumer Groups.
    async fn describe_consumer_groups(&self, groups: &[String]) -> BinderResult<Vec<GroupDescription>>;

    /// Configuration of each of the given Topics, by Topic name.
    async fn describe_topic_configs(&self, topics: &[String]) -> BinderResult<HashMap<String, TopicConfig>>;
}

/// Target Topics of a binder.
#[derive(Debug, Clone)]
pub enum TopicSelector {
    /// An explicit set of Topic names.
    Names(BTreeSet<String>),

    /// All the Topics whose name matches, resolved again at every refresh.
    /// Never matches the internal `__consumer_offsets` Topic.
    Pattern(Regex),
}

impl TopicSelector {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    /// Topic names known without asking the cluster: empty for [`TopicSelector::Pattern`].
    pub fn known_names(&self) -> Vec<String> {
        match self {
            Self::Names(names) => names.iter().cloned().collect(),
            Self::Pattern(_) => Vec::new(),
        }
    }

    /// Resolves the current set of target Topics, sorted by name.
    pub async fn resolve<A: BrokerAdmin + ?Sized>(&self, admin: &A) -> BinderResult<Vec<String>> {
        match self {
            Self::Names(names) => Ok(names.iter().cloned().collect()),
            Self::Pattern(re) => {
                let mut topics: Vec<String> = admin
                    .list_topics()
                    .await?
                    .into_iter()
                    .filter(|t| t != CONSUMER_OFFSETS_TOPIC && re.is_match(t))
                    .collect();
                topics.sort();
                trace!("Topics matching '{}': {:?}", re, topics);
                Ok(topics)
            },
        }
    }
}

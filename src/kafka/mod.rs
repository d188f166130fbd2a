//! Binders observing a Kafka cluster through its Admin API.
//!
//! Every binder opens a fresh [`BrokerAdmin`] client, via its [`crate::ClientFactory`],
//! at every refresh.

// Inner modules
mod admin;
mod clients;
mod consumer_group_lag;
mod consumer_group_members;
mod consumer_group_states;
#[cfg(test)]
pub(crate) mod mock;
mod non_preferred_leaders;
mod out_of_sync_replicas;
mod rdkafka_admin;
mod topic_record_count;
mod topic_retention;

/// Prefix of every Kafka metric name.
const KAFKA_METRIC_PREFIX: &str = "kafka";

// Exports
pub use admin::{BrokerAdmin, OffsetSpec, TopicConfig, TopicSelector};
pub use clients::{lags, out_of_sync_counts, record_counts, ConsumerGroupClient, OffsetsClient, TopicClient};
pub use consumer_group_lag::ConsumerGroupLagMetric;
pub use consumer_group_members::ConsumerGroupMemberCountMetric;
pub use consumer_group_states::ConsumerGroupStatesMetric;
pub use non_preferred_leaders::NonPreferredLeadersMetric;
pub use out_of_sync_replicas::OutOfSyncReplicasMetric;
pub use rdkafka_admin::{RdKafkaAdmin, RdKafkaAdminFactory};
pub use topic_record_count::TopicRecordCountMetric;
pub use topic_retention::TopicRetentionMetric;

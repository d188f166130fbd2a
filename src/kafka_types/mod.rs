// Inner modules
mod group;
mod partition;
mod topic;
mod topic_partition;
mod topic_partition_offsets;

// Exports
pub use group::{ConsumerGroupState, GroupDescription};
pub use partition::PartitionStatus;
pub use topic::TopicDescription;
pub use topic_partition::TopicPartition;
pub use topic_partition_offsets::TopicPartitionOffsets;

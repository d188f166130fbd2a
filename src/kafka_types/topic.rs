use super::partition::PartitionStatus;
use super::topic_partition::TopicPartition;

/// A Topic, and the status of each of its Partitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: Vec<PartitionStatus>,
}

impl TopicDescription {
    pub fn topic_partitions(&self) -> impl Iterator<Item = TopicPartition> + '_ {
        self.partitions.iter().map(|p| TopicPartition::new(self.name.clone(), p.id))
    }
}

/// Offsets of a Topic Partition: the earliest and latest available,
/// and (optionally) the one committed by a Consumer Group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct TopicPartitionOffsets {
    pub topic: String,
    pub partition: u32,

    /// Consumer Group the `consumer_offset` belongs to, if any was requested
    pub group: Option<String>,

    /// `None` if the Group has not committed an offset for this Partition yet
    pub consumer_offset: Option<i64>,

    pub start_offset: i64,
    pub end_offset: i64,
}

impl TopicPartitionOffsets {
    /// Estimated amount of records in the Partition (never negative).
    pub fn count(&self) -> i64 {
        (self.end_offset - self.start_offset).max(0)
    }

    /// Records yet to be consumed by the Group (never negative).
    /// `None` if the Group has not committed an offset.
    pub fn lag(&self) -> Option<i64> {
        self.consumer_offset.map(|co| (self.end_offset - co).max(0))
    }
}

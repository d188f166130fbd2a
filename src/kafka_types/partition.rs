use std::collections::BTreeSet;

/// Replication status of a Partition, as described by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PartitionStatus {
    pub id: u32,
    pub leader_broker: u32,

    /// Brokers holding a replica, in preference order: the first one is the _preferred_ leader.
    pub replica_brokers: Vec<u32>,

    pub in_sync_replica_brokers: Vec<u32>,
}

impl PartitionStatus {
    /// Amount of replicas that are not part of the in-sync replica set.
    pub fn out_of_sync_count(&self) -> usize {
        let isr: BTreeSet<u32> = self.in_sync_replica_brokers.iter().copied().collect();
        self.replica_brokers.iter().copied().collect::<BTreeSet<u32>>().difference(&isr).count()
    }

    /// `true` if the current leader is not the preferred one.
    pub fn has_non_preferred_leader(&self) -> bool {
        self.replica_brokers.first().is_some_and(|preferred| *preferred != self.leader_broker)
    }
}

//! In-memory Kafka cluster, standing in for a real broker in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::admin::{BrokerAdmin, OffsetSpec, TopicConfig};
use crate::errors::{BinderError, BinderResult};
use crate::internals::ClientFactory;
use crate::kafka_types::{ConsumerGroupState, GroupDescription, PartitionStatus, TopicDescription, TopicPartition};

#[derive(Default)]
struct ClusterState {
    topics: BTreeMap<String, Vec<(PartitionStatus, (i64, i64))>>,
    configs: HashMap<String, TopicConfig>,
    committed: HashMap<(String, TopicPartition), i64>,
    groups: BTreeMap<String, GroupDescription>,
}

/// A fake cluster that can be mutated while binders are polling it.
///
/// Cloning it gives another handle to the same cluster.
#[derive(Clone, Default)]
pub(crate) struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
    unreachable: Arc<AtomicBool>,
    failing_calls: Arc<AtomicBool>,
    opened_clients: Arc<AtomicUsize>,
}

impl MockCluster {
    pub(crate) fn add_partition(&self, topic: &str, id: u32, offsets: (i64, i64), replicas: &[u32], isr: &[u32]) {
        let partition = PartitionStatus {
            id,
            leader_broker: replicas.first().copied().unwrap_or_default(),
            replica_brokers: replicas.to_vec(),
            in_sync_replica_brokers: isr.to_vec(),
        };
        let mut state = self.state.lock().unwrap();
        state.topics.entry(topic.to_string()).or_default().push((partition, offsets));
        state.configs.entry(topic.to_string()).or_default();
    }

    pub(crate) fn set_leader(&self, topic: &str, id: u32, leader: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.topics.get_mut(topic).and_then(|ps| ps.iter_mut().find(|(p, _)| p.id == id)) {
            p.0.leader_broker = leader;
        }
    }

    pub(crate) fn set_offsets(&self, topic: &str, id: u32, offsets: (i64, i64)) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.topics.get_mut(topic).and_then(|ps| ps.iter_mut().find(|(p, _)| p.id == id)) {
            p.1 = offsets;
        }
    }

    pub(crate) fn set_config(&self, topic: &str, key: &str, value: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.configs.entry(topic.to_string()).or_default().insert(key.to_string(), value.map(str::to_string));
    }

    pub(crate) fn commit(&self, group: &str, topic: &str, partition: u32, offset: i64) {
        let mut state = self.state.lock().unwrap();
        state.committed.insert((group.to_string(), TopicPartition::new(topic, partition)), offset);
    }

    pub(crate) fn set_group(&self, name: &str, state: ConsumerGroupState, members: usize) {
        self.state.lock().unwrap().groups.insert(
            name.to_string(),
            GroupDescription {
                name: name.to_string(),
                state,
                members,
            },
        );
    }

    /// When set, opening a client fails with [`BinderError::Connection`].
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// When set, every admin call fails with [`BinderError::Call`].
    pub(crate) fn set_failing_calls(&self, failing: bool) {
        self.failing_calls.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn opened_clients(&self) -> usize {
        self.opened_clients.load(Ordering::SeqCst)
    }

    pub(crate) fn admin(&self) -> MockAdmin {
        MockAdmin {
            cluster: self.clone(),
        }
    }
}

#[async_trait]
impl ClientFactory for MockCluster {
    type Client = MockAdmin;

    async fn open_client(&self) -> BinderResult<Self::Client> {
        self.opened_clients.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BinderError::Connection("mock cluster is unreachable".to_string()));
        }
        Ok(self.admin())
    }
}

pub(crate) struct MockAdmin {
    cluster: MockCluster,
}

impl MockAdmin {
    fn check(&self, call: &'static str) -> BinderResult<()> {
        if self.cluster.failing_calls.load(Ordering::SeqCst) {
            Err(BinderError::call(call, "mock call failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerAdmin for MockAdmin {
    async fn list_topics(&self) -> BinderResult<Vec<String>> {
        self.check("list_topics")?;
        Ok(self.cluster.state.lock().unwrap().topics.keys().cloned().collect())
    }

    async fn describe_topics(&self, topics: &[String]) -> BinderResult<Vec<TopicDescription>> {
        self.check("describe_topics")?;
        let state = self.cluster.state.lock().unwrap();
        topics
            .iter()
            .map(|t| {
                state
                    .topics
                    .get(t)
                    .map(|ps| TopicDescription {
                        name: t.clone(),
                        partitions: ps.iter().map(|(p, _)| p.clone()).collect(),
                    })
                    .ok_or_else(|| BinderError::call("describe_topics", format!("unknown topic '{t}'")))
            })
            .collect()
    }

    async fn list_offsets(
        &self,
        partitions: &[TopicPartition],
        spec: OffsetSpec,
    ) -> BinderResult<HashMap<TopicPartition, i64>> {
        self.check("list_offsets")?;
        let state = self.cluster.state.lock().unwrap();
        Ok(partitions
            .iter()
            .filter_map(|tp| {
                let (_, (start, end)) = state.topics.get(&tp.topic)?.iter().find(|(p, _)| p.id == tp.partition)?;
                let offset = match spec {
                    OffsetSpec::Earliest => *start,
                    OffsetSpec::Latest => *end,
                };
                Some((tp.clone(), offset))
            })
            .collect())
    }

    async fn committed_offsets(
        &self,
        group: &str,
        partitions: &[TopicPartition],
    ) -> BinderResult<HashMap<TopicPartition, i64>> {
        self.check("committed_offsets")?;
        let state = self.cluster.state.lock().unwrap();
        Ok(partitions
            .iter()
            .filter_map(|tp| state.committed.get(&(group.to_string(), tp.clone())).map(|o| (tp.clone(), *o)))
            .collect())
    }

    async fn describe_consumer_groups(&self, groups: &[String]) -> BinderResult<Vec<GroupDescription>> {
        self.check("describe_consumer_groups")?;
        let state = self.cluster.state.lock().unwrap();
        Ok(groups.iter().filter_map(|g| state.groups.get(g).cloned()).collect())
    }

    async fn describe_topic_configs(&self, topics: &[String]) -> BinderResult<HashMap<String, TopicConfig>> {
        self.check("describe_configs")?;
        let state = self.cluster.state.lock().unwrap();
        Ok(topics.iter().filter_map(|t| state.configs.get(t).map(|c| (t.clone(), c.clone()))).collect())
    }
}

use std::fmt;
use std::str::FromStr;

/// State of a Consumer Group, as reported by the Group Coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsumerGroupState {
    Unknown,
    PreparingRebalance,
    CompletingRebalance,
    Stable,
    Dead,
    Empty,
}

impl ConsumerGroupState {
    pub const ALL: [ConsumerGroupState; 6] = [
        Self::Unknown,
        Self::PreparingRebalance,
        Self::CompletingRebalance,
        Self::Stable,
        Self::Dead,
        Self::Empty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::PreparingRebalance => "PreparingRebalance",
            Self::CompletingRebalance => "CompletingRebalance",
            Self::Stable => "Stable",
            Self::Dead => "Dead",
            Self::Empty => "Empty",
        }
    }
}

impl FromStr for ConsumerGroupState {
    type Err = std::convert::Infallible;

    /// Parsing never fails: anything unrecognised is [`ConsumerGroupState::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PreparingRebalance" => Self::PreparingRebalance,
            // Older brokers report "AwaitingSync" for the same state
            "CompletingRebalance" | "AwaitingSync" => Self::CompletingRebalance,
            "Stable" => Self::Stable,
            "Dead" => Self::Dead,
            "Empty" => Self::Empty,
            _ => Self::Unknown,
        })
    }
}

impl fmt::Display for ConsumerGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer Group, as described by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    /// Group name
    pub name: String,

    /// Group state
    pub state: ConsumerGroupState,

    /// Amount of members currently in the Group
    pub members: usize,
}

//! Member records and the merge rules of the gossip table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;

/// Tag under which a member advertises its log server address.
pub const RPC_ADDR_TAG: &str = "rpc_addr";

/// Liveness of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Reachable and participating.
    Alive,
    /// Stopped answering gossip.
    Failed,
    /// Left the cluster on purpose.
    Left,
}

impl MemberStatus {
    /// Tie-break order at equal incarnation: left > failed > alive.
    fn precedence(self) -> u8 {
        match self {
            Self::Alive => 0,
            Self::Failed => 1,
            Self::Left => 2,
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alive => "alive",
            Self::Failed => "failed",
            Self::Left => "left",
        })
    }
}

/// One node as seen through gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique node name.
    pub name: String,
    /// Gossip address.
    pub addr: SocketAddr,
    /// Free-form tags, including [`RPC_ADDR_TAG`].
    pub tags: BTreeMap<String, String>,
    /// Liveness.
    pub status: MemberStatus,
    /// Version of this record, bumped only by the member itself.
    pub incarnation: u64,
}

impl Member {
    /// Address of the member's log server, if advertised.
    #[must_use]
    pub fn rpc_addr(&self) -> Option<&str> {
        self.tags.get(RPC_ADDR_TAG).map(String::as_str)
    }

    /// Returns true if `self` should replace `other`.
    fn supersedes(&self, other: &Member) -> bool {
        self.incarnation > other.incarnation
            || (self.incarnation == other.incarnation
                && self.status.precedence() > other.status.precedence())
    }
}

/// A change the local node must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    /// A remote member became alive.
    Join(Member),
    /// A remote member left or failed.
    Leave(Member),
}

/// The local view of the cluster.
#[derive(Debug)]
pub(crate) struct MemberTable {
    local: String,
    members: HashMap<String, Entry>,
}

#[derive(Debug)]
struct Entry {
    member: Member,
    failed_exchanges: u32,
}

impl MemberTable {
    pub(crate) fn new(local: Member) -> Self {
        let name = local.name.clone();
        let mut members = HashMap::new();
        members.insert(
            name.clone(),
            Entry {
                member: local,
                failed_exchanges: 0,
            },
        );
        Self {
            local: name,
            members,
        }
    }

    /// Every member, the local one included, sorted by name.
    pub(crate) fn snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.values().map(|e| e.member.clone()).collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    pub(crate) fn local(&self) -> Option<&Member> {
        self.members.get(&self.local).map(|e| &e.member)
    }

    /// Remote members with the given status.
    pub(crate) fn remote_with_status(&self, status: MemberStatus) -> Vec<Member> {
        self.members
            .values()
            .filter(|e| e.member.name != self.local && e.member.status == status)
            .map(|e| e.member.clone())
            .collect()
    }

    /// Merges gossip received from a peer and returns the resulting events.
    pub(crate) fn merge(&mut self, remote: Vec<Member>) -> Vec<MemberEvent> {
        remote
            .into_iter()
            .filter_map(|member| self.merge_one(member))
            .collect()
    }

    fn merge_one(&mut self, remote: Member) -> Option<MemberEvent> {
        if remote.name == self.local {
            self.refute(&remote);
            return None;
        }

        match self.members.get_mut(&remote.name) {
            Some(entry) => {
                if !remote.supersedes(&entry.member) {
                    return None;
                }
                let previous = entry.member.status;
                entry.member = remote;
                entry.failed_exchanges = 0;
                transition(previous, &entry.member)
            }
            None => {
                let event = (remote.status == MemberStatus::Alive)
                    .then(|| MemberEvent::Join(remote.clone()));
                self.members.insert(
                    remote.name.clone(),
                    Entry {
                        member: remote,
                        failed_exchanges: 0,
                    },
                );
                event
            }
        }
    }

    /// Overrides gossip that reports the local node as not alive.
    fn refute(&mut self, remote: &Member) {
        let Some(entry) = self.members.get_mut(&self.local) else {
            return;
        };
        let local = &mut entry.member;
        if local.status == MemberStatus::Alive
            && remote.status != MemberStatus::Alive
            && remote.incarnation >= local.incarnation
        {
            local.incarnation = remote.incarnation + 1;
            tracing::info!(
                incarnation = local.incarnation,
                reported = %remote.status,
                "refuting stale gossip about self"
            );
        }
    }

    /// Records a successful exchange with `name`.
    pub(crate) fn exchange_succeeded(&mut self, name: &str) {
        if let Some(entry) = self.members.get_mut(name) {
            entry.failed_exchanges = 0;
        }
    }

    /// Records a failed exchange and marks the member failed once
    /// `threshold` consecutive exchanges failed.
    pub(crate) fn exchange_failed(&mut self, name: &str, threshold: u32) -> Option<MemberEvent> {
        if name == self.local {
            return None;
        }
        let entry = self.members.get_mut(name)?;
        entry.failed_exchanges += 1;
        if entry.member.status != MemberStatus::Alive || entry.failed_exchanges < threshold {
            return None;
        }
        entry.member.status = MemberStatus::Failed;
        Some(MemberEvent::Leave(entry.member.clone()))
    }

    /// Marks the local member as left and returns its new record.
    pub(crate) fn leave_local(&mut self) -> Option<Member> {
        let entry = self.members.get_mut(&self.local)?;
        if entry.member.status == MemberStatus::Left {
            return None;
        }
        entry.member.status = MemberStatus::Left;
        entry.member.incarnation += 1;
        Some(entry.member.clone())
    }
}

fn transition(previous: MemberStatus, current: &Member) -> Option<MemberEvent> {
    match (previous, current.status) {
        (MemberStatus::Alive, MemberStatus::Alive) => None,
        (MemberStatus::Alive, _) => Some(MemberEvent::Leave(current.clone())),
        (_, MemberStatus::Alive) => Some(MemberEvent::Join(current.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, status: MemberStatus, incarnation: u64) -> Member {
        let mut tags = BTreeMap::new();
        tags.insert(RPC_ADDR_TAG.to_string(), format!("127.0.0.1:90{name}"));
        Member {
            name: name.to_string(),
            addr: "127.0.0.1:8000".parse().unwrap(),
            tags,
            status,
            incarnation,
        }
    }

    fn table() -> MemberTable {
        MemberTable::new(member("0", MemberStatus::Alive, 0))
    }

    #[test]
    fn new_alive_member_joins() {
        let mut table = table();
        let events = table.merge(vec![member("1", MemberStatus::Alive, 0)]);

        assert_eq!(events, vec![MemberEvent::Join(member("1", MemberStatus::Alive, 0))]);
        assert_eq!(table.snapshot().len(), 2);
        assert_eq!(table.snapshot()[1].rpc_addr(), Some("127.0.0.1:901"));
    }

    #[test]
    fn repeated_gossip_is_silent() {
        let mut table = table();
        table.merge(vec![member("1", MemberStatus::Alive, 0)]);
        assert!(table.merge(vec![member("1", MemberStatus::Alive, 0)]).is_empty());
    }

    #[test]
    fn left_beats_alive_at_equal_incarnation() {
        let mut table = table();
        table.merge(vec![member("1", MemberStatus::Alive, 1)]);

        let events = table.merge(vec![member("1", MemberStatus::Left, 1)]);
        assert!(matches!(events.as_slice(), [MemberEvent::Leave(m)] if m.name == "1"));

        // Older alive gossip cannot resurrect it.
        assert!(table.merge(vec![member("1", MemberStatus::Alive, 1)]).is_empty());
        assert_eq!(table.snapshot()[1].status, MemberStatus::Left);
    }

    #[test]
    fn failed_then_left_emits_one_leave() {
        let mut table = table();
        table.merge(vec![member("1", MemberStatus::Alive, 0)]);

        assert_eq!(table.merge(vec![member("1", MemberStatus::Failed, 0)]).len(), 1);
        assert!(table.merge(vec![member("1", MemberStatus::Left, 0)]).is_empty());
    }

    #[test]
    fn higher_incarnation_rejoins() {
        let mut table = table();
        table.merge(vec![member("1", MemberStatus::Alive, 0)]);
        table.merge(vec![member("1", MemberStatus::Failed, 0)]);

        let events = table.merge(vec![member("1", MemberStatus::Alive, 1)]);
        assert!(matches!(events.as_slice(), [MemberEvent::Join(m)] if m.incarnation == 1));
    }

    #[test]
    fn self_reported_failed_is_refuted() {
        let mut table = table();
        let events = table.merge(vec![member("0", MemberStatus::Failed, 3)]);

        assert!(events.is_empty());
        let local = table.local().unwrap();
        assert_eq!(local.status, MemberStatus::Alive);
        assert_eq!(local.incarnation, 4);
    }

    #[test]
    fn consecutive_failures_mark_failed() {
        let mut table = table();
        table.merge(vec![member("1", MemberStatus::Alive, 0)]);

        assert!(table.exchange_failed("1", 3).is_none());
        table.exchange_succeeded("1");
        assert!(table.exchange_failed("1", 3).is_none());
        assert!(table.exchange_failed("1", 3).is_none());

        let event = table.exchange_failed("1", 3);
        assert!(matches!(event, Some(MemberEvent::Leave(ref m)) if m.status == MemberStatus::Failed));
        assert!(table.exchange_failed("1", 3).is_none());
        assert!(table.remote_with_status(MemberStatus::Alive).is_empty());
        assert_eq!(table.remote_with_status(MemberStatus::Failed).len(), 1);
    }

    #[test]
    fn leave_local_bumps_incarnation_once() {
        let mut table = table();
        let left = table.leave_local().unwrap();
        assert_eq!(left.status, MemberStatus::Left);
        assert_eq!(left.incarnation, 1);
        assert!(table.leave_local().is_none());
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let mut table = table();
        table.merge(vec![
            member("2", MemberStatus::Alive, 0),
            member("1", MemberStatus::Left, 0),
        ]);
        let names: Vec<String> = table.snapshot().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
    }
}

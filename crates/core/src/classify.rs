use crate::records::{Change, DEPARTED_NICK, Departure, MemberSnapshot, Presence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Space-independent profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: i64,
    pub name: String,
    pub tag: String,
}

/// Space-scoped member fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberState {
    pub uid: i64,
    pub sid: i64,
    pub nick: Option<String>,
    pub status: Presence,
}

/// Classified platform occurrences as delivered by the connector. One JSON
/// object per line on the ingest socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Full roster; the first one satisfies the sync gate.
    Snapshot { members: Vec<MemberSnapshot> },
    UserUpdate {
        before: UserProfile,
        after: UserProfile,
    },
    MemberUpdate {
        before: MemberState,
        after: MemberState,
        /// Every space id where the member is currently visible.
        mutual_spaces: Vec<i64>,
    },
    MemberJoin {
        member: MemberSnapshot,
        /// Membership count after the join; 1 means first sighting anywhere.
        mutual_spaces: usize,
    },
    MemberRemove {
        member: MemberSnapshot,
        /// Membership count after the removal; 0 means gone everywhere.
        mutual_spaces: usize,
    },
    SpaceJoin { members: Vec<MemberSnapshot> },
}

/// Changes (and possibly departures) derived from one gateway event.
#[derive(Debug, Default, PartialEq)]
pub struct Classified {
    pub changes: Vec<Change>,
    pub departures: Vec<Departure>,
}

/// Presence is recorded from exactly one space per member (the lowest
/// mutual space id) so concurrent per-space observations do not multiply.
pub fn status_authority(sid: i64, mutual_spaces: &[i64]) -> bool {
    mutual_spaces
        .iter()
        .copied()
        .min()
        .is_none_or(|lowest| sid <= lowest)
}

pub fn classify(event: &GatewayEvent, observed_at: DateTime<Utc>) -> Classified {
    let mut out = Classified::default();
    match event {
        GatewayEvent::Snapshot { members } | GatewayEvent::SpaceJoin { members } => {
            out.changes = bulk_changes(members, observed_at);
        }
        GatewayEvent::UserUpdate { before, after } => {
            if before.name != after.name {
                out.changes.push(Change::Name {
                    uid: after.uid,
                    name: after.name.clone(),
                    first_seen: observed_at,
                });
            }
            if before.tag != after.tag {
                out.changes.push(Change::Tag {
                    uid: after.uid,
                    tag: after.tag.clone(),
                    first_seen: observed_at,
                });
            }
        }
        GatewayEvent::MemberUpdate {
            before,
            after,
            mutual_spaces,
        } => {
            if before.nick != after.nick {
                out.changes.push(Change::Nick {
                    uid: after.uid,
                    sid: after.sid,
                    nick: after.nick.clone(),
                    first_seen: observed_at,
                });
            }
            if before.status != after.status && status_authority(after.sid, mutual_spaces) {
                out.changes.push(Change::Status {
                    uid: after.uid,
                    status: after.status,
                    first_seen: observed_at,
                });
            }
        }
        GatewayEvent::MemberJoin {
            member,
            mutual_spaces,
        } => {
            member_changes(&mut out.changes, member, observed_at, *mutual_spaces == 1);
        }
        GatewayEvent::MemberRemove {
            member,
            mutual_spaces,
        } => {
            out.changes.push(Change::Nick {
                uid: member.uid,
                sid: member.sid,
                nick: Some(DEPARTED_NICK.to_string()),
                first_seen: observed_at,
            });
            if *mutual_spaces == 0 {
                out.departures.push(Departure {
                    uid: member.uid,
                    at: observed_at,
                });
            }
        }
    }
    out
}

/// Baseline observations for a batch of membership rows: one nick per row,
/// and name/tag/status once per distinct member.
pub fn bulk_changes(members: &[MemberSnapshot], observed_at: DateTime<Utc>) -> Vec<Change> {
    let mut changes = Vec::with_capacity(members.len() * 2);
    for member in members {
        changes.push(Change::Nick {
            uid: member.uid,
            sid: member.sid,
            nick: member.nick.clone(),
            first_seen: observed_at,
        });
    }
    let mut seen: HashSet<i64> = HashSet::new();
    for member in members {
        if seen.insert(member.uid) {
            member_profile_changes(&mut changes, member, observed_at);
        }
    }
    changes
}

fn member_changes(
    changes: &mut Vec<Change>,
    member: &MemberSnapshot,
    observed_at: DateTime<Utc>,
    full: bool,
) {
    changes.push(Change::Nick {
        uid: member.uid,
        sid: member.sid,
        nick: member.nick.clone(),
        first_seen: observed_at,
    });
    if full {
        member_profile_changes(changes, member, observed_at);
    }
}

fn member_profile_changes(
    changes: &mut Vec<Change>,
    member: &MemberSnapshot,
    observed_at: DateTime<Utc>,
) {
    changes.push(Change::Name {
        uid: member.uid,
        name: member.name.clone(),
        first_seen: observed_at,
    });
    changes.push(Change::Tag {
        uid: member.uid,
        tag: member.tag.clone(),
        first_seen: observed_at,
    });
    changes.push(Change::Status {
        uid: member.uid,
        status: member.status,
        first_seen: observed_at,
    });
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of history categories. Each category maps to one table with a
/// dedup key (the columns that identify "the same entity" during compaction),
/// a single value column, and a `first_seen` timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Names,
    Tags,
    Nicks,
    Statuses,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Names,
        Category::Tags,
        Category::Nicks,
        Category::Statuses,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Category::Names => "names",
            Category::Tags => "tags",
            Category::Nicks => "nicks",
            Category::Statuses => "statuses",
        }
    }

    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Category::Nicks => &["uid", "sid"],
            _ => &["uid"],
        }
    }

    pub fn value_column(self) -> &'static str {
        match self {
            Category::Names => "name",
            Category::Tags => "tag",
            Category::Nicks => "nick",
            Category::Statuses => "status",
        }
    }

    /// Statuses flip constantly and every observation is meaningful, so the
    /// category is exempt from duplicate-run compaction.
    pub fn compactable(self) -> bool {
        !matches!(self, Category::Statuses)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Names => 0,
            Category::Tags => 1,
            Category::Nicks => 2,
            Category::Statuses => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Idle,
    Dnd,
    Offline,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Idle => "idle",
            Presence::Dnd => "dnd",
            Presence::Offline => "offline",
        }
    }
}

/// One observed attribute change. `first_seen` is stamped at classification
/// time, never at flush time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Change {
    Name {
        uid: i64,
        name: String,
        first_seen: DateTime<Utc>,
    },
    Tag {
        uid: i64,
        tag: String,
        first_seen: DateTime<Utc>,
    },
    Nick {
        uid: i64,
        sid: i64,
        nick: Option<String>,
        first_seen: DateTime<Utc>,
    },
    Status {
        uid: i64,
        status: Presence,
        first_seen: DateTime<Utc>,
    },
}

impl Change {
    pub fn category(&self) -> Category {
        match self {
            Change::Name { .. } => Category::Names,
            Change::Tag { .. } => Category::Tags,
            Change::Nick { .. } => Category::Nicks,
            Change::Status { .. } => Category::Statuses,
        }
    }

    pub fn uid(&self) -> i64 {
        match self {
            Change::Name { uid, .. }
            | Change::Tag { uid, .. }
            | Change::Nick { uid, .. }
            | Change::Status { uid, .. } => *uid,
        }
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        match self {
            Change::Name { first_seen, .. }
            | Change::Tag { first_seen, .. }
            | Change::Nick { first_seen, .. }
            | Change::Status { first_seen, .. } => *first_seen,
        }
    }
}

/// Recorded when a member stops being observable in every space at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub uid: i64,
    pub at: DateTime<Utc>,
}

/// Nick value written when a member leaves a space, so the nick history
/// carries the membership boundary.
pub const DEPARTED_NICK: &str = "left_space";

/// Point-in-time view of one member in one space; the reconciliation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub uid: i64,
    pub sid: i64,
    pub name: String,
    pub tag: String,
    pub nick: Option<String>,
    pub status: Presence,
}

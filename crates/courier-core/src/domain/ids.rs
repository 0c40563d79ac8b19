//! Task / Lease の識別子
//!
//! どちらも ULID。マーカー型で区別するので `TaskId` を `LeaseId` の位置に
//! 渡すとコンパイルエラーになる。Message の ID は単調増加が要るので
//! [`MessageId`](super::message::MessageId) (u64) を別に使う。

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub trait IdKind: Send + Sync + 'static {
    /// Prefix used by `Display` and accepted by `FromStr`.
    const PREFIX: &'static str;
}

/// Serialises as the bare ULID string.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<K: IdKind> {
    ulid: Ulid,
    #[serde(skip)]
    _kind: PhantomData<K>,
}

impl<K: IdKind> Id<K> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _kind: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(K::PREFIX)?;
        fmt::Display::fmt(&self.ulid, f)
    }
}

impl<K: IdKind> FromStr for Id<K> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(K::PREFIX).unwrap_or(s);
        raw.parse::<Ulid>().map(Self::from_ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {}

impl IdKind for TaskKind {
    const PREFIX: &'static str = "task-";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaseKind {}

impl IdKind for LeaseKind {
    const PREFIX: &'static str = "lease-";
}

pub type TaskId = Id<TaskKind>;

/// Issued fresh on every claim.
pub type LeaseId = Id<LeaseKind>;

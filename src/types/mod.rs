use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilePartId(pub i64);

impl FileId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl FilePartId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FilePartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Bit-set tagging a subset of files inside a group name.
    ///
    /// Flags carry no built-in meaning; a [`crate::storage::Group`] record may
    /// give a bit a human label. All 64 bits are valid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct GroupFlag: u64 {
        const _ = !0;
    }
}

impl GroupFlag {
    /// Zero flag. In queries it matches every stored flag.
    pub const ANY: GroupFlag = GroupFlag::empty();

    pub fn new(bits: u64) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_empty()
    }

    /// Query-side match: a zero query flag matches everything, otherwise at
    /// least one bit must be shared.
    pub fn matches(&self, stored: GroupFlag) -> bool {
        self.is_wildcard() || self.intersects(stored)
    }

    pub fn to_i64(self) -> i64 {
        self.bits() as i64
    }

    pub fn from_i64(value: i64) -> Self {
        Self::from_bits_retain(value as u64)
    }
}

impl Default for GroupFlag {
    fn default() -> Self {
        Self::ANY
    }
}

/// Processing state shared by scan items and stored rows.
///
/// Stored rows use `Started` as the "not yet seen in this scan" marker and
/// `Completed` once a scan has confirmed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressStatus {
    Pending,
    Started,
    Processing,
    Skipped,
    Updated,
    Completed,
    Canceled,
    Failed,
    Exception,
}

impl ProgressStatus {
    pub const ALL: [ProgressStatus; 9] = [
        ProgressStatus::Pending,
        ProgressStatus::Started,
        ProgressStatus::Processing,
        ProgressStatus::Skipped,
        ProgressStatus::Updated,
        ProgressStatus::Completed,
        ProgressStatus::Canceled,
        ProgressStatus::Failed,
        ProgressStatus::Exception,
    ];

    /// Stable integer code used by persistent stores.
    pub fn code(self) -> i64 {
        match self {
            ProgressStatus::Pending => 0,
            ProgressStatus::Started => 1,
            ProgressStatus::Processing => 2,
            ProgressStatus::Skipped => 3,
            ProgressStatus::Updated => 4,
            ProgressStatus::Completed => 5,
            ProgressStatus::Canceled => 6,
            ProgressStatus::Failed => 7,
            ProgressStatus::Exception => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Whether this outcome blocks post-scan reconciliation.
    pub fn is_problem(self) -> bool {
        matches!(
            self,
            ProgressStatus::Canceled | ProgressStatus::Failed | ProgressStatus::Exception
        )
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Started => "started",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Skipped => "skipped",
            ProgressStatus::Updated => "updated",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Canceled => "canceled",
            ProgressStatus::Failed => "failed",
            ProgressStatus::Exception => "exception",
        };
        f.write_str(name)
    }
}

impl FromStr for ProgressStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or("Unknown progress status")
    }
}

/// The (group name, group flag) pair a scan owns. Scope matching is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexScope {
    pub group_name: String,
    pub group_flag: GroupFlag,
}

impl IndexScope {
    pub fn new(group_name: impl Into<String>, group_flag: GroupFlag) -> Self {
        Self {
            group_name: group_name.into(),
            group_flag,
        }
    }

    pub fn contains(&self, group_name: &str, group_flag: GroupFlag) -> bool {
        self.group_name == group_name && self.group_flag == group_flag
    }
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.group_name, self.group_flag.bits())
    }
}

/// Query-side group filter with wildcard semantics.
///
/// An empty name matches all names; a zero flag matches all flags; a non-zero
/// flag matches any stored flag sharing at least one bit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    pub group_name: String,
    pub group_flag: GroupFlag,
}

impl GroupFilter {
    pub fn new(group_name: impl Into<String>, group_flag: GroupFlag) -> Self {
        Self {
            group_name: group_name.into(),
            group_flag,
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, group_name: &str, group_flag: GroupFlag) -> bool {
        (self.group_name.is_empty() || self.group_name == group_name)
            && self.group_flag.matches(group_flag)
    }
}

impl From<&IndexScope> for GroupFilter {
    fn from(scope: &IndexScope) -> Self {
        Self::new(scope.group_name.clone(), scope.group_flag)
    }
}

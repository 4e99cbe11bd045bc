//! Core type definitions: identifiers and status enumerations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::HubError;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new identifier
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Wrap an existing ULID
            pub fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Get the underlying ULID
            pub fn as_ulid(&self) -> &Ulid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = HubError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| HubError::ValidationError(format!(
                        "Invalid {}: {}",
                        stringify!($name),
                        e
                    )))
            }
        }
    };
}

ulid_id!(
    /// Identifier of a registered repository
    RepositoryId
);
ulid_id!(
    /// Identifier of an artifact (one file of a repository)
    ArtifactId
);
ulid_id!(
    /// Identifier of an asynchronous job
    JobId
);

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Get the string representation used in storage and logs
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = HubError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(HubError::invalid_value($field, other)),
                }
            }
        }
    };
}

string_enum!(
    /// Lifecycle status of a registered repository
    RepositoryStatus, "repository status" {
        /// Registered, never synced successfully
        Registered => "registered",
        /// Remote listing reconciled into the catalog
        Synced => "synced",
        /// The remote reported the repository absent on the last sync
        Error => "error",
    }
);

string_enum!(
    /// Role of a file within a model repository
    ArtifactType, "artifact type" {
        /// Model weights
        Model => "model",
        /// Model or generation configuration
        Config => "config",
        /// Tokenizer and vocabulary files
        Tokenizer => "tokenizer",
        /// Anything else (readme, license, images)
        Other => "other",
    }
);

string_enum!(
    /// Download state of an artifact
    DownloadStatus, "download status" {
        Pending => "pending",
        Downloading => "downloading",
        Completed => "completed",
        Failed => "failed",
    }
);

string_enum!(
    /// Kind of asynchronous job
    JobKind, "job kind" {
        /// Reconcile a repository's remote listing
        Sync => "sync",
        /// Fetch one artifact into the content store
        Download => "download",
        /// Local storage scan. Reserved: no payload constructs it.
        Scan => "scan",
    }
);

string_enum!(
    /// Status of an asynchronous job
    JobStatus, "job status" {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
);

impl Default for RepositoryStatus {
    fn default() -> Self {
        Self::Registered
    }
}

impl Default for DownloadStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl JobStatus {
    /// Whether no further transition may leave this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects Pending -> Running -> {Completed, Failed}.
    ///
    /// Running -> Running is allowed so an expired lease can be re-claimed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

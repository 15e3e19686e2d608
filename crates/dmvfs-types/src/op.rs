//! Backend capability names.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// One entry of the backend operation table.
///
/// Used to name the missing capability in [`crate::VfsError::Unsupported`]
/// and in log fields.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Op {
    Init,
    Deinit,
    IsContextValid,
    Open,
    Close,
    Read,
    Write,
    Seek,
    Tell,
    Eof,
    Size,
    Flush,
    Error,
    Getc,
    Putc,
    Ioctl,
    Sync,
    Stat,
    Unlink,
    Rename,
    Chmod,
    Utime,
    Mkdir,
    Rmdir,
    #[serde(rename = "direxists")]
    #[strum(serialize = "direxists")]
    DirExists,
    #[serde(rename = "opendir")]
    #[strum(serialize = "opendir")]
    OpenDir,
    #[serde(rename = "readdir")]
    #[strum(serialize = "readdir")]
    ReadDir,
    #[serde(rename = "closedir")]
    #[strum(serialize = "closedir")]
    CloseDir,
}

impl Op {
    /// Operation name as used in logs.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

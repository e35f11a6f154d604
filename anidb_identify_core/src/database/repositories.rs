//! Repositories over a borrowed connection
//!
//! Each repository wraps the `&mut SqliteConnection` of the [`Store`] that
//! created it, so two repositories can never race on one connection.
//!
//! [`Store`]: super::Store

pub mod local_files;
pub mod metadata;
pub mod notifications;
pub mod packets;
pub mod settings;

pub use local_files::LocalFileRepository;
pub use metadata::MetadataRepository;
pub use notifications::NotificationRepository;
pub use packets::PacketRepository;
pub use settings::SettingsRepository;

/// Convert an unsigned protocol value for an INTEGER column
pub(crate) fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

//! Turning hashed files into as few API requests as possible
//!
//! [`LocalIdentify`] answers from local storage first and trims request
//! masks down to what is still missing. [`IdentifyCoordinator`] drives a
//! whole run: hash reuse, the hasher pool, batch lookup, then FILE and
//! MYLISTADD requests for whatever storage could not answer.

pub mod coordinator;
pub mod local;

pub use coordinator::{HashedFile, IdentifyCoordinator, IdentifyOptions, IdentifySummary};
pub use local::{FILE_ANIME_REQUEST_FIELDS, FILE_REQUEST_FIELDS, FileLookup, LocalIdentify};

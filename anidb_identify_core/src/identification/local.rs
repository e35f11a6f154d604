use crate::Result;
use crate::database::{LocalFlags, MetadataRepository};
use crate::protocol::mask::{
    ANIME_AMASK, AnimeField, EpisodeField, FILE_AMASK, FILE_FMASK, FileAnimeField,
    FileAnimeTarget, FileField, Mask,
};
use crate::protocol::messages::{AnimeInfo, EpisodeInfo, GroupInfo};
use log::debug;
use std::collections::HashMap;

/// fmask fields requested for a file nothing is known about
pub const FILE_REQUEST_FIELDS: &[FileField] = &[
    FileField::Aid,
    FileField::Eid,
    FileField::Gid,
    FileField::Lid,
    FileField::OtherEpisodes,
    FileField::IsDeprecated,
    FileField::State,
    FileField::Size,
    FileField::Ed2k,
    FileField::Md5,
    FileField::Sha1,
    FileField::Crc32,
    FileField::Quality,
    FileField::Source,
    FileField::AudioCodec,
    FileField::AudioBitrate,
    FileField::VideoCodec,
    FileField::VideoBitrate,
    FileField::Resolution,
    FileField::FileType,
    FileField::DubLanguage,
    FileField::SubLanguage,
    FileField::Length,
    FileField::Description,
    FileField::AiredDate,
    FileField::AnidbFilename,
];

/// amask fields requested alongside a FILE lookup
pub const FILE_ANIME_REQUEST_FIELDS: &[FileAnimeField] = FileAnimeField::ALL;

/// What to do about one hashed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    /// Storage already holds everything a FILE reply would bring
    Skip,
    /// Ask for these fields only
    Request { fmask: Mask, amask: Mask },
}

impl FileLookup {
    pub fn full() -> Self {
        Self::Request {
            fmask: FILE_FMASK.mask_for(FILE_REQUEST_FIELDS),
            amask: FILE_AMASK.mask_for(FILE_ANIME_REQUEST_FIELDS),
        }
    }
}

/// Local storage lookups that decide whether a request is needed at all
pub struct LocalIdentify<'c> {
    metadata: MetadataRepository<'c>,
}

impl<'c> LocalIdentify<'c> {
    pub fn new(metadata: MetadataRepository<'c>) -> Self {
        Self { metadata }
    }

    pub async fn identify(&mut self, size: i64, hash: &str) -> Result<LocalFlags> {
        self.metadata.identify(size, hash).await
    }

    /// One query for a whole directory's worth of hashes
    pub async fn identify_batch(
        &mut self,
        pairs: &[(i64, String)],
    ) -> Result<HashMap<(i64, String), LocalFlags>> {
        self.metadata.identify_batch(pairs).await
    }

    /// Decide the FILE request for a file whose flags are already known
    ///
    /// Each field is dropped from the masks once storage holds it. The
    /// lid only counts as known when the file is in the mylist, so a file
    /// is skipped only when it is fully known and confirmed there.
    pub async fn plan_file(&mut self, size: i64, hash: &str, flags: LocalFlags) -> Result<FileLookup> {
        if !flags.contains(LocalFlags::IN_LOCAL_STORE) {
            return Ok(FileLookup::full());
        }
        let Some(file) = self.metadata.find_file_by_identity(size, hash).await? else {
            return Ok(FileLookup::full());
        };

        let anime = match file.aid().filter(|aid| *aid > 0) {
            Some(aid) => self.metadata.load_anime(aid).await?,
            None => None,
        };
        let episode = match file.eid().filter(|eid| *eid > 0) {
            Some(eid) => self.metadata.load_episode(eid).await?,
            None => None,
        };
        let group = match file.gid().filter(|gid| *gid > 0) {
            Some(gid) => self.metadata.load_group(gid).await?,
            None => None,
        };

        let anime_fields: Vec<FileAnimeField> = FILE_ANIME_REQUEST_FIELDS
            .iter()
            .copied()
            .filter(|field| {
                !known_anime_field(*field, anime.as_ref(), episode.as_ref(), group.as_ref())
            })
            .collect();

        let mut file_fields: Vec<FileField> = FILE_REQUEST_FIELDS
            .iter()
            .copied()
            .filter(|field| match field {
                FileField::Lid => !flags.contains(LocalFlags::IN_MYLIST),
                field => !file.has(*field),
            })
            .collect();

        // amask fields are attached to records by the ids in the same reply
        for field in &anime_fields {
            let key = match field.target() {
                FileAnimeTarget::Anime(_) => FileField::Aid,
                FileAnimeTarget::Episode(_) => FileField::Eid,
                FileAnimeTarget::GroupName | FileAnimeTarget::GroupShortName => FileField::Gid,
            };
            if !file_fields.contains(&key) {
                file_fields.push(key);
            }
        }

        if file_fields.is_empty() && anime_fields.is_empty() {
            debug!("File {} is fully known locally", file.fid);
            return Ok(FileLookup::Skip);
        }
        debug!(
            "File {} still needs {} file and {} anime fields",
            file.fid,
            file_fields.len(),
            anime_fields.len()
        );
        Ok(FileLookup::Request {
            fmask: FILE_FMASK.mask_for(&file_fields),
            amask: FILE_AMASK.mask_for(&anime_fields),
        })
    }

    /// amask for the `wanted` anime fields storage lacks, if any
    pub async fn plan_anime(&mut self, aid: i64, wanted: &[AnimeField]) -> Result<Option<Mask>> {
        let anime = self.metadata.load_anime(aid).await?;
        let missing: Vec<AnimeField> = wanted
            .iter()
            .copied()
            .filter(|field| !anime.as_ref().is_some_and(|anime| anime.has(*field)))
            .collect();
        if missing.is_empty() {
            return Ok(None);
        }
        Ok(Some(ANIME_AMASK.mask_for(&missing)))
    }

    /// Whether an EPISODE request would add anything
    pub async fn needs_episode(&mut self, eid: i64) -> Result<bool> {
        Ok(match self.metadata.load_episode(eid).await? {
            Some(episode) => EpisodeField::ALL.iter().any(|field| !episode.has(*field)),
            None => true,
        })
    }
}

fn known_anime_field(
    field: FileAnimeField,
    anime: Option<&AnimeInfo>,
    episode: Option<&EpisodeInfo>,
    group: Option<&GroupInfo>,
) -> bool {
    match field.target() {
        FileAnimeTarget::Anime(field) => anime.is_some_and(|anime| anime.has(field)),
        FileAnimeTarget::Episode(field) => episode.is_some_and(|episode| episode.has(field)),
        FileAnimeTarget::GroupName => group.is_some_and(|group| group.name.is_some()),
        FileAnimeTarget::GroupShortName => group.is_some_and(|group| group.short_name.is_some()),
    }
}

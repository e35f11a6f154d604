//! Bit-to-field layouts for every mask the client sends
//!
//! Each layout is a table of bytes, each byte listing its slots from bit 7
//! down to bit 0. Retired and unused slots still occupy a reply field when
//! their bit is set, so they must stay in the table.

use super::Mask;
use serde::{Deserialize, Serialize};

/// What a single mask bit selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<F> {
    /// Id field the caller reads before walking; never consumed by the walker
    Leading,
    /// A field stored in a record
    Field(F),
    /// Field the server dropped; its token is read and discarded
    Retired,
    /// Bit with no documented meaning; its token is read and discarded
    Unused,
}

/// Declarative mask layout: `bytes[i][0]` is bit 7 of byte `i`
#[derive(Debug)]
pub struct MaskLayout<F: 'static> {
    pub name: &'static str,
    pub bytes: &'static [[Slot<F>; 8]],
}

impl<F: Copy + PartialEq> MaskLayout<F> {
    pub fn width(&self) -> usize {
        self.bytes.len()
    }

    pub fn slot(&self, byte: usize, bit: u8) -> Slot<F> {
        match self.bytes.get(byte) {
            Some(slots) if bit < 8 => slots[7 - bit as usize],
            _ => Slot::Unused,
        }
    }

    /// Where `field` lives in this layout
    pub fn position_of(&self, field: F) -> Option<(usize, u8)> {
        self.bytes.iter().enumerate().find_map(|(byte, slots)| {
            slots
                .iter()
                .position(|slot| *slot == Slot::Field(field))
                .map(|index| (byte, 7 - index as u8))
        })
    }

    /// Mask selecting exactly `fields`
    pub fn mask_for(&self, fields: &[F]) -> Mask {
        let mut mask = Mask::new(self.width());
        for field in fields {
            if let Some((byte, bit)) = self.position_of(*field) {
                mask.set(byte, bit);
            }
        }
        mask
    }

    /// Fields selected by `mask`, in wire order
    pub fn fields_in(&self, mask: &Mask) -> Vec<F> {
        mask.set_bits()
            .filter_map(|(byte, bit)| match self.slot(byte, bit) {
                Slot::Field(field) => Some(field),
                _ => None,
            })
            .collect()
    }
}

macro_rules! field_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $column:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Storage column holding this field
            pub fn column(self) -> &'static str {
                match self {
                    $($name::$variant => $column,)+
                }
            }
        }
    };
}

field_enum! {
    /// Fields of an ANIME reply
    AnimeField {
        DateFlags => "date_flags",
        Year => "year",
        Type => "type",
        RelatedAidList => "related_aid_list",
        RelatedAidType => "related_aid_type",
        RomajiName => "name_romaji",
        KanjiName => "name_kanji",
        EnglishName => "name_english",
        OtherName => "name_other",
        ShortNameList => "name_short",
        SynonymList => "synonyms",
        Episodes => "episodes",
        HighestEpisode => "highest_episode",
        SpecialEpisodeCount => "special_ep_count",
        AirDate => "air_date",
        EndDate => "end_date",
        Url => "url",
        PictureName => "picname",
        Rating => "rating",
        VoteCount => "vote_count",
        TempRating => "temp_rating",
        TempVoteCount => "temp_vote_count",
        AverageReviewRating => "avg_review_rating",
        ReviewCount => "review_count",
        AwardList => "award_list",
        IsRestricted => "is_18_restricted",
        AnnId => "ann_id",
        AllCinemaId => "allcinema_id",
        AnimeNfoId => "animenfo_id",
        TagNameList => "tag_name_list",
        TagIdList => "tag_id_list",
        TagWeightList => "tag_weight_list",
        DateRecordUpdated => "date_record_updated",
        CharacterIdList => "character_id_list",
        SpecialsCount => "specials_count",
        CreditsCount => "credits_count",
        OtherCount => "other_count",
        TrailerCount => "trailer_count",
        ParodyCount => "parody_count",
    }
}

field_enum! {
    /// Fields selected by a FILE fmask
    FileField {
        Aid => "aid",
        Eid => "eid",
        Gid => "gid",
        Lid => "lid",
        OtherEpisodes => "other_episodes",
        IsDeprecated => "is_deprecated",
        State => "state",
        Size => "size",
        Ed2k => "ed2k",
        Md5 => "md5",
        Sha1 => "sha1",
        Crc32 => "crc32",
        ColourDepth => "colour_depth",
        Quality => "quality",
        Source => "source",
        AudioCodec => "audio_codec",
        AudioBitrate => "audio_bitrate",
        VideoCodec => "video_codec",
        VideoBitrate => "video_bitrate",
        Resolution => "resolution",
        FileType => "file_type",
        DubLanguage => "dub_language",
        SubLanguage => "sub_language",
        Length => "length",
        Description => "description",
        AiredDate => "aired_date",
        AnidbFilename => "anidb_filename",
        MylistState => "mylist_state",
        MylistFileState => "mylist_filestate",
        MylistViewed => "mylist_viewed",
        MylistViewDate => "mylist_viewdate",
        MylistStorage => "mylist_storage",
        MylistSource => "mylist_source",
        MylistOther => "mylist_other",
    }
}

field_enum! {
    /// Anime, episode and group fields selected by a FILE amask
    FileAnimeField {
        EpisodeTotal => "episodes",
        EpisodeLast => "highest_episode",
        Year => "year",
        Type => "type",
        RelatedAidList => "related_aid_list",
        RelatedAidType => "related_aid_type",
        RomajiName => "name_romaji",
        KanjiName => "name_kanji",
        EnglishName => "name_english",
        OtherName => "name_other",
        ShortNameList => "name_short",
        SynonymList => "synonyms",
        EpisodeNumber => "epno",
        EpisodeName => "name_english",
        EpisodeRomajiName => "name_romaji",
        EpisodeKanjiName => "name_kanji",
        EpisodeRating => "rating",
        EpisodeVoteCount => "vote_count",
        GroupName => "name",
        GroupShortName => "short_name",
        DateAidRecordUpdated => "date_record_updated",
    }
}

field_enum! {
    /// Fields of an EPISODE reply, in reply order after the eid
    EpisodeField {
        Aid => "aid",
        Length => "length",
        Rating => "rating",
        VoteCount => "vote_count",
        EpisodeNumber => "epno",
        EnglishName => "name_english",
        RomajiName => "name_romaji",
        KanjiName => "name_kanji",
        Aired => "aired",
        Type => "type",
    }
}

/// Record a FILE amask field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAnimeTarget {
    Anime(AnimeField),
    Episode(EpisodeField),
    GroupName,
    GroupShortName,
}

impl FileAnimeField {
    pub fn target(self) -> FileAnimeTarget {
        use FileAnimeTarget::{Anime, Episode};
        match self {
            Self::EpisodeTotal => Anime(AnimeField::Episodes),
            Self::EpisodeLast => Anime(AnimeField::HighestEpisode),
            Self::Year => Anime(AnimeField::Year),
            Self::Type => Anime(AnimeField::Type),
            Self::RelatedAidList => Anime(AnimeField::RelatedAidList),
            Self::RelatedAidType => Anime(AnimeField::RelatedAidType),
            Self::RomajiName => Anime(AnimeField::RomajiName),
            Self::KanjiName => Anime(AnimeField::KanjiName),
            Self::EnglishName => Anime(AnimeField::EnglishName),
            Self::OtherName => Anime(AnimeField::OtherName),
            Self::ShortNameList => Anime(AnimeField::ShortNameList),
            Self::SynonymList => Anime(AnimeField::SynonymList),
            Self::DateAidRecordUpdated => Anime(AnimeField::DateRecordUpdated),
            Self::EpisodeNumber => Episode(EpisodeField::EpisodeNumber),
            Self::EpisodeName => Episode(EpisodeField::EnglishName),
            Self::EpisodeRomajiName => Episode(EpisodeField::RomajiName),
            Self::EpisodeKanjiName => Episode(EpisodeField::KanjiName),
            Self::EpisodeRating => Episode(EpisodeField::Rating),
            Self::EpisodeVoteCount => Episode(EpisodeField::VoteCount),
            Self::GroupName => FileAnimeTarget::GroupName,
            Self::GroupShortName => FileAnimeTarget::GroupShortName,
        }
    }
}

use Slot::{Field, Leading, Retired, Unused};

/// ANIME amask, 7 bytes
pub static ANIME_AMASK: MaskLayout<AnimeField> = MaskLayout {
    name: "anime amask",
    bytes: &[
        [
            Leading,
            Field(AnimeField::DateFlags),
            Field(AnimeField::Year),
            Field(AnimeField::Type),
            Field(AnimeField::RelatedAidList),
            Field(AnimeField::RelatedAidType),
            Retired,
            Retired,
        ],
        [
            Field(AnimeField::RomajiName),
            Field(AnimeField::KanjiName),
            Field(AnimeField::EnglishName),
            Field(AnimeField::OtherName),
            Field(AnimeField::ShortNameList),
            Field(AnimeField::SynonymList),
            Retired,
            Retired,
        ],
        [
            Field(AnimeField::Episodes),
            Field(AnimeField::HighestEpisode),
            Field(AnimeField::SpecialEpisodeCount),
            Field(AnimeField::AirDate),
            Field(AnimeField::EndDate),
            Field(AnimeField::Url),
            Field(AnimeField::PictureName),
            Retired,
        ],
        [
            Field(AnimeField::Rating),
            Field(AnimeField::VoteCount),
            Field(AnimeField::TempRating),
            Field(AnimeField::TempVoteCount),
            Field(AnimeField::AverageReviewRating),
            Field(AnimeField::ReviewCount),
            Field(AnimeField::AwardList),
            Field(AnimeField::IsRestricted),
        ],
        [
            Retired,
            Field(AnimeField::AnnId),
            Field(AnimeField::AllCinemaId),
            Field(AnimeField::AnimeNfoId),
            Field(AnimeField::TagNameList),
            Field(AnimeField::TagIdList),
            Field(AnimeField::TagWeightList),
            Field(AnimeField::DateRecordUpdated),
        ],
        [
            Field(AnimeField::CharacterIdList),
            Retired,
            Retired,
            Retired,
            Unused,
            Unused,
            Unused,
            Unused,
        ],
        [
            Field(AnimeField::SpecialsCount),
            Field(AnimeField::CreditsCount),
            Field(AnimeField::OtherCount),
            Field(AnimeField::TrailerCount),
            Field(AnimeField::ParodyCount),
            Unused,
            Unused,
            Unused,
        ],
    ],
};

/// FILE fmask, 5 bytes; the fid always precedes these fields
pub static FILE_FMASK: MaskLayout<FileField> = MaskLayout {
    name: "file fmask",
    bytes: &[
        [
            Unused,
            Field(FileField::Aid),
            Field(FileField::Eid),
            Field(FileField::Gid),
            Field(FileField::Lid),
            Field(FileField::OtherEpisodes),
            Field(FileField::IsDeprecated),
            Field(FileField::State),
        ],
        [
            Field(FileField::Size),
            Field(FileField::Ed2k),
            Field(FileField::Md5),
            Field(FileField::Sha1),
            Field(FileField::Crc32),
            Unused,
            Field(FileField::ColourDepth),
            Unused,
        ],
        [
            Field(FileField::Quality),
            Field(FileField::Source),
            Field(FileField::AudioCodec),
            Field(FileField::AudioBitrate),
            Field(FileField::VideoCodec),
            Field(FileField::VideoBitrate),
            Field(FileField::Resolution),
            Field(FileField::FileType),
        ],
        [
            Field(FileField::DubLanguage),
            Field(FileField::SubLanguage),
            Field(FileField::Length),
            Field(FileField::Description),
            Field(FileField::AiredDate),
            Unused,
            Unused,
            Field(FileField::AnidbFilename),
        ],
        [
            Field(FileField::MylistState),
            Field(FileField::MylistFileState),
            Field(FileField::MylistViewed),
            Field(FileField::MylistViewDate),
            Field(FileField::MylistStorage),
            Field(FileField::MylistSource),
            Field(FileField::MylistOther),
            Unused,
        ],
    ],
};

/// FILE amask, 4 bytes; walked right after the fmask fields
pub static FILE_AMASK: MaskLayout<FileAnimeField> = MaskLayout {
    name: "file amask",
    bytes: &[
        [
            Field(FileAnimeField::EpisodeTotal),
            Field(FileAnimeField::EpisodeLast),
            Field(FileAnimeField::Year),
            Field(FileAnimeField::Type),
            Field(FileAnimeField::RelatedAidList),
            Field(FileAnimeField::RelatedAidType),
            Retired,
            Unused,
        ],
        [
            Field(FileAnimeField::RomajiName),
            Field(FileAnimeField::KanjiName),
            Field(FileAnimeField::EnglishName),
            Field(FileAnimeField::OtherName),
            Field(FileAnimeField::ShortNameList),
            Field(FileAnimeField::SynonymList),
            Retired,
            Retired,
        ],
        [
            Field(FileAnimeField::EpisodeNumber),
            Field(FileAnimeField::EpisodeName),
            Field(FileAnimeField::EpisodeRomajiName),
            Field(FileAnimeField::EpisodeKanjiName),
            Field(FileAnimeField::EpisodeRating),
            Field(FileAnimeField::EpisodeVoteCount),
            Unused,
            Unused,
        ],
        [
            Field(FileAnimeField::GroupName),
            Field(FileAnimeField::GroupShortName),
            Unused,
            Unused,
            Unused,
            Unused,
            Unused,
            Field(FileAnimeField::DateAidRecordUpdated),
        ],
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_widths() {
        assert_eq!(ANIME_AMASK.width(), 7);
        assert_eq!(FILE_FMASK.width(), 5);
        assert_eq!(FILE_AMASK.width(), 4);
    }

    #[test]
    fn test_every_field_has_exactly_one_slot() {
        for field in AnimeField::ALL {
            assert!(ANIME_AMASK.position_of(*field).is_some(), "{field:?}");
        }
        for field in FileField::ALL {
            assert!(FILE_FMASK.position_of(*field).is_some(), "{field:?}");
        }
        for field in FileAnimeField::ALL {
            assert!(FILE_AMASK.position_of(*field).is_some(), "{field:?}");
        }
    }

    #[test]
    fn test_known_positions() {
        assert_eq!(ANIME_AMASK.slot(0, 7), Slot::Leading);
        assert_eq!(ANIME_AMASK.slot(0, 6), Slot::Field(AnimeField::DateFlags));
        assert_eq!(ANIME_AMASK.slot(0, 1), Slot::Retired);
        assert_eq!(ANIME_AMASK.slot(6, 2), Slot::Unused);
        assert_eq!(
            ANIME_AMASK.position_of(AnimeField::CharacterIdList),
            Some((5, 7))
        );
        assert_eq!(FILE_FMASK.position_of(FileField::Ed2k), Some((1, 6)));
        assert_eq!(
            FILE_AMASK.position_of(FileAnimeField::DateAidRecordUpdated),
            Some((3, 0))
        );
    }

    #[test]
    fn test_mask_for_round_trips_through_fields_in() {
        let fields = [AnimeField::Year, AnimeField::RomajiName, AnimeField::ParodyCount];
        let mask = ANIME_AMASK.mask_for(&fields);
        assert_eq!(mask.to_string(), "20800000000008");
        assert_eq!(ANIME_AMASK.fields_in(&mask), fields.to_vec());
    }

    #[test]
    fn test_file_amask_targets() {
        assert_eq!(
            FileAnimeField::EpisodeTotal.target(),
            FileAnimeTarget::Anime(AnimeField::Episodes)
        );
        assert_eq!(
            FileAnimeField::EpisodeNumber.target(),
            FileAnimeTarget::Episode(EpisodeField::EpisodeNumber)
        );
        assert_eq!(
            FileAnimeField::GroupShortName.target(),
            FileAnimeTarget::GroupShortName
        );
    }
}

use std::io::{BufWriter, Write};
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};

use crate::bank::AudioStream;
use crate::container::{VorbisSetupLibrary, write_container};
use crate::error::{Error, Result};

/// Resolved, display-ready tag values for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub genre: Option<String>,
}

/// Writes tagged audio files around untouched stream payloads.
pub struct TagWriter<'a> {
    setups: &'a VorbisSetupLibrary,
}

impl<'a> TagWriter<'a> {
    pub fn new(setups: &'a VorbisSetupLibrary) -> Self {
        Self { setups }
    }

    /// Write `stream` to `output` with `tags` and an optional PNG cover.
    ///
    /// The file is assembled and tagged under a temporary name in the
    /// destination directory and renamed into place, so `output` either
    /// holds the complete file or is left untouched.
    pub fn write(&self, stream: &AudioStream, tags: &TrackTags, cover_png: Option<&[u8]>, output: &Path) -> Result<()> {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        // lofty picks the file type from the extension
        let suffix = output
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix(".mdrip-")
            .suffix(&suffix)
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            write_container(stream, self.setups, &mut writer)?;
            writer.flush()?;
        }
        apply_tags(temp.path(), tags, cover_png)?;

        temp.persist(output).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Wrote {}", output.display());
        Ok(())
    }
}

fn tag_error(e: lofty::error::LoftyError) -> Error {
    Error::Tag(e.to_string())
}

fn apply_tags(path: &Path, tags: &TrackTags, cover_png: Option<&[u8]>) -> Result<()> {
    let mut tagged_file = Probe::open(path).map_err(tag_error)?.read().map_err(tag_error)?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| Error::Tag("file type has no tag support".into()))?;

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());
    if let Some(track) = tags.track_number {
        tag.set_track(track);
    }
    if let Some(total) = tags.track_total {
        tag.set_track_total(total);
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre.clone());
    }

    if let Some(png) = cover_png {
        let pic = Picture::unchecked(png.to_vec())
            .pic_type(PictureType::CoverFront)
            .mime_type(MimeType::Png)
            .build();
        tag.push_picture(pic);
    }

    tag.save_to_path(path, WriteOptions::default()).map_err(tag_error)?;
    Ok(())
}

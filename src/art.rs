use crate::error::PlayerError;
use image::imageops::FilterType;
use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::probe::Probe;
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

pub trait ArtReader {
    /// Embedded cover image bytes, `None` when the file carries no picture.
    fn read_embedded_image(&self, path: &Path) -> Result<Option<Vec<u8>>, PlayerError>;
}

/// Reads pictures through lofty's tag parser, falling back to symphonia's
/// container metadata when lofty finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyArtReader;

impl ArtReader for LoftyArtReader {
    fn read_embedded_image(&self, path: &Path) -> Result<Option<Vec<u8>>, PlayerError> {
        let stripped = crate::config::strip_windows_verbatim_prefix(path);
        let tagged_file = Probe::open(&stripped)
            .and_then(|probe| probe.read())
            .map_err(|err| PlayerError::ArtRead {
                path: stripped.clone(),
                reason: err.to_string(),
            })?;

        let pictures = tagged_file.tags().iter().flat_map(|tag| tag.pictures());
        let mut first = None;
        for picture in pictures {
            if picture.pic_type() == PictureType::CoverFront && !picture.data().is_empty() {
                return Ok(Some(picture.data().to_vec()));
            }
            if first.is_none() && !picture.data().is_empty() {
                first = Some(picture.data().to_vec());
            }
        }

        Ok(first.or_else(|| symphonia_cover_art(&stripped)))
    }
}

fn symphonia_cover_art(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let mut probed = get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let metadata = probed.format.metadata();
    let revision = metadata.current()?;
    let visual = revision
        .visuals()
        .iter()
        .find(|entry| !entry.data.is_empty())?;
    Some(visual.data.as_ref().to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumArt {
    /// No picture for the current track, or nothing playing.
    Missing,
    /// No art reader configured.
    Unavailable,
    Image(ArtImage),
}

impl AlbumArt {
    /// Decodes `bytes` and crops/scales them to fill a `size` x `size` square.
    pub fn from_bytes(bytes: &[u8], size: u32) -> Result<Self, image::ImageError> {
        let size = size.max(1);
        let decoded = image::load_from_memory(bytes)?;
        let fitted = decoded
            .resize_to_fill(size, size, FilterType::Lanczos3)
            .to_rgb8();
        Ok(Self::Image(ArtImage {
            width: fitted.width(),
            height: fitted.height(),
            pixels: fitted.into_raw(),
        }))
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Missing => Some("No Art"),
            Self::Unavailable => Some("Art disabled"),
            Self::Image(_) => None,
        }
    }
}

/// Row-major RGB pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl ArtImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ]
    }

    /// Nearest-neighbour sample of the image scaled to `columns` x `rows`.
    pub fn sample(&self, columns: u32, rows: u32, column: u32, row: u32) -> [u8; 3] {
        if columns == 0 || rows == 0 {
            return [0, 0, 0];
        }
        let x = u64::from(column) * u64::from(self.width) / u64::from(columns);
        let y = u64::from(row) * u64::from(self.height) / u64::from(rows);
        self.pixel(
            u32::try_from(x).unwrap_or(u32::MAX),
            u32::try_from(y).unwrap_or(u32::MAX),
        )
    }
}

/// Loads the art for `path`, degrading to [`AlbumArt::Missing`] on any failure.
pub fn load_album_art(reader: &dyn ArtReader, path: &Path, size: u32) -> AlbumArt {
    let bytes = match reader.read_embedded_image(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::debug!(path = %path.display(), "no embedded picture");
            return AlbumArt::Missing;
        }
        Err(err) => {
            tracing::debug!(error = %err, "album art read failed");
            return AlbumArt::Missing;
        }
    };

    match AlbumArt::from_bytes(&bytes, size) {
        Ok(art) => art,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "embedded picture did not decode");
            AlbumArt::Missing
        }
    }
}

use std::{fmt, sync::OnceLock};

use regex::Regex;
use reqwest::Url;
use thiserror::Error;

const MEDIA_EXTENSIONS: [&str; 6] = ["mp4", "webm", "mkv", "mov", "avi", "m3u8"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Youtube,
    Bilibili,
    Vimeo,
    Direct,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Bilibili => "Bilibili",
            Platform::Vimeo => "Vimeo",
            Platform::Direct => "Direct file",
        }
    }

    /// Platforms that publish their own subtitle tracks.
    pub fn has_official_captions(&self) -> bool {
        !matches!(self, Platform::Direct)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub platform: Platform,
    pub url: Url,
    /// Platform video id, when the URL carries one (short links do not).
    pub video_id: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("video reference is empty")]
    Empty,

    #[error("not a valid URL: {reason}")]
    Unparseable { reference: String, reason: String },

    #[error("unsupported URL scheme '{scheme}'")]
    UnsupportedScheme { reference: String, scheme: String },

    #[error("unrecognized video host '{host}'")]
    UnsupportedHost { reference: String, host: String },

    #[error("no {platform} video id found in URL")]
    MissingVideoId {
        reference: String,
        platform: Platform,
    },
}

impl SourceError {
    pub fn reference(&self) -> &str {
        match self {
            SourceError::Empty => "",
            SourceError::Unparseable { reference, .. }
            | SourceError::UnsupportedScheme { reference, .. }
            | SourceError::UnsupportedHost { reference, .. }
            | SourceError::MissingVideoId { reference, .. } => reference,
        }
    }
}

fn youtube_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid youtube id regex"))
}

fn bilibili_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/video/(BV[0-9A-Za-z]{10}|av\d+)/?$").expect("valid bilibili regex")
    })
}

fn vimeo_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(?:video/)?(\d+)/?").expect("valid vimeo regex"))
}

/// Parse and classify a video URL.
pub fn parse_video_ref(input: &str) -> Result<VideoSource, SourceError> {
    let reference = input.trim();
    if reference.is_empty() {
        return Err(SourceError::Empty);
    }

    let url = Url::parse(reference).map_err(|e| SourceError::Unparseable {
        reference: reference.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::UnsupportedScheme {
            reference: reference.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    let host = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .trim_start_matches("m.")
        .to_ascii_lowercase();

    let missing = |platform| SourceError::MissingVideoId {
        reference: reference.to_string(),
        platform,
    };

    let (platform, video_id) = match host.as_str() {
        "youtube.com" => {
            let id = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())
                .or_else(|| {
                    let mut segments = url.path_segments()?;
                    match segments.next()? {
                        "shorts" | "embed" | "live" => segments.next().map(str::to_string),
                        _ => None,
                    }
                })
                .filter(|id| youtube_id_re().is_match(id))
                .ok_or_else(|| missing(Platform::Youtube))?;
            (Platform::Youtube, Some(id))
        }
        "youtu.be" => {
            let id = url
                .path_segments()
                .and_then(|mut s| s.next())
                .filter(|id| youtube_id_re().is_match(id))
                .map(str::to_string)
                .ok_or_else(|| missing(Platform::Youtube))?;
            (Platform::Youtube, Some(id))
        }
        "bilibili.com" => {
            let id = bilibili_path_re()
                .captures(url.path())
                .map(|c| c[1].to_string())
                .ok_or_else(|| missing(Platform::Bilibili))?;
            (Platform::Bilibili, Some(id))
        }
        // Short links are resolved by the subtitle service.
        "b23.tv" => {
            if url.path().trim_matches('/').is_empty() {
                return Err(missing(Platform::Bilibili));
            }
            (Platform::Bilibili, None)
        }
        "vimeo.com" | "player.vimeo.com" => {
            let id = vimeo_path_re()
                .captures(url.path())
                .map(|c| c[1].to_string())
                .ok_or_else(|| missing(Platform::Vimeo))?;
            (Platform::Vimeo, Some(id))
        }
        _ if has_media_extension(&url) => (Platform::Direct, None),
        _ => {
            return Err(SourceError::UnsupportedHost {
                reference: reference.to_string(),
                host,
            });
        }
    };

    Ok(VideoSource {
        platform,
        url,
        video_id,
    })
}

fn has_media_extension(url: &Url) -> bool {
    url.path()
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_watch_and_short_links() {
        let src = parse_video_ref("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").unwrap();
        assert_eq!(src.platform, Platform::Youtube);
        assert_eq!(src.video_id.as_deref(), Some("dQw4w9WgXcQ"));

        let src = parse_video_ref("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(src.video_id.as_deref(), Some("dQw4w9WgXcQ"));

        let src = parse_video_ref("https://youtube.com/shorts/dQw4w9WgXcQ").unwrap();
        assert_eq!(src.video_id.as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn bilibili_bv_id_and_short_link() {
        let src = parse_video_ref("https://www.bilibili.com/video/BV1xx411c7XZ/").unwrap();
        assert_eq!(src.platform, Platform::Bilibili);
        assert_eq!(src.video_id.as_deref(), Some("BV1xx411c7XZ"));

        let src = parse_video_ref("https://b23.tv/abc123").unwrap();
        assert_eq!(src.platform, Platform::Bilibili);
        assert_eq!(src.video_id, None);
    }

    #[test]
    fn vimeo_numeric_id() {
        let src = parse_video_ref("https://vimeo.com/76979871").unwrap();
        assert_eq!(src.platform, Platform::Vimeo);
        assert_eq!(src.video_id.as_deref(), Some("76979871"));
    }

    #[test]
    fn direct_media_files_have_no_official_captions() {
        let src = parse_video_ref("https://cdn.example.org/lectures/week1.MP4").unwrap();
        assert_eq!(src.platform, Platform::Direct);
        assert!(!src.platform.has_official_captions());
    }

    #[test]
    fn rejects_malformed_and_unsupported_references() {
        assert_eq!(parse_video_ref("   "), Err(SourceError::Empty));
        assert!(matches!(
            parse_video_ref("not a url"),
            Err(SourceError::Unparseable { .. })
        ));
        assert!(matches!(
            parse_video_ref("ftp://youtube.com/watch?v=dQw4w9WgXcQ"),
            Err(SourceError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            parse_video_ref("https://example.com/about"),
            Err(SourceError::UnsupportedHost { .. })
        ));
        assert!(matches!(
            parse_video_ref("https://www.youtube.com/watch?v=short"),
            Err(SourceError::MissingVideoId { .. })
        ));
    }
}

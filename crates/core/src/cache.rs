use std::{
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;

use crate::types::{AnalysisOptions, AnalysisResult};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("glossa")
}

/// Get the cache directory for a given video URL
pub fn get_cache_dir(root: &Path, url: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    url.trim().hash(&mut hasher);
    let url_hash = hasher.finish();

    root.join(url_hash.to_string())
}

/// Cached result path, keyed by language and, when frames were analyzed, by
/// visual mode and frame interval
pub fn get_result_path(cache_dir: &Path, options: &AnalysisOptions) -> PathBuf {
    let mode = if options.include_visual_analysis {
        format!(
            "visual-{}-{}",
            options.visual_mode.name(),
            options.frame_interval
        )
    } else {
        "audio".to_string()
    };
    cache_dir.join(format!("analysis_{}_{}.json", options.language, mode))
}

pub async fn load_result(path: &Path) -> Result<AnalysisResult, CacheError> {
    let json_content = fs::read_to_string(path).await?;
    let result: AnalysisResult = serde_json::from_str(&json_content)?;
    Ok(result)
}

pub async fn save_result(result: &AnalysisResult, path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let pretty_json = serde_json::to_string_pretty(result)?;
    fs::write(path, &pretty_json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceStrategy, SubtitleItem, VisualMode};

    #[test]
    fn same_url_same_dir() {
        let root = Path::new("/cache");
        let a = get_cache_dir(root, "https://youtu.be/dQw4w9WgXcQ");
        let b = get_cache_dir(root, " https://youtu.be/dQw4w9WgXcQ ");
        assert_eq!(a, b);
        assert_ne!(a, get_cache_dir(root, "https://youtu.be/other"));
    }

    #[test]
    fn result_path_depends_on_options() {
        let dir = Path::new("/cache/1");
        let mut options = AnalysisOptions::default();
        assert_eq!(
            get_result_path(dir, &options),
            dir.join("analysis_zh_visual-all-2.json")
        );
        options.visual_mode = VisualMode::Ocr;
        options.frame_interval = 10.0;
        assert_eq!(
            get_result_path(dir, &options),
            dir.join("analysis_zh_visual-ocr-10.json")
        );
        options.frame_interval = 0.5;
        assert_eq!(
            get_result_path(dir, &options),
            dir.join("analysis_zh_visual-ocr-0.5.json")
        );
        options.include_visual_analysis = false;
        options.language = "en".into();
        assert_eq!(
            get_result_path(dir, &options),
            dir.join("analysis_en_audio.json")
        );
    }

    #[tokio::test]
    async fn saved_result_loads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = get_result_path(&tmp.path().join("abc"), &AnalysisOptions::default());
        let result = AnalysisResult {
            subtitles: vec![SubtitleItem::new(0.0, 1.0, "你好")],
            subtitle_source: Some(SourceStrategy::SpeechToText),
            summary: Some("greeting".into()),
            ..Default::default()
        };

        save_result(&result, &path).await.unwrap();
        assert_eq!(load_result(&path).await.unwrap(), result);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_result(&tmp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }
}

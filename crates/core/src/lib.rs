//! Glossa Core Library
//!
//! Turns a video URL into accessibility artifacts (subtitles, on-screen text,
//! scene descriptions, glossary, summary) by driving remote subtitle and
//! analysis jobs through a fallback-aware stage pipeline.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod format;
pub mod gateway;
pub mod health;
pub mod machine;
pub mod orchestrator;
pub mod poller;
pub mod source;
pub mod types;

// Re-export commonly used items at crate root
pub use assembler::{AssemblyOptions, AssemblyWarning, assemble};
pub use cache::{get_cache_dir, get_result_path, get_root_cache_dir, load_result, save_result};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{AnalysisError, ErrorKind, JobFailed, Result};
pub use format::{format_result_readable, format_timestamp, subtitle_at, to_srt};
pub use gateway::{GatewayError, HttpGateway, JobGateway, RemoteStatus, Service};
pub use health::{ServiceReadiness, check_service, wait_until_ready};
pub use orchestrator::{JobHandle, JobReport, Orchestrator};
pub use source::{Platform, VideoSource, parse_video_ref};
pub use types::{
    AnalysisJob, AnalysisOptions, AnalysisResult, GlossaryTerm, SceneDescription, SourceStrategy,
    Stage, SubtitleItem, VisualFrame, VisualMode,
};

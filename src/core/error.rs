use std::path::PathBuf;

/// Failures that change what the caller of the playback supervisor sees.
///
/// Everything else (unreadable metadata, missing files on removal, children
/// that ignore SIGTERM) is logged and absorbed where it happens.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no playable videos in {}", dir.display())]
    EmptyCatalog { dir: PathBuf },

    #[error("failed to start player {program} with args {args:?}: {source}")]
    Spawn {
        program: String,
        args: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("a playback session is already running ({})", path.display())]
    SessionActive { path: PathBuf },
}

//! Local media capture.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use webrtc::track::track_local::TrackLocal;

use crate::session::StreamMode;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Microphone.
    Audio,
    /// Camera.
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Errors from the capture collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user denied access; the UI should point at settings.
    #[error("{0} permission denied")]
    PermissionDenied(MediaKind),

    /// No device or the device is busy.
    #[error("{0} unavailable: {1}")]
    Unavailable(MediaKind, String),
}

/// One captured track, ready to attach to a peer connection.
#[derive(Clone)]
pub struct MediaTrack {
    /// Audio or video.
    pub kind: MediaKind,
    /// The outgoing track.
    pub track: Arc<dyn TrackLocal + Send + Sync>,
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("kind", &self.kind)
            .field("id", &self.track.id())
            .finish()
    }
}

/// Tracks captured for one session.
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    /// Captured tracks, audio first.
    pub tracks: Vec<MediaTrack>,
}

impl LocalMedia {
    /// Whether any track of `kind` was captured.
    pub fn has(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// Media kinds needed for a stream mode.
pub fn kinds_for(mode: StreamMode) -> &'static [MediaKind] {
    match mode {
        StreamMode::Audio => &[MediaKind::Audio],
        StreamMode::AudioVideo => &[MediaKind::Audio, MediaKind::Video],
    }
}

/// Platform media capture.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Capture one track of `kind`.
    async fn local_media(&self, kind: MediaKind) -> Result<MediaTrack, MediaError>;

    /// Stop capturing and release the devices behind `media`.
    async fn release(&self, media: LocalMedia);

    /// Capture every track needed for `mode`.
    async fn capture(&self, mode: StreamMode) -> Result<LocalMedia, MediaError> {
        let mut media = LocalMedia::default();
        for kind in kinds_for(mode) {
            match self.local_media(*kind).await {
                Ok(track) => media.tracks.push(track),
                Err(e) => {
                    self.release(media).await;
                    return Err(e);
                }
            }
        }
        Ok(media)
    }
}

/// Media source for devices that only receive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMedia;

#[async_trait]
impl MediaSource for NoMedia {
    async fn local_media(&self, kind: MediaKind) -> Result<MediaTrack, MediaError> {
        Err(MediaError::Unavailable(kind, "capture disabled".into()))
    }

    async fn release(&self, _media: LocalMedia) {}
}

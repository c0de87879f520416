//! Host player collaborator used to anchor live timelines.

use async_trait::async_trait;
use m3u8_rs::MediaPlaylist;

/// Snapshot of the host player's playback state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackInfo {
    /// Current position in seconds on the player's timeline.
    pub current_position: f64,
    pub playback_speed: f64,
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self {
            current_position: 0.0,
            playback_speed: 1.0,
        }
    }
}

#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    /// Absolute playback position, in seconds, at which the first new segment
    /// of a live playlist starts.
    async fn absolute_playback_position(&self, playlist: &MediaPlaylist) -> f64;

    /// Drops any per-session state. Called when the loader stops or a new
    /// manifest starts playing.
    async fn reset(&self) {}
}

/// Always reports the same position. Used when no player is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPlaybackProvider {
    position: f64,
}

impl StaticPlaybackProvider {
    pub fn new(position: f64) -> Self {
        Self { position }
    }
}

#[async_trait]
impl PlaybackProvider for StaticPlaybackProvider {
    async fn absolute_playback_position(&self, _playlist: &MediaPlaylist) -> f64 {
        self.position
    }
}

/// Queries the host for its playback state on every live parse.
pub struct ExternalPlaybackProvider<F> {
    playback_info: F,
}

impl<F> ExternalPlaybackProvider<F>
where
    F: Fn() -> PlaybackInfo + Send + Sync,
{
    pub fn new(playback_info: F) -> Self {
        Self { playback_info }
    }
}

#[async_trait]
impl<F> PlaybackProvider for ExternalPlaybackProvider<F>
where
    F: Fn() -> PlaybackInfo + Send + Sync,
{
    async fn absolute_playback_position(&self, _playlist: &MediaPlaylist) -> f64 {
        (self.playback_info)().current_position.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn external_provider_reads_host_position() {
        let provider = ExternalPlaybackProvider::new(|| PlaybackInfo {
            current_position: 42.5,
            playback_speed: 1.0,
        });
        let playlist = MediaPlaylist::default();
        assert_eq!(provider.absolute_playback_position(&playlist).await, 42.5);
    }

    #[tokio::test]
    async fn negative_host_position_is_clamped() {
        let provider = ExternalPlaybackProvider::new(|| PlaybackInfo {
            current_position: -3.0,
            ..Default::default()
        });
        let playlist = MediaPlaylist::default();
        assert_eq!(provider.absolute_playback_position(&playlist).await, 0.0);
    }
}

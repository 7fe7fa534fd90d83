use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("player is not ready")]
    NotReady,
    #[error("player is no longer attached")]
    Detached,
}

/// Embedded media player, as seen by the watch loop.
///
/// Implementations wrap whatever the host uses to play video. Calls must be
/// cheap; the loop makes them on every poll.
pub trait Player: Send + Sync {
    /// Current playhead in seconds.
    ///
    /// # Errors
    ///
    /// `PlayerError::NotReady` until media is loaded.
    fn current_position(&self) -> Result<f64, PlayerError>;

    /// Media length in seconds.
    ///
    /// # Errors
    ///
    /// `PlayerError::NotReady` until media is loaded.
    fn duration(&self) -> Result<f64, PlayerError>;

    /// Move the playhead.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the player cannot seek right now.
    fn seek_to(&self, seconds: f64) -> Result<(), PlayerError>;
}

/// Callbacks the host forwards from its player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    Ended,
}

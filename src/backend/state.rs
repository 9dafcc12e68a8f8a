//! Speaking/paused bookkeeping shared by backends

use crate::error::{BackendError, Result};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Uninitialized,
    Idle,
    Speaking,
    Paused,
}

/// State machine for one backend instance
///
/// Every backend that tracks its own playback state goes through this type
/// so error codes for illegal transitions are identical everywhere. `stop`
/// while idle succeeds.
#[derive(Debug, Default)]
pub struct SpeechState {
    state: PlaybackState,
}

impl SpeechState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> PlaybackState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != PlaybackState::Uninitialized
    }

    /// Fails with `NotInitialized` before `initialize` succeeded
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }

    /// Check an `initialize` call is allowed, without committing to it
    pub fn check_initialize(&self) -> Result<()> {
        if self.is_initialized() {
            Err(BackendError::AlreadyInitialized)
        } else {
            Ok(())
        }
    }

    /// Record a successful `initialize`
    pub fn initialized(&mut self) -> Result<()> {
        self.check_initialize()?;
        self.state = PlaybackState::Idle;
        Ok(())
    }

    pub fn speaking(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.state = PlaybackState::Speaking;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.state == PlaybackState::Idle {
            debug!("Stop while idle");
        }
        self.state = PlaybackState::Idle;
        Ok(())
    }

    /// Utterance ran to completion
    pub fn finished(&mut self) {
        if self.state == PlaybackState::Speaking {
            self.state = PlaybackState::Idle;
        }
    }

    /// Check `pause` is legal without changing state
    pub fn check_pause(&self) -> Result<()> {
        match self.state {
            PlaybackState::Uninitialized => Err(BackendError::NotInitialized),
            PlaybackState::Idle => Err(BackendError::NotSpeaking),
            PlaybackState::Paused => Err(BackendError::AlreadyPaused),
            PlaybackState::Speaking => Ok(()),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        self.check_pause()?;
        self.state = PlaybackState::Paused;
        Ok(())
    }

    /// Check `resume` is legal without changing state
    pub fn check_resume(&self) -> Result<()> {
        match self.state {
            PlaybackState::Uninitialized => Err(BackendError::NotInitialized),
            PlaybackState::Paused => Ok(()),
            _ => Err(BackendError::NotPaused),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        self.check_resume()?;
        self.state = PlaybackState::Speaking;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_once() {
        let mut s = SpeechState::new();
        assert_eq!(s.ensure_initialized(), Err(BackendError::NotInitialized));
        assert!(s.initialized().is_ok());
        assert_eq!(s.get(), PlaybackState::Idle);
        assert_eq!(s.initialized(), Err(BackendError::AlreadyInitialized));
    }

    #[test]
    fn test_uninitialized_rejects_everything() {
        let mut s = SpeechState::new();
        assert_eq!(s.speaking(), Err(BackendError::NotInitialized));
        assert_eq!(s.stop(), Err(BackendError::NotInitialized));
        assert_eq!(s.pause(), Err(BackendError::NotInitialized));
        assert_eq!(s.resume(), Err(BackendError::NotInitialized));
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut s = SpeechState::new();
        s.initialized().unwrap();
        assert_eq!(s.pause(), Err(BackendError::NotSpeaking));
        assert_eq!(s.resume(), Err(BackendError::NotPaused));

        s.speaking().unwrap();
        assert_eq!(s.resume(), Err(BackendError::NotPaused));
        s.pause().unwrap();
        assert_eq!(s.pause(), Err(BackendError::AlreadyPaused));
        s.resume().unwrap();
        assert_eq!(s.get(), PlaybackState::Speaking);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut s = SpeechState::new();
        s.initialized().unwrap();
        assert!(s.stop().is_ok());
        assert!(s.stop().is_ok());
        s.speaking().unwrap();
        s.pause().unwrap();
        assert!(s.stop().is_ok());
        assert_eq!(s.get(), PlaybackState::Idle);
    }

    #[test]
    fn test_finished_only_leaves_speaking() {
        let mut s = SpeechState::new();
        s.initialized().unwrap();
        s.speaking().unwrap();
        s.pause().unwrap();
        s.finished();
        assert_eq!(s.get(), PlaybackState::Paused);
        s.resume().unwrap();
        s.finished();
        assert_eq!(s.get(), PlaybackState::Idle);
    }
}

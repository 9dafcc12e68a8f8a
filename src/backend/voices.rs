//! Voice enumeration shared by backends

use crate::error::{BackendError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub language: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

/// Voices as of the last refresh plus the selected index
///
/// An index at or past the end always fails with `VoiceNotFound`; asking
/// for the current voice when the list is empty fails with `NoVoices`.
#[derive(Debug, Default)]
pub struct VoiceList {
    voices: Vec<Voice>,
    current: Option<usize>,
}

impl VoiceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list, keeping the selection if a voice of the same name survives
    pub fn replace(&mut self, voices: Vec<Voice>) {
        let selected = self.current.and_then(|i| self.voices.get(i)).map(|v| v.name.clone());
        self.current = selected.and_then(|name| voices.iter().position(|v| v.name == name));
        self.voices = voices;
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Voice> {
        self.voices.get(index).ok_or(BackendError::VoiceNotFound)
    }

    /// Validate and record a selection, returning the chosen voice
    pub fn select(&mut self, index: usize) -> Result<&Voice> {
        if index >= self.voices.len() {
            return Err(BackendError::VoiceNotFound);
        }
        self.current = Some(index);
        Ok(&self.voices[index])
    }

    /// Mark the voice with this name as current, if present
    pub fn select_by_name(&mut self, name: &str) -> Option<usize> {
        let index = self.voices.iter().position(|v| v.name == name)?;
        self.current = Some(index);
        Some(index)
    }

    pub fn current(&self) -> Result<usize> {
        if self.voices.is_empty() {
            return Err(BackendError::NoVoices);
        }
        self.current.ok_or(BackendError::VoiceNotFound)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }
}

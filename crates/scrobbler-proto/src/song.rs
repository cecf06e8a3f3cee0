//! Song model shared between the daemon and the browser side.
//!
//! A `Song` keeps what the page reported (`parsed`) apart from what the user
//! typed in (`user`). Display fields prefer the user's corrections.

use serde::{Deserialize, Serialize};

/// Raw player state as reported by an injected connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub current_time: Option<f64>,
    #[serde(default)]
    pub is_playing: bool,
}

impl PageState {
    /// True when the page is not showing any track at all.
    pub fn is_empty(&self) -> bool {
        is_blank(&self.artist) && is_blank(&self.track) && is_blank(&self.unique_id)
    }

    /// Key used to tell one track from the next.
    pub fn track_key(&self) -> Option<String> {
        if let Some(id) = self.unique_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(id.trim().to_string());
        }
        if self.is_empty() {
            return None;
        }
        Some(format!(
            "{}\u{0}{}",
            self.artist.as_deref().unwrap_or("").trim(),
            self.track.as_deref().unwrap_or("").trim()
        ))
    }
}

/// Track fields as parsed from the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFields {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
}

/// User correction sent with `CorrectTrack`. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPatch {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongFlags {
    pub is_corrected_by_user: bool,
    pub is_skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongMetadata {
    /// Love status as last confirmed by the love service.
    pub user_loved: Option<bool>,
    pub connector_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    key: String,
    parsed: TrackFields,
    user: TrackFields,
    pub unique_id: Option<String>,
    pub duration: Option<f64>,
    pub current_time: Option<f64>,
    pub is_playing: bool,
    pub flags: SongFlags,
    pub metadata: SongMetadata,
}

impl Song {
    /// Build a song from a non-empty page state.
    pub fn from_state(state: &PageState, connector_label: &str) -> Option<Self> {
        let key = state.track_key()?;
        Some(Self {
            key,
            parsed: TrackFields {
                artist: clean(&state.artist),
                track: clean(&state.track),
                album: clean(&state.album),
                album_artist: clean(&state.album_artist),
            },
            user: TrackFields::default(),
            unique_id: clean(&state.unique_id),
            duration: state.duration,
            current_time: state.current_time,
            is_playing: state.is_playing,
            flags: SongFlags::default(),
            metadata: SongMetadata {
                user_loved: None,
                connector_label: connector_label.to_string(),
            },
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn artist(&self) -> Option<&str> {
        self.user.artist.as_deref().or(self.parsed.artist.as_deref())
    }

    pub fn track(&self) -> Option<&str> {
        self.user.track.as_deref().or(self.parsed.track.as_deref())
    }

    pub fn album(&self) -> Option<&str> {
        self.user.album.as_deref().or(self.parsed.album.as_deref())
    }

    pub fn album_artist(&self) -> Option<&str> {
        self.user
            .album_artist
            .as_deref()
            .or(self.parsed.album_artist.as_deref())
    }

    /// A song can be scrobbled once both artist and track are known.
    pub fn is_valid(&self) -> bool {
        self.artist().is_some() && self.track().is_some()
    }

    /// Update playback position fields. Returns true when anything changed.
    pub fn update_playback(&mut self, state: &PageState) -> bool {
        let changed = self.is_playing != state.is_playing
            || self.duration != state.duration
            || self.current_time != state.current_time;
        self.is_playing = state.is_playing;
        self.duration = state.duration;
        self.current_time = state.current_time;
        changed
    }

    pub fn apply_patch(&mut self, patch: &SongPatch) {
        if let Some(v) = clean(&patch.artist) {
            self.user.artist = Some(v);
        }
        if let Some(v) = clean(&patch.track) {
            self.user.track = Some(v);
        }
        if let Some(v) = clean(&patch.album) {
            self.user.album = Some(v);
        }
        if let Some(v) = clean(&patch.album_artist) {
            self.user.album_artist = Some(v);
        }
        self.flags.is_corrected_by_user = self.user != TrackFields::default();
    }

    pub fn reset_user_data(&mut self) {
        self.user = TrackFields::default();
        self.flags.is_corrected_by_user = false;
    }

    pub fn set_loved(&mut self, loved: bool) {
        self.metadata.user_loved = Some(loved);
    }

    /// Snapshot safe to hand to other processes.
    pub fn info(&self) -> SongInfo {
        SongInfo {
            artist: self.artist().map(str::to_string),
            track: self.track().map(str::to_string),
            album: self.album().map(str::to_string),
            album_artist: self.album_artist().map(str::to_string),
            unique_id: self.unique_id.clone(),
            duration: self.duration,
            current_time: self.current_time,
            is_playing: self.is_playing,
            is_valid: self.is_valid(),
            parsed: self.parsed.clone(),
            flags: self.flags.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Externally shareable song snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongInfo {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub unique_id: Option<String>,
    pub duration: Option<f64>,
    pub current_time: Option<f64>,
    pub is_playing: bool,
    pub is_valid: bool,
    pub parsed: TrackFields,
    pub flags: SongFlags,
    pub metadata: SongMetadata,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(artist: &str, track: &str) -> PageState {
        PageState {
            artist: Some(artist.into()),
            track: Some(track.into()),
            is_playing: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_state_has_no_song() {
        let s = PageState {
            artist: Some("  ".into()),
            ..Default::default()
        };
        assert!(s.is_empty());
        assert!(Song::from_state(&s, "Label").is_none());
    }

    #[test]
    fn test_unique_id_wins_track_key() {
        let mut s = state("A", "B");
        let plain = s.track_key().unwrap();
        s.unique_id = Some("vid-1".into());
        assert_eq!(s.track_key().as_deref(), Some("vid-1"));
        assert_ne!(plain, "vid-1");
    }

    #[test]
    fn test_patch_overrides_display_fields() {
        let mut song = Song::from_state(&state("Artst", "Song"), "Label").unwrap();
        song.apply_patch(&SongPatch {
            artist: Some("Artist".into()),
            track: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(song.artist(), Some("Artist"));
        assert_eq!(song.track(), Some("Song"));
        assert!(song.flags.is_corrected_by_user);

        let info = song.info();
        assert_eq!(info.parsed.artist.as_deref(), Some("Artst"));
        assert_eq!(info.artist.as_deref(), Some("Artist"));

        song.reset_user_data();
        assert_eq!(song.artist(), Some("Artst"));
        assert!(!song.flags.is_corrected_by_user);
    }

    #[test]
    fn test_validity_needs_artist_and_track() {
        let s = PageState {
            track: Some("Only Track".into()),
            ..Default::default()
        };
        let mut song = Song::from_state(&s, "Label").unwrap();
        assert!(!song.is_valid());
        song.apply_patch(&SongPatch {
            artist: Some("Someone".into()),
            ..Default::default()
        });
        assert!(song.is_valid());
    }

    #[test]
    fn test_update_playback_reports_changes() {
        let mut song = Song::from_state(&state("A", "B"), "Label").unwrap();
        let mut next = state("A", "B");
        assert!(!song.update_playback(&next));
        next.is_playing = false;
        assert!(song.update_playback(&next));
        assert!(!song.is_playing);
    }
}

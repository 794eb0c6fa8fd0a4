//! Medien-Tracks und Streams
//!
//! `MediaTrack` ist ein leichtgewichtiges Handle auf eine Quelle (Kamera,
//! Mikrofon, Bildschirm). Klone teilen sich `enabled`/`stopped`, so dass ein
//! Toggle auf der Verbindung auch beim Aufrufer sichtbar ist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Art eines Medien-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Lokaler oder entfernter Medien-Track
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn neu(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn audio(label: impl Into<String>) -> Self {
        Self::neu(TrackKind::Audio, label)
    }

    pub fn video(label: impl Into<String>) -> Self {
        Self::neu(TrackKind::Video, label)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Kehrt `enabled` um und liefert den neuen Wert
    pub fn umschalten(&self) -> bool {
        !self.inner.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stoppt die Quelle endgueltig
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::trace!(track = %self.inner.id, kind = ?self.inner.kind, "Track gestoppt");
        }
    }

    /// Prueft ob beide Handles dieselbe Quelle meinen
    pub fn ptr_eq(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Lokale Medienquelle eines Anrufs (z.B. Kamera + Mikrofon)
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    tracks: Vec<MediaTrack>,
}

impl LocalStream {
    pub fn neu(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Erster Video-Track
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// Erster Audio-Track
    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    pub fn alle_stoppen(&self) {
        self.tracks.iter().for_each(MediaTrack::stop);
    }
}

/// Vom Gegenueber empfangener Stream
#[derive(Debug, Clone)]
pub struct RemoteStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl RemoteStream {
    pub fn neu(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }
}

/// Aktivierungszustand der lokalen Tracks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTracksEnabled {
    pub video: bool,
    pub audio: bool,
}

/// Momentaufnahme des Medienzustands einer Verbindung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSessionState {
    pub local_tracks_enabled: LocalTracksEnabled,
    pub remote_stream_attached: bool,
    pub screen_share_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klone_teilen_zustand() {
        let track = MediaTrack::video("kamera");
        let klon = track.clone();
        assert!(klon.is_enabled());
        assert!(!track.umschalten());
        assert!(!klon.is_enabled());
        assert!(track.umschalten());
        assert!(klon.is_enabled());
        klon.stop();
        assert!(track.is_stopped());
        assert!(track.ptr_eq(&klon));
    }

    #[test]
    fn stream_findet_erste_tracks() {
        let a = MediaTrack::audio("mikro");
        let v1 = MediaTrack::video("kamera");
        let v2 = MediaTrack::video("zweitkamera");
        let stream = LocalStream::neu(vec![a.clone(), v1.clone(), v2]);
        assert!(stream.video_track().unwrap().ptr_eq(&v1));
        assert!(stream.audio_track().unwrap().ptr_eq(&a));

        stream.alle_stoppen();
        assert!(stream.tracks().iter().all(MediaTrack::is_stopped));
    }

    #[test]
    fn medienzustand_camel_case() {
        let json = serde_json::to_value(MediaSessionState::default()).unwrap();
        assert!(json.get("localTracksEnabled").is_some());
        assert!(json.get("remoteStreamAttached").is_some());
        assert!(json.get("screenShareActive").is_some());
    }
}

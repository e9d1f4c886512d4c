//! # Update Reconciler
//!
//! Receiver state updates carry a `generationTime` stamp (unix
//! milliseconds at the receiver). Updates can arrive out of order across
//! reads and across reconnects, so each category keeps the stamp of the
//! last accepted update and silently discards anything not strictly newer.
//!
//! The reconciler is owned by the application and handed to each session
//! in turn, so accepted snapshots survive reconnects.

use crate::protocol::message::{PlaybackUpdateMessage, VolumeUpdateMessage};

/// Staleness filter plus last-accepted snapshots.
#[derive(Debug, Default)]
pub struct UpdateReconciler {
    playback_generation: u64,
    volume_generation: u64,
    playback: Option<PlaybackUpdateMessage>,
    volume: Option<VolumeUpdateMessage>,
}

impl UpdateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a playback update. Returns true when accepted; a stale
    /// update is discarded and the snapshot keeps its previous value.
    pub fn offer_playback(&mut self, update: PlaybackUpdateMessage) -> bool {
        if update.generation_time <= self.playback_generation {
            return false;
        }
        self.playback_generation = update.generation_time;
        self.playback = Some(update);
        true
    }

    /// Offer a volume update under the same strictly-newer rule.
    pub fn offer_volume(&mut self, update: VolumeUpdateMessage) -> bool {
        if update.generation_time <= self.volume_generation {
            return false;
        }
        self.volume_generation = update.generation_time;
        self.volume = Some(update);
        true
    }

    /// Last accepted playback state, if any update arrived yet.
    pub fn playback(&self) -> Option<&PlaybackUpdateMessage> {
        self.playback.as_ref()
    }

    /// Last accepted volume, if any update arrived yet.
    pub fn volume(&self) -> Option<&VolumeUpdateMessage> {
        self.volume.as_ref()
    }
}

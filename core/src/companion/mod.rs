// Companion bridge — the phone ↔ wearable side channel
//
// A second, lower-bandwidth duplex link with always exactly one counterpart.
// Uplink: periodic biometric readings from the wearable. Downlink: a
// simplified ping notification so the wearable can buzz the user when the
// phone isn't foregrounded. Completely independent of the peer mesh; a dead
// counterpart degrades to "use last known sample" and nothing more.

use crate::session::VitalsSample;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_BUFFER: usize = 64;

/// Uplink frame: one biometric reading.
/// `timestamp` is fractional unix seconds, the shape the wearable sends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricReading {
    pub heart_rate: f64,
    pub oxygen: f64,
    pub energy: f64,
    pub timestamp: f64,
}

impl BiometricReading {
    pub fn to_sample(self) -> VitalsSample {
        VitalsSample::new(self.heart_rate, self.oxygen, self.energy)
    }
}

/// Downlink frame: notifications relayed to the wearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CompanionNotify {
    Ping,
}

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("malformed companion frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("counterpart unreachable")]
    Unreachable,
}

pub fn encode_reading(reading: &BiometricReading) -> Result<Vec<u8>, CompanionError> {
    Ok(serde_json::to_vec(reading)?)
}

pub fn decode_reading(bytes: &[u8]) -> Result<BiometricReading, CompanionError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_notify(notify: &CompanionNotify) -> Result<Vec<u8>, CompanionError> {
    Ok(serde_json::to_vec(notify)?)
}

pub fn decode_notify(bytes: &[u8]) -> Result<CompanionNotify, CompanionError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Phone-side end of the bridge.
///
/// Owns the uplink pump (wearable frames → decoded samples) and the downlink
/// sender. Every decoded reading is cached, so the rest of the system can
/// fall back to the last known sample when the counterpart goes quiet.
#[derive(Clone)]
pub struct CompanionBridge {
    downlink_tx: mpsc::Sender<Vec<u8>>,
    last_reading: Arc<RwLock<Option<BiometricReading>>>,
}

impl CompanionBridge {
    /// Wire up the phone side: frames arriving on `uplink_rx` are decoded
    /// and forwarded as samples on `samples_tx`; malformed frames are
    /// dropped with a log line, and the pump ending (counterpart gone) is
    /// not an error anywhere.
    pub fn spawn(
        uplink_rx: mpsc::Receiver<Vec<u8>>,
        downlink_tx: mpsc::Sender<Vec<u8>>,
        samples_tx: mpsc::Sender<VitalsSample>,
    ) -> Self {
        let last_reading = Arc::new(RwLock::new(None));
        tokio::spawn(run_uplink_pump(uplink_rx, samples_tx, last_reading.clone()));

        Self {
            downlink_tx,
            last_reading,
        }
    }

    /// Relay a ping to the wearable so it can haptic the user. Never blocks
    /// the caller; failure here never travels further than a debug log.
    pub fn notify_ping(&self) {
        let Ok(frame) = encode_notify(&CompanionNotify::Ping) else {
            return;
        };
        if self.downlink_tx.try_send(frame).is_err() {
            debug!("Companion counterpart unreachable; ping relay dropped");
        }
    }

    /// Most recent reading, whether or not the counterpart is still alive
    pub fn last_reading(&self) -> Option<BiometricReading> {
        *self.last_reading.read()
    }
}

async fn run_uplink_pump(
    mut uplink_rx: mpsc::Receiver<Vec<u8>>,
    samples_tx: mpsc::Sender<VitalsSample>,
    last_reading: Arc<RwLock<Option<BiometricReading>>>,
) {
    while let Some(frame) = uplink_rx.recv().await {
        match decode_reading(&frame) {
            Ok(reading) => {
                *last_reading.write() = Some(reading);
                if samples_tx.send(reading.to_sample()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Dropping malformed companion frame: {}", e);
            }
        }
    }
    debug!("Companion uplink closed; last known sample stays available");
}

/// Wearable-side end, used by the CLI's simulated watch and by tests.
pub struct WearableLink {
    uplink_tx: mpsc::Sender<Vec<u8>>,
    downlink_rx: mpsc::Receiver<Vec<u8>>,
}

impl WearableLink {
    pub async fn send_reading(&self, reading: &BiometricReading) -> Result<(), CompanionError> {
        let frame = encode_reading(reading)?;
        self.uplink_tx
            .send(frame)
            .await
            .map_err(|_| CompanionError::Unreachable)
    }

    /// Next notification from the phone, if any arrived
    pub fn try_recv_notify(&mut self) -> Option<CompanionNotify> {
        loop {
            match self.downlink_rx.try_recv() {
                Ok(frame) => match decode_notify(&frame) {
                    Ok(notify) => return Some(notify),
                    Err(e) => {
                        warn!("Dropping malformed notify frame: {}", e);
                    }
                },
                Err(_) => return None,
            }
        }
    }

    pub async fn recv_notify(&mut self) -> Option<CompanionNotify> {
        loop {
            let frame = self.downlink_rx.recv().await?;
            match decode_notify(&frame) {
                Ok(notify) => return Some(notify),
                Err(e) => warn!("Dropping malformed notify frame: {}", e),
            }
        }
    }
}

/// Create both ends of the bridge plus the decoded-sample stream the node
/// feeds into the sync protocol.
pub fn pair() -> (CompanionBridge, WearableLink, mpsc::Receiver<VitalsSample>) {
    let (uplink_tx, uplink_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (downlink_tx, downlink_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (samples_tx, samples_rx) = mpsc::channel(CHANNEL_BUFFER);

    let bridge = CompanionBridge::spawn(uplink_rx, downlink_tx, samples_tx);
    let wearable = WearableLink {
        uplink_tx,
        downlink_rx,
    };
    (bridge, wearable, samples_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_wire_shape() {
        let reading = BiometricReading {
            heart_rate: 72.0,
            oxygen: 98.0,
            energy: 140.5,
            timestamp: 1_700_000_000.25,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&encode_reading(&reading).unwrap()).unwrap();

        assert_eq!(json["heartRate"], 72.0);
        assert_eq!(json["oxygen"], 98.0);
        assert_eq!(json["energy"], 140.5);
        assert_eq!(json["timestamp"], 1_700_000_000.25);
    }

    #[test]
    fn test_notify_wire_shape() {
        let bytes = encode_notify(&CompanionNotify::Ping).unwrap();
        assert_eq!(bytes, br#"{"type":"ping"}"#);
        assert_eq!(decode_notify(&bytes).unwrap(), CompanionNotify::Ping);
    }

    #[tokio::test]
    async fn test_uplink_decodes_and_caches() {
        let (bridge, wearable, mut samples_rx) = pair();

        let reading = BiometricReading {
            heart_rate: 80.0,
            oxygen: 97.0,
            energy: 130.0,
            timestamp: 1.0,
        };
        wearable.send_reading(&reading).await.unwrap();

        let sample = samples_rx.recv().await.unwrap();
        assert_eq!(sample.heart_rate, 80.0);
        assert_eq!(bridge.last_reading().unwrap(), reading);
    }

    #[tokio::test]
    async fn test_malformed_uplink_frame_dropped() {
        let (uplink_tx, uplink_rx) = mpsc::channel(8);
        let (downlink_tx, _downlink_rx) = mpsc::channel(8);
        let (samples_tx, mut samples_rx) = mpsc::channel(8);
        let bridge = CompanionBridge::spawn(uplink_rx, downlink_tx, samples_tx);

        uplink_tx.send(b"not json".to_vec()).await.unwrap();
        uplink_tx
            .send(
                encode_reading(&BiometricReading {
                    heart_rate: 70.0,
                    oxygen: 99.0,
                    energy: 120.0,
                    timestamp: 2.0,
                })
                .unwrap(),
            )
            .await
            .unwrap();

        // Garbage is skipped; the valid frame still lands
        let sample = samples_rx.recv().await.unwrap();
        assert_eq!(sample.heart_rate, 70.0);
        assert_eq!(bridge.last_reading().unwrap().heart_rate, 70.0);
    }

    #[tokio::test]
    async fn test_counterpart_gone_keeps_last_sample() {
        let (bridge, wearable, mut samples_rx) = pair();

        wearable
            .send_reading(&BiometricReading {
                heart_rate: 75.0,
                oxygen: 98.0,
                energy: 125.0,
                timestamp: 3.0,
            })
            .await
            .unwrap();
        let _ = samples_rx.recv().await;

        drop(wearable);
        // Relay attempt after the counterpart died: silent no-op
        bridge.notify_ping();

        assert_eq!(bridge.last_reading().unwrap().heart_rate, 75.0);
    }

    #[tokio::test]
    async fn test_ping_notify_reaches_wearable() {
        let (bridge, mut wearable, _samples_rx) = pair();

        bridge.notify_ping();

        assert_eq!(wearable.recv_notify().await, Some(CompanionNotify::Ping));
    }
}

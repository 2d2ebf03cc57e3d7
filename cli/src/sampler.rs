// Simulated wearable — stands in for the watch half of the companion bridge
//
// Emits a randomized biometric reading on a fixed cadence and buzzes
// (prints) when the phone relays a ping. Reading ranges match what a calm
// adult on their feet would show.

use colored::*;
use pulselink_core::companion::{BiometricReading, CompanionNotify, WearableLink};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub fn random_reading(rng: &mut StdRng) -> BiometricReading {
    BiometricReading {
        heart_rate: rng.gen_range(65.0..95.0),
        oxygen: rng.gen_range(96.0..100.0),
        energy: rng.gen_range(120.0..160.0),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64(),
    }
}

/// Drive the wearable end until the phone side goes away.
pub async fn run(mut wearable: WearableLink, interval: Duration) {
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let reading = random_reading(&mut rng);
                if wearable.send_reading(&reading).await.is_err() {
                    debug!("Phone side gone; wearable sampler stopping");
                    break;
                }
            }
            notify = wearable.recv_notify() => {
                match notify {
                    Some(CompanionNotify::Ping) => {
                        println!("{}", "  (wearable) bzzt — ping received".magenta());
                    }
                    None => break,
                }
            }
        }
    }
}

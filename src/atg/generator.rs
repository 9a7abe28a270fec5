//! Automatic Transaction Generator (spec.md §4.I): one task per enabled
//! connector driving randomized Authorize/StartTransaction/StopTransaction
//! cycles. The task never mutates `StationState` itself — every
//! state-changing step goes through a [`StationSignal`] processed by the
//! station's own message loop, preserving the "one logical thread of
//! control" contract (spec.md §5).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::protocol::correlator::{Correlator, RequestOptions};
use crate::protocol::dispatch::OcppBinding;
use crate::station::info::StationInfo;
use crate::station::runtime::StationSignal;
use crate::station::template::AtgPolicy;
use crate::tags::cache::{IdTagDistribution, TagCache};

/// Everything one connector's ATG loop needs, independent of the station's
/// own message loop.
pub struct AtgTask {
    pub connector_id: u32,
    pub policy: AtgPolicy,
    pub tag_cache: Arc<TagCache>,
    pub id_tags_file: Option<String>,
    pub id_tag_distribution: IdTagDistribution,
    pub info: Arc<StationInfo>,
    pub binding: Arc<dyn OcppBinding>,
    pub correlator: Arc<Correlator>,
    pub signal_tx: mpsc::UnboundedSender<StationSignal>,
}

impl AtgTask {
    /// Runs until `stop` is set or `stopOnConnectionFailure` trips while
    /// disconnected (spec.md §4.I step 6).
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let started_at = tokio::time::Instant::now();

        loop {
            if *stop.borrow() {
                // Parked rather than terminated: a later `StartATG`
                // control-plane command flips the same watch channel back
                // to `false` and this loop resumes (spec.md §4.K).
                if stop.changed().await.is_err() {
                    break;
                }
                continue;
            }
            if let Some(max_secs) = self.policy.stop_absolute_duration_secs {
                if started_at.elapsed().as_secs() >= max_secs {
                    info!(connector_id = self.connector_id, "ATG reached stopAbsoluteDuration");
                    break;
                }
            }

            let delay = rand_range(
                self.policy.min_delay_between_two_transactions_secs,
                self.policy.max_delay_between_two_transactions_secs,
            );
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                _ = stop.changed() => {}
            }
            if *stop.borrow() {
                continue;
            }
            if self.policy.stop_on_connection_failure && !self.correlator.is_connected() {
                info!(connector_id = self.connector_id, "ATG stopping: connection down and stopOnConnectionFailure set");
                break;
            }

            let Some(id_tag) = self.next_id_tag() else {
                debug!(connector_id = self.connector_id, "ATG has no id tag available this cycle");
                continue;
            };

            if self.policy.require_authorize && !self.authorize(&id_tag).await {
                debug!(connector_id = self.connector_id, id_tag, "ATG id tag not authorized, skipping cycle");
                continue;
            }

            let _ = self.signal_tx.send(StationSignal::ScheduledStartTransaction {
                connector_id: self.connector_id,
                id_tag: id_tag.clone(),
            });

            let duration = rand_range(self.policy.min_duration_secs, self.policy.max_duration_secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
                _ = stop.changed() => {}
            }

            let _ = self.signal_tx.send(StationSignal::ScheduledStopTransaction {
                connector_id: self.connector_id,
                reason: "Local".to_string(),
            });
        }

        info!(connector_id = self.connector_id, "ATG loop stopped");
    }

    fn next_id_tag(&self) -> Option<String> {
        let path = self.id_tags_file.as_deref()?;
        let tag = self.tag_cache.get_id_tag(
            path,
            self.id_tag_distribution,
            &self.info.hash_id,
            self.info.instance_index,
            self.connector_id,
        )?;
        if rand::thread_rng().gen_bool(self.policy.probability_of_non_authorized_tag.clamp(0.0, 1.0)) {
            Some(format!("INVALID-{tag}"))
        } else {
            Some(tag)
        }
    }

    async fn authorize(&self, id_tag: &str) -> bool {
        let (action, payload) = self.binding.authorize(id_tag);
        match self.correlator.send_request(action, payload, RequestOptions::default()).await {
            Ok(response) => response
                .get("idTagInfo")
                .and_then(|v| v.get("status"))
                .and_then(|v| v.as_str())
                .map(|s| s == "Accepted")
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

fn rand_range(min: u64, max: u64) -> u64 {
    if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_range_returns_min_when_max_not_greater() {
        assert_eq!(rand_range(10, 10), 10);
        assert_eq!(rand_range(10, 5), 10);
    }

    #[test]
    fn rand_range_stays_within_bounds() {
        for _ in 0..50 {
            let v = rand_range(2, 8);
            assert!((2..=8).contains(&v));
        }
    }
}

//! Relay home selection.

use crate::error::{OverlayError, Result};
use crate::human::HumanLog;
use overlay_discovery::{PathProber, RegionId, RelayMap};

/// Pick the relay region to call home.
///
/// Uses the prober's preference when it has one and falls back to
/// `default_region` with a warning otherwise.
///
/// # Errors
///
/// Returns [`OverlayError::RegionSelection`] if the measurement itself fails.
pub async fn pick_relay_home(
    prober: &dyn PathProber,
    map: &RelayMap,
    default_region: RegionId,
    default_name: &str,
    human: &dyn HumanLog,
) -> Result<RegionId> {
    let report = prober
        .probe(map)
        .await
        .map_err(OverlayError::RegionSelection)?;

    // 0 is not a region; the prober had no preference
    match report.preferred_region.filter(|&region| region != 0) {
        Some(region) => {
            let name = map
                .get(region)
                .map_or_else(|| region.to_string(), |r| r.region_name.clone());
            human.info(&format!("Picked relay region {name} as overlay home"));
            Ok(region)
        }
        None => {
            human.warn(&format!(
                "Failed to determine overlay relay region, defaulting to {default_name}."
            ));
            Ok(default_region)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use overlay_discovery::relay::{NetcheckReport, RelayError, RelayRegion};
    use parking_lot::Mutex;

    struct Fixed(std::result::Result<Option<RegionId>, RelayError>);

    #[async_trait]
    impl PathProber for Fixed {
        async fn probe(&self, _map: &RelayMap) -> std::result::Result<NetcheckReport, RelayError> {
            self.0.clone().map(|preferred_region| NetcheckReport {
                preferred_region,
                ..NetcheckReport::default()
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl HumanLog for Recorder {
        fn info(&self, line: &str) {
            self.0.lock().push(line.to_string());
        }
        fn warn(&self, line: &str) {
            self.0.lock().push(format!("WARN {line}"));
        }
    }

    fn map() -> RelayMap {
        [
            RelayRegion::new(1, "nyc", "New York City", "127.0.0.1:1"),
            RelayRegion::new(7, "sea", "Seattle", "127.0.0.1:7"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_preferred_region_used() {
        let log = Recorder::default();
        let region = pick_relay_home(&Fixed(Ok(Some(7))), &map(), 1, "NYC", &log)
            .await
            .unwrap();
        assert_eq!(region, 7);
        assert_eq!(
            log.0.lock().as_slice(),
            ["Picked relay region Seattle as overlay home"]
        );
    }

    #[tokio::test]
    async fn test_fallback_to_default_warns() {
        let log = Recorder::default();
        let region = pick_relay_home(&Fixed(Ok(None)), &map(), 1, "NYC", &log)
            .await
            .unwrap();
        assert_eq!(region, 1);
        assert_eq!(
            log.0.lock().as_slice(),
            ["WARN Failed to determine overlay relay region, defaulting to NYC."]
        );
    }

    #[tokio::test]
    async fn test_region_zero_means_no_preference() {
        let log = Recorder::default();
        let region = pick_relay_home(&Fixed(Ok(Some(0))), &map(), 1, "NYC", &log)
            .await
            .unwrap();
        assert_eq!(region, 1);
        assert_eq!(
            log.0.lock().as_slice(),
            ["WARN Failed to determine overlay relay region, defaulting to NYC."]
        );
    }

    #[tokio::test]
    async fn test_probe_failure_propagates() {
        let log = Recorder::default();
        let err = pick_relay_home(&Fixed(Err(RelayError::NoRegions)), &map(), 1, "NYC", &log)
            .await
            .unwrap_err();
        assert!(matches!(err, OverlayError::RegionSelection(RelayError::NoRegions)));
        assert!(log.0.lock().is_empty());
    }
}

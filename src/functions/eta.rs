use crate::config::TrackingConfig;
use crate::functions::route_graph::RouteGraph;
use crate::queries::_structs::LiveFields;
use crate::utils::geo_math::distance_km;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaStatus {
    ArrivingSoon,
    Catchable,
    Far,
    Passed,
    NoRoute,
    NoLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtaEstimate {
    pub status: EtaStatus,
    pub eta_minutes: Option<u32>,
    pub nearest_stop_index: Option<usize>,
    pub stops_between: Option<usize>,
    pub distance_km: Option<f64>,
}

impl EtaEstimate {
    fn without_eta(status: EtaStatus) -> Self {
        Self {
            status,
            eta_minutes: None,
            nearest_stop_index: None,
            stops_between: None,
            distance_km: None,
        }
    }
}

/// Distance/speed ETA model with a per-stop dwell allowance.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    pub avg_speed_kmh: f64,
    pub stop_delay_secs: f64,
    pub stale_after: Duration,
    pub smoothing_alpha: f64,
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

impl EtaEstimator {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            avg_speed_kmh: config.avg_speed_kmh,
            stop_delay_secs: config.stop_delay_secs,
            stale_after: Duration::seconds(config.stale_after_secs),
            smoothing_alpha: config.smoothing_alpha,
        }
    }

    /// A position is usable only when present and younger than the
    /// staleness threshold.
    pub fn usable_position(&self, live: &LiveFields, now: DateTime<Utc>) -> Option<(f64, f64)> {
        let position = live.position()?;
        match live.updated_at {
            Some(at) if now - at > self.stale_after => None,
            _ => Some(position),
        }
    }

    /// ETA of a bus to the stop at `pickup_idx` of `route`.
    pub fn estimate(
        &self,
        live: &LiveFields,
        route: &RouteGraph,
        pickup_idx: usize,
        now: DateTime<Utc>,
    ) -> EtaEstimate {
        let Some((lat, lng)) = self.usable_position(live, now) else {
            return EtaEstimate::without_eta(EtaStatus::NoLocation);
        };
        let Some(pickup) = route.stops.get(pickup_idx) else {
            return EtaEstimate::without_eta(EtaStatus::NoRoute);
        };
        let Some(nearest) = route.nearest_stop(lat, lng) else {
            return EtaEstimate::without_eta(EtaStatus::NoRoute);
        };

        if nearest.index > pickup_idx {
            return EtaEstimate {
                nearest_stop_index: Some(nearest.index),
                ..EtaEstimate::without_eta(EtaStatus::Passed)
            };
        }

        let total_km = if nearest.index == pickup_idx {
            distance_km(lat, lng, pickup.stop.latitude, pickup.stop.longitude)
        } else {
            let path = route.shortest_path(nearest.stop_id, pickup.stop.id);
            if !path.is_reachable() {
                return EtaEstimate {
                    nearest_stop_index: Some(nearest.index),
                    ..EtaEstimate::without_eta(EtaStatus::NoRoute)
                };
            }
            nearest.distance_km + path.distance_m / 1000.0
        };

        let stops_between = pickup_idx.saturating_sub(nearest.index);
        let minutes = self.travel_minutes(total_km, stops_between);
        let (status, eta_minutes) = classify(eta_minutes_from(minutes));

        EtaEstimate {
            status,
            eta_minutes,
            nearest_stop_index: Some(nearest.index),
            stops_between: Some(stops_between),
            distance_km: Some(total_km),
        }
    }

    /// Driving time at the average speed plus one dwell per stop in between.
    pub fn travel_minutes(&self, distance_km: f64, stops_between: usize) -> f64 {
        let travel = distance_km / self.avg_speed_kmh * 60.0;
        let dwell = stops_between as f64 * self.stop_delay_secs / 60.0;
        travel + dwell
    }

    /// Seconds to reach a point `distance_km` away with no stops, at least 1.
    pub fn seconds_to(&self, distance_km: f64) -> i32 {
        let secs = (distance_km / self.avg_speed_kmh * 3600.0) as i32;
        secs.max(1)
    }

    pub fn smooth(&self, raw: f64, previous: Option<f64>) -> f64 {
        smooth(raw, previous, self.smoothing_alpha)
    }
}

/// Whole minutes, rounded, never below one.
pub fn eta_minutes_from(minutes: f64) -> u32 {
    minutes.round().max(1.0) as u32
}

/// Buckets an ETA. Anything beyond half an hour is not shown.
pub fn classify(eta: u32) -> (EtaStatus, Option<u32>) {
    match eta {
        0..=2 => (EtaStatus::ArrivingSoon, Some(eta)),
        3..=10 => (EtaStatus::Catchable, Some(eta)),
        11..=30 => (EtaStatus::Far, Some(eta)),
        _ => (EtaStatus::NoRoute, None),
    }
}

/// Exponential moving average.
pub fn smooth(raw: f64, previous: Option<f64>, alpha: f64) -> f64 {
    match previous {
        Some(prev) => alpha * raw + (1.0 - alpha) * prev,
        None => raw,
    }
}

/// Ascending, `None` last.
pub fn cmp_missing_last<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

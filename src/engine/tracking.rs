use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::deals::get_deal;
use crate::engine::feed::publish;
use crate::error::AppError;
use crate::geo::path_length_km;
use crate::models::change::{Change, ChangeKind};
use crate::models::deal::Deal;
use crate::models::identity::Identity;
use crate::models::tracking::{LocationPing, PingSource, Position, TrackSummary};
use crate::state::AppState;

/// Handle of a running heartbeat task. Dropping it closes the position
/// channel, which ends the task.
pub struct TrackingSession {
    pub deal_id: Uuid,
    pub carrier_id: Uuid,
    pub started_at: DateTime<Utc>,
    position_tx: watch::Sender<Option<Position>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub deal_id: Uuid,
    pub carrier_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub heartbeat_secs: u64,
}

fn carrier_deal(state: &AppState, identity: Identity, deal_id: Uuid) -> Result<Deal, AppError> {
    let deal = get_deal(state, deal_id)?;
    if identity.user_id != deal.carrier_id {
        return Err(AppError::Forbidden(format!(
            "only the carrier of deal {deal_id} can report its position"
        )));
    }
    Ok(deal)
}

fn write_ping(
    state: &AppState,
    deal_id: Uuid,
    position: Position,
    source: PingSource,
) -> Result<LocationPing, AppError> {
    let deal = get_deal(state, deal_id)?;
    if !deal.status.is_trackable() {
        return Err(AppError::Conflict(format!(
            "deal {deal_id} is {:?}; tracking is closed",
            deal.status
        )));
    }

    let ping = LocationPing {
        id: Uuid::new_v4(),
        deal_id,
        carrier_id: deal.carrier_id,
        point: position.point,
        speed_kmh: position.speed_kmh,
        heading: position.heading,
        source,
        recorded_at: Utc::now(),
    };

    state.locations.insert(ping.id, ping.clone());
    state
        .metrics
        .location_pings_total
        .with_label_values(&[source.as_label()])
        .inc();
    publish(state, ChangeKind::Insert, Change::Location(ping.clone()));

    Ok(ping)
}

/// Records one device report. Every report is stored; if a session is
/// running it also becomes the position repeated by the heartbeat.
pub fn report_position(
    state: &AppState,
    identity: Identity,
    deal_id: Uuid,
    position: Position,
) -> Result<LocationPing, AppError> {
    if !position.point.is_valid() {
        return Err(AppError::BadRequest(
            "lat must be within [-90, 90] and lng within [-180, 180]".to_string(),
        ));
    }

    carrier_deal(state, identity, deal_id)?;
    let ping = write_ping(state, deal_id, position, PingSource::Device)?;

    if let Some(session) = state.tracking_sessions.get(&deal_id) {
        session.position_tx.send_replace(Some(position));
    }

    Ok(ping)
}

/// Starts the heartbeat task of a deal. Holding the order lock keeps a
/// concurrent delivery or cancellation from ending the deal between the
/// status check and the session insert.
pub async fn start_tracking(
    state: &Arc<AppState>,
    identity: Identity,
    deal_id: Uuid,
) -> Result<SessionInfo, AppError> {
    let order_id = get_deal(state, deal_id)?.order_id;

    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let deal = carrier_deal(state, identity, deal_id)?;
    if !deal.status.is_trackable() {
        return Err(AppError::Conflict(format!(
            "deal {deal_id} is {:?}; tracking is closed",
            deal.status
        )));
    }

    let heartbeat_secs = state.config.gps_heartbeat_secs;

    let (info, position_rx) = match state.tracking_sessions.entry(deal_id) {
        Entry::Occupied(existing) => {
            let existing = existing.get();
            return Ok(SessionInfo {
                deal_id,
                carrier_id: existing.carrier_id,
                started_at: existing.started_at,
                heartbeat_secs,
            });
        }
        Entry::Vacant(slot) => {
            let (position_tx, position_rx) = watch::channel(None);
            let session = slot.insert(TrackingSession {
                deal_id,
                carrier_id: deal.carrier_id,
                started_at: Utc::now(),
                position_tx,
            });
            let info = SessionInfo {
                deal_id,
                carrier_id: session.carrier_id,
                started_at: session.started_at,
                heartbeat_secs,
            };
            (info, position_rx)
        }
    };

    state
        .metrics
        .tracking_sessions_active
        .set(state.tracking_sessions.len() as i64);

    tokio::spawn(run_session(
        state.clone(),
        deal_id,
        Duration::from_secs(heartbeat_secs),
        position_rx,
    ));

    info!(%deal_id, carrier_id = %deal.carrier_id, heartbeat_secs, "tracking started");
    Ok(info)
}

/// Returns whether a session was running.
pub fn stop_tracking(state: &AppState, deal_id: Uuid) -> bool {
    let stopped = state.tracking_sessions.remove(&deal_id).is_some();
    if stopped {
        state
            .metrics
            .tracking_sessions_active
            .set(state.tracking_sessions.len() as i64);
        info!(%deal_id, "tracking stopped");
    }
    stopped
}

async fn run_session(
    state: Arc<AppState>,
    deal_id: Uuid,
    heartbeat: Duration,
    mut position_rx: watch::Receiver<Option<Position>>,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = position_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let last = *position_rx.borrow();
                let Some(position) = last else {
                    continue;
                };
                if let Err(err) = write_ping(&state, deal_id, position, PingSource::Heartbeat) {
                    warn!(%deal_id, error = %err, "heartbeat rejected; ending session");
                    stop_tracking(&state, deal_id);
                    break;
                }
            }
        }
    }
}

/// Ping history of a deal for its two parties.
pub fn track_summary(
    state: &AppState,
    identity: Identity,
    deal_id: Uuid,
    recent_limit: usize,
) -> Result<TrackSummary, AppError> {
    let deal = get_deal(state, deal_id)?;
    if !identity.is_admin() && !deal.is_participant(identity.user_id) {
        return Err(AppError::Forbidden(format!(
            "caller is not a party to deal {deal_id}"
        )));
    }

    let mut pings: Vec<LocationPing> = state
        .locations
        .iter()
        .filter(|entry| entry.value().deal_id == deal_id)
        .map(|entry| entry.value().clone())
        .collect();
    pings.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));

    let distance_km = path_length_km(pings.iter().map(|ping| &ping.point));
    let recent = pings
        .iter()
        .rev()
        .take(recent_limit)
        .cloned()
        .collect();

    Ok(TrackSummary {
        deal_id,
        pings: pings.len(),
        distance_km,
        last: pings.last().cloned(),
        recent,
        session_active: state.tracking_sessions.contains_key(&deal_id),
    })
}

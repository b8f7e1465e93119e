//! Keyed incident store with per-key merge serialization

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SentinelError};
use crate::models::{
    AnomalyVerdict, DedupKey, Incident, IncidentEvent, IncidentEventKind, IncidentStatus,
    IncidentSummary, RootCauseReport, RootCauseState, StabilityClass, StabilityReport,
};

/// Evidence kept on one incident across merges
const MAX_INCIDENT_EVIDENCE: usize = 100;

/// Notification channel capacity; slow subscribers lose oldest events
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root-cause call failures tolerated before marking unavailable
    pub max_agent_retries: u32,
    /// Consecutive stable reports required before auto-resolution
    pub resolve_stable_cycles: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_agent_retries: 5,
            resolve_stable_cycles: 3,
        }
    }
}

/// What `ingest_verdict` did with a detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Verdict had detected=false; nothing recorded
    Ignored,
    Created(Uuid),
    Merged(Uuid),
}

/// Single writer of incident records.
///
/// Concurrent detections for the same dedup key serialize through the keyed
/// map's entry lock; unrelated services never contend.
pub struct IncidentManager {
    incidents: DashMap<Uuid, Incident>,
    open_by_key: DashMap<DedupKey, Uuid>,
    /// Root-cause call failures per incident
    agent_attempts: DashMap<Uuid, u32>,
    /// Consecutive stable reports per incident
    stable_streaks: DashMap<Uuid, u32>,
    events: broadcast::Sender<IncidentEvent>,
    config: ManagerConfig,
}

impl IncidentManager {
    pub fn new(config: ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            incidents: DashMap::new(),
            open_by_key: DashMap::new(),
            agent_attempts: DashMap::new(),
            stable_streaks: DashMap::new(),
            events,
            config,
        }
    }

    /// Subscribe to creation and transition notifications
    pub fn subscribe(&self) -> broadcast::Receiver<IncidentEvent> {
        self.events.subscribe()
    }

    /// Fold a detection into the incident store.
    ///
    /// An active incident with the same dedup key absorbs the verdict
    /// (severity raised to the max of old and new, evidence appended);
    /// otherwise a fresh incident opens.
    pub fn ingest_verdict(&self, service: &str, verdict: &AnomalyVerdict) -> IngestOutcome {
        if !verdict.detected {
            return IngestOutcome::Ignored;
        }

        let key = DedupKey::new(verdict.category, service);

        // The entry guard holds the shard lock for this key, so two cycles
        // detecting the same key cannot both create an incident.
        let mut entry = self.open_by_key.entry(key.clone()).or_insert(Uuid::nil());
        let existing = *entry.value();

        if !existing.is_nil() {
            if let Some(mut incident) = self.incidents.get_mut(&existing) {
                if incident.status.is_active() {
                    merge_verdict(&mut incident, verdict);
                    let event = event_for(&incident, IncidentEventKind::Merged {
                        detection_count: incident.detection_count,
                    });
                    info!(
                        incident_id = %incident.id,
                        detection_count = incident.detection_count,
                        severity = %incident.severity,
                        "detection merged into open incident"
                    );
                    drop(incident);
                    let _ = self.events.send(event);
                    return IngestOutcome::Merged(existing);
                }
            }
        }

        let incident = new_incident(service, verdict);
        let id = incident.id;
        *entry.value_mut() = id;
        let event = event_for(&incident, IncidentEventKind::Created);
        info!(
            incident_id = %id,
            service = %service,
            category = %verdict.category,
            severity = %verdict.severity,
            "incident opened"
        );
        self.incidents.insert(id, incident);
        drop(entry);
        let _ = self.events.send(event);
        IngestOutcome::Created(id)
    }

    /// Operator acknowledges an open incident
    pub fn acknowledge(&self, id: Uuid, assignee: Option<String>) -> Result<Incident> {
        self.transition(id, IncidentStatus::Acknowledged, |incident| {
            if assignee.is_some() {
                incident.assignee = assignee.clone();
            }
        })
    }

    /// Operator resolves an acknowledged or investigating incident
    pub fn resolve(&self, id: Uuid, note: Option<String>) -> Result<Incident> {
        self.transition(id, IncidentStatus::Resolved, |incident| {
            incident.resolution_note = note.clone();
            incident.resolved_at = Some(Utc::now());
        })
    }

    /// Close a resolved incident, or dismiss an open one as a false positive
    pub fn close(&self, id: Uuid, note: Option<String>) -> Result<Incident> {
        self.transition(id, IncidentStatus::Closed, |incident| {
            if incident.status == IncidentStatus::Open {
                incident.resolution_note =
                    Some(note.clone().unwrap_or_else(|| "dismissed".to_string()));
            } else if note.is_some() {
                incident.resolution_note = note.clone();
            }
        })
    }

    /// Attach a root-cause report, advancing to investigating if not past it
    pub fn attach_root_cause(&self, id: Uuid, report: RootCauseReport) -> Result<Incident> {
        let mut incident = self
            .incidents
            .get_mut(&id)
            .ok_or(SentinelError::IncidentNotFound(id))?;

        incident.root_cause = RootCauseState::Available { report };
        incident.updated_at = Utc::now();
        self.agent_attempts.remove(&id);

        if matches!(
            incident.status,
            IncidentStatus::Open | IncidentStatus::Acknowledged
        ) {
            let from = incident.status;
            incident.status = IncidentStatus::Investigating;
            let event = event_for(&incident, IncidentEventKind::Transitioned { from });
            let snapshot = incident.clone();
            drop(incident);
            let _ = self.events.send(event);
            return Ok(snapshot);
        }

        Ok(incident.clone())
    }

    /// Record a failed root-cause call.
    ///
    /// The incident stays in its current state; after the retry budget is
    /// spent the root-cause field flips to unavailable and the state machine
    /// proceeds without it.
    pub fn record_root_cause_failure(&self, id: Uuid, error: &str) -> Result<RootCauseState> {
        let mut incident = self
            .incidents
            .get_mut(&id)
            .ok_or(SentinelError::IncidentNotFound(id))?;

        let mut attempts = self.agent_attempts.entry(id).or_insert(0);
        *attempts += 1;
        let spent = *attempts;
        drop(attempts);

        if spent >= self.config.max_agent_retries {
            warn!(
                incident_id = %id,
                attempts = spent,
                "root-cause retries exhausted, proceeding without a report"
            );
            incident.root_cause = RootCauseState::Unavailable {
                attempts: spent,
                last_error: error.to_string(),
            };
        } else {
            warn!(incident_id = %id, attempts = spent, error = %error, "root-cause call failed");
        }
        incident.updated_at = Utc::now();
        Ok(incident.root_cause.clone())
    }

    /// True while the incident still wants a root-cause report
    pub fn needs_root_cause(&self, id: Uuid) -> bool {
        self.incidents
            .get(&id)
            .map(|i| i.status.is_active() && matches!(i.root_cause, RootCauseState::Pending))
            .unwrap_or(false)
    }

    /// Ids of incidents for one service that still fold in detections
    pub fn active_for_service(&self, service: &str) -> Vec<Uuid> {
        self.incidents
            .iter()
            .filter(|i| i.service == service && i.status.is_active())
            .map(|i| i.id)
            .collect()
    }

    /// Feed a stability report for a service into resolution bookkeeping.
    ///
    /// Sustained stable classification while an incident is acknowledged or
    /// investigating resolves it; anything else resets the streak.
    pub fn observe_stability(&self, service: &str, report: &StabilityReport) -> Vec<Incident> {
        let mut resolved = Vec::new();
        for id in self.active_for_service(service) {
            if report.classification != StabilityClass::Stable {
                self.stable_streaks.remove(&id);
                continue;
            }

            let mut streak = self.stable_streaks.entry(id).or_insert(0);
            *streak += 1;
            let sustained = *streak >= self.config.resolve_stable_cycles;
            drop(streak);

            if !sustained {
                continue;
            }

            let eligible = self
                .incidents
                .get(&id)
                .map(|i| {
                    matches!(
                        i.status,
                        IncidentStatus::Acknowledged | IncidentStatus::Investigating
                    )
                })
                .unwrap_or(false);
            if !eligible {
                continue;
            }

            match self.transition(id, IncidentStatus::Resolved, |incident| {
                incident.resolution_note =
                    Some("auto-resolved after sustained stability".to_string());
                incident.resolved_at = Some(Utc::now());
            }) {
                Ok(incident) => {
                    info!(incident_id = %id, service = %service, "incident auto-resolved");
                    resolved.push(incident);
                }
                Err(err) => warn!(incident_id = %id, error = %err, "auto-resolve skipped"),
            }
        }
        resolved
    }

    pub fn get(&self, id: Uuid) -> Result<Incident> {
        self.incidents
            .get(&id)
            .map(|i| i.clone())
            .ok_or(SentinelError::IncidentNotFound(id))
    }

    /// Incidents newest first, optionally filtered by status
    pub fn list(&self, status: Option<IncidentStatus>, limit: usize) -> Vec<Incident> {
        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
            .map(|i| i.clone())
            .collect();
        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        incidents.truncate(limit);
        incidents
    }

    /// Compact view for dashboards and reports
    pub fn summary(&self, id: Uuid) -> Result<IncidentSummary> {
        let incident = self.get(id)?;
        let until = incident.resolved_at.unwrap_or_else(Utc::now);
        let duration_minutes =
            (until - incident.created_at).num_seconds().max(0) as f64 / 60.0;
        let probable_cause = match &incident.root_cause {
            RootCauseState::Available { report } => Some(report.probable_cause.clone()),
            _ => None,
        };
        Ok(IncidentSummary {
            id: incident.id,
            title: incident.title,
            service: incident.service,
            category: incident.category,
            severity: incident.severity,
            status: incident.status,
            created_at: incident.created_at,
            duration_minutes,
            detection_count: incident.detection_count,
            probable_cause,
            resolution_note: incident.resolution_note,
        })
    }

    /// Count of incidents still folding in new detections
    pub fn active_count(&self) -> usize {
        self.incidents.iter().filter(|i| i.status.is_active()).count()
    }

    fn transition<F>(&self, id: Uuid, to: IncidentStatus, apply: F) -> Result<Incident>
    where
        F: Fn(&mut Incident),
    {
        let (snapshot, from) = {
            let mut incident = self
                .incidents
                .get_mut(&id)
                .ok_or(SentinelError::IncidentNotFound(id))?;

            let from = incident.status;
            if !from.can_transition(to) {
                return Err(SentinelError::InvalidTransition { from, to });
            }

            incident.status = to;
            apply(&mut incident);
            incident.updated_at = Utc::now();
            (incident.clone(), from)
        };

        // Lock order is key-then-incident everywhere: the incident guard must
        // be released before touching the key index, or this path deadlocks
        // against a concurrent merge. The status flip above already happened
        // under the guard, so a merge racing this window sees an inactive
        // incident and opens a fresh one; remove_if re-checks the id in case
        // the slot was already re-pointed.
        if !to.is_active() {
            self.open_by_key
                .remove_if(&snapshot.dedup_key(), |_, v| *v == id);
            self.agent_attempts.remove(&id);
            self.stable_streaks.remove(&id);
        }

        let event = event_for(&snapshot, IncidentEventKind::Transitioned { from });
        info!(incident_id = %id, from = %from, to = %to, "incident transitioned");
        let _ = self.events.send(event);
        Ok(snapshot)
    }
}

impl Default for IncidentManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

fn new_incident(service: &str, verdict: &AnomalyVerdict) -> Incident {
    let now = Utc::now();
    Incident {
        id: Uuid::new_v4(),
        title: verdict.title.clone(),
        description: verdict.description.clone(),
        category: verdict.category,
        severity: verdict.severity,
        status: IncidentStatus::Open,
        service: service.to_string(),
        created_at: now,
        updated_at: now,
        assignee: None,
        root_cause: RootCauseState::Pending,
        resolution_note: None,
        evidence: verdict.evidence.clone(),
        detection_count: 1,
        resolved_at: None,
    }
}

fn merge_verdict(incident: &mut Incident, verdict: &AnomalyVerdict) {
    incident.severity = incident.severity.max(verdict.severity);
    incident.detection_count += 1;
    incident.updated_at = Utc::now();
    incident.description = verdict.description.clone();

    let room = MAX_INCIDENT_EVIDENCE.saturating_sub(incident.evidence.len());
    incident
        .evidence
        .extend(verdict.evidence.iter().take(room).cloned());
}

fn event_for(incident: &Incident, kind: IncidentEventKind) -> IncidentEvent {
    IncidentEvent {
        incident_id: incident.id,
        service: incident.service.clone(),
        title: incident.title.clone(),
        status: incident.status,
        severity: incident.severity,
        event: kind,
        at: Utc::now(),
    }
}

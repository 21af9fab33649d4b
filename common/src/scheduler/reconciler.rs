// Live schedule and registry reconciliation

use crate::errors::ScheduleError;
use crate::models::{ExecutionContext, TaskRecord};
use crate::schedule::{next_run_at, parse_task_interval};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// In-memory projection of a registered task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub record: TaskRecord,
    pub next_run_at: DateTime<Utc>,
}

/// What a reconciliation changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub added: Vec<i64>,
    /// Existing entries whose record fields changed
    pub updated: Vec<i64>,
    pub removed: Vec<i64>,
    /// Records left unscheduled because their interval is unusable
    pub invalid: Vec<(i64, ScheduleError)>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.invalid.is_empty()
    }
}

/// Tasks that became due during one evaluation
#[derive(Debug, Default)]
pub struct DueTasks {
    /// Snapshots to dispatch, one per due entry
    pub ready: Vec<ExecutionContext>,
    /// Entries removed because their interval could no longer be parsed
    pub dropped: Vec<(i64, ScheduleError)>,
}

/// Live schedule keyed by task ID
#[derive(Debug, Default)]
pub struct LiveSchedule {
    entries: HashMap<i64, ScheduleEntry>,
}

impl LiveSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ScheduleEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.values()
    }

    /// Merge the registry's current records into the schedule
    ///
    /// New records are scheduled at `now + interval`. Known records have their
    /// fields replaced and keep their pending `next_run_at`. Entries with no
    /// current record are removed. The merged map replaces the old one in a
    /// single assignment.
    pub fn reconcile(&mut self, records: &[TaskRecord], now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut merged = HashMap::with_capacity(records.len());

        for record in records {
            match self.entries.get(&record.id) {
                Some(existing) => {
                    if existing.record != *record {
                        report.updated.push(record.id);
                    }
                    merged.insert(
                        record.id,
                        ScheduleEntry {
                            record: record.clone(),
                            next_run_at: existing.next_run_at,
                        },
                    );
                }
                None => {
                    let first_run = parse_task_interval(&record.every)
                        .and_then(|interval| next_run_at(now, interval));
                    match first_run {
                        Ok(next_run_at) => {
                            report.added.push(record.id);
                            merged.insert(
                                record.id,
                                ScheduleEntry {
                                    record: record.clone(),
                                    next_run_at,
                                },
                            );
                        }
                        Err(e) => report.invalid.push((record.id, e)),
                    }
                }
            }
        }

        report.removed = self
            .entries
            .keys()
            .filter(|id| !merged.contains_key(id))
            .copied()
            .collect();
        report.removed.sort_unstable();

        self.entries = merged;
        report
    }

    /// Collect entries due at `now` and advance each by its own interval
    ///
    /// An entry is due when `next_run_at <= now`. Each due entry yields
    /// exactly one snapshot no matter how many intervals have elapsed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> DueTasks {
        let mut due = DueTasks::default();

        for (id, entry) in self.entries.iter_mut() {
            if entry.next_run_at > now {
                continue;
            }

            due.ready.push(ExecutionContext::from(&entry.record));

            match parse_task_interval(&entry.record.every).and_then(|i| next_run_at(now, i)) {
                Ok(next) => entry.next_run_at = next,
                Err(e) => due.dropped.push((*id, e)),
            }
        }

        for (id, _) in &due.dropped {
            self.entries.remove(id);
        }

        due.ready.sort_by_key(|ctx| ctx.task_id);
        due
    }
}

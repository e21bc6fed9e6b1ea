//! Diff engine — merging, time filtering and fingerprinting of group timelines.
//!
//! Fingerprints are taken over the raw per-period statuses so that change
//! detection is independent of how the timeline is later merged or cut for
//! display.

use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::{GroupSchedule, Period, Status};
use sha2::{Digest, Sha256};

/// A period paired with its status; after [`join`] it may span several slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub period: Period,
    pub status: Status,
}

impl Slot {
    pub fn new(from: &str, to: &str, status: Status) -> Self {
        Self {
            period: Period::new(from, to),
            status,
        }
    }
}

/// Zip periods with statuses. Both sequences must have the same length.
pub fn pair(periods: &[Period], statuses: &[Status]) -> Result<Vec<Slot>> {
    if periods.len() != statuses.len() {
        return Err(WatchError::InvalidSchedule(format!(
            "{} periods but {} statuses",
            periods.len(),
            statuses.len()
        )));
    }
    Ok(periods
        .iter()
        .zip(statuses)
        .map(|(period, status)| Slot {
            period: period.clone(),
            status: *status,
        })
        .collect())
}

/// Merge adjacent slots with equal status, keeping order.
pub fn join(slots: &[Slot]) -> Vec<Slot> {
    let mut merged: Vec<Slot> = Vec::with_capacity(slots.len());
    for slot in slots {
        match merged.last_mut() {
            Some(last) if last.status == slot.status => {
                last.period.to = slot.period.to.clone();
            }
            _ => merged.push(slot.clone()),
        }
    }
    merged
}

/// Drop every slot that has ended by `reference` ("HH:MM"), i.e. `to <= reference`.
///
/// Zero-padded "HH:MM" strings order the same way as the times they denote,
/// "24:00" included.
pub fn cut_by_time(reference: &str, slots: &[Slot]) -> Vec<Slot> {
    slots
        .iter()
        .filter(|slot| slot.period.to.as_str() > reference)
        .cloned()
        .collect()
}

/// What is left of a group's day after `reference`, merged for display.
pub fn remaining(periods: &[Period], group: &GroupSchedule, reference: &str) -> Result<Vec<Slot>> {
    let slots = pair(periods, &group.statuses)?;
    Ok(join(&cut_by_time(reference, &slots)))
}

/// Stable digest of the raw status sequence.
pub fn fingerprint(group: &GroupSchedule) -> String {
    let mut hasher = Sha256::new();
    for status in &group.statuses {
        hasher.update(status.as_str().as_bytes());
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
}

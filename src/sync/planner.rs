//! Minimal edit script between the current remote order and the target order.
//!
//! The longest common subsequence of track ids is kept in place as a fixed
//! backbone. Everything outside it is either removed, moved or added:
//!
//! - a remote entry outside the LCS whose id is still wanted somewhere else in
//!   the target becomes a `Move`,
//! - remaining remote entries outside the LCS become `Remove`s, issued in
//!   descending position order,
//! - remaining target entries become `Add`s, issued in ascending target order.
//!
//! Repeated ids are matched positionally, so a playlist may contain the same
//! track more than once. Plans are ordered removes, then moves, then adds, and
//! every position refers to the playlist as left by the previous operation.

use std::collections::{HashMap, VecDeque};

use crate::ports::provider::is_unaddressable;
use crate::sync::resolver::SyncTarget;
use crate::sync::types::{RemoteTrackRef, SongId, SyncOperation};

/// How a target entry gets into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Part of the LCS backbone, paired with this remote index.
    Anchor(usize),
    /// Paired with this remote index, which has to move.
    Moved(usize),
    Added,
}

#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    /// Index in the original remote order; stable identity while simulating.
    key: usize,
    track_id: &'a str,
}

/// LCS lengths of `a` against every prefix of `b`, in one row of memory.
fn lcs_row(a: &[&str], b: &[&str]) -> Vec<u32> {
    let mut prev = vec![0u32; b.len() + 1];
    let mut row = vec![0u32; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            row[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(row[j])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev
}

/// Hirschberg's divide and conquer: splits `a` in half and `b` where the two
/// halves' LCS lengths add up to the best total, so memory stays linear in
/// the playlist length. Pairs are pushed in ascending order.
fn hirschberg(a: &[&str], b: &[&str], a_offset: usize, b_offset: usize, pairs: &mut Vec<(usize, usize)>) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    if a.len() == 1 {
        if let Some(j) = b.iter().position(|y| *y == a[0]) {
            pairs.push((a_offset, b_offset + j));
        }
        return;
    }

    let mid = a.len() / 2;
    let upper = lcs_row(&a[..mid], b);
    let lower_a: Vec<&str> = a[mid..].iter().rev().copied().collect();
    let lower_b: Vec<&str> = b.iter().rev().copied().collect();
    let lower = lcs_row(&lower_a, &lower_b);

    // upper[k] + LCS(a[mid..], b[k..]); the first best split wins.
    let split = (0..=b.len())
        .max_by_key(|&k| (upper[k] + lower[b.len() - k], std::cmp::Reverse(k)))
        .unwrap_or_default();

    hirschberg(&a[..mid], &b[..split], a_offset, b_offset, pairs);
    hirschberg(&a[mid..], &b[split..], a_offset + mid, b_offset + split, pairs);
}

/// Index pairs `(remote, target)` of a longest common subsequence, ascending.
fn lcs_pairs(current: &[&str], target: &[&str]) -> Vec<(usize, usize)> {
    let mut prefix = 0;
    while prefix < current.len() && prefix < target.len() && current[prefix] == target[prefix] {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < current.len() - prefix
        && suffix < target.len() - prefix
        && current[current.len() - 1 - suffix] == target[target.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mid_current = &current[prefix..current.len() - suffix];
    let mid_target = &target[prefix..target.len() - suffix];
    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|k| (k, k)).collect();
    hirschberg(mid_current, mid_target, prefix, prefix, &mut pairs);

    pairs.extend((0..suffix).rev().map(|k| {
        (current.len() - 1 - k, target.len() - 1 - k)
    }));

    pairs
}

/// Computes the operations that turn `current` into `target`.
///
/// `target` pairs each wanted track id with the local song it stands for, so
/// outcomes can be attributed per song.
pub fn plan_operations(current: &[&str], target: &[(&str, Option<SongId>)]) -> Vec<SyncOperation> {
    let target_ids: Vec<&str> = target.iter().map(|(id, _)| *id).collect();

    let mut in_lcs = vec![false; current.len()];
    let mut placements = vec![Placement::Added; target.len()];
    for (i, j) in lcs_pairs(current, &target_ids) {
        in_lcs[i] = true;
        placements[j] = Placement::Anchor(i);
    }

    // Leftover remote entries, per id, in ascending position.
    let mut leftovers: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (i, id) in current.iter().enumerate() {
        if !in_lcs[i] {
            leftovers.entry(id).or_default().push_back(i);
        }
    }

    for (j, id) in target_ids.iter().enumerate() {
        if placements[j] != Placement::Added {
            continue;
        }
        if let Some(i) = leftovers.get_mut(id).and_then(VecDeque::pop_front) {
            placements[j] = Placement::Moved(i);
        }
    }

    let mut removals: Vec<usize> = leftovers.into_values().flatten().collect();
    removals.sort_unstable_by(|a, b| b.cmp(a));

    let mut operations = Vec::new();

    // Removing from the highest index down leaves lower indexes valid.
    for &i in &removals {
        operations.push(SyncOperation::Remove {
            track_id: current[i].to_string(),
            position: i,
        });
    }

    let mut removed = vec![false; current.len()];
    for &i in &removals {
        removed[i] = true;
    }
    let mut working: Vec<Slot> = current
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed[*i])
        .map(|(key, track_id)| Slot { key, track_id })
        .collect();

    // Place each moved entry directly after its target predecessor. Anchors
    // never move, and a later placement never separates an earlier entry from
    // its predecessor, so the final order matches the target.
    let mut predecessor: Option<usize> = None;
    for (j, placement) in placements.iter().enumerate() {
        let key = match *placement {
            Placement::Added => continue,
            Placement::Anchor(key) => key,
            Placement::Moved(key) => {
                let position_of = |key: usize, working: &[Slot]| {
                    working.iter().position(|slot| slot.key == key)
                };
                let from = position_of(key, &working).unwrap_or_default();
                let to = match predecessor.and_then(|p| position_of(p, &working)) {
                    None => 0,
                    Some(pred) if from > pred => pred + 1,
                    Some(pred) => pred,
                };

                if from != to {
                    let slot = working.remove(from);
                    working.insert(to, slot);
                    operations.push(SyncOperation::Move {
                        track_id: slot.track_id.to_string(),
                        from,
                        to,
                        song_id: target[j].1,
                    });
                }
                key
            }
        };
        predecessor = Some(key);
    }

    // Every earlier target entry is in place by now, so each add lands at its
    // target index.
    for (j, placement) in placements.iter().enumerate() {
        if *placement == Placement::Added {
            operations.push(SyncOperation::Add {
                track_id: target[j].0.to_string(),
                position: j,
                song_id: target[j].1,
            });
        }
    }

    operations
}

/// Keeps remote entries that cannot be removed by id in the target.
///
/// Each one is pinned right after the wanted track that precedes it remotely
/// (matching repeated ids by occurrence), or at the front when nothing wanted
/// precedes it. Running this again on the converged playlist pins every entry
/// to the same spot.
fn pin_unaddressable<'a>(
    current: &[&'a str],
    target: &[(&'a str, Option<SongId>)],
) -> Vec<(&'a str, Option<SongId>)> {
    if !current.iter().any(|id| is_unaddressable(id)) {
        return target.to_vec();
    }

    let mut occurrences: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, (id, _)) in target.iter().enumerate() {
        occurrences.entry(*id).or_default().push(j);
    }

    // pinned[0] is the front, pinned[j + 1] follows target entry j.
    let mut pinned: Vec<Vec<&'a str>> = vec![Vec::new(); target.len() + 1];
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut slot = 0;
    for id in current {
        if is_unaddressable(id) {
            pinned[slot].push(*id);
            continue;
        }
        let occurrence = seen.entry(*id).or_default();
        if let Some(indexes) = occurrences.get(id) {
            slot = indexes[(*occurrence).min(indexes.len() - 1)] + 1;
        }
        *occurrence += 1;
    }

    let mut pinned = pinned.into_iter();
    let mut out: Vec<(&str, Option<SongId>)> = pinned
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|id| (id, None))
        .collect();
    for (entry, after) in target.iter().zip(pinned) {
        out.push(*entry);
        out.extend(after.into_iter().map(|id| (id, None)));
    }
    out
}

/// Plans the edit script from the remote snapshot to the resolved targets.
pub fn plan(remote: &[RemoteTrackRef], targets: &[SyncTarget]) -> Vec<SyncOperation> {
    let current: Vec<&str> = remote.iter().map(|t| t.track_id.as_str()).collect();
    let target: Vec<(&str, Option<SongId>)> = targets
        .iter()
        .map(|t| (t.track_id.as_str(), Some(t.song.id)))
        .collect();
    plan_operations(&current, &pin_unaddressable(&current, &target))
}

/// Applies operations to an in-memory list with provider semantics.
///
/// Returns `None` when an operation refers to a position that does not exist.
pub fn simulate(current: &[&str], operations: &[SyncOperation]) -> Option<Vec<String>> {
    let mut list: Vec<String> = current.iter().map(|id| id.to_string()).collect();
    for operation in operations {
        match operation {
            SyncOperation::Add {
                track_id, position, ..
            } => {
                if *position > list.len() {
                    return None;
                }
                list.insert(*position, track_id.clone());
            }
            SyncOperation::Remove { track_id, position } => {
                if list.get(*position) != Some(track_id) {
                    return None;
                }
                list.remove(*position);
            }
            SyncOperation::Move {
                track_id, from, to, ..
            } => {
                if list.get(*from) != Some(track_id) || *to >= list.len() {
                    return None;
                }
                let item = list.remove(*from);
                list.insert(*to, item);
            }
        }
    }
    Some(list)
}

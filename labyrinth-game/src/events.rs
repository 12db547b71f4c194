//! Event selection for a floor
use crate::data::{Event, EventKind};
use crate::effects::{EffectKey, EffectState};
use crate::meta::MetaState;
use rand::Rng;

const BASE_WEIGHT: u32 = 1;
const CHAIN_BOOST_WEIGHT: u32 = 2;

/// Whether `event` may be drawn from the open pool of `floor`.
fn eligible(event: &Event, floor: u32, used_ids: &[String], meta: &MetaState) -> bool {
    event.appears_on(floor)
        && event.kind != EventKind::Boss
        && !event.chain_only
        && !used_ids.iter().any(|id| *id == event.id)
        && event
            .requires
            .as_ref()
            .is_none_or(|predicate| predicate.holds(meta))
}

/// Draw the next open event for `floor`.
///
/// Used, chain-only, boss and meta-gated events are excluded. With the chain boost
/// effect, events that can start a chain carry double weight. Returns `None` when the
/// floor has nothing left to offer.
pub fn pick_event<'a, R: Rng>(
    events: &'a [Event],
    floor: u32,
    used_ids: &[String],
    meta: &MetaState,
    effects: &EffectState,
    rng: &mut R,
) -> Option<&'a Event> {
    let candidates: Vec<&Event> = events
        .iter()
        .filter(|event| eligible(event, floor, used_ids, meta))
        .collect();

    if candidates.is_empty() {
        log::warn!("no events left for floor {floor}");
        return None;
    }

    let boosted = effects.flag(EffectKey::ChainBoost);
    let weights: Vec<(usize, u32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, event)| {
            let weight = if boosted && event.can_chain() {
                CHAIN_BOOST_WEIGHT
            } else {
                BASE_WEIGHT
            };
            (idx, weight)
        })
        .collect();

    let (idx, roll) = choose_weighted(&weights, rng)?;
    let picked = candidates.get(idx).copied()?;
    log::debug!(
        "floor {floor}: picked {} (roll {roll}, {} candidates, chain boost {boosted})",
        picked.id,
        candidates.len()
    );
    Some(picked)
}

/// Look up the continuation of a chain flag.
#[must_use]
pub fn find_chain_event<'a>(events: &'a [Event], id: &str) -> Option<&'a Event> {
    events.iter().find(|event| event.id == id)
}

fn choose_weighted<R: Rng>(weights: &[(usize, u32)], rng: &mut R) -> Option<(usize, u32)> {
    let total_weight: u32 = weights.iter().map(|(_, weight)| *weight).sum();
    if total_weight == 0 {
        return None;
    }

    let roll = rng.gen_range(0..total_weight);
    let mut current = 0;
    for (idx, weight) in weights {
        current += *weight;
        if roll < current {
            return Some((*idx, roll));
        }
    }

    weights.first().map(|(idx, _)| (*idx, roll))
}

//! The consolidation algorithm: role totals + resolution priority rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult, ItemId, LocationId, Quantity};
use stocktake_counting::{CountRole, CountSession};

/// Per-item totals of each consolidation-relevant role at one slot.
///
/// Counting roles sum across that role's sessions. FinalAdjustment comes from
/// the most recently started adjustment session only: an approved ERP recount
/// supersedes an earlier auto-saved adjustment, it does not sum with it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTotals {
    pub first: Option<Quantity>,
    pub second: Option<Quantity>,
    pub recount: Option<Quantity>,
    pub final_adjustment: Option<Quantity>,
}

/// How an item's quantity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Rule 1: an authoritative final adjustment exists.
    FinalAdjustment,
    /// Rule 2: the recount reproduced the first or second count.
    RecountConfirmed,
    /// Rule 3: first and second count agree.
    CountsAgree,
    /// Rule 4: no agreement; the quantity is only a candidate.
    Conflict,
}

/// Resolution of one item at one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResolution {
    pub item_id: ItemId,
    /// Resolved quantity, or the best candidate when in conflict. Never zero
    /// just because a role is missing: a positive observation is kept.
    pub quantity: Quantity,
    pub source: ResolutionSource,
    pub totals: RoleTotals,
}

impl ItemResolution {
    pub fn is_resolved(&self) -> bool {
        self.source != ResolutionSource::Conflict
    }
}

/// Derived, read-on-demand view of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConsolidation {
    pub slot_id: LocationId,
    pub items: BTreeMap<ItemId, ItemResolution>,
}

impl SlotConsolidation {
    /// True iff every item resolved under rules 1-3.
    pub fn is_fully_resolved(&self) -> bool {
        self.items.values().all(ItemResolution::is_resolved)
    }

    pub fn conflict_items(&self) -> Vec<ItemId> {
        self.items
            .values()
            .filter(|r| !r.is_resolved())
            .map(|r| r.item_id)
            .collect()
    }

    /// Quantities of the items resolved under rules 1-3.
    pub fn resolved_quantities(&self) -> BTreeMap<ItemId, Quantity> {
        self.items
            .values()
            .filter(|r| r.is_resolved())
            .map(|r| (r.item_id, r.quantity))
            .collect()
    }
}

/// An explicit human decision for one conflict item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    First,
    Second,
    Recount,
    Typed(Quantity),
}

/// Consolidate the live records of one slot.
///
/// Sessions of other slots are ignored; ErpRecount sessions never enter the
/// resolution (their quantities reach consolidation only through the approved
/// FinalAdjustment injection).
pub fn consolidate_slot(slot_id: LocationId, sessions: &[CountSession]) -> SlotConsolidation {
    let mut first: BTreeMap<ItemId, Quantity> = BTreeMap::new();
    let mut second: BTreeMap<ItemId, Quantity> = BTreeMap::new();
    let mut recount: BTreeMap<ItemId, Quantity> = BTreeMap::new();

    for session in sessions {
        if session.slot_id() != Some(slot_id) {
            continue;
        }
        let target = match session.role() {
            CountRole::FirstCount => &mut first,
            CountRole::SecondCount => &mut second,
            CountRole::Recount => &mut recount,
            CountRole::FinalAdjustment | CountRole::ErpRecount => continue,
        };
        for (item_id, quantity) in session.totals_by_item() {
            *target.entry(item_id).or_insert(Quantity::ZERO) += quantity;
        }
    }

    // Latest adjustment wins.
    let final_adjustment: BTreeMap<ItemId, Quantity> = sessions
        .iter()
        .filter(|s| s.slot_id() == Some(slot_id) && s.role() == CountRole::FinalAdjustment)
        .max_by_key(|s| s.started_at())
        .map(|s| s.totals_by_item())
        .unwrap_or_default();

    let mut item_ids: Vec<ItemId> = Vec::new();
    for map in [&first, &second, &recount, &final_adjustment] {
        item_ids.extend(map.keys().copied());
    }
    item_ids.sort();
    item_ids.dedup();

    let items = item_ids
        .into_iter()
        .map(|item_id| {
            let totals = RoleTotals {
                first: first.get(&item_id).copied(),
                second: second.get(&item_id).copied(),
                recount: recount.get(&item_id).copied(),
                final_adjustment: final_adjustment.get(&item_id).copied(),
            };
            let (quantity, source) = resolve(totals);
            (
                item_id,
                ItemResolution {
                    item_id,
                    quantity,
                    source,
                    totals,
                },
            )
        })
        .collect();

    SlotConsolidation { slot_id, items }
}

/// Resolution priority rules for one item.
fn resolve(totals: RoleTotals) -> (Quantity, ResolutionSource) {
    // Rule 1: a final adjustment is authoritative and terminal.
    if let Some(adjustment) = totals.final_adjustment {
        return (adjustment, ResolutionSource::FinalAdjustment);
    }

    // Rule 2: a recount that reproduces the first or second count confirms it.
    // Detection is numeric equality, as in the observed legacy behavior.
    if let Some(recount) = totals.recount {
        if totals.first == Some(recount) || totals.second == Some(recount) {
            return (recount, ResolutionSource::RecountConfirmed);
        }
    }

    // Rule 3: both counting passes agree.
    if let (Some(first), Some(second)) = (totals.first, totals.second) {
        if first == second {
            return (first, ResolutionSource::CountsAgree);
        }
    }

    // Rule 4: conflict. The candidate prefers the second pass, then the first,
    // then the largest quantity observed at all.
    let candidate = totals
        .second
        .or(totals.first)
        .or(totals.recount)
        .unwrap_or(Quantity::ZERO);
    (candidate, ResolutionSource::Conflict)
}

/// Turn a consolidation plus explicit conflict choices into the quantities of
/// a final adjustment.
///
/// Every conflict item must carry a choice; otherwise the save is rejected
/// with `IncompleteResolution` listing the offending items.
pub fn apply_conflict_choices(
    consolidation: &SlotConsolidation,
    choices: &BTreeMap<ItemId, ConflictChoice>,
) -> DomainResult<BTreeMap<ItemId, Quantity>> {
    let missing: Vec<String> = consolidation
        .items
        .values()
        .filter(|r| !r.is_resolved() && !choices.contains_key(&r.item_id))
        .map(|r| r.item_id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DomainError::incomplete_resolution(missing.join(", ")));
    }

    let mut adjusted = BTreeMap::new();
    for resolution in consolidation.items.values() {
        let quantity = if resolution.is_resolved() {
            resolution.quantity
        } else {
            let choice = choices[&resolution.item_id];
            pick(resolution, choice)?
        };
        adjusted.insert(resolution.item_id, quantity);
    }
    Ok(adjusted)
}

fn pick(resolution: &ItemResolution, choice: ConflictChoice) -> DomainResult<Quantity> {
    let from_role = |qty: Option<Quantity>, role: &str| {
        qty.ok_or_else(|| {
            DomainError::validation(format!(
                "no {role} count recorded for item {}",
                resolution.item_id
            ))
        })
    };
    match choice {
        ConflictChoice::First => from_role(resolution.totals.first, "first"),
        ConflictChoice::Second => from_role(resolution.totals.second, "second"),
        ConflictChoice::Recount => from_role(resolution.totals.recount, "recount"),
        ConflictChoice::Typed(quantity) => {
            if quantity.is_negative() {
                return Err(DomainError::validation(
                    "typed quantity cannot be negative",
                ));
            }
            Ok(quantity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use stocktake_core::{
        Aggregate, CompanyId, OperatorId, ScanRecordId, SessionId,
    };
    use stocktake_counting::{CountingCommand, OpenSession, RecordScan};

    fn session_with(
        slot_id: LocationId,
        role: CountRole,
        started_at: DateTime<Utc>,
        scans: &[(ItemId, i64)],
    ) -> CountSession {
        let session_id = SessionId::new();
        let mut session = CountSession::empty(session_id);
        let events = session
            .handle(&CountingCommand::OpenSession(OpenSession {
                session_id,
                company_id: CompanyId::new(),
                slot_id,
                role,
                operator: OperatorId::new(),
                occurred_at: started_at,
            }))
            .unwrap();
        session.apply(&events[0]);

        for (item_id, qty) in scans {
            let events = session
                .handle(&CountingCommand::RecordScan(RecordScan {
                    session_id,
                    record_id: ScanRecordId::new(),
                    item_id: *item_id,
                    quantity: Quantity::from_units(*qty),
                    occurred_at: started_at,
                }))
                .unwrap();
            session.apply(&events[0]);
        }
        session
    }

    fn consolidate(slot: LocationId, sessions: Vec<CountSession>) -> SlotConsolidation {
        consolidate_slot(slot, &sessions)
    }

    #[test]
    fn agreeing_counts_resolve() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 5)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 5)]),
            ],
        );

        let resolution = &result.items[&item];
        assert_eq!(resolution.quantity, Quantity::from_units(5));
        assert_eq!(resolution.source, ResolutionSource::CountsAgree);
        assert!(result.is_fully_resolved());
    }

    #[test]
    fn recount_confirming_the_first_count_resolves() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 5)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 7)]),
                session_with(slot, CountRole::Recount, now, &[(item, 5)]),
            ],
        );

        let resolution = &result.items[&item];
        assert_eq!(resolution.quantity, Quantity::from_units(5));
        assert_eq!(resolution.source, ResolutionSource::RecountConfirmed);
        assert!(result.is_fully_resolved());
    }

    #[test]
    fn recount_confirming_neither_count_is_a_conflict() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 5)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 7)]),
                session_with(slot, CountRole::Recount, now, &[(item, 6)]),
            ],
        );

        let resolution = &result.items[&item];
        assert_eq!(resolution.source, ResolutionSource::Conflict);
        // Candidate prefers the second pass.
        assert_eq!(resolution.quantity, Quantity::from_units(7));
        assert!(!result.is_fully_resolved());
        assert_eq!(result.conflict_items(), vec![item]);
    }

    #[test]
    fn final_adjustment_overrides_everything() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 5)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 7)]),
                session_with(slot, CountRole::FinalAdjustment, now, &[(item, 9)]),
            ],
        );

        let resolution = &result.items[&item];
        assert_eq!(resolution.quantity, Quantity::from_units(9));
        assert_eq!(resolution.source, ResolutionSource::FinalAdjustment);
        assert!(result.is_fully_resolved());
    }

    #[test]
    fn latest_final_adjustment_wins() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FinalAdjustment, now, &[(item, 9)]),
                session_with(
                    slot,
                    CountRole::FinalAdjustment,
                    now + Duration::seconds(10),
                    &[(item, 4)],
                ),
            ],
        );

        assert_eq!(result.items[&item].quantity, Quantity::from_units(4));
    }

    #[test]
    fn lone_first_count_keeps_its_value_but_stays_unresolved() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let result = consolidate(
            slot,
            vec![session_with(slot, CountRole::FirstCount, Utc::now(), &[(item, 3)])],
        );

        let resolution = &result.items[&item];
        // Never falls back to zero.
        assert_eq!(resolution.quantity, Quantity::from_units(3));
        assert_eq!(resolution.source, ResolutionSource::Conflict);
        assert!(!result.is_fully_resolved());
    }

    #[test]
    fn counting_roles_sum_across_sessions() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 2)]),
                session_with(slot, CountRole::FirstCount, now, &[(item, 3)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 5)]),
            ],
        );

        let resolution = &result.items[&item];
        assert_eq!(resolution.quantity, Quantity::from_units(5));
        assert_eq!(resolution.source, ResolutionSource::CountsAgree);
    }

    #[test]
    fn sessions_of_other_slots_are_ignored() {
        let slot = LocationId::new();
        let other_slot = LocationId::new();
        let item = ItemId::new();
        let now = Utc::now();
        let result = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(item, 5)]),
                session_with(slot, CountRole::SecondCount, now, &[(item, 5)]),
                session_with(other_slot, CountRole::SecondCount, now, &[(item, 9)]),
            ],
        );

        assert_eq!(result.items[&item].quantity, Quantity::from_units(5));
    }

    #[test]
    fn conflict_choices_produce_adjustment_quantities() {
        let slot = LocationId::new();
        let conflicted = ItemId::new();
        let agreed = ItemId::new();
        let now = Utc::now();
        let consolidation = consolidate(
            slot,
            vec![
                session_with(slot, CountRole::FirstCount, now, &[(conflicted, 5), (agreed, 2)]),
                session_with(slot, CountRole::SecondCount, now, &[(conflicted, 7), (agreed, 2)]),
            ],
        );

        // Without a choice for the conflict item the save is rejected.
        let err = apply_conflict_choices(&consolidation, &BTreeMap::new()).unwrap_err();
        match err {
            DomainError::IncompleteResolution(msg) => {
                assert!(msg.contains(&conflicted.to_string()));
            }
            other => panic!("expected IncompleteResolution, got {other:?}"),
        }

        let mut choices = BTreeMap::new();
        choices.insert(conflicted, ConflictChoice::First);
        let adjusted = apply_conflict_choices(&consolidation, &choices).unwrap();
        assert_eq!(adjusted[&conflicted], Quantity::from_units(5));
        assert_eq!(adjusted[&agreed], Quantity::from_units(2));

        choices.insert(conflicted, ConflictChoice::Typed(Quantity::from_units(6)));
        let adjusted = apply_conflict_choices(&consolidation, &choices).unwrap();
        assert_eq!(adjusted[&conflicted], Quantity::from_units(6));
    }

    #[test]
    fn choice_referencing_an_absent_role_is_rejected() {
        let slot = LocationId::new();
        let item = ItemId::new();
        let consolidation = consolidate(
            slot,
            vec![session_with(slot, CountRole::FirstCount, Utc::now(), &[(item, 3)])],
        );

        let mut choices = BTreeMap::new();
        choices.insert(item, ConflictChoice::Recount);
        let err = apply_conflict_choices(&consolidation, &choices).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: consolidation is independent of session order.
            #[test]
            fn session_order_does_not_matter(
                first in 0i64..100,
                second in 0i64..100,
                recount in proptest::option::of(0i64..100),
            ) {
                let slot = LocationId::new();
                let item = ItemId::new();
                let now = Utc::now();

                let mut sessions = vec![
                    session_with(slot, CountRole::FirstCount, now, &[(item, first)]),
                    session_with(slot, CountRole::SecondCount, now, &[(item, second)]),
                ];
                if let Some(recount) = recount {
                    sessions.push(session_with(slot, CountRole::Recount, now, &[(item, recount)]));
                }

                let forward = consolidate_slot(slot, &sessions);
                sessions.reverse();
                let backward = consolidate_slot(slot, &sessions);

                prop_assert_eq!(forward, backward);
            }

            /// Property: the resolved quantity is always one of the observed
            /// totals (a positive observation is never invented or discarded).
            #[test]
            fn resolution_picks_an_observed_total(
                first in 0i64..100,
                second in 0i64..100,
            ) {
                let slot = LocationId::new();
                let item = ItemId::new();
                let now = Utc::now();
                let sessions = vec![
                    session_with(slot, CountRole::FirstCount, now, &[(item, first)]),
                    session_with(slot, CountRole::SecondCount, now, &[(item, second)]),
                ];

                let result = consolidate_slot(slot, &sessions);
                let quantity = result.items[&item].quantity;
                prop_assert!(
                    quantity == Quantity::from_units(first)
                        || quantity == Quantity::from_units(second)
                );
            }
        }
    }
}

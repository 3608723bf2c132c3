#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use proptest::sample::Index;
use strata_core::model::OrgUnit;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn unit(id: &str, parent: Option<&str>, name: &str) -> OrgUnit {
    OrgUnit {
        id: id.to_string(),
        name: name.to_string(),
        short_code: None,
        description: None,
        parent_id: parent.map(str::to_string),
        tenant_scope: None,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

pub fn unit_id(i: usize) -> String {
    format!("pl-{i:08}")
}

/// A well-formed unit list: every parent reference points at an earlier
/// unit (so the list is acyclic), then the list is shuffled so the builder
/// sees children before their parents.
pub fn arb_units(max: usize) -> impl Strategy<Value = Vec<OrgUnit>> {
    prop::collection::vec(any::<Index>(), 1..max)
        .prop_map(|picks| {
            picks
                .iter()
                .enumerate()
                .map(|(i, pick)| {
                    let choice = pick.index(i + 1);
                    let parent = (choice < i).then(|| unit_id(choice));
                    unit(&unit_id(i), parent.as_deref(), &format!("Pôle {i}"))
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|units| Just(units).prop_shuffle())
}

/// Units plus a selector for picking one of them.
pub fn arb_units_and_pick(max: usize) -> impl Strategy<Value = (Vec<OrgUnit>, Index)> {
    (arb_units(max), any::<Index>())
}

/// Ids of units nobody names as parent.
pub fn leaf_ids(units: &[OrgUnit]) -> Vec<String> {
    units
        .iter()
        .filter(|u| !units.iter().any(|o| o.parent_id.as_deref() == Some(u.id.as_str())))
        .map(|u| u.id.clone())
        .collect()
}

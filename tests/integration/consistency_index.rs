#![allow(missing_docs)]

use std::cell::Cell;

use penumbra::check::{
    matching, CheckOptions, CollectingSink, Finding, FindingKind, ScanCoordinator, ScanSummary,
    Severity,
};
use penumbra::index::{IndexDescriptor, MemIndex, MemIndexes, SchemaDescriptor};
use penumbra::storage::MemRecordStore;
use penumbra::types::{
    EntityKind, EntityRef, IndexId, LabelId, PenumbraError, PropId, PropValue, ValueKind,
};
use rustc_hash::FxHashSet;

const PERSON: LabelId = LabelId(1);
const KNOWS: LabelId = LabelId(7);
const NAME: PropId = PropId(2);
const AGE: PropId = PropId(3);

fn run(store: &MemRecordStore, indexes: &MemIndexes) -> (ScanSummary, Vec<Finding>) {
    let options = CheckOptions::default().threads(2).shard_size(2);
    let sink = CollectingSink::new();
    let summary = ScanCoordinator::new(store, Some(indexes), &options).run(&sink);
    (summary, sink.into_sorted())
}

fn people(names: &[&str]) -> MemRecordStore {
    let mut store = MemRecordStore::new();
    for (age, name) in names.iter().enumerate() {
        store.create_node(
            &[PERSON],
            &[(NAME, PropValue::from(*name)), (AGE, PropValue::Int(age as i64))],
        );
    }
    store
}

fn name_index(unique: bool) -> IndexDescriptor {
    let schema = SchemaDescriptor::node(PERSON, &[NAME]);
    if unique {
        IndexDescriptor::unique(1, schema)
    } else {
        IndexDescriptor::non_unique(1, schema)
    }
}

fn populated(store: &MemRecordStore, descriptors: Vec<IndexDescriptor>) -> MemIndexes {
    let mut indexes = MemIndexes::new();
    for descriptor in descriptors {
        indexes.create(descriptor).expect("create index");
    }
    indexes.populate(store).expect("populate");
    indexes
}

fn name_entries(indexes: &MemIndexes) -> &MemIndex {
    indexes.index(IndexId(1)).expect("name index")
}

#[test]
fn consistent_store_reports_nothing() {
    let store = people(&["ada", "grace", "linus"]);
    let indexes = populated(&store, vec![name_index(true)]);
    let (summary, findings) = run(&store, &indexes);
    assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    assert_eq!(summary.nodes_checked, 3);
    assert_eq!(summary.index_checks, 3);
    assert!(summary.errors.is_empty());
    assert_eq!(indexes.open_readers(), 0);
}

#[test]
fn missing_unique_entry_is_not_indexed() {
    let store = people(&["ada", "grace", "linus"]);
    let indexes = populated(&store, vec![name_index(true)]);
    assert!(name_entries(&indexes).remove(1, &[PropValue::from("grace")]));

    let (_, findings) = run(&store, &indexes);
    assert_eq!(findings.len(), 1, "{findings:?}");
    let finding = &findings[0];
    assert_eq!(finding.kind, FindingKind::NotIndexed);
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.entity, EntityRef::node(1));
    assert_eq!(finding.index.as_ref().map(IndexDescriptor::id), Some(IndexId(1)));
    assert_eq!(finding.values, Some(vec![PropValue::from("grace")]));
    assert_eq!(finding.observed_count, Some(0));
}

#[test]
fn duplicate_unique_entry_is_indexed_multiple_times() {
    let store = people(&["ada", "grace"]);
    let indexes = populated(&store, vec![name_index(true)]);
    name_entries(&indexes).insert(0, vec![PropValue::from("ada")]);

    let (_, findings) = run(&store, &indexes);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::IndexedMultipleTimes);
    assert_eq!(findings[0].entity, EntityRef::node(0));
    assert_eq!(findings[0].observed_count, Some(2));
}

#[test]
fn unique_entry_for_other_entity_is_critical() {
    let store = people(&["ada", "grace", "linus"]);
    let indexes = populated(&store, vec![name_index(true)]);
    name_entries(&indexes).insert(2, vec![PropValue::from("ada")]);

    let (_, findings) = run(&store, &indexes);
    assert_eq!(findings.len(), 1, "{findings:?}");
    let finding = &findings[0];
    assert_eq!(finding.kind, FindingKind::UniqueIndexNotUnique);
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.entity, EntityRef::node(0));
    assert_eq!(finding.other_entity, Some(2));
}

#[test]
fn stolen_unique_entry_reports_both_sides() {
    let store = people(&["ada", "grace"]);
    let indexes = populated(&store, vec![name_index(true)]);
    let index = name_entries(&indexes);
    assert!(index.remove(0, &[PropValue::from("ada")]));
    index.insert(1, vec![PropValue::from("ada")]);

    let (_, findings) = run(&store, &indexes);
    let kinds: Vec<_> = findings.iter().map(|f| (f.kind, f.entity.id)).collect();
    assert_eq!(
        kinds,
        vec![
            (FindingKind::NotIndexed, 0),
            (FindingKind::UniqueIndexNotUnique, 0),
        ]
    );
    assert_eq!(findings[1].other_entity, Some(1));
}

#[test]
fn non_unique_index_counts_only_the_entity() {
    let store = people(&["ada", "ada", "grace"]);
    let indexes = populated(&store, vec![name_index(false)]);
    let (_, findings) = run(&store, &indexes);
    assert!(findings.is_empty(), "shared values are legal: {findings:?}");

    let index = name_entries(&indexes);
    assert!(index.remove(1, &[PropValue::from("ada")]));
    index.insert(2, vec![PropValue::from("grace")]);
    let (summary, findings) = run(&store, &indexes);
    let kinds: Vec<_> = findings.iter().map(|f| (f.kind, f.entity.id)).collect();
    assert_eq!(
        kinds,
        vec![
            (FindingKind::NotIndexed, 1),
            (FindingKind::IndexedMultipleTimes, 2),
        ]
    );
    assert_eq!(findings[1].observed_count, Some(2));
    assert_eq!(summary.index_checks, 3);
}

#[test]
fn entity_without_all_schema_keys_is_not_checked() {
    let mut store = MemRecordStore::new();
    store.create_node(&[PERSON], &[(AGE, PropValue::Int(40))]);
    let composite = IndexDescriptor::unique(1, SchemaDescriptor::node(PERSON, &[NAME, AGE]));
    let indexes = populated(&store, vec![composite]);
    assert!(name_entries(&indexes).entries().is_empty());

    let (summary, findings) = run(&store, &indexes);
    assert!(findings.is_empty());
    assert_eq!(summary.index_checks, 0);
}

#[test]
fn composite_index_uses_schema_key_order() {
    let mut store = MemRecordStore::new();
    store.create_node(
        &[PERSON],
        &[(AGE, PropValue::Int(36)), (NAME, PropValue::from("ada"))],
    );
    let composite = IndexDescriptor::unique(1, SchemaDescriptor::node(PERSON, &[NAME, AGE]));
    let indexes = populated(&store, vec![composite]);
    assert_eq!(
        name_entries(&indexes).entries(),
        vec![(0, vec![PropValue::from("ada"), PropValue::Int(36)])]
    );
    let (_, findings) = run(&store, &indexes);
    assert!(findings.is_empty());
}

#[test]
fn unsupported_query_is_an_entity_error_not_a_finding() {
    let mut store = MemRecordStore::new();
    store.create_node(&[PERSON], &[(NAME, PropValue::Float(1.5))]);
    store.create_node(&[PERSON], &[(NAME, PropValue::from("grace"))]);
    let mut indexes = MemIndexes::new();
    indexes
        .add(MemIndex::new(name_index(true)).reject_value_kind(ValueKind::Float))
        .expect("add index");
    indexes.populate(&store).expect("populate");

    let (summary, findings) = run(&store, &indexes);
    assert!(findings.is_empty(), "{findings:?}");
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].entity, EntityRef::node(0));
    assert!(summary.errors[0].message.contains("does not support"));
    assert_eq!(summary.nodes_checked, 1, "the other node is still checked");
    assert_eq!(indexes.open_readers(), 0, "readers released on the error path");
}

#[test]
fn approximate_index_hits_are_filtered_against_records() {
    let store = people(&["alphabet", "alphanumeric", "beta"]);
    let mut indexes = MemIndexes::new();
    indexes
        .add(MemIndex::new(name_index(true)).approximate(true))
        .expect("add index");
    indexes.populate(&store).expect("populate");

    let (summary, findings) = run(&store, &indexes);
    assert!(
        findings.is_empty(),
        "prefix collisions are not violations: {findings:?}"
    );
    assert!(summary.cache.entries >= 2);

    name_entries(&indexes).insert(2, vec![PropValue::from("alphabet")]);
    let (_, findings) = run(&store, &indexes);
    // Node 2's record holds "beta", so the stray entry is filtered out as a
    // false positive for node 0.
    assert!(findings.is_empty(), "{findings:?}");
}

#[test]
fn approximate_index_still_reports_real_duplicates() {
    let mut store = people(&["alphabet", "grace"]);
    store.create_node(&[PERSON], &[(NAME, PropValue::from("alphabet"))]);
    let mut indexes = MemIndexes::new();
    indexes
        .add(MemIndex::new(name_index(true)).approximate(true))
        .expect("add index");
    indexes.populate(&store).expect("populate");

    let (_, findings) = run(&store, &indexes);
    let pairs: Vec<_> = findings
        .iter()
        .map(|f| (f.kind, f.entity.id, f.other_entity))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (FindingKind::UniqueIndexNotUnique, 0, Some(2)),
            (FindingKind::UniqueIndexNotUnique, 2, Some(0)),
        ]
    );
}

#[test]
fn relationship_index_is_checked_against_relationships_only() {
    let mut store = MemRecordStore::new();
    store.create_node(&[KNOWS], &[(PropId(1), PropValue::Int(5))]);
    store.create_relationship(KNOWS, &[(PropId(1), PropValue::Int(5))]);
    store.create_relationship(KNOWS, &[(PropId(1), PropValue::Int(6))]);
    let descriptor =
        IndexDescriptor::non_unique(4, SchemaDescriptor::relationship(KNOWS, &[PropId(1)]));
    let indexes = populated(&store, vec![descriptor]);
    let index = indexes.index(IndexId(4)).expect("index");
    assert_eq!(index.entries().len(), 2);
    assert!(index.remove(1, &[PropValue::Int(6)]));

    let (summary, findings) = run(&store, &indexes);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::NotIndexed);
    assert_eq!(findings[0].entity, EntityRef::relationship(1));
    assert_eq!(summary.index_checks, 2);
}

#[test]
fn index_checks_can_be_disabled() {
    let store = people(&["ada"]);
    let indexes = populated(&store, vec![name_index(true)]);
    assert!(name_entries(&indexes).remove(0, &[PropValue::from("ada")]));
    let options = CheckOptions::default().check_indexes(false);
    let sink = CollectingSink::new();
    let summary = ScanCoordinator::new(&store, Some(&indexes), &options).run(&sink);
    assert!(sink.is_empty());
    assert_eq!(summary.index_checks, 0);
}

#[test]
fn matching_loads_keys_once_and_only_on_label_hit() {
    let descriptors = vec![
        SchemaDescriptor::node(PERSON, &[NAME]),
        SchemaDescriptor::node(PERSON, &[NAME, AGE]),
        SchemaDescriptor::relationship(PERSON, &[NAME]),
    ];
    let loads = Cell::new(0);
    let load = || {
        loads.set(loads.get() + 1);
        Ok::<_, PenumbraError>([NAME].into_iter().collect::<FxHashSet<_>>())
    };

    let mut iter = matching(EntityKind::Node, &[LabelId(9)], &descriptors, None, load);
    assert!(iter.next().is_none());
    assert!(!iter.keys_loaded());
    assert_eq!(loads.get(), 0);

    let load = || {
        loads.set(loads.get() + 1);
        Ok::<_, PenumbraError>([NAME].into_iter().collect::<FxHashSet<_>>())
    };
    let matched: Vec<_> = matching(EntityKind::Node, &[PERSON], &descriptors, None, load)
        .collect::<Result<_, _>>()
        .expect("keys load");
    assert_eq!(matched, vec![&descriptors[0]]);
    assert_eq!(loads.get(), 1);
}

#[test]
fn matching_exempts_one_key() {
    let descriptors = vec![SchemaDescriptor::node(PERSON, &[NAME, AGE])];
    let load = || Ok::<_, PenumbraError>([NAME].into_iter().collect::<FxHashSet<_>>());
    let matched: Vec<_> = matching(EntityKind::Node, &[PERSON], &descriptors, Some(AGE), load)
        .collect::<Result<_, _>>()
        .expect("keys load");
    assert_eq!(matched.len(), 1);
}

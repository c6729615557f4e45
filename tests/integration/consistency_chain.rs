#![allow(missing_docs)]

use penumbra::admin::{check_consistency, ConsistencyCheckMode};
use penumbra::check::{
    ChainDefect, ChainReader, CheckOptions, CollectingSink, Finding, FindingKind, Severity,
};
use penumbra::index::{IndexAccessors, IndexDescriptor, MemIndexes, SchemaDescriptor};
use penumbra::storage::{EntityRecord, MemRecordStore, PropertyBlock, PropertyRecord, RecordAccess};
use penumbra::types::{EntityKind, EntityRef, IndexId, LabelId, PropId, PropValue};

const LABEL: LabelId = LabelId(1);

fn props(keys: std::ops::Range<u32>) -> Vec<(PropId, PropValue)> {
    keys.map(|k| (PropId(k), PropValue::Int(i64::from(k)))).collect()
}

fn link(id: u64, prev: Option<u64>, next: Option<u64>, keys: &[u32]) -> PropertyRecord {
    PropertyRecord {
        id,
        in_use: true,
        prev,
        next,
        blocks: keys
            .iter()
            .map(|k| PropertyBlock::new(PropId(*k), i64::from(*k)))
            .collect(),
    }
}

fn check(
    store: &MemRecordStore,
    indexes: Option<&MemIndexes>,
    options: &CheckOptions,
) -> Vec<Finding> {
    let sink = CollectingSink::new();
    let report = check_consistency(
        store,
        indexes.map(|i| i as &dyn IndexAccessors),
        options,
        ConsistencyCheckMode::Full,
        &sink,
    );
    assert!(report.summary.errors.is_empty(), "{:?}", report.summary.errors);
    let findings = sink.into_sorted();
    assert_eq!(report.findings.total(), findings.len() as u64);
    assert_eq!(report.success, findings.is_empty());
    findings
}

fn default_check(store: &MemRecordStore) -> Vec<Finding> {
    check(store, None, &CheckOptions::default().threads(1))
}

#[test]
fn well_formed_chains_report_nothing() {
    let mut store = MemRecordStore::new();
    for n in 0..10 {
        store.create_node(&[LABEL], &props(0..n));
    }
    store.create_relationship(LabelId(4), &props(0..9));
    assert!(default_check(&store).is_empty());
}

#[test]
fn head_with_prev_pointer_is_one_finding() {
    let mut store = MemRecordStore::new();
    let head = store.write_chain(&props(0..6)).expect("chain");
    let second = head + 1;
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(second)));

    let findings = default_check(&store);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyNotFirstInChain);
    assert_eq!(findings[0].entity, EntityRef::node(0));
    assert_eq!(findings[0].property_record, Some(second));
}

#[test]
fn repeated_key_is_reported_at_the_repeat() {
    let mut store = MemRecordStore::new();
    store.put_property(link(0, None, Some(1), &[1, 2]));
    store.put_property(link(1, Some(0), None, &[3, 2]));
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0)));

    let findings = default_check(&store);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyKeyNotUniqueInChain);
    assert_eq!(findings[0].property_record, Some(1));
    assert_eq!(findings[0].property_key, Some(PropId(2)));
}

#[test]
fn first_occurrence_of_a_repeated_key_wins() {
    let mut store = MemRecordStore::new();
    store.put_property(PropertyRecord {
        id: 0,
        in_use: true,
        prev: None,
        next: Some(1),
        blocks: vec![PropertyBlock::new(PropId(1), "first")],
    });
    store.put_property(PropertyRecord {
        id: 1,
        in_use: true,
        prev: Some(0),
        next: None,
        blocks: vec![PropertyBlock::new(PropId(1), "second")],
    });
    let node = EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0));
    store.put_entity(node.clone());

    let chain = ChainReader::new(&store).read_chain(&node).expect("read chain");
    assert_eq!(chain.properties().get(PropId(1)), Some(&PropValue::from("first")));
    assert_eq!(
        chain.defects(),
        &[ChainDefect::DuplicateKey {
            record: 1,
            key: PropId(1)
        }]
    );
}

#[test]
fn freed_record_in_chain_stops_traversal() {
    let mut store = MemRecordStore::new();
    let id = store.create_node(&[LABEL], &props(0..12));
    assert!(store.delete_property(1));

    let findings = default_check(&store);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyNotInUse);
    assert_eq!(findings[0].property_record, Some(1));

    let node = store.entity(EntityKind::Node, id).expect("node");
    let chain = ChainReader::new(&store).read_chain(&node).expect("read chain");
    assert_eq!(chain.records().len(), 2);
    assert_eq!(chain.properties().len(), 4, "only the in-use head contributes");
}

#[test]
fn dangling_head_reads_as_not_in_use() {
    let mut store = MemRecordStore::new();
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(99)));
    let findings = default_check(&store);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyNotInUse);
    assert_eq!(findings[0].property_record, Some(99));
}

#[test]
fn cycle_terminates_with_one_finding() {
    let mut store = MemRecordStore::new();
    store.put_property(link(0, None, Some(1), &[1]));
    store.put_property(link(1, Some(0), Some(2), &[2]));
    store.put_property(link(2, Some(1), Some(1), &[3]));
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0)));

    let findings = default_check(&store);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyChainCycle);
    assert_eq!(findings[0].property_record, Some(1));
}

#[test]
fn self_loop_on_head_is_a_cycle() {
    let mut store = MemRecordStore::new();
    store.put_property(link(0, None, Some(0), &[1]));
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0)));
    let kinds: Vec<_> = default_check(&store).iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FindingKind::PropertyChainCycle]);
}

#[test]
fn overlong_chain_is_a_warning() {
    let mut store = MemRecordStore::new();
    store.create_node(&[LABEL], &props(0..12));
    let options = CheckOptions::default().threads(1).max_chain_length(2);

    let findings = check(&store, None, &options);
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].kind, FindingKind::PropertyChainTooLong);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert_eq!(findings[0].observed_count, Some(2));
}

#[test]
fn chain_defects_do_not_stop_index_checks() {
    let mut store = MemRecordStore::new();
    store.put_property(link(0, None, Some(1), &[1, 2]));
    store.put_property(link(1, Some(0), None, &[2]));
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0)));
    let mut indexes = MemIndexes::new();
    indexes
        .create(IndexDescriptor::unique(
            1,
            SchemaDescriptor::node(LABEL, &[PropId(2)]),
        ))
        .expect("create index");

    let findings = check(&store, Some(&indexes), &CheckOptions::default());
    let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FindingKind::PropertyKeyNotUniqueInChain,
            FindingKind::NotIndexed,
        ]
    );
    let not_indexed = &findings[1];
    assert_eq!(not_indexed.index.as_ref().map(IndexDescriptor::id), Some(IndexId(1)));
    assert_eq!(not_indexed.values, Some(vec![PropValue::Int(2)]));
}

#[test]
fn chain_reporting_can_be_disabled() {
    let mut store = MemRecordStore::new();
    store.put_property(link(0, None, Some(0), &[1]));
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(0)));
    let options = CheckOptions::default().check_property_chains(false);
    assert!(check(&store, None, &options).is_empty());
}

#[test]
fn freed_entities_are_not_walked() {
    let mut store = MemRecordStore::new();
    store.put_entity(EntityRecord::new(EntityKind::Node, 0, &[LABEL], Some(7)));
    store.delete_entity(EntityKind::Node, 0);
    assert!(default_check(&store).is_empty());
}

use super::*;

#[test]
fn empty_by_default() {
    let set = GuardSet::new();
    assert!(set.is_empty());
    assert!(!set.contains(Guard::WritingEditor));
}

#[test]
fn guards_are_independent() {
    let mut set = GuardSet::new();
    assert!(set.insert(Guard::RebuildingScene));
    assert!(set.contains(Guard::RebuildingScene));
    assert!(!set.contains(Guard::WritingEditor));
    assert!(!set.contains(Guard::HandlingSelection));
    set.remove(Guard::RebuildingScene);
    assert!(set.is_empty());
}

#[test]
fn insert_reports_already_held() {
    let mut set = GuardSet::new();
    assert!(set.insert(Guard::HandlingSelection));
    assert!(!set.insert(Guard::HandlingSelection));
    set.remove(Guard::HandlingSelection);
    assert!(set.insert(Guard::HandlingSelection));
}

#[test]
fn link_state_defaults_unlinked() {
    assert_eq!(LinkState::default(), LinkState::Unlinked);
    assert!(LinkState::Linked.is_linked());
}

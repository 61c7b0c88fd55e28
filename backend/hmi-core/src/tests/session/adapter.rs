use crate::error::session::SessionError;
use crate::session::{AdapterAddress, AdapterSpec, AdapterStatus, AdapterStore};

fn spec(id: Option<u32>, name: &str) -> AdapterSpec {
    AdapterSpec::new(id, name, "10.0.0.5", 9000).unwrap()
}

/// **VALUE**: Ids are assigned as last id + 1, starting from 0.
///
/// **WHY THIS MATTERS**: Default adapter lists mix explicit and implicit ids; the operator
/// refers to adapters by these numbers.
///
/// **BUG THIS CATCHES**: Using the collection length (which breaks after a removal or an
/// explicit id) instead of the last id.
#[test]
fn given_empty_store_when_adding_without_ids_then_assigns_sequentially() {
    // GIVEN: An empty store
    let mut store = AdapterStore::new();

    // WHEN: Adding twice without ids
    let first = store.add(spec(None, "first")).unwrap();
    let second = store.add(spec(None, "second")).unwrap();

    // THEN: 0 then 1
    assert_eq!(first, 0);
    assert_eq!(second, 1);
}

#[test]
fn given_explicit_id_when_adding_without_id_then_continues_from_last() {
    let mut store = AdapterStore::new();
    store.add(spec(Some(7), "seven")).unwrap();

    let next = store.add(spec(None, "next")).unwrap();

    assert_eq!(next, 8);
}

#[test]
fn given_existing_id_when_adding_same_id_then_duplicate_error() {
    let mut store = AdapterStore::new();
    store.add(spec(Some(3), "three")).unwrap();

    let result = store.add(spec(Some(3), "again"));

    assert!(matches!(
        result,
        Err(SessionError::DuplicateAdapter { adapter_id: 3, .. })
    ));
    assert_eq!(store.len(), 1);
}

/// **VALUE**: Removal is real: a removed adapter never shows up again.
///
/// **BUG THIS CATCHES**: A non-mutating "removal" that returns a filtered copy and leaves the
/// store untouched.
#[test]
fn given_adapter_when_removed_then_no_longer_listed() {
    let mut store = AdapterStore::new();
    store.add(spec(Some(0), "a")).unwrap();
    store.add(spec(Some(1), "b")).unwrap();

    assert!(store.remove(0));

    assert!(store.get(0).is_none());
    assert_eq!(store.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1]);
    assert!(!store.remove(0));
}

#[test]
fn given_adapter_when_updated_then_name_and_address_change_but_status_kept() {
    let mut store = AdapterStore::new();
    store.add(spec(Some(0), "a")).unwrap();
    store.get_mut(0).unwrap().status = AdapterStatus::Connected;

    let address = AdapterAddress::new("10.0.0.9", 9100).unwrap();
    assert!(store.update(0, "renamed".to_string(), address.clone()));

    let adapter = store.get(0).unwrap();
    assert_eq!(adapter.name, "renamed");
    assert_eq!(adapter.address, address);
    assert_eq!(adapter.status, AdapterStatus::Connected);
    assert!(!store.update(9, "ghost".to_string(), address));
}

#[test]
fn given_invalid_fields_when_spec_built_then_validation_error() {
    assert!(AdapterSpec::new(None, "  ", "10.0.0.5", 9000).is_err());
    assert!(AdapterSpec::new(None, "name", "", 9000).is_err());
    assert!(AdapterSpec::new(None, "name", "10.0.0.5", 0).is_err());
}

/// **VALUE**: Addresses become `ws://host:port/namespace`, honouring an explicit scheme.
///
/// **BUG THIS CATCHES**: A host typed as `http://...` producing `ws://http://...`.
#[test]
fn given_addresses_when_url_built_then_scheme_normalised() {
    let plain = AdapterAddress::new("10.0.0.5", 9000).unwrap();
    let secure = AdapterAddress::new("https://adapter.local/", 8443).unwrap();
    let ws = AdapterAddress::new("ws://localhost", 5001).unwrap();

    assert_eq!(plain.to_url("/api").unwrap().as_str(), "ws://10.0.0.5:9000/api");
    assert_eq!(
        secure.to_url("/api").unwrap().as_str(),
        "wss://adapter.local:8443/api"
    );
    assert_eq!(ws.to_url("/api").unwrap().as_str(), "ws://localhost:5001/api");
}

#[test]
fn given_statuses_when_coded_then_match_operator_codes() {
    assert_eq!(AdapterStatus::Disconnected.code(), 0);
    assert_eq!(AdapterStatus::Connecting.code(), 1);
    assert_eq!(AdapterStatus::Connected.code(), 2);
    assert_eq!(AdapterStatus::Unavailable.code(), -1);
    assert_eq!(AdapterStatus::Failed.code(), -2);
    assert!(AdapterStatus::Connecting.is_active());
    assert!(!AdapterStatus::Unavailable.is_active());
}

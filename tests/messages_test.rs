use std::collections::BTreeMap;

use busflow_loading::messages::{DEFAULT_MESSAGE, MessageCatalog};
use busflow_loading::model::Scope;

#[test]
fn explicit_message_wins_over_key() {
    let catalog = MessageCatalog::default();
    assert_eq!(
        catalog.resolve(Scope::Action, Some("Uploading 12 customers"), Some("import_customers")),
        "Uploading 12 customers"
    );
}

#[test]
fn blank_message_falls_back_to_key() {
    let catalog = MessageCatalog::default();
    assert_eq!(
        catalog.resolve(Scope::Action, Some("   "), Some("import_customers")),
        "Importing customers..."
    );
}

#[test]
fn unknown_key_uses_scope_default() {
    let catalog = MessageCatalog::default();
    assert_eq!(catalog.resolve(Scope::Route, None, Some("depots")), "Loading page...");
    assert_eq!(
        catalog.resolve(Scope::Auth, None, None),
        "Checking your session..."
    );
}

#[test]
fn system_scope_falls_back_to_default_message() {
    let catalog = MessageCatalog::default();
    assert_eq!(catalog.resolve(Scope::System, None, None), DEFAULT_MESSAGE);
    assert_eq!(
        catalog.resolve(Scope::System, None, Some("reconnect")),
        "Reconnecting..."
    );
}

#[test]
fn keys_are_scoped() {
    let catalog = MessageCatalog::default();
    // save_route belongs to the action scope
    assert_eq!(catalog.resolve(Scope::Route, None, Some("save_route")), "Loading page...");
}

#[test]
fn overrides_replace_and_add() {
    let overrides = BTreeMap::from([(
        "system".to_string(),
        BTreeMap::from([
            ("default".to_string(), "Syncing...".to_string()),
            ("realtime".to_string(), "Waiting for live updates...".to_string()),
        ]),
    )]);
    let catalog = MessageCatalog::builtin("Loading...")
        .with_overrides(&overrides)
        .unwrap();

    assert_eq!(catalog.resolve(Scope::System, None, None), "Syncing...");
    assert_eq!(
        catalog.resolve(Scope::System, None, Some("realtime")),
        "Waiting for live updates..."
    );
    assert_eq!(catalog.default_message(), "Loading...");
}

#[test]
fn overrides_with_unknown_scope_fail() {
    let overrides = BTreeMap::from([("billing".to_string(), BTreeMap::new())]);
    assert!(MessageCatalog::default().with_overrides(&overrides).is_err());
}

// tests/registry_lookup.rs
use std::fs;

use wildfire_risk::{Engine, EngineError, Entity, EntityRegistry};

#[test]
fn unknown_entity_is_not_found() {
    let reg = EntityRegistry::california();
    assert_eq!(
        reg.lookup("Gotham").unwrap_err(),
        EngineError::NotFound("Gotham".into())
    );
}

#[test]
fn known_entity_without_data_is_none_not_error() {
    let engine = Engine::builder(EntityRegistry::california()).build();
    assert!(engine.record("Alpine").unwrap().is_none());
    assert!(matches!(
        engine.record("Atlantis"),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn iteration_keeps_load_order() {
    let reg = EntityRegistry::from_entities(vec![
        Entity::new("Yolo", 38.73, -121.81),
        Entity::new("Alameda", 37.65, -121.91),
        Entity::new("Modoc", 41.59, -120.72),
    ])
    .unwrap();
    let names: Vec<_> = reg.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Yolo", "Alameda", "Modoc"]);
}

#[test]
fn registry_files_load_by_extension_and_by_sniffing() {
    let dir = tempfile::tempdir().unwrap();

    let toml_path = dir.path().join("counties.toml");
    fs::write(
        &toml_path,
        "[[entities]]\nname = \"Shasta\"\nlat = 40.76\nlon = -122.04\nfips = \"06089\"\n",
    )
    .unwrap();
    let reg = EntityRegistry::load_from(&toml_path).unwrap();
    assert_eq!(reg.lookup("shasta").unwrap().fips.as_deref(), Some("06089"));

    // No extension: content decides.
    let json_path = dir.path().join("counties");
    fs::write(&json_path, r#"[{"name": "Lake", "lat": 39.1, "lon": -122.75}]"#).unwrap();
    assert_eq!(EntityRegistry::load_from(&json_path).unwrap().len(), 1);

    let empty = dir.path().join("empty.json");
    fs::write(&empty, "[]").unwrap();
    let err = EntityRegistry::load_from(&empty).unwrap_err();
    assert!(format!("{err:#}").contains("registry is empty"), "{err:#}");
}

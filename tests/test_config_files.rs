use abicall::config::{Config, FormatName, CONFIG_FILE};
use abicall::decl::DeclSet;
use abicall::{LayoutRegistry, LinkPolicy};
use std::fs;

#[test]
fn test_discover_nearest_config() {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("project");
    let nested = project.join("src").join("deep");
    fs::create_dir_all(&nested).unwrap();

    fs::write(root.path().join(CONFIG_FILE), "[logging]\nformat = \"pretty\"\n").unwrap();
    fs::write(
        project.join(CONFIG_FILE),
        "[logging]\nformat = \"json\"\nlevel = \"debug\"\n\n[linker]\npolicy = \"report-all\"\n",
    )
    .unwrap();

    let config = Config::discover_from(&nested).unwrap();
    assert_eq!(config.logging.format, FormatName::Json);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.linker.policy, LinkPolicy::ReportAll);
}

#[test]
fn test_unparsable_config_is_skipped_by_discovery() {
    let root = tempfile::tempdir().unwrap();
    let nested = root.path().join("child");
    fs::create_dir_all(&nested).unwrap();

    fs::write(root.path().join(CONFIG_FILE), "[linker]\npolicy = \"report-all\"\n").unwrap();
    fs::write(nested.join(CONFIG_FILE), "[linker\npolicy =").unwrap();

    assert!(Config::load(&nested.join(CONFIG_FILE)).is_err());
    let config = Config::discover_from(&nested).unwrap();
    assert_eq!(config.linker.policy, LinkPolicy::ReportAll);
}

#[test]
fn test_struct_descriptions_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("structs.toml");
    fs::write(
        &path,
        r#"
        [[struct]]
        name = "file_header"

        [[struct.field]]
        name = "magic"
        type = "unsigned_int"

        [[struct.field]]
        name = "flags"
        type = "unsigned_char"
        cardinality = 3

        [[struct.field]]
        name = "length"
        type = "long_long"
        "#,
    )
    .unwrap();

    let registry = LayoutRegistry::new();
    let layouts = DeclSet::load(&path).unwrap().define_all(&registry).unwrap();
    let header = &layouts[0];
    assert_eq!(header.offset_of("flags"), Some(4));
    assert_eq!(header.offset_of("length"), Some(8));
    assert_eq!(header.size(), 16);
}

#[test]
fn test_init_with_explicit_config() {
    let config = Config::parse("[logging]\nlevel = \"warn\"\nformat = \"compact\"\n").unwrap();
    abicall::init_with_config(&config);
    assert!(abicall::logging::is_initialized());

    // Later initializations keep the first subscriber
    abicall::init_with_config(&Config::default());
    assert!(abicall::logging::is_initialized());
}

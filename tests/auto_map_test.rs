//! 自动映射集成测试
//!
//! 全局类型目录在同一测试进程内共享，每个测试使用各自的命名空间。

use anyhow::Result;
use iocbox::config::EnvSettings;
use iocbox::{
    auto_map, auto_map_from_config, auto_map_namespace, register_types, AppSettings, AutoMapOptions, AutoMapper,
    Commit, Constructor, ContainerError, GroupScan, MapFilter, ServiceContainer, ServiceKey, ServiceLifetime,
    SettingsLoader, StaticTypeCatalog, TypeInfo, TypeRef,
};
use std::fs;
use tempfile::TempDir;

fn contract(namespace: &str, name: &str) -> TypeRef {
    TypeInfo::interface(namespace, name).shared()
}

fn implementation(contract: &TypeRef, name: &str) -> TypeInfo {
    TypeInfo::class(contract.namespace(), name)
        .implements_type(contract)
        .with_constructor(Constructor::from_fn(|| ()))
}

#[test]
fn test_auto_map_registers_with_inferred_lifetime() -> Result<()> {
    let users = contract("Global.Users.Services", "IUserService");
    let cache = contract("Global.Users.Services", "ICache");
    register_types(
        "global-users",
        vec![
            users.clone(),
            implementation(&users, "UserService").shared(),
        ],
    );
    register_types(
        "global-cache",
        vec![
            cache.clone(),
            implementation(&cache, "Cache").with_attribute("Stateless").shared(),
        ],
    );

    let container = ServiceContainer::new();
    let mut found = Vec::new();
    let filter = MapFilter::new("Global.Users.*")?;
    let mapped = auto_map(&container, &filter, |ty| found.push(ty.name().to_string()))?;

    assert_eq!(mapped, 2);
    assert_eq!(found, vec!["IUserService", "ICache"]);
    let lifetimes: Vec<(String, ServiceLifetime)> = container
        .registrations()
        .iter()
        .map(|r| (r.key().to_string(), r.lifetime()))
        .collect();
    assert!(lifetimes.contains(&("Global.Users.Services.IUserService".to_string(), ServiceLifetime::Transient)));
    assert!(lifetimes.contains(&("Global.Users.Services.ICache".to_string(), ServiceLifetime::Singleton)));
    Ok(())
}

#[test]
fn test_auto_map_namespace_with_format() -> Result<()> {
    let store = contract("Global.Format.Contracts", "IStore");
    register_types(
        "global-format",
        vec![
            store.clone(),
            TypeInfo::class("Global.Format.Contracts", "DefaultStore")
                .implements_type(&store)
                .with_constructor(Constructor::from_fn(|| ()))
                .shared(),
        ],
    );

    let container = ServiceContainer::new();
    assert_eq!(
        auto_map_namespace(&container, "Global.Format.Contracts", Some("{0}.Default{1}"))?,
        1
    );
    assert!(container.get(&ServiceKey::new(&store), &[])?.is_some());
    Ok(())
}

#[test]
fn test_missing_actual_type_fails_without_callback() {
    let orphan = contract("Local.Orphans", "IOrphan");
    let catalog = StaticTypeCatalog::new().with_group("orphans", vec![orphan]);

    let container = ServiceContainer::new();
    let mut callbacks = 0;
    let filter = MapFilter::new("Local.Orphans").expect("valid expression");
    let err = AutoMapper::new(&catalog)
        .map(&container, &filter, |_| callbacks += 1)
        .unwrap_err();

    match err {
        ContainerError::NoMappingFound { expected } => assert_eq!(expected, "Local.Orphans.IOrphan"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(callbacks, 0);
    assert!(container.is_empty());
}

#[test]
fn test_commit_modes() -> Result<()> {
    let good = contract("Local.Commit", "IGood");
    let bad = contract("Local.Commit", "IBad");
    let catalog = StaticTypeCatalog::new()
        .with_group("good", vec![good.clone(), implementation(&good, "Good").shared()])
        .with_group("bad", vec![bad]);
    let filter = MapFilter::new("Local.Commit")?;

    let best_effort = ServiceContainer::new();
    assert!(AutoMapper::new(&catalog).map(&best_effort, &filter, |_| {}).is_err());
    assert_eq!(best_effort.len(), 1);

    let all_or_nothing = ServiceContainer::new();
    let mut callbacks = 0;
    let result = AutoMapper::new(&catalog)
        .with_options(AutoMapOptions {
            commit: Commit::AllOrNothing,
            scan: GroupScan::FirstMatch,
        })
        .map(&all_or_nothing, &filter, |_| callbacks += 1);
    assert!(matches!(result, Err(ContainerError::NoMappingFound { .. })));
    assert!(all_or_nothing.is_empty());
    assert_eq!(callbacks, 0);
    Ok(())
}

#[test]
fn test_actual_type_without_constructor_is_not_a_mapping() -> Result<()> {
    let good = contract("Local.Unbuildable", "IGood");
    let bad = contract("Local.Unbuildable", "IBad");
    let catalog = StaticTypeCatalog::new()
        .with_group("good", vec![good.clone(), implementation(&good, "Good").shared()])
        .with_group(
            "bad",
            vec![
                bad.clone(),
                TypeInfo::class("Local.Unbuildable", "Bad").implements_type(&bad).shared(),
            ],
        );
    let filter = MapFilter::new("Local.Unbuildable")?;

    let all_or_nothing = ServiceContainer::new();
    let mut callbacks = 0;
    let err = AutoMapper::new(&catalog)
        .with_options(AutoMapOptions {
            commit: Commit::AllOrNothing,
            ..Default::default()
        })
        .map(&all_or_nothing, &filter, |_| callbacks += 1)
        .unwrap_err();
    assert!(matches!(err, ContainerError::NoMappingFound { ref expected } if expected == "Local.Unbuildable.IBad"));
    assert!(all_or_nothing.is_empty());
    assert_eq!(callbacks, 0);

    let best_effort = ServiceContainer::new();
    let err = AutoMapper::new(&catalog)
        .map(&best_effort, &filter, |_| {})
        .unwrap_err();
    assert!(matches!(err, ContainerError::NoMappingFound { .. }));
    assert_eq!(best_effort.len(), 1);
    Ok(())
}

#[test]
fn test_auto_mapped_services_are_not_fixed() -> Result<()> {
    let clock = contract("Local.Fixed", "IClock");
    let catalog = StaticTypeCatalog::new().with_group(
        "fixed",
        vec![clock.clone(), implementation(&clock, "Clock").shared()],
    );

    let container = ServiceContainer::new();
    container.register_instance(String::from("manual"))?;
    AutoMapper::new(&catalog).map_namespace(&container, "Local.Fixed", None)?;

    let key = ServiceKey::new(&clock);
    assert!(container.get(&key, &[])?.is_some());
    assert!(container.get_fixed(&key, &[])?.is_none());
    assert!(container.get_fixed(&ServiceKey::of::<String>(), &[])?.is_some());
    Ok(())
}

#[test]
fn test_auto_map_from_settings_file() -> Result<()> {
    let mail = contract("Global.Config.Mail", "IMailer");
    register_types(
        "global-config",
        vec![mail.clone(), implementation(&mail, "Mailer").shared()],
    );

    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("settings.toml"),
        "[app_settings]\n\"ioc.namespaces\" = \"Global.Config.*\"\n",
    )?;
    let settings: AppSettings = SettingsLoader::with_base_path(temp_dir.path())
        .without_env_overrides()
        .load()?;

    let container = ServiceContainer::new();
    assert_eq!(auto_map_from_config(&container, &settings, "ioc.namespaces")?, 1);
    assert!(container.contains(&ServiceKey::new(&mail), false)?);

    let err = auto_map_from_config(&container, &EnvSettings::new("IOCBOX_AUTO_MAP_TEST_"), "ioc.namespaces")
        .unwrap_err();
    assert!(matches!(err, ContainerError::MissingConfiguration { .. }));
    Ok(())
}

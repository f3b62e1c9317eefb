//! iocbox: 控制反转服务容器
//!
//! ```ignore
//! use iocbox::{ServiceContainer, ServiceLifetime};
//!
//! let container = ServiceContainer::new();
//! container.register(ServiceLifetime::Singleton, |_| Ok(String::from("postgres://localhost")))?;
//! let url = container.resolve::<String>(&[])?;
//! ```

pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::{AppSettings, ConfigSource, SettingsLoader};
pub use errors::{BoxError, ConfigError, ContainerError, ContainerResult};
pub use infrastructure::{
    auto_map, auto_map_from_config, auto_map_namespace, global_catalog, register_types, Arguments, AutoMapOptions,
    AutoMapper, Commit, Constructor, ContainerOptions, ContainerStats, GroupScan, Instance, MapFilter, Parameter,
    ServiceBuilder, ServiceContainer, ServiceKey, ServiceLifetime, StaticTypeCatalog, TypeCatalog, TypeGroup,
    TypeInfo, TypeKind, TypeRef,
};

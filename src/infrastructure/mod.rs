//! 基础设施层
//!
//! 提供：
//! - 类型目录
//! - 依赖注入容器
//! - 映射筛选器与自动映射

pub mod auto_map;
pub mod catalog;
pub mod container;
pub mod map_filter;

// 重新导出API
pub use auto_map::{auto_map, auto_map_from_config, auto_map_namespace, AutoMapOptions, AutoMapper, Commit, GroupScan};
pub use catalog::{
    global_catalog, register_types, Constructor, Parameter, StaticTypeCatalog, TypeCatalog, TypeGroup, TypeInfo,
    TypeKind, TypeRef,
};
pub use container::{
    Arguments, ContainerOptions, ContainerStats, Instance, Registration, RegistrationOrigin, ServiceBuilder,
    ServiceContainer, ServiceKey, ServiceLifetime,
};
pub use map_filter::{default_singleton_policy, MapFilter, SingletonPolicy};

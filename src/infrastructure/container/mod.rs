//! Container module
//!
//! 服务键、生命周期与容器实现。

pub mod binder;
pub mod instance;
pub mod registration;
pub mod registry;
mod resolver;

pub use binder::{RangeServiceBinder, ServiceBuilder, TypeServiceBinder, ValueServiceBinder};
pub use instance::{Arguments, Instance};
pub use registration::{InstanceFactory, Registration, RegistrationOrigin};
pub use registry::{ContainerOptions, ContainerStats, ServiceContainer};

use crate::errors::{ContainerError, ContainerResult};
use crate::infrastructure::catalog::{TypeInfo, TypeRef};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// New instance per resolve
    Transient,
    /// One instance per container, shared with descendants via promotion
    Singleton,
    /// One instance per scope container
    Scoped,
}

impl ServiceLifetime {
    /// 是否缓存实例
    pub fn is_cached(self) -> bool {
        !matches!(self, ServiceLifetime::Transient)
    }

    pub(crate) fn from_singleton_mode(singleton: bool) -> Self {
        if singleton {
            ServiceLifetime::Singleton
        } else {
            ServiceLifetime::Transient
        }
    }
}

/// 服务键：预期类型加可选名称。
///
/// 相等性只比较预期类型的完全限定名和名称，描述符的其他字段不参与。
#[derive(Clone)]
pub struct ServiceKey {
    expected: TypeRef,
    name: Option<String>,
}

impl ServiceKey {
    /// 默认（仅类型）槽位
    pub fn new(expected: &TypeRef) -> Self {
        Self {
            expected: expected.clone(),
            name: None,
        }
    }

    /// 命名槽位
    pub fn named(expected: &TypeRef, name: impl Into<String>) -> Self {
        Self {
            expected: expected.clone(),
            name: Some(name.into()),
        }
    }

    /// Rust 类型对应的默认槽位
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            expected: Arc::new(TypeInfo::of::<T>()),
            name: None,
        }
    }

    pub fn expected(&self) -> &TypeRef {
        &self.expected
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_default_slot(&self) -> bool {
        self.name.is_none()
    }

    /// 对应的默认槽位键
    pub fn default_slot(&self) -> Self {
        Self::new(&self.expected)
    }

    pub(crate) fn validate(&self) -> ContainerResult<()> {
        if self.expected.qualified_name().trim().is_empty() {
            return Err(ContainerError::invalid("key", "expected type name is blank"));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ContainerError::invalid("name", "service name is blank"));
            }
        }
        Ok(())
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.expected.qualified_name() == other.expected.qualified_name() && self.name == other.name
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expected.qualified_name().hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[{}]", self.expected.qualified_name(), name),
            None => f.write_str(self.expected.qualified_name()),
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_ignores_descriptor_details() {
        let a = TypeInfo::interface("App.Data", "IRepo").shared();
        let b = TypeInfo::interface("App.Data", "IRepo")
            .with_attribute("stateless")
            .shared();

        let mut keys = HashSet::new();
        keys.insert(ServiceKey::new(&a));
        assert!(keys.contains(&ServiceKey::new(&b)));
        assert!(!keys.contains(&ServiceKey::named(&b, "primary")));
    }

    #[test]
    fn test_blank_keys_are_rejected() {
        let blank = TypeInfo::interface("", " ").shared();
        assert!(matches!(
            ServiceKey::new(&blank).validate(),
            Err(ContainerError::InvalidArgument { argument: "key", .. })
        ));

        let ty = TypeInfo::interface("App", "IRepo").shared();
        assert!(matches!(
            ServiceKey::named(&ty, "  ").validate(),
            Err(ContainerError::InvalidArgument { argument: "name", .. })
        ));
    }

    #[test]
    fn test_key_display() {
        let ty = TypeInfo::interface("App", "IRepo").shared();
        assert_eq!(ServiceKey::new(&ty).to_string(), "App.IRepo");
        assert_eq!(ServiceKey::named(&ty, "conn").to_string(), "App.IRepo[conn]");
    }
}

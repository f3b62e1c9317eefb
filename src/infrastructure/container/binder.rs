//! 流式注册接口
//!
//! ```ignore
//! container
//!     .builder()
//!     .use_type(&repository_contract)
//!     .singleton(&sql_repository)?
//!     .use_value(&string_type, "connection")
//!     .value(String::from("postgres://localhost"))?;
//! ```
//!
//! 每个绑定器都必须以一个终结方法完成；未完成就丢弃的绑定器不会注册任何服务。

use super::{Instance, ServiceContainer, ServiceKey, ServiceLifetime};
use crate::errors::{BoxError, ContainerResult};
use crate::infrastructure::catalog::TypeRef;
use std::any::Any;

/// 注册入口，持有目标容器和提升标志
#[derive(Debug, Clone, Copy)]
pub struct ServiceBuilder<'c> {
    container: &'c ServiceContainer,
    promote: bool,
}

impl ServiceContainer {
    /// 开始流式注册（不提升到父容器）
    pub fn builder(&self) -> ServiceBuilder<'_> {
        self.builder_promoted(false)
    }

    pub fn builder_promoted(&self, promote: bool) -> ServiceBuilder<'_> {
        ServiceBuilder {
            container: self,
            promote,
        }
    }
}

impl<'c> ServiceBuilder<'c> {
    pub fn container(&self) -> &'c ServiceContainer {
        self.container
    }

    /// 绑定预期类型的默认槽位
    pub fn use_type(self, expected: &TypeRef) -> TypeServiceBinder<'c> {
        TypeServiceBinder {
            builder: self,
            key: ServiceKey::new(expected),
        }
    }

    /// 绑定命名槽位，通常是某个构造函数参数
    pub fn use_value(self, expected: &TypeRef, name: impl Into<String>) -> ValueServiceBinder<'c> {
        ValueServiceBinder {
            builder: self,
            key: ServiceKey::named(expected, name),
        }
    }

    /// 为预期类型批量追加实际类型
    pub fn use_range(self, expected: &TypeRef) -> RangeServiceBinder<'c> {
        RangeServiceBinder {
            builder: self,
            expected: expected.clone(),
        }
    }
}

/// 类型绑定器
#[must_use = "a binder registers nothing until it is completed"]
pub struct TypeServiceBinder<'c> {
    builder: ServiceBuilder<'c>,
    key: ServiceKey,
}

impl<'c> TypeServiceBinder<'c> {
    pub fn transient(self, actual: &TypeRef) -> ContainerResult<ServiceBuilder<'c>> {
        self.with_lifetime(actual, ServiceLifetime::Transient)
    }

    pub fn singleton(self, actual: &TypeRef) -> ContainerResult<ServiceBuilder<'c>> {
        self.with_lifetime(actual, ServiceLifetime::Singleton)
    }

    pub fn scoped(self, actual: &TypeRef) -> ContainerResult<ServiceBuilder<'c>> {
        self.with_lifetime(actual, ServiceLifetime::Scoped)
    }

    /// 生命周期取自预期类型的标记，其次是实际类型的标记，默认瞬态
    pub fn as_type(self, actual: &TypeRef) -> ContainerResult<ServiceBuilder<'c>> {
        let lifetime = self
            .key
            .expected()
            .lifetime()
            .or_else(|| actual.lifetime())
            .unwrap_or(ServiceLifetime::Transient);
        self.with_lifetime(actual, lifetime)
    }

    /// 使用回调工厂
    pub fn factory<F>(self, lifetime: ServiceLifetime, factory: F) -> ContainerResult<ServiceBuilder<'c>>
    where
        F: Fn(&[Instance]) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        let Self { builder, key } = self;
        builder
            .container
            .add_factory(&key, factory, lifetime, builder.promote)?;
        Ok(builder)
    }

    /// 使用现成的实例
    pub fn instance<T: Any + Send + Sync>(self, value: T) -> ContainerResult<ServiceBuilder<'c>> {
        let Self { builder, key } = self;
        builder
            .container
            .add_instance(&key, Instance::new(value), builder.promote)?;
        Ok(builder)
    }

    fn with_lifetime(self, actual: &TypeRef, lifetime: ServiceLifetime) -> ContainerResult<ServiceBuilder<'c>> {
        let Self { builder, key } = self;
        builder
            .container
            .add_type(&key, actual, lifetime, builder.promote)?;
        Ok(builder)
    }
}

/// 命名值绑定器
#[must_use = "a binder registers nothing until it is completed"]
pub struct ValueServiceBinder<'c> {
    builder: ServiceBuilder<'c>,
    key: ServiceKey,
}

impl<'c> ValueServiceBinder<'c> {
    pub fn value<T: Any + Send + Sync>(self, value: T) -> ContainerResult<ServiceBuilder<'c>> {
        let Self { builder, key } = self;
        builder
            .container
            .add_instance(&key, Instance::new(value), builder.promote)?;
        Ok(builder)
    }

    pub fn transient<T, F>(self, factory: F) -> ContainerResult<ServiceBuilder<'c>>
    where
        T: Any + Send + Sync,
        F: Fn(&[Instance]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.with_factory(ServiceLifetime::Transient, factory)
    }

    pub fn singleton<T, F>(self, factory: F) -> ContainerResult<ServiceBuilder<'c>>
    where
        T: Any + Send + Sync,
        F: Fn(&[Instance]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.with_factory(ServiceLifetime::Singleton, factory)
    }

    fn with_factory<T, F>(self, lifetime: ServiceLifetime, factory: F) -> ContainerResult<ServiceBuilder<'c>>
    where
        T: Any + Send + Sync,
        F: Fn(&[Instance]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let Self { builder, key } = self;
        builder.container.add_factory(
            &key,
            move |args| factory(args).map(Instance::new),
            lifetime,
            builder.promote,
        )?;
        Ok(builder)
    }
}

/// 批量绑定器，以 [`done`](Self::done) 结束
#[must_use = "call `done` to continue with the builder"]
pub struct RangeServiceBinder<'c> {
    builder: ServiceBuilder<'c>,
    expected: TypeRef,
}

impl<'c> RangeServiceBinder<'c> {
    pub fn transient(self, actual: &TypeRef) -> ContainerResult<Self> {
        self.add(actual, ServiceLifetime::Transient)
    }

    pub fn singleton(self, actual: &TypeRef) -> ContainerResult<Self> {
        self.add(actual, ServiceLifetime::Singleton)
    }

    pub fn scoped(self, actual: &TypeRef) -> ContainerResult<Self> {
        self.add(actual, ServiceLifetime::Scoped)
    }

    pub fn done(self) -> ServiceBuilder<'c> {
        self.builder
    }

    fn add(self, actual: &TypeRef, lifetime: ServiceLifetime) -> ContainerResult<Self> {
        self.builder
            .container
            .add_range(&self.expected, actual, lifetime, self.builder.promote)?;
        Ok(self)
    }
}

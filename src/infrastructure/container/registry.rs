//! 服务注册表
//!
//! 解决以下问题：
//! - 服务键到注册信息的映射（每个键最多一个注册，后注册的覆盖先注册的）
//! - 父子容器之间的提升（注册向上同步、读取未命中时向上查找）
//! - 单次解析只观察解析开始时的注册表快照
//!
//! 注册表本身是 `Arc<RegistrationMap>`，写操作在容器级写锁下写时复制，
//! 解析只克隆 `Arc`，不会长时间持有锁。

use super::registration::{Activator, RegistrationSpec};
use super::resolver::{Layer, Resolver};
use super::{Instance, Registration, RegistrationOrigin, ServiceKey, ServiceLifetime};
use crate::errors::{BoxError, ContainerError, ContainerResult};
use crate::infrastructure::catalog::{TypeInfo, TypeKind, TypeRef};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// 容器选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerOptions {
    /// 本地未注册时是否向父容器查找
    pub promote_on_read: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            promote_on_read: true,
        }
    }
}

/// 某一时刻的注册表
#[derive(Clone, Default)]
pub(crate) struct RegistrationMap {
    pub(crate) services: HashMap<ServiceKey, Arc<Registration>>,
    /// 批量注册，键为预期类型的默认槽位
    pub(crate) ranges: HashMap<ServiceKey, Vec<Arc<Registration>>>,
}

impl RegistrationMap {
    fn len(&self) -> usize {
        self.services.len() + self.ranges.values().map(Vec::len).sum::<usize>()
    }

    /// 只保留手工注册的服务
    fn manual_subset(&self) -> Self {
        fn is_manual(registration: &Arc<Registration>) -> bool {
            registration.origin() == RegistrationOrigin::Manual
        }

        Self {
            services: self
                .services
                .iter()
                .filter(|(_, r)| is_manual(r))
                .map(|(k, r)| (k.clone(), r.clone()))
                .collect(),
            ranges: self
                .ranges
                .iter()
                .map(|(k, list)| {
                    let manual: Vec<_> = list.iter().filter(|r| is_manual(r)).cloned().collect();
                    (k.clone(), manual)
                })
                .filter(|(_, list)| !list.is_empty())
                .collect(),
        }
    }

    /// 该注册是否仍在此注册表中
    pub(crate) fn holds(&self, registration: &Registration) -> bool {
        let key = registration.key();
        self.services.get(key).is_some_and(|r| r.id() == registration.id())
            || self
                .ranges
                .get(key)
                .is_some_and(|list| list.iter().any(|r| r.id() == registration.id()))
    }

    fn sorted(&self) -> Vec<Arc<Registration>> {
        let mut all: Vec<_> = self
            .services
            .values()
            .chain(self.ranges.values().flatten())
            .cloned()
            .collect();
        all.sort_by_key(|r| r.id());
        all
    }
}

/// 内部容器统计信息（原子计数器）
#[derive(Default)]
pub(crate) struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    transient_creations: AtomicUsize,
}

impl InnerStats {
    pub(crate) fn record_resolution(&self) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient(&self) {
        self.transient_creations.fetch_add(1, Ordering::Relaxed);
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    pub total_resolutions: usize,
    pub cache_hits: usize,
    /// 缓存生命周期的实际构造次数
    pub cache_misses: usize,
    pub transient_creations: usize,
    pub registered_services: usize,
}

impl ContainerStats {
    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// 某个作用域容器中一个注册的实例缓存
pub(crate) struct ScopedSlot {
    registration: Weak<Registration>,
    pub(crate) cell: OnceCell<Instance>,
    pub(crate) lock: Mutex<()>,
}

pub(crate) struct ContainerInner {
    id: Uuid,
    parent: Option<Weak<ContainerInner>>,
    options: ContainerOptions,
    registrations: RwLock<Arc<RegistrationMap>>,
    fixed: OnceCell<Arc<RegistrationMap>>,
    /// 作用域实例缓存，键为注册 ID（可能属于祖先容器）
    scoped: DashMap<u64, Arc<ScopedSlot>>,
    pub(crate) stats: InnerStats,
}

impl ContainerInner {
    fn new(parent: Option<Weak<ContainerInner>>, options: ContainerOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent,
            options,
            registrations: RwLock::new(Arc::new(RegistrationMap::default())),
            fixed: OnceCell::new(),
            scoped: DashMap::new(),
            stats: InnerStats::default(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn parent(&self) -> Option<Arc<ContainerInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn snapshot(&self) -> Arc<RegistrationMap> {
        self.registrations.read().clone()
    }

    fn fixed_snapshot(&self) -> Arc<RegistrationMap> {
        self.fixed
            .get_or_init(|| {
                let fixed = Arc::new(self.snapshot().manual_subset());
                tracing::debug!(container = %self.id, services = fixed.len(), "Fixed service set frozen");
                fixed
            })
            .clone()
    }

    pub(crate) fn scoped_slot(&self, registration: &Arc<Registration>) -> Arc<ScopedSlot> {
        if let Some(slot) = self.scoped.get(&registration.id()) {
            return slot.clone();
        }
        // 祖先容器替换或移除的注册不会通知子容器，新建槽位时顺带清理
        self.scoped.retain(|_, slot| slot.registration.strong_count() > 0);
        self.scoped
            .entry(registration.id())
            .or_insert_with(|| {
                Arc::new(ScopedSlot {
                    registration: Arc::downgrade(registration),
                    cell: OnceCell::new(),
                    lock: Mutex::new(()),
                })
            })
            .clone()
    }

    fn insert(&self, key: &ServiceKey, registration: Arc<Registration>) {
        let replaced = {
            let mut guard = self.registrations.write();
            Arc::make_mut(&mut *guard)
                .services
                .insert(key.clone(), registration)
        };
        if let Some(old) = replaced {
            self.scoped.remove(&old.id());
        }
    }

    fn insert_range(&self, key: &ServiceKey, registration: Arc<Registration>) {
        let mut guard = self.registrations.write();
        Arc::make_mut(&mut *guard)
            .ranges
            .entry(key.clone())
            .or_default()
            .push(registration);
    }

    fn remove(&self, key: &ServiceKey) -> bool {
        let removed: Vec<Arc<Registration>> = {
            let mut guard = self.registrations.write();
            let present = guard.services.contains_key(key)
                || (key.is_default_slot() && guard.ranges.contains_key(key));
            if !present {
                return false;
            }
            let map = Arc::make_mut(&mut *guard);
            let mut removed: Vec<_> = map.services.remove(key).into_iter().collect();
            if key.is_default_slot() {
                removed.extend(map.ranges.remove(key).unwrap_or_default());
            }
            removed
        };
        for registration in &removed {
            self.scoped.remove(&registration.id());
        }
        true
    }

    fn contains(&self, key: &ServiceKey) -> bool {
        let map = self.registrations.read();
        map.services.contains_key(key) || (key.is_default_slot() && map.ranges.contains_key(key))
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        tracing::trace!(container = %self.id, "Container dropped");
    }
}

/// 服务容器
///
/// 克隆只复制句柄，所有克隆共享同一份注册表。子容器只持有父容器的弱引用。
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

impl ServiceContainer {
    /// 创建新的根容器
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            inner: Arc::new(ContainerInner::new(None, options)),
        }
    }

    /// 创建子容器
    pub fn create_child(&self) -> Self {
        self.create_child_with(ContainerOptions::default())
    }

    pub fn create_child_with(&self, options: ContainerOptions) -> Self {
        let child = Self {
            inner: Arc::new(ContainerInner::new(Some(Arc::downgrade(&self.inner)), options)),
        };
        tracing::debug!(parent = %self.inner.id, child = %child.inner.id, "Child container created");
        child
    }

    /// 创建作用域：作用域服务在每个作用域容器内各有一个实例
    pub fn create_scope(&self) -> Self {
        self.create_child()
    }

    /// 父容器（已释放时为 `None`）
    pub fn parent(&self) -> Option<ServiceContainer> {
        self.inner.parent().map(|inner| Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn options(&self) -> ContainerOptions {
        self.inner.options
    }

    /// 本地注册数量（含批量注册）
    pub fn len(&self) -> usize {
        self.inner.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 本地注册列表，按注册顺序
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.inner.snapshot().sorted()
    }

    /// 注册回调工厂
    pub fn add_factory<F>(
        &self,
        key: &ServiceKey,
        factory: F,
        lifetime: ServiceLifetime,
        promote: bool,
    ) -> ContainerResult<()>
    where
        F: Fn(&[Instance]) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        key.validate()?;
        let spec = RegistrationSpec {
            lifetime,
            activator: Activator::Factory(Arc::new(factory)),
            origin: RegistrationOrigin::Manual,
        };
        self.insert(key, spec, promote);
        Ok(())
    }

    /// 注册现成的实例，生命周期固定为单例
    pub fn add_instance(&self, key: &ServiceKey, instance: Instance, promote: bool) -> ContainerResult<()> {
        key.validate()?;
        let spec = RegistrationSpec {
            lifetime: ServiceLifetime::Singleton,
            activator: Activator::Instance(instance),
            origin: RegistrationOrigin::Manual,
        };
        self.insert(key, spec, promote);
        Ok(())
    }

    /// 注册实际类型，由构造函数描述解析依赖
    pub fn add_type(
        &self,
        key: &ServiceKey,
        actual: &TypeRef,
        lifetime: ServiceLifetime,
        promote: bool,
    ) -> ContainerResult<()> {
        self.add_type_with_origin(key, actual, lifetime, promote, RegistrationOrigin::Manual)
    }

    pub(crate) fn add_type_with_origin(
        &self,
        key: &ServiceKey,
        actual: &TypeRef,
        lifetime: ServiceLifetime,
        promote: bool,
        origin: RegistrationOrigin,
    ) -> ContainerResult<()> {
        Self::check_type_mapping(key, actual)?;
        let spec = RegistrationSpec {
            lifetime,
            activator: Activator::Type(actual.clone()),
            origin,
        };
        self.insert(key, spec, promote);
        Ok(())
    }

    /// 不注册，只检查 `add_type` 是否会接受该映射
    pub(crate) fn check_type_mapping(key: &ServiceKey, actual: &TypeRef) -> ContainerResult<()> {
        key.validate()?;
        validate_actual(key, actual)
    }

    /// 为预期类型追加一个实际类型，通过 [`get_all`](Self::get_all) 获取
    pub fn add_range(
        &self,
        expected: &TypeRef,
        actual: &TypeRef,
        lifetime: ServiceLifetime,
        promote: bool,
    ) -> ContainerResult<()> {
        let key = ServiceKey::new(expected);
        key.validate()?;
        validate_actual(&key, actual)?;
        let spec = RegistrationSpec {
            lifetime,
            activator: Activator::Type(actual.clone()),
            origin: RegistrationOrigin::Manual,
        };

        let registration = Arc::new(Registration::new(key.clone(), spec));
        self.inner.insert_range(&key, registration.clone());
        if promote {
            let mut current = self.inner.parent();
            while let Some(parent) = current {
                parent.insert_range(&key, registration.clone());
                current = parent.parent();
            }
        }
        tracing::debug!(container = %self.inner.id, key = %key, actual = %actual, ?lifetime, promote, "Range service registered");
        Ok(())
    }

    /// 提升时祖先容器共享同一个注册，单例在整个层级中只有一个实例
    fn insert(&self, key: &ServiceKey, spec: RegistrationSpec, promote: bool) {
        let lifetime = spec.lifetime;
        let registration = Arc::new(Registration::new(key.clone(), spec));
        self.inner.insert(key, registration.clone());
        if promote {
            let mut current = self.inner.parent();
            while let Some(parent) = current {
                parent.insert(key, registration.clone());
                current = parent.parent();
            }
        }
        tracing::debug!(container = %self.inner.id, key = %key, ?lifetime, promote, "Service registered");
    }

    /// 移除服务；返回本地是否有注册被移除
    pub fn remove(&self, key: &ServiceKey, promote: bool) -> ContainerResult<bool> {
        key.validate()?;
        let removed = self.inner.remove(key);
        if promote {
            let mut current = self.inner.parent();
            while let Some(parent) = current {
                parent.remove(key);
                current = parent.parent();
            }
        }
        tracing::debug!(container = %self.inner.id, key = %key, removed, promote, "Service removed");
        Ok(removed)
    }

    /// 检查服务是否已注册
    pub fn contains(&self, key: &ServiceKey, promote: bool) -> ContainerResult<bool> {
        key.validate()?;
        if self.inner.contains(key) {
            return Ok(true);
        }
        if promote {
            let mut current = self.inner.parent();
            while let Some(parent) = current {
                if parent.contains(key) {
                    return Ok(true);
                }
                current = parent.parent();
            }
        }
        Ok(false)
    }

    /// 解析服务；未注册时返回 `None`
    pub fn get(&self, key: &ServiceKey, args: &[Instance]) -> ContainerResult<Option<Instance>> {
        self.get_promoted(key, args, self.inner.options.promote_on_read)
    }

    /// 解析服务，并显式指定未命中时是否查找父容器
    pub fn get_promoted(
        &self,
        key: &ServiceKey,
        args: &[Instance],
        promote: bool,
    ) -> ContainerResult<Option<Instance>> {
        key.validate()?;
        Resolver::new(self.layers(promote, false)).resolve(key, args)
    }

    /// 只从手工注册的固定服务中解析
    pub fn get_fixed(&self, key: &ServiceKey, args: &[Instance]) -> ContainerResult<Option<Instance>> {
        key.validate()?;
        Resolver::new(self.layers(self.inner.options.promote_on_read, true)).resolve(key, args)
    }

    /// 冻结固定服务集合，返回其中的注册数量。只在第一次调用时生效。
    pub fn freeze_fixed(&self) -> usize {
        self.inner.fixed_snapshot().len()
    }

    /// 获取所有可赋值给 `expected` 的服务实例
    pub fn get_all(&self, expected: &TypeInfo, args: &[Instance]) -> ContainerResult<Vec<Instance>> {
        if expected.qualified_name().trim().is_empty() {
            return Err(ContainerError::invalid("expected", "expected type name is blank"));
        }
        Resolver::new(self.layers(self.inner.options.promote_on_read, false)).resolve_all(expected, args)
    }

    /// 获取容器统计信息
    pub fn stats(&self) -> ContainerStats {
        let stats = &self.inner.stats;
        ContainerStats {
            total_resolutions: stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            transient_creations: stats.transient_creations.load(Ordering::Relaxed),
            registered_services: self.len(),
        }
    }

    fn layers(&self, promote: bool, fixed: bool) -> Vec<Layer> {
        let layer = |inner: &Arc<ContainerInner>| Layer {
            map: if fixed { inner.fixed_snapshot() } else { inner.snapshot() },
            container: inner.clone(),
        };

        let mut layers = vec![layer(&self.inner)];
        if promote {
            let mut current = self.inner.parent();
            while let Some(parent) = current {
                layers.push(layer(&parent));
                current = parent.parent();
            }
        }
        layers
    }
}

/// 类型化的便捷方法
impl ServiceContainer {
    /// 以 `T` 为键注册单例实例
    pub fn register_instance<T: Any + Send + Sync>(&self, value: T) -> ContainerResult<()> {
        self.add_instance(&ServiceKey::of::<T>(), Instance::new(value), false)
    }

    /// 以 `T` 为键注册工厂
    pub fn register<T, F>(&self, lifetime: ServiceLifetime, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&[Instance]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.add_factory(
            &ServiceKey::of::<T>(),
            move |args| factory(args).map(Instance::new),
            lifetime,
            false,
        )
    }

    /// 解析以 `T` 为键的服务
    pub fn resolve<T: Any + Send + Sync>(&self, args: &[Instance]) -> ContainerResult<Option<Arc<T>>> {
        self.get_as::<T>(&ServiceKey::of::<T>(), args)
    }

    /// 解析服务并转换为 `T`
    pub fn get_as<T: Any + Send + Sync>(
        &self,
        key: &ServiceKey,
        args: &[Instance],
    ) -> ContainerResult<Option<Arc<T>>> {
        self.get(key, args)?.map(|instance| cast::<T>(&instance)).transpose()
    }

    /// 从固定服务中解析并转换为 `T`
    pub fn get_fixed_as<T: Any + Send + Sync>(
        &self,
        key: &ServiceKey,
        args: &[Instance],
    ) -> ContainerResult<Option<Arc<T>>> {
        self.get_fixed(key, args)?.map(|instance| cast::<T>(&instance)).transpose()
    }

    /// 获取所有服务并转换为 `T`
    pub fn get_all_as<T: Any + Send + Sync>(
        &self,
        expected: &TypeInfo,
        args: &[Instance],
    ) -> ContainerResult<Vec<Arc<T>>> {
        self.get_all(expected, args)?
            .iter()
            .map(cast::<T>)
            .collect()
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .field("registrations", &self.len())
            .field("has_parent", &self.inner.parent().is_some())
            .finish()
    }
}

fn cast<T: Any + Send + Sync>(instance: &Instance) -> ContainerResult<Arc<T>> {
    instance
        .downcast::<T>()
        .ok_or_else(|| ContainerError::TypeCastFailed {
            expected: std::any::type_name::<T>().to_string(),
            actual: instance.type_name().to_string(),
        })
}

fn validate_actual(key: &ServiceKey, actual: &TypeRef) -> ContainerResult<()> {
    if actual.kind() != TypeKind::Concrete {
        return Err(ContainerError::invalid(
            "actual",
            format!("'{}' is not a concrete type", actual),
        ));
    }
    if actual.constructor().is_none() {
        return Err(ContainerError::invalid(
            "actual",
            format!("'{}' has no constructor", actual),
        ));
    }
    // 命名槽位绑定的是参数值，不要求与预期类型兼容
    if key.is_default_slot() && !actual.is_assignable_to(key.expected()) {
        return Err(ContainerError::invalid(
            "actual",
            format!("'{}' is not assignable to '{}'", actual, key.expected()),
        ));
    }
    Ok(())
}

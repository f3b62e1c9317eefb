//! 服务注册信息

use super::{Instance, ServiceKey, ServiceLifetime};
use crate::errors::BoxError;
use crate::infrastructure::catalog::{TypeInfo, TypeKind, TypeRef};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 回调工厂，参数为后期映射的值
pub type InstanceFactory = Arc<dyn Fn(&[Instance]) -> Result<Instance, BoxError> + Send + Sync>;

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// 注册来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOrigin {
    /// 手工注册
    Manual,
    /// 自动映射
    AutoMap,
}

/// 实例的创建方式
#[derive(Clone)]
pub(crate) enum Activator {
    Instance(Instance),
    Factory(InstanceFactory),
    Type(TypeRef),
}

/// 注册描述，不含缓存
pub(crate) struct RegistrationSpec {
    pub(crate) lifetime: ServiceLifetime,
    pub(crate) activator: Activator,
    pub(crate) origin: RegistrationOrigin,
}

/// 一个服务槽位的注册
///
/// 提升注册时祖先容器持有同一个 `Arc<Registration>`，单例缓存因此在整个层级中唯一。
pub struct Registration {
    id: u64,
    key: ServiceKey,
    spec: RegistrationSpec,
    cache: OnceCell<Instance>,
    /// 单例首次构造在此串行化
    lock: Mutex<()>,
    /// 构造函数每个参数依次查找的服务键；后期映射参数为空
    parameter_slots: Vec<Vec<ServiceKey>>,
}

impl Registration {
    pub(crate) fn new(key: ServiceKey, spec: RegistrationSpec) -> Self {
        let cache = match &spec.activator {
            Activator::Instance(instance) => OnceCell::with_value(instance.clone()),
            _ => OnceCell::new(),
        };
        let parameter_slots = parameter_slots(&key, &spec.activator);
        Self {
            id: NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed),
            key,
            spec,
            cache,
            lock: Mutex::new(()),
            parameter_slots,
        }
    }

    /// 全局递增，体现注册顺序
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.spec.lifetime
    }

    pub fn origin(&self) -> RegistrationOrigin {
        self.spec.origin
    }

    /// 绑定的实际类型（回调和实例注册没有）
    pub fn actual_type(&self) -> Option<&TypeRef> {
        match &self.spec.activator {
            Activator::Type(actual) => Some(actual),
            _ => None,
        }
    }

    /// 已缓存的单例实例
    pub fn cached_instance(&self) -> Option<&Instance> {
        self.cache.get()
    }

    pub(crate) fn activator(&self) -> &Activator {
        &self.spec.activator
    }

    pub(crate) fn cache(&self) -> &OnceCell<Instance> {
        &self.cache
    }

    pub(crate) fn construction_lock(&self) -> &Mutex<()> {
        &self.lock
    }

    pub(crate) fn parameter_slots(&self, index: usize) -> &[ServiceKey] {
        self.parameter_slots.get(index).map(Vec::as_slice).unwrap_or_default()
    }
}

/// 查找顺序：所属服务（实际类型、其次服务键类型）的同名槽位、参数类型的同名槽位、
/// 参数类型的默认槽位
fn parameter_slots(key: &ServiceKey, activator: &Activator) -> Vec<Vec<ServiceKey>> {
    let Activator::Type(actual) = activator else {
        return Vec::new();
    };
    let Some(constructor) = actual.constructor() else {
        return Vec::new();
    };

    constructor
        .parameters()
        .iter()
        .map(|parameter| {
            if parameter.is_late_bound() {
                return Vec::new();
            }
            let parameter_type: TypeRef = Arc::new(TypeInfo::new("", parameter.type_name(), TypeKind::Interface));
            let mut slots = vec![ServiceKey::named(actual, parameter.name())];
            if key.expected().qualified_name() != actual.qualified_name() {
                slots.push(ServiceKey::named(key.expected(), parameter.name()));
            }
            slots.push(ServiceKey::named(&parameter_type, parameter.name()));
            slots.push(ServiceKey::new(&parameter_type));
            slots
        })
        .collect()
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("lifetime", &self.spec.lifetime)
            .field("origin", &self.spec.origin)
            .field("actual_type", &self.actual_type().map(|t| t.qualified_name()))
            .finish()
    }
}

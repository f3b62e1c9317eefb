//! 服务解析器
//!
//! 一次顶层解析对应一个 `Resolver`，持有解析开始时的注册表快照链（本地容器在前，
//! 父容器依次在后）。正在构造的注册记录在线程局部栈上，工厂内部再次访问容器
//! 形成的环也能被检测到。

use super::registration::Activator;
use super::registry::{ContainerInner, RegistrationMap};
use super::{Arguments, Instance, Registration, ServiceKey, ServiceLifetime};
use crate::errors::{ContainerError, ContainerResult};
use crate::infrastructure::catalog::{TypeInfo, TypeRef};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

thread_local! {
    static IN_PROGRESS: RefCell<Vec<(u64, ServiceKey)>> = RefCell::new(Vec::new());
}

/// 构造期间的栈帧，离开作用域时出栈
struct InProgress;

impl InProgress {
    fn enter(registration: &Registration) -> ContainerResult<Self> {
        IN_PROGRESS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(id, _)| *id == registration.id()) {
                let mut chain: Vec<String> = stack[start..].iter().map(|(_, key)| key.to_string()).collect();
                chain.push(registration.key().to_string());
                tracing::warn!(chain = %chain.join(" -> "), "Circular dependency detected");
                return Err(ContainerError::CircularDependency { chain });
            }
            stack.push((registration.id(), registration.key().clone()));
            Ok(InProgress)
        })
    }
}

impl Drop for InProgress {
    fn drop(&mut self) {
        IN_PROGRESS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// 快照链中的一层
#[derive(Clone)]
pub(crate) struct Layer {
    pub(crate) container: Arc<ContainerInner>,
    pub(crate) map: Arc<RegistrationMap>,
}

pub(crate) struct Resolver {
    layers: Vec<Layer>,
}

impl Resolver {
    pub(crate) fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// 解析单个服务；未注册时返回 `None`
    pub(crate) fn resolve(&self, key: &ServiceKey, args: &[Instance]) -> ContainerResult<Option<Instance>> {
        match self.find(key) {
            Some((owner, registration)) => self.activate(owner, &registration, args).map(Some),
            None => {
                tracing::trace!(key = %key, "Service not registered");
                Ok(None)
            }
        }
    }

    /// 解析所有可赋值给 `expected` 的服务，按层、再按注册顺序。
    ///
    /// 实际类型相同的注册只产生一次；回调和实例注册以服务键区分。
    pub(crate) fn resolve_all(&self, expected: &TypeInfo, args: &[Instance]) -> ContainerResult<Vec<Instance>> {
        let mut produced = HashSet::new();
        let mut instances = Vec::new();

        for owner in 0..self.layers.len() {
            let map = self.layers[owner].map.clone();
            let mut candidates: Vec<&Arc<Registration>> = map
                .services
                .values()
                .filter(|r| r.key().is_default_slot() && r.key().expected().is_assignable_to(expected))
                .collect();
            for (key, list) in &map.ranges {
                if key.expected().is_assignable_to(expected) {
                    candidates.extend(list.iter());
                }
            }
            candidates.sort_by_key(|r| r.id());

            for registration in candidates {
                let identity = match registration.actual_type() {
                    Some(actual) => actual.qualified_name().to_string(),
                    None => registration.key().to_string(),
                };
                if produced.insert(identity) {
                    instances.push(self.activate(owner, registration, args)?);
                }
            }
        }

        Ok(instances)
    }

    fn find(&self, key: &ServiceKey) -> Option<(usize, Arc<Registration>)> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(index, layer)| layer.map.services.get(key).map(|r| (index, r.clone())))
    }

    /// 按生命周期取得实例
    fn activate(
        &self,
        owner: usize,
        registration: &Arc<Registration>,
        args: &[Instance],
    ) -> ContainerResult<Instance> {
        let requester = self.layers[0].container.clone();
        requester.stats.record_resolution();

        match registration.lifetime() {
            ServiceLifetime::Transient => {
                let _frame = InProgress::enter(registration)?;
                let result = self.construct(registration, args);
                if result.is_ok() {
                    requester.stats.record_transient();
                }
                result
            }
            ServiceLifetime::Singleton => {
                // 单例的依赖从持有该注册的最外层容器开始查找，与请求方无关
                let owner = self.outermost_holder(owner, registration);
                if owner == 0 {
                    let lock = registration.construction_lock();
                    return self.cached(registration.cache(), lock, &requester, registration, args);
                }
                if let Some(instance) = registration.cache().get() {
                    requester.stats.record_hit();
                    return Ok(instance.clone());
                }
                Resolver::new(self.layers[owner..].to_vec()).cached(
                    registration.cache(),
                    registration.construction_lock(),
                    &requester,
                    registration,
                    args,
                )
            }
            ServiceLifetime::Scoped => {
                let slot = requester.scoped_slot(registration);
                self.cached(&slot.cell, &slot.lock, &requester, registration, args)
            }
        }
    }

    /// 提升注册在各层共享同一个 `Registration`，取链上最靠后的那一层
    fn outermost_holder(&self, found: usize, registration: &Registration) -> usize {
        (found + 1..self.layers.len())
            .rev()
            .find(|&index| self.layers[index].map.holds(registration))
            .unwrap_or(found)
    }

    /// 双重检查：先无锁读缓存，未命中时进入该缓存自己的构造锁再检查一次
    fn cached(
        &self,
        cell: &OnceCell<Instance>,
        lock: &Mutex<()>,
        requester: &ContainerInner,
        registration: &Registration,
        args: &[Instance],
    ) -> ContainerResult<Instance> {
        if let Some(instance) = cell.get() {
            requester.stats.record_hit();
            return Ok(instance.clone());
        }

        let _frame = InProgress::enter(registration)?;
        let _guard = lock.lock();
        match cell.get() {
            Some(instance) => {
                requester.stats.record_hit();
                Ok(instance.clone())
            }
            None => self.construct(registration, args).map(|instance| {
                let _ = cell.set(instance.clone());
                requester.stats.record_miss();
                tracing::trace!(
                    container = %self.layers[0].container.id(),
                    key = %registration.key(),
                    lifetime = ?registration.lifetime(),
                    "Cached instance created"
                );
                instance
            }),
        }
    }

    fn construct(&self, registration: &Registration, args: &[Instance]) -> ContainerResult<Instance> {
        match registration.activator() {
            Activator::Instance(instance) => Ok(instance.clone()),
            Activator::Factory(factory) => factory(args).map_err(ContainerError::from_factory),
            Activator::Type(actual) => self.construct_type(registration, actual, args),
        }
    }

    /// 按声明顺序绑定构造函数参数
    fn construct_type(
        &self,
        registration: &Registration,
        actual: &TypeRef,
        args: &[Instance],
    ) -> ContainerResult<Instance> {
        let constructor = actual
            .constructor()
            .ok_or_else(|| ContainerError::invalid("actual", format!("'{}' has no constructor", actual)))?;

        let mut late_bound = args.iter();
        let mut values = Vec::with_capacity(constructor.parameters().len());
        for (index, parameter) in constructor.parameters().iter().enumerate() {
            let resolved = self.resolve_parameter(registration.parameter_slots(index))?;

            let value = match resolved {
                Some(value) => value,
                None => match late_bound.next() {
                    Some(value) => value.clone(),
                    None => parameter.default_value().cloned().ok_or_else(|| {
                        ContainerError::UnresolvableDependency {
                            parameter: parameter.name().to_string(),
                            service: actual.qualified_name().to_string(),
                        }
                    })?,
                },
            };
            values.push(value);
        }

        constructor
            .activate(Arguments::new(actual.qualified_name(), values))
            .map_err(ContainerError::from_factory)
    }

    /// 按注册时算好的槽位顺序查找参数值
    fn resolve_parameter(&self, slots: &[ServiceKey]) -> ContainerResult<Option<Instance>> {
        for candidate in slots {
            if let Some((index, registration)) = self.find(candidate) {
                // 依赖不接收后期映射的值
                return self.activate(index, &registration, &[]).map(Some);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ContainerError;
    use crate::infrastructure::catalog::{Constructor, Parameter, TypeInfo, TypeRef};
    use crate::infrastructure::container::{Instance, ServiceContainer, ServiceKey, ServiceLifetime};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Greeter {
        name: String,
        age: u32,
    }

    fn greeter_type() -> TypeRef {
        TypeInfo::class("App", "Greeter")
            .with_constructor(Constructor::new(
                vec![Parameter::of::<String>("name"), Parameter::of::<u32>("age")],
                |args| {
                    Ok(Instance::new(Greeter {
                        name: args.cloned::<String>(0)?,
                        age: args.cloned::<u32>(1)?,
                    }))
                },
            ))
            .shared()
    }

    /// A 依赖 B，B 依赖 A
    fn cyclic_types() -> (TypeRef, TypeRef) {
        let a_contract = TypeInfo::interface("App", "IA").shared();
        let b_contract = TypeInfo::interface("App", "IB").shared();
        let a = TypeInfo::class("App", "A")
            .implements_type(&a_contract)
            .with_constructor(Constructor::new(
                vec![Parameter::typed("b", &b_contract)],
                |_| Ok(Instance::new(())),
            ))
            .shared();
        let b = TypeInfo::class("App", "B")
            .implements_type(&b_contract)
            .with_constructor(Constructor::new(
                vec![Parameter::typed("a", &a_contract)],
                |_| Ok(Instance::new(())),
            ))
            .shared();
        (a, b)
    }

    #[test]
    fn test_late_bound_arguments_are_positional() {
        let container = ServiceContainer::new();
        let greeter = greeter_type();
        let key = ServiceKey::new(&greeter);
        container
            .add_type(&key, &greeter, ServiceLifetime::Transient, false)
            .unwrap();

        let value = container
            .get_as::<Greeter>(&key, &crate::instances!["Alice".to_string(), 30u32])
            .unwrap()
            .unwrap();
        assert_eq!(value.name, "Alice");
        assert_eq!(value.age, 30);
    }

    #[test]
    fn test_missing_argument_names_parameter() {
        let container = ServiceContainer::new();
        let greeter = greeter_type();
        let key = ServiceKey::new(&greeter);
        container
            .add_type(&key, &greeter, ServiceLifetime::Transient, false)
            .unwrap();

        let err = container
            .get(&key, &crate::instances!["Alice".to_string()])
            .unwrap_err();
        match err {
            ContainerError::UnresolvableDependency { parameter, service } => {
                assert_eq!(parameter, "age");
                assert_eq!(service, "App.Greeter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parameter_defaults() {
        let container = ServiceContainer::new();
        let greeter = TypeInfo::class("App", "Greeter")
            .with_constructor(Constructor::new(
                vec![
                    Parameter::of::<String>("name").late_bound(),
                    Parameter::of::<u32>("age").with_default(18u32),
                ],
                |args| {
                    Ok(Instance::new(Greeter {
                        name: args.cloned::<String>(0)?,
                        age: args.cloned::<u32>(1)?,
                    }))
                },
            ))
            .shared();
        let key = ServiceKey::new(&greeter);
        container
            .add_type(&key, &greeter, ServiceLifetime::Transient, false)
            .unwrap();

        let value = container
            .get_as::<Greeter>(&key, &crate::instances!["Bob".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(value.name, "Bob");
        assert_eq!(value.age, 18);
    }

    #[test]
    fn test_named_slot_takes_priority() {
        let container = ServiceContainer::new();
        let greeter = greeter_type();
        let key = ServiceKey::new(&greeter);
        container
            .add_type(&key, &greeter, ServiceLifetime::Transient, false)
            .unwrap();

        let string_type = Arc::new(TypeInfo::of::<String>());
        container
            .add_instance(&ServiceKey::new(&string_type), Instance::new("Default".to_string()), false)
            .unwrap();
        container
            .add_instance(&ServiceKey::named(&greeter, "name"), Instance::new("Owner".to_string()), false)
            .unwrap();
        container
            .add_instance(&ServiceKey::named(&Arc::new(TypeInfo::of::<u32>()), "age"), Instance::new(41u32), false)
            .unwrap();

        let value = container.get_as::<Greeter>(&key, &[]).unwrap().unwrap();
        assert_eq!(value.name, "Owner");
        assert_eq!(value.age, 41);

        container.remove(&ServiceKey::named(&greeter, "name"), false).unwrap();
        let value = container.get_as::<Greeter>(&key, &[]).unwrap().unwrap();
        assert_eq!(value.name, "Default");
    }

    #[test]
    fn test_circular_dependency_is_reported() {
        let (a, b) = cyclic_types();
        let container = ServiceContainer::new();
        let a_key = ServiceKey::new(&Arc::new(TypeInfo::interface("App", "IA")));
        let b_key = ServiceKey::new(&Arc::new(TypeInfo::interface("App", "IB")));
        container.add_type(&a_key, &a, ServiceLifetime::Singleton, false).unwrap();
        container.add_type(&b_key, &b, ServiceLifetime::Transient, false).unwrap();

        let err = container.get(&a_key, &[]).unwrap_err();
        match err {
            ContainerError::CircularDependency { chain } => {
                assert_eq!(chain, vec!["App.IA", "App.IB", "App.IA"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // 失败的构造不会留下缓存
        assert!(container.get(&a_key, &[]).is_err());
    }

    #[test]
    fn test_reentrant_factory_cycle_is_reported() {
        let container = ServiceContainer::new();
        let inner = container.clone();
        container
            .register(ServiceLifetime::Singleton, move |_| {
                let nested = inner.resolve::<u8>(&[])?;
                Ok(nested.map_or(0u8, |v| *v + 1))
            })
            .unwrap();

        let err = container.resolve::<u8>(&[]).unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { ref chain } if chain.len() == 2));
        // 出错后线程局部栈已清空，再次解析报告同样的错误而不是更长的链
        let err = container.resolve::<u8>(&[]).unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { ref chain } if chain.len() == 2));
    }

    #[test]
    fn test_factory_errors_keep_their_source() {
        #[derive(Debug, thiserror::Error)]
        #[error("disk full")]
        struct DiskFull;

        let container = ServiceContainer::new();
        let key = ServiceKey::of::<Greeter>();
        container
            .add_factory(&key, |_| Err(DiskFull.into()), ServiceLifetime::Singleton, false)
            .unwrap();

        let err = container.get(&key, &[]).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        let source = err.into_construction_source().unwrap();
        assert!(source.downcast_ref::<DiskFull>().is_some());
    }

    #[test]
    fn test_scoped_instances_per_scope() {
        let root = ServiceContainer::new();
        root.register(ServiceLifetime::Scoped, |_| Ok(String::from("request")))
            .unwrap();

        let first = root.create_scope();
        let second = root.create_scope();
        let a1 = first.resolve::<String>(&[]).unwrap().unwrap();
        let a2 = first.resolve::<String>(&[]).unwrap().unwrap();
        let b = second.resolve::<String>(&[]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn test_singleton_is_cached_on_declaring_container() {
        let root = ServiceContainer::new();
        root.register(ServiceLifetime::Singleton, |_| Ok(String::from("shared")))
            .unwrap();

        let first = root.create_child().resolve::<String>(&[]).unwrap().unwrap();
        let second = root.create_child().resolve::<String>(&[]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_all_skips_duplicate_actual_types() {
        let contract = TypeInfo::interface("App", "IPlugin").shared();
        let plugin = |name: &str| {
            let name = name.to_string();
            TypeInfo::class("App", name.clone())
                .implements_type(&contract)
                .with_constructor(Constructor::from_fn(move || name.clone()))
                .shared()
        };

        let root = ServiceContainer::new();
        root.add_range(&contract, &plugin("Alpha"), ServiceLifetime::Transient, false)
            .unwrap();
        let child = root.create_child();
        child
            .add_range(&contract, &plugin("Beta"), ServiceLifetime::Transient, false)
            .unwrap();
        child
            .add_range(&contract, &plugin("Alpha"), ServiceLifetime::Singleton, false)
            .unwrap();

        let names: Vec<String> = child
            .get_all_as::<String>(&contract, &[])
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);
    }
}

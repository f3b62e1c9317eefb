//! 类型目录
//!
//! 自动映射需要的类型描述：命名空间、名称、种类、实现的契约以及可选的构造函数。
//! 目录由调用方提供（显式注册表、构建期生成的代码等），容器只读使用。

use super::container::{Arguments, Instance, ServiceLifetime};
use crate::errors::BoxError;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 共享的类型描述
pub type TypeRef = Arc<TypeInfo>;

/// 构造函数的激活函数
pub type Activation = Arc<dyn Fn(Arguments) -> Result<Instance, BoxError> + Send + Sync>;

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// 接口（契约）
    Interface,
    /// 抽象类型，不能直接实例化
    Abstract,
    /// 具体类型
    Concrete,
}

/// 构造函数参数
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    type_name: String,
    default: Option<Instance>,
    late_bound: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
            late_bound: false,
        }
    }

    /// 参数类型为 Rust 类型 `T`
    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        let (namespace, type_name) = rust_type_path::<T>();
        Self::new(name, qualify(&namespace, &type_name))
    }

    /// 参数类型为目录中的类型
    pub fn typed(name: impl Into<String>, ty: &TypeInfo) -> Self {
        Self::new(name, ty.qualified_name())
    }

    pub fn with_default<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Instance::new(value));
        self
    }

    /// 标记为后期映射参数：只从调用方提供的参数取值
    pub fn late_bound(mut self) -> Self {
        self.late_bound = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn default_value(&self) -> Option<&Instance> {
        self.default.as_ref()
    }

    pub fn is_late_bound(&self) -> bool {
        self.late_bound
    }
}

/// 构造函数描述
#[derive(Clone)]
pub struct Constructor {
    parameters: Vec<Parameter>,
    activation: Activation,
}

impl Constructor {
    pub fn new<F>(parameters: Vec<Parameter>, activation: F) -> Self
    where
        F: Fn(Arguments) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Self {
            parameters,
            activation: Arc::new(activation),
        }
    }

    /// 无参构造函数
    pub fn from_fn<T, F>(create: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(Vec::new(), move |_| Ok(Instance::new(create())))
    }

    /// 使用 `Default` 构造
    pub fn default_of<T: Any + Send + Sync + Default>() -> Self {
        Self::from_fn(T::default)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn activate(&self, arguments: Arguments) -> Result<Instance, BoxError> {
        (self.activation)(arguments)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// 类型描述
#[derive(Debug, Clone)]
pub struct TypeInfo {
    namespace: String,
    name: String,
    qualified_name: String,
    kind: TypeKind,
    contracts: Vec<String>,
    lifetime: Option<ServiceLifetime>,
    attributes: Vec<String>,
    constructor: Option<Constructor>,
}

impl TypeInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: TypeKind) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        Self {
            qualified_name: qualify(&namespace, &name),
            namespace,
            name,
            kind,
            contracts: Vec::new(),
            lifetime: None,
            attributes: Vec::new(),
            constructor: None,
        }
    }

    pub fn interface(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, TypeKind::Interface)
    }

    pub fn abstract_type(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, TypeKind::Abstract)
    }

    pub fn class(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, TypeKind::Concrete)
    }

    /// 描述 Rust 具体类型，命名空间取自模块路径
    pub fn of<T: ?Sized + 'static>() -> Self {
        let (namespace, name) = rust_type_path::<T>();
        Self::class(namespace, name)
    }

    /// 描述 Rust 契约类型，通常是 `dyn Trait`
    pub fn contract<T: ?Sized + 'static>() -> Self {
        let (namespace, name) = rust_type_path::<T>();
        Self::interface(namespace, name)
    }

    pub fn implements(mut self, contract: impl Into<String>) -> Self {
        self.contracts.push(contract.into());
        self
    }

    pub fn implements_type(self, contract: &TypeInfo) -> Self {
        let name = contract.qualified_name.clone();
        self.implements(name)
    }

    /// 显式生命周期标记
    pub fn with_lifetime(mut self, lifetime: ServiceLifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn shared(self) -> TypeRef {
        Arc::new(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// 接口或抽象类型
    pub fn is_contract(&self) -> bool {
        !matches!(self.kind, TypeKind::Concrete)
    }

    pub fn contracts(&self) -> &[String] {
        &self.contracts
    }

    pub fn lifetime(&self) -> Option<ServiceLifetime> {
        self.lifetime
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// 特性比较不区分大小写
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// 本类型的实例能否当作 `target` 使用
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        self.qualified_name == target.qualified_name
            || self.contracts.iter().any(|c| c == &target.qualified_name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

pub(crate) fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// 拆分 Rust 类型名：`a::b::Foo<T>` → (`a.b`, `Foo<T>`)
fn rust_type_path<T: ?Sized + 'static>() -> (String, String) {
    let full = std::any::type_name::<T>();
    let full = full.strip_prefix("dyn ").unwrap_or(full);
    // 去掉 `+ Send + Sync` 之类的附加约束
    let full = full.split(" + ").next().unwrap_or(full);
    let head_end = full.find('<').unwrap_or(full.len());
    match full[..head_end].rfind("::") {
        Some(pos) => (full[..pos].replace("::", "."), full[pos + 2..].to_string()),
        None => (String::new(), full.to_string()),
    }
}

/// 同一来源的一组类型
#[derive(Debug, Clone)]
pub struct TypeGroup {
    pub origin: String,
    pub types: Vec<TypeRef>,
}

/// 类型目录提供者
pub trait TypeCatalog: Send + Sync {
    /// 按来源分组的全部可加载类型
    fn all_types(&self) -> Vec<TypeGroup>;
}

/// 内存中的类型目录
#[derive(Debug, Clone, Default)]
pub struct StaticTypeCatalog {
    groups: Vec<TypeGroup>,
}

impl StaticTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<I>(mut self, origin: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = TypeRef>,
    {
        self.add_types(origin, types);
        self
    }

    /// 追加类型；来源已存在时合并到同一组
    pub fn add_types<I>(&mut self, origin: impl Into<String>, types: I)
    where
        I: IntoIterator<Item = TypeRef>,
    {
        let origin = origin.into();
        match self.groups.iter_mut().find(|g| g.origin == origin) {
            Some(group) => group.types.extend(types),
            None => self.groups.push(TypeGroup {
                origin,
                types: types.into_iter().collect(),
            }),
        }
    }

    pub fn find(&self, qualified_name: &str) -> Option<TypeRef> {
        self.groups
            .iter()
            .flat_map(|g| g.types.iter())
            .find(|t| t.qualified_name() == qualified_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.types.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

impl TypeCatalog for StaticTypeCatalog {
    fn all_types(&self) -> Vec<TypeGroup> {
        self.groups.clone()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_CATALOG: RwLock<StaticTypeCatalog> = RwLock::new(StaticTypeCatalog::new());
}

/// 进程级类型目录的句柄
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalTypeCatalog;

impl TypeCatalog for GlobalTypeCatalog {
    fn all_types(&self) -> Vec<TypeGroup> {
        GLOBAL_CATALOG.read().all_types()
    }
}

/// 获取全局类型目录
pub fn global_catalog() -> GlobalTypeCatalog {
    GlobalTypeCatalog
}

/// 向全局类型目录注册类型
pub fn register_types<I>(origin: impl Into<String>, types: I)
where
    I: IntoIterator<Item = TypeRef>,
{
    GLOBAL_CATALOG.write().add_types(origin, types);
}

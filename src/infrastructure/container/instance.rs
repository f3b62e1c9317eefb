//! 类型擦除的服务实例

use crate::errors::{BoxError, ContainerError};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 容器中流转的服务实例，克隆只增加引用计数
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 安全的类型转换
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    /// 实例的 Rust 类型名称（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 是否为同一个实例
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.value) as *const u8,
            Arc::as_ptr(&other.value) as *const u8,
        )
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 构造函数收到的已绑定参数，顺序与参数声明一致
#[derive(Debug, Clone)]
pub struct Arguments {
    service: String,
    values: Vec<Instance>,
}

impl Arguments {
    pub(crate) fn new(service: impl Into<String>, values: Vec<Instance>) -> Self {
        Self {
            service: service.into(),
            values,
        }
    }

    /// 正在构造的服务
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index)
    }

    /// 按位置取出参数并转换为 `T`
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, BoxError> {
        let instance = self.values.get(index).ok_or_else(|| {
            Box::new(ContainerError::UnresolvableDependency {
                parameter: format!("#{index}"),
                service: self.service.clone(),
            }) as BoxError
        })?;

        instance.downcast::<T>().ok_or_else(|| {
            Box::new(ContainerError::TypeCastFailed {
                expected: std::any::type_name::<T>().to_string(),
                actual: instance.type_name().to_string(),
            }) as BoxError
        })
    }

    /// 取出参数的克隆值
    pub fn cloned<T: Any + Send + Sync + Clone>(&self, index: usize) -> Result<T, BoxError> {
        self.get::<T>(index).map(|value| (*value).clone())
    }
}

/// 构造实例列表
#[macro_export]
macro_rules! instances {
    () => {
        ::std::vec::Vec::<$crate::Instance>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::Instance::new($value)),+]
    };
}

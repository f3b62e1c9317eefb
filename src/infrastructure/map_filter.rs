//! 自动映射筛选器
//!
//! 命名空间表达式由 `|` 分隔的若干模式组成，每个模式是完整命名空间、
//! 以 `*` 结尾的前缀模式或以 `*` 开头的后缀模式，`*` 最多出现一次。

use super::catalog::{qualify, TypeGroup, TypeInfo, TypeKind, TypeRef};
use super::container::ServiceLifetime;
use crate::errors::{ContainerError, ContainerResult};
use std::fmt;
use std::sync::Arc;

/// 单例模式判定策略：`(预期类型, 实际类型) -> 是否单例`
pub type SingletonPolicy = Arc<dyn Fn(&TypeInfo, &TypeInfo) -> bool + Send + Sync>;

const SINGLETON_ATTRIBUTES: &[&str] = &["singleton", "stateless", "shared"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum NamespacePattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl NamespacePattern {
    fn parse(pattern: &str) -> ContainerResult<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ContainerError::invalid("expression", "namespace pattern is blank"));
        }
        if pattern.matches('*').count() > 1 {
            return Err(ContainerError::invalid(
                "expression",
                format!("'{pattern}' contains more than one '*'"),
            ));
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            Ok(Self::Prefix(prefix.trim_end_matches('.').to_string()))
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            Ok(Self::Suffix(suffix.trim_start_matches('.').to_string()))
        } else if pattern.contains('*') {
            Err(ContainerError::invalid(
                "expression",
                format!("'{pattern}' has '*' in the middle"),
            ))
        } else {
            Ok(Self::Exact(pattern.to_string()))
        }
    }

    fn matches(&self, namespace: &str) -> bool {
        match self {
            Self::Exact(exact) => namespace == exact,
            Self::Prefix(prefix) => {
                prefix.is_empty()
                    || namespace == prefix
                    || namespace
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
            Self::Suffix(suffix) => {
                suffix.is_empty()
                    || namespace == suffix
                    || namespace
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
        }
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}.*"),
            Self::Suffix(suffix) => write!(f, "*.{suffix}"),
        }
    }
}

/// 依赖注入的映射筛选器
#[derive(Clone)]
pub struct MapFilter {
    patterns: Vec<NamespacePattern>,
    actual_name_format: Option<String>,
    singleton_policy: SingletonPolicy,
}

impl MapFilter {
    /// 解析命名空间表达式，例如 `App.Services.*|*.Contracts`
    pub fn new(expression: &str) -> ContainerResult<Self> {
        if expression.trim().is_empty() {
            return Err(ContainerError::invalid("expression", "namespace expression is blank"));
        }
        let patterns = expression
            .split('|')
            .map(NamespacePattern::parse)
            .collect::<ContainerResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            actual_name_format: None,
            singleton_policy: Arc::new(default_singleton_policy),
        })
    }

    /// 实际类型完全限定名的格式，`{0}` 为预期类型的命名空间，`{1}` 为去掉前缀 `I` 的名称。
    /// 例如 `{0}.Default{1}`。空白格式等同于未设置。
    pub fn with_actual_name_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.actual_name_format = if format.trim().is_empty() { None } else { Some(format) };
        self
    }

    pub fn with_singleton_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&TypeInfo, &TypeInfo) -> bool + Send + Sync + 'static,
    {
        self.singleton_policy = Arc::new(policy);
        self
    }

    /// 类型是否为预期类型：命名空间匹配且不是具体类型
    pub fn is_expect_type(&self, ty: &TypeInfo) -> bool {
        ty.is_contract() && self.patterns.iter().any(|p| p.matches(ty.namespace()))
    }

    /// 推导实际类型的完全限定名
    pub fn actual_type_name(&self, expected: &TypeInfo) -> String {
        let name = expected.name();
        let base = name.strip_prefix('I').unwrap_or(name);
        match &self.actual_name_format {
            Some(format) => format
                .replace("{0}", expected.namespace())
                .replace("{1}", base),
            None => qualify(expected.namespace(), base),
        }
    }

    /// 在所有分组中查找第一个名称匹配、可赋值给预期类型且带构造函数的具体类型
    pub fn find_actual_type(&self, groups: &[TypeGroup], expected: &TypeInfo) -> Option<TypeRef> {
        let actual_name = self.actual_type_name(expected);
        groups
            .iter()
            .flat_map(|group| group.types.iter())
            .find(|ty| {
                ty.kind() == TypeKind::Concrete
                    && ty.constructor().is_some()
                    && ty.qualified_name() == actual_name
                    && ty.is_assignable_to(expected)
            })
            .cloned()
    }

    pub fn is_singleton_mode(&self, expected: &TypeInfo, actual: &TypeInfo) -> bool {
        (self.singleton_policy)(expected, actual)
    }
}

impl fmt::Debug for MapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = self.patterns.iter().map(ToString::to_string).collect();
        f.debug_struct("MapFilter")
            .field("patterns", &patterns)
            .field("actual_name_format", &self.actual_name_format)
            .finish_non_exhaustive()
    }
}

/// 默认单例策略
///
/// 显式生命周期标记优先（实际类型、其次预期类型）；没有标记时，实际类型带有
/// `singleton`/`stateless`/`shared` 特性或名称以 `Singleton` 结尾即为单例。
pub fn default_singleton_policy(expected: &TypeInfo, actual: &TypeInfo) -> bool {
    if let Some(lifetime) = actual.lifetime().or_else(|| expected.lifetime()) {
        return lifetime == ServiceLifetime::Singleton;
    }
    SINGLETON_ATTRIBUTES.iter().any(|a| actual.has_attribute(a)) || actual.name().ends_with("Singleton")
}

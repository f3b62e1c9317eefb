//! 自动映射
//!
//! 扫描类型目录，把命名空间匹配的契约类型按命名约定绑定到实际类型。

use super::catalog::{global_catalog, TypeCatalog, TypeGroup, TypeInfo, TypeRef};
use super::container::{RegistrationOrigin, ServiceContainer, ServiceKey, ServiceLifetime};
use super::map_filter::MapFilter;
use crate::config::ConfigSource;
use crate::errors::{ContainerError, ContainerResult};
use crate::logging::OperationTimer;

/// 失败时已完成的映射如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commit {
    /// 失败前已添加的映射保留
    #[default]
    BestEffort,
    /// 先规划并校验全部映射，任何一个失败则什么都不添加
    AllOrNothing,
}

/// 每个类型分组内的扫描方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupScan {
    /// 每组映射到第一个预期类型后停止扫描该组
    #[default]
    FirstMatch,
    /// 扫描组内全部类型
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoMapOptions {
    pub commit: Commit,
    pub scan: GroupScan,
}

struct Mapping {
    expected: TypeRef,
    actual: TypeRef,
    lifetime: ServiceLifetime,
}

/// 基于类型目录的自动映射器
pub struct AutoMapper<'a> {
    catalog: &'a dyn TypeCatalog,
    options: AutoMapOptions,
}

impl<'a> AutoMapper<'a> {
    pub fn new(catalog: &'a dyn TypeCatalog) -> Self {
        Self {
            catalog,
            options: AutoMapOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AutoMapOptions) -> Self {
        self.options = options;
        self
    }

    /// 按筛选器映射，返回添加的映射数量。`on_found` 在每个预期类型注册后调用。
    pub fn map<F>(&self, container: &ServiceContainer, filter: &MapFilter, mut on_found: F) -> ContainerResult<usize>
    where
        F: FnMut(&TypeInfo),
    {
        let timer = OperationTimer::new("auto_map")
            .with_metadata("filter", format!("{filter:?}"))
            .with_metadata("commit", format!("{:?}", self.options.commit));
        let groups = self.catalog.all_types();

        let mapped = match self.options.commit {
            Commit::BestEffort => {
                let mut mapped = 0;
                self.scan(&groups, filter, |mapping| {
                    register(container, &mapping)?;
                    on_found(&mapping.expected);
                    mapped += 1;
                    Ok(())
                })?;
                mapped
            }
            Commit::AllOrNothing => {
                let mut planned = Vec::new();
                self.scan(&groups, filter, |mapping| {
                    planned.push(mapping);
                    Ok(())
                })?;
                for mapping in &planned {
                    ServiceContainer::check_type_mapping(&ServiceKey::new(&mapping.expected), &mapping.actual)?;
                }
                for mapping in &planned {
                    register(container, mapping)?;
                    on_found(&mapping.expected);
                }
                planned.len()
            }
        };

        timer.with_metadata("mapped", mapped).finish();
        Ok(mapped)
    }

    /// 按命名空间表达式映射；`format` 为实际类型名称格式，见
    /// [`MapFilter::with_actual_name_format`]
    pub fn map_namespace(
        &self,
        container: &ServiceContainer,
        expression: &str,
        format: Option<&str>,
    ) -> ContainerResult<usize> {
        let mut filter = MapFilter::new(expression)?;
        if let Some(format) = format {
            filter = filter.with_actual_name_format(format);
        }
        self.map(container, &filter, |_| {})
    }

    /// 从设置项读取命名空间表达式后映射
    pub fn map_from_config(
        &self,
        container: &ServiceContainer,
        source: &dyn ConfigSource,
        key: &str,
    ) -> ContainerResult<usize> {
        let expression = source
            .setting(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ContainerError::MissingConfiguration { key: key.to_string() })?;
        tracing::debug!(key, expression = %expression, "Namespace expression read from settings");
        self.map_namespace(container, &expression, None)
    }

    fn scan<F>(&self, groups: &[TypeGroup], filter: &MapFilter, mut visit: F) -> ContainerResult<()>
    where
        F: FnMut(Mapping) -> ContainerResult<()>,
    {
        for group in groups {
            for expected in group.types.iter().filter(|ty| filter.is_expect_type(ty)) {
                let actual = filter.find_actual_type(groups, expected).ok_or_else(|| {
                    tracing::warn!(
                        origin = %group.origin,
                        expected = %expected,
                        actual = %filter.actual_type_name(expected),
                        "No actual mapping type found"
                    );
                    ContainerError::NoMappingFound {
                        expected: expected.qualified_name().to_string(),
                    }
                })?;

                let lifetime = ServiceLifetime::from_singleton_mode(filter.is_singleton_mode(expected, &actual));
                visit(Mapping {
                    expected: expected.clone(),
                    actual,
                    lifetime,
                })?;

                if self.options.scan == GroupScan::FirstMatch {
                    break;
                }
            }
        }
        Ok(())
    }
}

fn register(container: &ServiceContainer, mapping: &Mapping) -> ContainerResult<()> {
    container.add_type_with_origin(
        &ServiceKey::new(&mapping.expected),
        &mapping.actual,
        mapping.lifetime,
        false,
        RegistrationOrigin::AutoMap,
    )?;
    tracing::debug!(
        expected = %mapping.expected,
        actual = %mapping.actual,
        lifetime = ?mapping.lifetime,
        "Type auto mapped"
    );
    Ok(())
}

/// 使用全局类型目录按筛选器映射
pub fn auto_map<F>(container: &ServiceContainer, filter: &MapFilter, on_found: F) -> ContainerResult<usize>
where
    F: FnMut(&TypeInfo),
{
    AutoMapper::new(&global_catalog()).map(container, filter, on_found)
}

/// 使用全局类型目录按命名空间表达式映射
pub fn auto_map_namespace(
    container: &ServiceContainer,
    expression: &str,
    format: Option<&str>,
) -> ContainerResult<usize> {
    AutoMapper::new(&global_catalog()).map_namespace(container, expression, format)
}

/// 使用全局类型目录，从设置项读取命名空间表达式后映射
pub fn auto_map_from_config(
    container: &ServiceContainer,
    source: &dyn ConfigSource,
    key: &str,
) -> ContainerResult<usize> {
    AutoMapper::new(&global_catalog()).map_from_config(container, source, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::catalog::{Constructor, StaticTypeCatalog};
    use std::collections::HashMap;

    fn implementation(contract: &TypeInfo, namespace: &str, name: &str) -> TypeRef {
        TypeInfo::class(namespace, name)
            .implements_type(contract)
            .with_constructor(Constructor::from_fn(|| ()))
            .shared()
    }

    fn catalog() -> StaticTypeCatalog {
        let users = TypeInfo::interface("App.Services", "IUserService");
        let orders = TypeInfo::interface("App.Services", "IOrderService");
        StaticTypeCatalog::new()
            .with_group(
                "services",
                vec![
                    users.clone().shared(),
                    orders.clone().shared(),
                    implementation(&users, "App.Services", "UserService"),
                ],
            )
            .with_group(
                "impl",
                vec![implementation(&orders, "App.Services", "OrderService")],
            )
    }

    #[test]
    fn test_first_match_per_group() {
        let container = ServiceContainer::new();
        let mut found = Vec::new();
        let filter = MapFilter::new("App.Services").unwrap();
        let mapped = AutoMapper::new(&catalog())
            .map(&container, &filter, |ty| found.push(ty.qualified_name().to_string()))
            .unwrap();

        assert_eq!(mapped, 1);
        assert_eq!(found, vec!["App.Services.IUserService"]);
    }

    #[test]
    fn test_exhaustive_scan() {
        let container = ServiceContainer::new();
        let options = AutoMapOptions {
            scan: GroupScan::Exhaustive,
            ..Default::default()
        };
        let mapped = AutoMapper::new(&catalog())
            .with_options(options)
            .map_namespace(&container, "App.Services", None)
            .unwrap();

        assert_eq!(mapped, 2);
        assert!(container
            .registrations()
            .iter()
            .all(|r| r.origin() == RegistrationOrigin::AutoMap));
    }

    #[test]
    fn test_missing_setting() {
        let container = ServiceContainer::new();
        let mut settings = HashMap::new();
        settings.insert("blank".to_string(), "  ".to_string());

        for key in ["absent", "blank"] {
            let err = AutoMapper::new(&catalog())
                .map_from_config(&container, &settings, key)
                .unwrap_err();
            assert!(matches!(err, ContainerError::MissingConfiguration { key: k } if k == key));
        }
    }
}

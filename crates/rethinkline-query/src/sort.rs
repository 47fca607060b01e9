//! 排序编译
//!
//! 方向约定: 指示值为 1 时升序,其余任何值(0、-1 等)均为降序。

use crate::ast::SortSpec;
use crate::term::{OrderKey, SortDirection};
use serde_json::Value;

pub fn direction_of(indicator: &Value) -> SortDirection {
    match indicator.as_f64() {
        Some(n) if n == 1.0 => SortDirection::Asc,
        _ => SortDirection::Desc,
    }
}

/// # Brief
/// 编译排序描述为有序排序键列表
///
/// 映射的迭代顺序即排序优先级(主键、次键……)。
pub fn compile_sort(spec: &SortSpec) -> Vec<OrderKey> {
    spec.iter()
        .map(|(field, indicator)| OrderKey {
            field: field.clone(),
            direction: direction_of(indicator),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direction_convention() {
        assert_eq!(direction_of(&json!(1)), SortDirection::Asc);
        assert_eq!(direction_of(&json!(1.0)), SortDirection::Asc);
        assert_eq!(direction_of(&json!(0)), SortDirection::Desc);
        assert_eq!(direction_of(&json!(-1)), SortDirection::Desc);
        assert_eq!(direction_of(&json!("1")), SortDirection::Desc);
    }

    #[test]
    fn test_order_is_preserved() {
        let mut spec = SortSpec::new();
        spec.insert("b".to_string(), json!(0));
        spec.insert("a".to_string(), json!(1));

        let keys = compile_sort(&spec);
        assert_eq!(keys, vec![OrderKey::desc("b"), OrderKey::asc("a")]);
    }

    #[test]
    fn test_empty_spec() {
        assert!(compile_sort(&SortSpec::new()).is_empty());
    }
}

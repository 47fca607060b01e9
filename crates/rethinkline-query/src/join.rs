//! 关联编译模块
//!
//! 把关联描述序列编译为单个 Merge 投影,每个 alias 对应一个字段:
//! - BelongsTo: 按父行外键取一个子文档
//! - HasMany: 取子键等于父行键的全部子文档
//! - ManyToMany: 先 HasMany 取中间表行,再把每个中间行映射为最终子文档
//!
//! 描述严格按顺序处理。JunctionHop 必须紧跟在填充同一 alias 的 HasMany 之后,
//! 这是位置约定,不从描述内容推断。

use crate::ast::{JoinDescriptor, Lookup};
use crate::term::{Binding, Expr, MergeField};
use crate::{QueryError, QueryResult};
use indexmap::IndexMap;
use tracing::trace;

/// 经过位置校验的关联计划
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPlan {
    BelongsTo(Lookup),
    HasMany(Lookup),
    /// 相邻的两跳: 父 → 中间表,中间表 → 最终子表
    ManyToMany { through: Lookup, hop: Lookup },
}

impl JoinPlan {
    pub fn alias(&self) -> &str {
        match self {
            JoinPlan::BelongsTo(l) | JoinPlan::HasMany(l) => &l.alias,
            JoinPlan::ManyToMany { through, .. } => &through.alias,
        }
    }
}

/// # Brief
/// 校验关联描述序列并配对多对多的两跳
///
/// # Returns
/// 校验后的关联计划,或 InvalidJoinSequence
pub fn validate_joins(descriptors: &[JoinDescriptor]) -> QueryResult<Vec<JoinPlan>> {
    let mut plans: Vec<JoinPlan> = Vec::with_capacity(descriptors.len());

    for (position, descriptor) in descriptors.iter().enumerate() {
        match descriptor {
            JoinDescriptor::BelongsTo(lookup) => plans.push(JoinPlan::BelongsTo(lookup.clone())),
            JoinDescriptor::HasMany(lookup) => plans.push(JoinPlan::HasMany(lookup.clone())),
            JoinDescriptor::JunctionHop(hop) => {
                let previous = position
                    .checked_sub(1)
                    .map(|i| &descriptors[i]);
                match (previous, plans.last()) {
                    (Some(JoinDescriptor::HasMany(through)), Some(JoinPlan::HasMany(_)))
                        if through.alias == hop.alias =>
                    {
                        plans.pop();
                        plans.push(JoinPlan::ManyToMany {
                            through: through.clone(),
                            hop: hop.clone(),
                        });
                    }
                    _ => {
                        return Err(QueryError::InvalidJoinSequence(format!(
                            "junction join #{} (`{}`) must directly follow a has-many join with the same alias",
                            position, hop.alias
                        )));
                    }
                }
            }
        }
    }

    Ok(plans)
}

fn require<'a>(key: &'a Option<String>, what: &str, lookup: &Lookup) -> QueryResult<&'a str> {
    key.as_deref().ok_or_else(|| {
        QueryError::InvalidJoinSequence(format!(
            "join `{}` on `{}` requires {}",
            lookup.alias, lookup.child, what
        ))
    })
}

fn belongs_to(lookup: &Lookup, binding: Binding, primary_key: &str) -> QueryResult<Expr> {
    let parent_key = require(&lookup.parent_key, "parentKey", lookup)?;
    let child_key = lookup.child_key.as_deref().unwrap_or(primary_key);
    Ok(Expr::get(
        lookup.child.as_str(),
        child_key,
        Expr::field_of(binding, parent_key),
    ))
}

fn has_many(lookup: &Lookup, primary_key: &str) -> QueryResult<Expr> {
    let child_key = require(&lookup.child_key, "childKey", lookup)?;
    let parent_key = lookup.parent_key.as_deref().unwrap_or(primary_key);
    Ok(Expr::get_all(lookup.child.as_str(), child_key, Expr::row(parent_key)))
}

/// # Brief
/// 编译单个关联计划为合并字段的值表达式
pub fn compile_join(plan: &JoinPlan, primary_key: &str) -> QueryResult<Expr> {
    match plan {
        JoinPlan::BelongsTo(lookup) => belongs_to(lookup, Binding::Row, primary_key),
        JoinPlan::HasMany(lookup) => has_many(lookup, primary_key),
        JoinPlan::ManyToMany { through, hop } => {
            let junction_rows = has_many(through, primary_key)?;
            let resolve = belongs_to(hop, Binding::Element, primary_key)?;
            Ok(junction_rows.map_items(resolve))
        }
    }
}

/// # Brief
/// 编译关联描述序列为合并投影字段
///
/// 同一 alias 的后续值完全替换之前的值,字段位置保持首次出现的位置。
///
/// # Arguments
/// * `descriptors` - 关联描述序列
/// * `primary_key` - 未指定键时使用的主键字段
pub fn compile_joins(descriptors: &[JoinDescriptor], primary_key: &str) -> QueryResult<Vec<MergeField>> {
    let plans = validate_joins(descriptors)?;
    let mut fields: IndexMap<String, Expr> = IndexMap::with_capacity(plans.len());

    for plan in &plans {
        let value = compile_join(plan, primary_key)?;
        trace!("Compiled join `{}`: {}", plan.alias(), value);
        fields.insert(plan.alias().to_string(), value);
    }

    Ok(fields
        .into_iter()
        .map(|(alias, value)| MergeField::new(alias, value))
        .collect())
}

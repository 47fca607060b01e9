//! 后端查询代数模块
//!
//! 文档存储本身没有关系连接算子,只提供以下可组合原语:
//! - Table: 表扫描
//! - Get: 按键等值查找
//! - Filter: 逐行谓词过滤
//! - OrderBy: 多键排序
//! - Skip/Limit: 分页
//! - Merge: 字段合并投影(用于挂载关联文档)
//!
//! Expr 是行级表达式,Term 是由上述原语串成的查询计划。
//! 编译器通过 QueryHandle 能力接口构造计划,不直接依赖 Term。

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// 字段引用所指向的变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Binding {
    /// 当前行
    Row,
    /// MapItems 中正在映射的数组元素
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        }
    }
}

/// 行级表达式
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Datum {
        value: Value,
    },
    Field {
        binding: Binding,
        name: String,
    },
    Compare {
        cmp: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And {
        args: Vec<Expr>,
    },
    Or {
        args: Vec<Expr>,
    },
    Not {
        arg: Box<Expr>,
    },
    /// 数组包含全部给定值
    Contains {
        collection: Box<Expr>,
        values: Vec<Value>,
    },
    /// 值属于列表
    In {
        value: Box<Expr>,
        list: Vec<Value>,
    },
    /// 正则匹配
    Match {
        subject: Box<Expr>,
        pattern: String,
    },
    /// 按索引取单个文档,不存在时为 null
    Get {
        table: String,
        index: String,
        key: Box<Expr>,
    },
    /// 按索引取全部匹配文档,结果为数组
    GetAll {
        table: String,
        index: String,
        key: Box<Expr>,
    },
    /// 对数组逐元素求值,元素以 Binding::Element 引用
    MapItems {
        source: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn datum(value: impl Into<Value>) -> Self {
        Expr::Datum { value: value.into() }
    }

    pub fn literal_true() -> Self {
        Expr::datum(true)
    }

    pub fn row(name: impl Into<String>) -> Self {
        Expr::Field {
            binding: Binding::Row,
            name: name.into(),
        }
    }

    pub fn element(name: impl Into<String>) -> Self {
        Expr::Field {
            binding: Binding::Element,
            name: name.into(),
        }
    }

    pub fn field_of(binding: Binding, name: impl Into<String>) -> Self {
        Expr::Field {
            binding,
            name: name.into(),
        }
    }

    fn compare(self, cmp: CompareOp, value: Value) -> Self {
        Expr::Compare {
            cmp,
            left: Box::new(self),
            right: Box::new(Expr::Datum { value }),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ne, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Lt, value.into())
    }

    pub fn le(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Le, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Gt, value.into())
    }

    pub fn ge(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ge, value.into())
    }

    pub fn not(self) -> Self {
        Expr::Not { arg: Box::new(self) }
    }

    pub fn contains(self, values: Vec<Value>) -> Self {
        Expr::Contains {
            collection: Box::new(self),
            values,
        }
    }

    pub fn is_in(self, list: Vec<Value>) -> Self {
        Expr::In {
            value: Box::new(self),
            list,
        }
    }

    pub fn matches(self, pattern: impl Into<String>) -> Self {
        Expr::Match {
            subject: Box::new(self),
            pattern: pattern.into(),
        }
    }

    /// 合取。空参数为恒真,单个参数直接返回该参数。
    pub fn and(mut args: Vec<Expr>) -> Self {
        match args.len() {
            0 => Expr::literal_true(),
            1 => args.remove(0),
            _ => Expr::And { args },
        }
    }

    /// 析取。空参数为恒假,单个参数直接返回该参数。
    pub fn or(mut args: Vec<Expr>) -> Self {
        match args.len() {
            0 => Expr::datum(false),
            1 => args.remove(0),
            _ => Expr::Or { args },
        }
    }

    pub fn get(table: impl Into<String>, index: impl Into<String>, key: Expr) -> Self {
        Expr::Get {
            table: table.into(),
            index: index.into(),
            key: Box::new(key),
        }
    }

    pub fn get_all(table: impl Into<String>, index: impl Into<String>, key: Expr) -> Self {
        Expr::GetAll {
            table: table.into(),
            index: index.into(),
            key: Box::new(key),
        }
    }

    pub fn map_items(self, body: Expr) -> Self {
        Expr::MapItems {
            source: Box::new(self),
            body: Box::new(body),
        }
    }
}

fn write_datum(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    write!(f, "{}", value)
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_datum(f, v)?;
    }
    Ok(())
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", a)?;
    }
    Ok(())
}

/// ReQL 风格的单行表示
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Datum { value } => write_datum(f, value),
            Expr::Field { binding: Binding::Row, name } => write!(f, "r.row({:?})", name),
            Expr::Field { binding: Binding::Element, name } => write!(f, "item({:?})", name),
            Expr::Compare { cmp, left, right } => {
                write!(f, "{}.{}({})", left, cmp.as_str(), right)
            }
            Expr::And { args } => {
                f.write_str("r.and(")?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::Or { args } => {
                f.write_str("r.or(")?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::Not { arg } => write!(f, "{}.not()", arg),
            Expr::Contains { collection, values } => {
                write!(f, "{}.contains(", collection)?;
                write_values(f, values)?;
                f.write_str(")")
            }
            Expr::In { value, list } => {
                f.write_str("r.expr([")?;
                write_values(f, list)?;
                write!(f, "]).contains({})", value)
            }
            Expr::Match { subject, pattern } => write!(f, "{}.match({:?})", subject, pattern),
            Expr::Get { table, index, key } => write!(
                f,
                "r.table({:?}).getAll({}, {{index: {:?}}}).nth(0).default(null)",
                table, key, index
            ),
            Expr::GetAll { table, index, key } => write!(
                f,
                "r.table({:?}).getAll({}, {{index: {:?}}}).coerceTo(\"array\")",
                table, key, index
            ),
            Expr::MapItems { source, body } => write!(f, "{}.map(item => {})", source, body),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// 排序键
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderKey {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}({:?})", self.direction.as_str(), self.field)
    }
}

/// 合并投影中的一个字段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeField {
    pub alias: String,
    pub value: Expr,
}

impl MergeField {
    pub fn new(alias: impl Into<String>, value: Expr) -> Self {
        Self {
            alias: alias.into(),
            value,
        }
    }
}

/// 集合句柄能力
///
/// 每个操作都返回新的句柄,原句柄保持不变,因此同一句柄可被多个编译调用共享。
pub trait QueryHandle: Clone {
    fn filter(&self, predicate: Expr) -> Self;
    fn get_by_key(&self, index: &str, key: Value) -> Self;
    fn order_by(&self, keys: Vec<OrderKey>) -> Self;
    fn skip(&self, count: u64) -> Self;
    fn limit(&self, count: u64) -> Self;
    fn merge(&self, fields: Vec<MergeField>) -> Self;
}

/// 查询计划
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "term", rename_all = "snake_case")]
pub enum Term {
    Table {
        name: String,
    },
    Get {
        input: Box<Term>,
        index: String,
        key: Value,
    },
    Filter {
        input: Box<Term>,
        predicate: Expr,
    },
    OrderBy {
        input: Box<Term>,
        keys: Vec<OrderKey>,
    },
    Skip {
        input: Box<Term>,
        count: u64,
    },
    Limit {
        input: Box<Term>,
        count: u64,
    },
    Merge {
        input: Box<Term>,
        fields: Vec<MergeField>,
    },
}

impl Term {
    pub fn table(name: impl Into<String>) -> Self {
        Term::Table { name: name.into() }
    }

    /// 计划最底层的表名
    pub fn table_name(&self) -> &str {
        match self {
            Term::Table { name } => name,
            Term::Get { input, .. }
            | Term::Filter { input, .. }
            | Term::OrderBy { input, .. }
            | Term::Skip { input, .. }
            | Term::Limit { input, .. }
            | Term::Merge { input, .. } => input.table_name(),
        }
    }

    /// 链式 ReQL 表示,例如 `r.table("users").filter(...).limit(1)`
    pub fn to_reql(&self) -> String {
        match self {
            Term::Table { name } => format!("r.table({:?})", name),
            Term::Get { input, index, key } => {
                format!("{}.getAll({}, {{index: {:?}}})", input.to_reql(), key, index)
            }
            Term::Filter { input, predicate } => {
                format!("{}.filter({})", input.to_reql(), predicate)
            }
            Term::OrderBy { input, keys } => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                format!("{}.orderBy({})", input.to_reql(), keys.join(", "))
            }
            Term::Skip { input, count } => format!("{}.skip({})", input.to_reql(), count),
            Term::Limit { input, count } => format!("{}.limit({})", input.to_reql(), count),
            Term::Merge { input, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|m| format!("{:?}: {}", m.alias, m.value))
                    .collect();
                format!("{}.merge({{{}}})", input.to_reql(), fields.join(", "))
            }
        }
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        match self {
            Term::Table { name } => write!(f, "{}Table({})", prefix, name),
            Term::Get { input, index, key } => {
                writeln!(f, "{}Get({} = {})", prefix, index, key)?;
                input.format(f, indent + 1)
            }
            Term::Filter { input, predicate } => {
                writeln!(f, "{}Filter {}", prefix, predicate)?;
                input.format(f, indent + 1)
            }
            Term::OrderBy { input, keys } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} {}", k.field, k.direction.as_str()))
                    .collect();
                writeln!(f, "{}OrderBy({})", prefix, keys.join(", "))?;
                input.format(f, indent + 1)
            }
            Term::Skip { input, count } => {
                writeln!(f, "{}Skip({})", prefix, count)?;
                input.format(f, indent + 1)
            }
            Term::Limit { input, count } => {
                writeln!(f, "{}Limit({})", prefix, count)?;
                input.format(f, indent + 1)
            }
            Term::Merge { input, fields } => {
                let aliases: Vec<&str> = fields.iter().map(|m| m.alias.as_str()).collect();
                writeln!(f, "{}Merge({})", prefix, aliases.join(", "))?;
                input.format(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format(f, 0)
    }
}

impl QueryHandle for Term {
    fn filter(&self, predicate: Expr) -> Self {
        Term::Filter {
            input: Box::new(self.clone()),
            predicate,
        }
    }

    fn get_by_key(&self, index: &str, key: Value) -> Self {
        Term::Get {
            input: Box::new(self.clone()),
            index: index.to_string(),
            key,
        }
    }

    fn order_by(&self, keys: Vec<OrderKey>) -> Self {
        Term::OrderBy {
            input: Box::new(self.clone()),
            keys,
        }
    }

    fn skip(&self, count: u64) -> Self {
        Term::Skip {
            input: Box::new(self.clone()),
            count,
        }
    }

    fn limit(&self, count: u64) -> Self {
        Term::Limit {
            input: Box::new(self.clone()),
            count,
        }
    }

    fn merge(&self, fields: Vec<MergeField>) -> Self {
        Term::Merge {
            input: Box::new(self.clone()),
            fields,
        }
    }
}

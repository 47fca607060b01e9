use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// 查询描述符
///
/// 编译器的唯一输入。各字段缺省时均为无操作。
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct QueryDescriptor {
    /// `where` 过滤条件,None 表示不过滤
    pub filter: Option<Clause>,
    /// 字段 → 方向指示值,按插入顺序决定排序优先级
    pub sort: Option<SortSpec>,
    pub skip: Option<u64>,
    /// 0 表示不限制
    pub limit: Option<u64>,
    pub joins: Option<Vec<JoinDescriptor>>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, clause: Clause) -> Self {
        self.filter = Some(clause);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_joins(mut self, joins: Vec<JoinDescriptor>) -> Self {
        self.joins = Some(joins);
        self
    }
}

/// 排序描述: 字段 → 方向指示值
///
/// 方向指示值为 1 时升序,其他任何值降序。
pub type SortSpec = IndexMap<String, Value>;

/// 过滤子句
///
/// 所有条目以 AND 组合。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    pub entries: Vec<ClauseEntry>,
}

impl Clause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.entries.push(ClauseEntry::Field {
            name: name.into(),
            expression,
        });
        self
    }

    pub fn or(mut self, clauses: Vec<Clause>) -> Self {
        self.entries.push(ClauseEntry::Or(clauses));
        self
    }

    pub fn and(mut self, clauses: Vec<Clause>) -> Self {
        self.entries.push(ClauseEntry::And(clauses));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClauseEntry {
    Field { name: String, expression: Expression },
    Or(Vec<Clause>),
    And(Vec<Clause>),
}

/// 字段级条件
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    /// 字段值属于列表
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// 数组字段包含全部给定值
    Contains(Vec<Value>),
    /// `%` 匹配任意串,`_` 匹配单个字符
    Like(String),
    StartsWith(String),
    EndsWith(String),
}

impl Expression {
    pub fn eq(value: impl Into<Value>) -> Self {
        Expression::Eq(value.into())
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Expression::Ne(value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Expression::Lt(value.into())
    }

    pub fn le(value: impl Into<Value>) -> Self {
        Expression::Le(value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Expression::Gt(value.into())
    }

    pub fn ge(value: impl Into<Value>) -> Self {
        Expression::Ge(value.into())
    }

    pub fn contains(values: Vec<Value>) -> Self {
        Expression::Contains(values)
    }
}

/// 操作符记号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Not,
    Contains,
    Like,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// 识别符号形式与单词形式两套记号
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" | "lessThan" => Some(Operator::LessThan),
            "<=" | "lessThanOrEqual" => Some(Operator::LessThanOrEqual),
            ">" | "greaterThan" => Some(Operator::GreaterThan),
            ">=" | "greaterThanOrEqual" => Some(Operator::GreaterThanOrEqual),
            "!" | "not" => Some(Operator::Not),
            "contains" => Some(Operator::Contains),
            "like" => Some(Operator::Like),
            "startsWith" => Some(Operator::StartsWith),
            "endsWith" => Some(Operator::EndsWith),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Not => "!",
            Operator::Contains => "contains",
            Operator::Like => "like",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 关联描述
///
/// 每个描述只能是三种关联之一。多对多关联由相邻的 HasMany 与 JunctionHop
/// 两个描述共同表达,二者共享同一 alias。
#[derive(Debug, Clone, PartialEq)]
pub enum JoinDescriptor {
    /// 单个子文档: child[child_key] == parent[parent_key]
    BelongsTo(Lookup),
    /// 子文档数组: child[child_key] == parent[parent_key]
    HasMany(Lookup),
    /// 多对多第二跳: 将前一跳得到的中间表行映射为最终子文档
    JunctionHop(Lookup),
}

impl JoinDescriptor {
    pub fn lookup(&self) -> &Lookup {
        match self {
            JoinDescriptor::BelongsTo(l) | JoinDescriptor::HasMany(l) | JoinDescriptor::JunctionHop(l) => l,
        }
    }

    pub fn alias(&self) -> &str {
        &self.lookup().alias
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JoinDescriptor::BelongsTo(_) => "belongs-to",
            JoinDescriptor::HasMany(_) => "has-many",
            JoinDescriptor::JunctionHop(_) => "junction-hop",
        }
    }
}

/// 关联查找参数
///
/// 未给出的键在编译时按主键补齐。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub alias: String,
    pub child: String,
    pub child_key: Option<String>,
    pub parent_key: Option<String>,
}

impl Lookup {
    pub fn new(alias: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            child: child.into(),
            child_key: None,
            parent_key: None,
        }
    }

    pub fn child_key(mut self, key: impl Into<String>) -> Self {
        self.child_key = Some(key.into());
        self
    }

    pub fn parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = Some(key.into());
        self
    }
}

//! 条件表达式模块
//!
//! 为转向规则与 Hook 提供统一的布尔条件求值：
//! - 表达式先编译为 [`Program`]，按原始文本缓存
//! - 求值结果必须是布尔值
//! - 提供基于时间的规则匹配

mod cache;
mod error;
mod eval;
mod lexer;
mod parser;
mod time_rules;


pub use cache::{DashMapProgramCache, ProgramCache};
pub use error::ConditionError;
pub use time_rules::{is_in_day_range, is_in_hour_range};

use crate::steering::TimeBasedRule;
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde_json::Value;
use std::sync::Arc;

/// 可作为条件求值上下文的类型
///
/// 返回的 JSON 对象即表达式中可见的顶层标识符。
pub trait ConditionContext {
    fn condition_env(&self) -> Value;
}

impl ConditionContext for Value {
    fn condition_env(&self) -> Value {
        self.clone()
    }
}

/// 编译后的条件程序
#[derive(Debug)]
pub struct Program {
    source: String,
    expr: parser::Expr,
}

impl Program {
    /// 编译条件文本（仅检查语法）
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let expr = parser::parse(source).map_err(|e| ConditionError::Compile {
            condition: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 在给定环境下执行，返回任意类型的结果
    pub fn run(&self, env: &Value) -> Result<Value, ConditionError> {
        eval::eval(&self.expr, env).map_err(|message| ConditionError::Eval {
            condition: self.source.clone(),
            message,
        })
    }
}

/// 空条件或 `true` 无需编译
fn is_trivially_true(condition: &str) -> bool {
    let trimmed = condition.trim();
    trimmed.is_empty() || trimmed == "true"
}

/// 条件求值器
pub struct ConditionEvaluator {
    cache: Arc<dyn ProgramCache>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(DashMapProgramCache::new()))
    }

    /// 使用自定义缓存实现
    pub fn with_cache(cache: Arc<dyn ProgramCache>) -> Self {
        Self { cache }
    }

    /// 编译条件并写入缓存
    ///
    /// 同一文本并发首次编译时，所有调用者拿到同一份缓存结果。
    pub fn compile(&self, condition: &str) -> Result<Arc<Program>, ConditionError> {
        if let Some(program) = self.cache.get(condition) {
            return Ok(program);
        }
        let program = Arc::new(Program::compile(condition)?);
        Ok(self.cache.insert(condition, program))
    }

    /// 加载期校验：平凡条件直接通过，其余必须能编译
    pub fn validate(&self, condition: &str) -> Result<(), ConditionError> {
        if is_trivially_true(condition) {
            return Ok(());
        }
        self.compile(condition).map(|_| ())
    }

    /// 对上下文求值条件
    ///
    /// # Arguments
    /// * `condition` - 条件文本，空串或 `true` 直接返回 `true`
    /// * `ctx` - 求值上下文
    pub fn evaluate<C>(&self, condition: &str, ctx: &C) -> Result<bool, ConditionError>
    where
        C: ConditionContext + ?Sized,
    {
        if is_trivially_true(condition) {
            return Ok(true);
        }

        let program = self.compile(condition)?;
        match program.run(&ctx.condition_env())? {
            Value::Bool(result) => Ok(result),
            other => Err(ConditionError::NotBoolean {
                condition: condition.to_string(),
                actual: eval::type_name(&other).to_string(),
            }),
        }
    }

    /// 时间规则是否命中当前时间
    pub fn check_time_rule<Tz: TimeZone>(&self, rule: &TimeBasedRule, now: &DateTime<Tz>) -> bool {
        is_in_hour_range(now.hour(), &rule.hours) && is_in_day_range(now.weekday(), &rule.days)
    }

    /// 清空编译缓存
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_programs(&self) -> usize {
        self.cache.len()
    }
}

//! 条件表达式错误类型

use thiserror::Error;

/// 条件编译/求值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    /// 编译失败（词法或语法错误）
    #[error("failed to compile condition '{condition}': {message}")]
    Compile { condition: String, message: String },

    /// 运行期求值失败（类型不匹配、非法正则等）
    #[error("failed to run condition '{condition}': {message}")]
    Eval { condition: String, message: String },

    /// 表达式结果不是布尔值
    #[error("condition '{condition}' did not return a boolean (got {actual})")]
    NotBoolean { condition: String, actual: String },
}

impl ConditionError {
    /// 是否为编译期错误
    pub fn is_compile_error(&self) -> bool {
        matches!(self, ConditionError::Compile { .. })
    }

    /// 出错的原始条件文本
    pub fn condition(&self) -> &str {
        match self {
            ConditionError::Compile { condition, .. }
            | ConditionError::Eval { condition, .. }
            | ConditionError::NotBoolean { condition, .. } => condition,
        }
    }
}

/// 词法/语法阶段的内部错误，携带出错位置
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub position: usize,
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.position)
    }
}

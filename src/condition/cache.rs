//! 已编译条件的缓存

use super::Program;
use dashmap::DashMap;
use std::sync::Arc;

/// 编译结果缓存，以原始条件文本为键
pub trait ProgramCache: Send + Sync {
    /// 查找已编译的程序
    fn get(&self, source: &str) -> Option<Arc<Program>>;

    /// 插入程序；若其他线程已抢先插入，返回已缓存的那一份
    fn insert(&self, source: &str, program: Arc<Program>) -> Arc<Program>;

    /// 清空缓存
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 基于 DashMap 的默认实现
#[derive(Default)]
pub struct DashMapProgramCache {
    programs: DashMap<String, Arc<Program>>,
}

impl DashMapProgramCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgramCache for DashMapProgramCache {
    fn get(&self, source: &str) -> Option<Arc<Program>> {
        self.programs.get(source).map(|entry| entry.value().clone())
    }

    fn insert(&self, source: &str, program: Arc<Program>) -> Arc<Program> {
        self.programs
            .entry(source.to_string())
            .or_insert(program)
            .value()
            .clone()
    }

    fn clear(&self) {
        self.programs.clear();
    }

    fn len(&self) -> usize {
        self.programs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_program() {
        let cache = DashMapProgramCache::new();
        let first = Arc::new(Program::compile("Hour > 1").unwrap());
        let second = Arc::new(Program::compile("Hour > 1").unwrap());

        let stored = cache.insert("Hour > 1", first.clone());
        assert!(Arc::ptr_eq(&stored, &first));

        let raced = cache.insert("Hour > 1", second);
        assert!(Arc::ptr_eq(&raced, &first));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("Hour > 1").is_none());
    }
}

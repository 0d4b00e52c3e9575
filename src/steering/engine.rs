//! 转向引擎
//!
//! 负责规则的加载、匹配、决策与热重载。

use super::injection::{apply_provider_settings, format_context_injection, inject_system_prompt};
use super::types::{ChatMessage, RoutingContext, SteeringDecision, SteeringRule};
use crate::condition::ConditionEvaluator;
use crate::loader::{ensure_dir, scan_yaml_files, LoadError};
use crate::telemetry::MetricsRegistry;
use crate::watcher::{DirWatcher, WatchError, DEFAULT_DEBOUNCE};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 转向目录下自动创建的子目录
const STEERING_SUBDIRS: [&str; 3] = ["intents", "providers", "users"];

/// 默认转向目录：`~/.switchailocal/steering`
pub fn default_steering_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchailocal")
        .join("steering")
}

/// 转向引擎
pub struct SteeringEngine {
    steering_dir: PathBuf,
    /// 当前生效的规则集，整体替换
    rules: RwLock<Arc<Vec<Arc<SteeringRule>>>>,
    evaluator: ConditionEvaluator,
    watcher: Mutex<Option<DirWatcher>>,
    metrics: Arc<MetricsRegistry>,
}

impl SteeringEngine {
    /// 创建转向引擎
    ///
    /// # Arguments
    /// * `steering_dir` - 规则目录，`None` 时使用默认目录
    /// * `metrics` - 共享计数器
    pub fn new(steering_dir: Option<PathBuf>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            steering_dir: steering_dir.unwrap_or_else(default_steering_dir),
            rules: RwLock::new(Arc::new(Vec::new())),
            evaluator: ConditionEvaluator::new(),
            watcher: Mutex::new(None),
            metrics,
        }
    }

    pub fn steering_dir(&self) -> &Path {
        &self.steering_dir
    }

    /// 首次使用时创建目录及分类子目录
    fn bootstrap_dir(&self) -> Result<(), LoadError> {
        if self.steering_dir.exists() {
            return Ok(());
        }
        ensure_dir(&self.steering_dir)?;
        for sub in STEERING_SUBDIRS {
            let path = self.steering_dir.join(sub);
            if let Err(e) = fs::create_dir_all(&path) {
                tracing::warn!("[STEERING] 创建子目录 {} 失败: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// 解析单个规则文件并校验条件
    fn load_rule_file(&self, path: &Path) -> Option<SteeringRule> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("[STEERING] 读取规则文件 {} 失败: {}", path.display(), e);
                return None;
            }
        };

        let mut rule: SteeringRule = match serde_yaml::from_str(&content) {
            Ok(rule) => rule,
            Err(e) => {
                tracing::error!("[STEERING] 解析规则文件 {} 失败: {}", path.display(), e);
                return None;
            }
        };

        if let Err(e) = self.evaluator.validate(&rule.activation.condition) {
            tracing::error!(
                "[STEERING] 规则 '{}' 条件无效，已跳过 ({}): {}",
                rule.name,
                path.display(),
                e
            );
            return None;
        }

        rule.file_path = path.to_path_buf();
        tracing::debug!("[STEERING] 已加载规则 '{}' 来自 {}", rule.name, path.display());
        Some(rule)
    }

    /// 从目录加载全部规则并原子替换当前规则集
    ///
    /// 单个文件出错只跳过该文件；返回成功加载的规则数。
    pub fn load_rules(&self) -> Result<usize, LoadError> {
        self.bootstrap_dir()?;
        let scan = scan_yaml_files(&self.steering_dir, "STEERING")?;
        self.metrics.rules_skipped.add(scan.skipped.len() as u64);

        let mut rules = Vec::with_capacity(scan.files.len());
        for path in &scan.files {
            match self.load_rule_file(path) {
                Some(rule) => rules.push(Arc::new(rule)),
                None => self.metrics.rules_skipped.inc(),
            }
        }

        // 稳定排序：同优先级保持扫描顺序
        rules.sort_by(|a, b| b.activation.priority.cmp(&a.activation.priority));

        let count = rules.len();
        *self.rules.write() = Arc::new(rules);
        self.evaluator.clear_cache();
        self.metrics.rules_loaded.add(count as u64);

        tracing::info!("[STEERING] 成功加载 {} 条转向规则", count);
        Ok(count)
    }

    /// 当前规则集快照
    pub fn rules(&self) -> Arc<Vec<Arc<SteeringRule>>> {
        self.rules.read().clone()
    }

    /// 找出条件成立的规则（按优先级降序）
    ///
    /// 求值出错的规则记录日志并视为不匹配。
    pub fn find_matching_rules(&self, ctx: &RoutingContext) -> Vec<Arc<SteeringRule>> {
        let rules = self.rules();
        let mut matches = Vec::new();

        for rule in rules.iter() {
            match self.evaluator.evaluate(&rule.activation.condition, ctx) {
                Ok(true) => matches.push(rule.clone()),
                Ok(false) => {}
                Err(e) => {
                    self.metrics.condition_errors.inc();
                    tracing::warn!("[STEERING] 规则 '{}' 条件求值失败: {}", rule.name, e);
                }
            }
        }

        self.metrics.rule_matches.add(matches.len() as u64);
        matches
    }

    /// 应用命中的规则，生成转向结果
    ///
    /// 只有优先级最高的规则生效，其余命中规则被忽略。
    /// 规则内时间规则的 `prefer_model` 优先于 `primary_model`。
    pub fn apply_steering(
        &self,
        ctx: &RoutingContext,
        messages: &[ChatMessage],
        metadata: Option<Map<String, Value>>,
        matched: &[Arc<SteeringRule>],
    ) -> SteeringDecision {
        let Some(rule) = matched.first() else {
            return SteeringDecision {
                model: None,
                messages: messages.to_vec(),
                metadata,
                rule: None,
                reason: None,
            };
        };

        let prefs = &rule.preferences;
        let mut decision = SteeringDecision {
            model: None,
            messages: messages.to_vec(),
            metadata,
            rule: Some(rule.name.clone()),
            reason: None,
        };

        let time_override = prefs
            .time_based_rules
            .iter()
            .filter(|tr| !tr.prefer_model.is_empty())
            .find(|tr| self.evaluator.check_time_rule(tr, &ctx.timestamp));

        if let Some(tr) = time_override {
            tracing::debug!(
                "[STEERING] 规则 '{}' 命中时间规则，偏好模型 {}",
                rule.name,
                tr.prefer_model
            );
            decision.model = Some(tr.prefer_model.clone());
            if !tr.reason.is_empty() {
                decision.reason = Some(tr.reason.clone());
            }
        } else if !prefs.primary_model.is_empty() {
            decision.model = Some(prefs.primary_model.clone());
        }

        if !prefs.context_injection.is_empty() {
            let prompt = format_context_injection(&prefs.context_injection, ctx);
            decision.messages = inject_system_prompt(&decision.messages, &prompt);
        }

        decision.metadata = apply_provider_settings(decision.metadata.take(), &prefs.provider_settings);

        if matched.len() > 1 {
            tracing::debug!(
                "[STEERING] 规则 '{}' 生效，忽略其余 {} 条低优先级规则",
                rule.name,
                matched.len() - 1
            );
        }

        self.metrics.steering_decisions.inc();
        decision
    }

    /// 启动目录监听，文件变更后自动重载
    pub fn start_watcher(self: &Arc<Self>) -> Result<(), WatchError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let watcher = DirWatcher::start(
            &self.steering_dir,
            "STEERING",
            DEFAULT_DEBOUNCE,
            Arc::new(move || {
                let Some(engine) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = engine.load_rules() {
                    tracing::error!("[STEERING] 重载转向规则失败: {}", e);
                }
            }),
        )?;
        *slot = Some(watcher);
        Ok(())
    }

    /// 停止目录监听，可重复调用
    pub fn stop_watcher(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}

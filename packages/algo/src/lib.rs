//! # recall-algo - 间隔重复调度核心算法库
//!
//! 本 crate 提供纯 Rust 实现的记忆调度算法:
//!
//! - **FSRS Scheduler** - 稳定性 / 难度 / 可提取性的连续状态记忆模型
//! - **Due-item Selection** - 到期复习项筛选、冷却期过滤与新题补足
//!
//! ## 设计理念
//!
//! - **纯函数** - 调度器无 I/O、无共享可变状态，持久化由调用方负责
//! - **永不失败** - 越界评分被截断，损坏的状态被防御性修正
//! - **固定权重** - 17 个 FSRS 权重为编译期常量，运行时不可修改
//!
//! ## 模块结构
//!
//! - [`fsrs`] - FSRS 更新公式 (首次复习、遗忘、回忆、下次到期)
//! - [`selection`] - 到期项选择策略 (冷却期、批量补足)
//! - [`sanitize`] - 数据清洗 (稳定性下限、难度截断)
//! - [`types`] - 公共类型和常量
//!
//! ## 使用示例
//!
//! ```rust
//! use chrono::Utc;
//! use recall_algo::{fsrs_update, MemoryState, Rating};
//!
//! let now = Utc::now();
//! let state = fsrs_update(&MemoryState::default(), Rating::Good, now);
//! assert_eq!(state.repetitions, 1);
//! assert_eq!(state.stability, 2.4);
//!
//! // 越界评分会被截断到 1..=4
//! let again = fsrs_update(&state, 0, now);
//! assert_eq!(again.lapses, 1);
//! ```

// ============================================================================
// 模块声明
// ============================================================================

pub mod fsrs;
pub mod sanitize;
pub mod selection;
pub mod types;

// ============================================================================
// 重新导出
// ============================================================================

/// 重新导出所有公共类型
pub use types::*;

/// 重新导出 FSRS 调度器
pub use fsrs::{
    due_after, fsrs_retrievability, fsrs_review, fsrs_update, next_interval_days, retrievability_at,
    MAX_INTERVAL_DAYS,
};

/// 重新导出到期项选择策略
pub use selection::{select_batch, DuePolicy, NewItemOrder, ReviewCandidate, Selection};

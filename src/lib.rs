//! # ssmap-rust
//!
//! 基于检索方案（search schemes）与双向 FM 索引的 DNA 短 read 近似匹配器。
//!
//! 给定预先索引的参考文本 T 与一组模式串，报告 T 中所有编辑距离或
//! Hamming 距离不超过 k 的子串出现位置（k ∈ 0..=4）。核心包括：
//!
//! - **双向 FM 索引**：正反两个 BWT 上的 LF 映射，支持左右两个方向的
//!   O(1) 区间扩展；稀疏采样 SA 经 LF 回溯定位。
//! - **检索方案驱动**：把模式切成若干部件，按方案给定的访问顺序 π 与
//!   累计误差上下界 L/U 做双向递归扩展；内置 Kucherov、Kianfar、
//!   鸽笼、01*0 等方案，也可从目录加载自定义方案。
//! - **位并行带状编辑距离**（Myers/Hyyrö 风格）：索引内剪枝与文本内
//!   校验共用；区间足够窄时直接切到文本内校验收尾。
//! - **命中汇总**：两路命中去重合并，终末回溯装配 CIGAR。
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use ssmap_rust::index::fm::FMIndex;
//! use ssmap_rust::search::{Counters, MatchOpt, Matcher, Strategy};
//! use ssmap_rust::util::dna;
//!
//! // 构建索引（实际使用中通过 `ssmap index` 预构建并落盘）
//! let mut text = dna::encode_reference(b"ACGTACGTAGCTGATCGTAG").unwrap();
//! text.push(0);
//! let index = FMIndex::build(text, 2, 64);
//!
//! // 以 kuch1 方案做 k=1 的近似匹配
//! let strategy = Strategy::builtin("kuch1").unwrap();
//! let opt = MatchOpt { max_ed: 1, ..Default::default() };
//! let matcher = Matcher::new(&index, &strategy, opt).unwrap();
//! let mut counters = Counters::default();
//! for occ in matcher.match_approx(b"GCTGATC", &mut counters) {
//!     println!("{}..{} ED={} CIGAR={}", occ.range.begin, occ.range.end, occ.distance, occ.cigar);
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — reads 文件解析（FASTA / FASTQ / CSV）
//! - [`index`] — 后缀数组、BWT 与双向 FM 索引
//! - [`search`] — 检索方案、切分、匹配驱动与命中汇总
//! - [`util`] — DNA 编码 / 反向互补

pub mod io;
pub mod index;
pub mod search;
pub mod util;

pub mod driver;
pub mod matrix;
pub mod occ;
pub mod partition;
pub mod scheme;

use anyhow::{bail, Result};

use crate::index::fm::FMIndex;
use crate::search::matrix::BitParallelED;
use crate::search::occ::{finalize, Occurrences};
use crate::util::dna;

pub use occ::{FMOcc, TextOcc};
pub use partition::{partition, Part, PartitionPolicy};
pub use scheme::{Search, SchemeForK, Strategy, MAX_SCHEME_ED};

/// 距离度量：Hamming（无 DP）、朴素编辑（逐结点整带重算）、
/// 优化编辑（跨部件复用 DP 状态，默认）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Hamming,
    EditNaive,
    EditOpt,
}

/// 每次 match_approx 的统计量。宿主可以跨 read 累加。
#[derive(Debug, Default, Clone)]
pub struct Counters {
    /// 访问的索引结点数（非空扩展次数）
    pub nodes: u64,
    /// 去重前报告的文本位置数
    pub reported_positions: u64,
    /// 经纯索引内匹配产出的最终命中数
    pub cigars_in_index: u64,
    /// 文本内校验产出的 CIGAR 数
    pub cigars_in_text: u64,
    /// 文本内校验产出且在去重后存活的命中数
    pub useful_cigars_in_text: u64,
    /// 启动的文本内校验次数
    pub in_text_started: u64,
    /// 带提前死亡的文本内校验次数
    pub aborted_in_text: u64,
    /// 首部件之后立即切换文本内校验的次数
    pub immediate_switch: u64,
    /// 实际启动的检索条数（种子为空的不计）
    pub searches_started: u64,
}

impl Counters {
    pub fn merge(&mut self, other: &Counters) {
        self.nodes += other.nodes;
        self.reported_positions += other.reported_positions;
        self.cigars_in_index += other.cigars_in_index;
        self.cigars_in_text += other.cigars_in_text;
        self.useful_cigars_in_text += other.useful_cigars_in_text;
        self.in_text_started += other.in_text_started;
        self.aborted_in_text += other.aborted_in_text;
        self.immediate_switch += other.immediate_switch;
        self.searches_started += other.searches_started;
    }
}

/// 匹配选项
#[derive(Debug, Clone, Copy)]
pub struct MatchOpt {
    pub max_ed: usize,
    pub partition: PartitionPolicy,
    pub metric: DistanceMetric,
    /// 区间宽度低于该阈值时切换文本内校验
    pub switch_point: usize,
}

impl Default for MatchOpt {
    fn default() -> Self {
        Self {
            max_ed: 0,
            partition: PartitionPolicy::Dynamic,
            metric: DistanceMetric::EditOpt,
            switch_point: 5,
        }
    }
}

/// 匹配器：持有只读索引与策略记录，自身无可变状态，
/// 每次 match_approx 的缓冲都在调用内创建并随调用释放。
pub struct Matcher<'a> {
    index: &'a FMIndex,
    strategy: &'a Strategy,
    opt: MatchOpt,
}

impl<'a> Matcher<'a> {
    /// 构造并做一次性配置校验（不支持的 (方案, k) 组合在这里报错）。
    pub fn new(index: &'a FMIndex, strategy: &'a Strategy, opt: MatchOpt) -> Result<Self> {
        if opt.max_ed > MAX_SCHEME_ED {
            bail!("max distance {} is not allowed, should be in [0, {}]", opt.max_ed, MAX_SCHEME_ED);
        }
        if opt.max_ed >= 1 && !strategy.naive && !strategy.supports(opt.max_ed) {
            bail!(
                "scheme '{}' does not support max distance {}",
                strategy.name,
                opt.max_ed
            );
        }
        Ok(Self { index, strategy, opt })
    }

    /// 近似匹配一条 read（ASCII 字节）。含非 ACGT 字符或比部件数短的
    /// 模式静默返回空结果。输出按（起点，距离）排序且已去重。
    pub fn match_approx(&self, read: &[u8], counters: &mut Counters) -> Vec<TextOcc> {
        let pattern = dna::encode_pattern(read);
        if pattern.is_empty() || pattern.contains(&dna::INVALID) {
            return Vec::new();
        }
        let k = self.opt.max_ed;

        if k == 0 {
            let m = pattern.len();
            let out: Vec<TextOcc> = self
                .index
                .exact_matches(&pattern)
                .into_iter()
                .map(|p| TextOcc::new(p, p + m, 0, format!("{}M", m), false))
                .collect();
            counters.reported_positions += out.len() as u64;
            counters.cigars_in_index += out.len() as u64;
            return out;
        }

        let mut occ = Occurrences::new();
        if self.strategy.naive {
            driver::naive_backtracking(self.index, &pattern, k, self.opt.metric, &mut occ, counters);
        } else {
            // Matcher::new 已校验支持性
            let scheme = match self.strategy.scheme(k) {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            };
            let partitioned =
                partition(self.index, &pattern, scheme, self.opt.partition, counters);
            let (parts, ranges) = match partitioned {
                Some(v) => v,
                None => return Vec::new(),
            };
            let mut drv = driver::Driver::new(
                self.index,
                &pattern,
                self.opt.metric,
                k,
                self.opt.switch_point,
            );
            for search in &scheme.searches {
                drv.run_search(search, &parts, &ranges, &mut occ, counters);
            }
        }
        self.assemble(&pattern, occ, counters)
    }

    /// 汇总两路命中：索引内命中定位后做终末回溯装配 CIGAR，
    /// 再与文本内命中合并去重。
    fn assemble(
        &self,
        pattern: &[u8],
        mut occ: Occurrences,
        counters: &mut Counters,
    ) -> Vec<TextOcc> {
        occ.dedup_index();
        let mut all = std::mem::take(&mut occ.in_text);
        let mut bp = BitParallelED::new();
        for fmo in &occ.in_index {
            for p in self.index.locate(&fmo.pair) {
                let end = p + fmo.length;
                if self.opt.metric == DistanceMetric::Hamming {
                    all.push(TextOcc::new(
                        p,
                        end,
                        fmo.distance,
                        format!("{}M", pattern.len()),
                        false,
                    ));
                } else {
                    let (d, cigar) =
                        driver::realign(&mut bp, pattern, &self.index.text[p..end], self.opt.max_ed);
                    all.push(TextOcc::new(p, end, d, cigar, false));
                }
            }
        }
        counters.reported_positions += all.len() as u64;
        let merged = finalize(all);
        for o in &merged {
            if o.from_text {
                counters.useful_cigars_in_text += 1;
            } else {
                counters.cigars_in_index += 1;
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::matrix::banded_edit_distance;
    use std::collections::BTreeMap;

    fn toy_index(seq: &[u8]) -> FMIndex {
        let mut text = dna::encode_reference(seq).unwrap();
        text.push(0);
        FMIndex::build(text, 1, 4)
    }

    /// 简单 LCG 生成的确定性伪随机参考序列
    fn make_reference(len: usize) -> Vec<u8> {
        let bases = [b'A', b'C', b'G', b'T'];
        let mut seq = Vec::with_capacity(len);
        let mut x: u32 = 42;
        for _ in 0..len {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            seq.push(bases[(x >> 16) as usize % 4]);
        }
        seq
    }

    fn run(
        index: &FMIndex,
        scheme: &str,
        read: &[u8],
        k: usize,
        policy: PartitionPolicy,
        metric: DistanceMetric,
        switch_point: usize,
    ) -> Vec<TextOcc> {
        let strategy = Strategy::builtin(scheme).unwrap();
        let opt = MatchOpt { max_ed: k, partition: policy, metric, switch_point };
        let matcher = Matcher::new(index, &strategy, opt).unwrap();
        let mut counters = Counters::default();
        matcher.match_approx(read, &mut counters)
    }

    /// 起点 → 最小距离（对集合性质做比较用）
    fn starts_map(occs: &[TextOcc]) -> BTreeMap<usize, usize> {
        let mut map = BTreeMap::new();
        for o in occs {
            let e = map.entry(o.range.begin).or_insert(o.distance);
            if o.distance < *e {
                *e = o.distance;
            }
        }
        map
    }

    /// 暴力真值：每个起点上任意窗口的最小编辑距离（≤ k 才记录）
    fn brute_force_edit(seq: &[u8], read: &[u8], k: usize) -> BTreeMap<usize, usize> {
        let text = dna::encode_pattern(seq);
        let pat = dna::encode_pattern(read);
        let m = pat.len();
        let mut map = BTreeMap::new();
        for start in 0..text.len() {
            let mut best: Option<usize> = None;
            let lo = m.saturating_sub(k);
            for len in lo..=(m + k) {
                if start + len > text.len() {
                    break;
                }
                if let Some(d) = banded_edit_distance(&pat, &text[start..start + len], k) {
                    if best.map(|b| d < b).unwrap_or(true) {
                        best = Some(d);
                    }
                }
            }
            if let Some(d) = best {
                map.insert(start, d);
            }
        }
        map
    }

    fn brute_force_hamming(seq: &[u8], read: &[u8], k: usize) -> BTreeMap<usize, usize> {
        let mut map = BTreeMap::new();
        if read.len() > seq.len() {
            return map;
        }
        for start in 0..=seq.len() - read.len() {
            let d = seq[start..start + read.len()]
                .iter()
                .zip(read)
                .filter(|(a, b)| a != b)
                .count();
            if d <= k {
                map.insert(start, d);
            }
        }
        map
    }

    /// 按 CIGAR 重放对齐并数出编辑数（往返校验）
    fn replay_cigar(occ: &TextOcc, seq: &[u8], read: &[u8]) -> usize {
        let text = dna::encode_pattern(seq);
        let pat = dna::encode_pattern(read);
        let mut edits = 0usize;
        let mut ti = occ.range.begin;
        let mut pi = 0usize;
        let mut num = 0usize;
        for ch in occ.cigar.bytes() {
            if ch.is_ascii_digit() {
                num = num * 10 + (ch - b'0') as usize;
                continue;
            }
            match ch {
                b'M' => {
                    for _ in 0..num {
                        if text[ti] != pat[pi] {
                            edits += 1;
                        }
                        ti += 1;
                        pi += 1;
                    }
                }
                b'I' => {
                    edits += num;
                    pi += num;
                }
                b'D' => {
                    edits += num;
                    ti += num;
                }
                other => panic!("unexpected CIGAR op {}", other as char),
            }
            num = 0;
        }
        assert_eq!(pi, read.len(), "CIGAR must consume the whole pattern");
        assert_eq!(ti, occ.range.end, "CIGAR must consume the whole text range");
        edits
    }

    const ALL_SCHEMES: [&str; 5] = ["kuch1", "kuch2", "kianfar", "pigeon", "01*0"];

    #[test]
    fn exact_match_starts() {
        let index = toy_index(b"ACGTACGTACGT");
        let occs = run(&index, "kuch1", b"ACGT", 0, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5);
        let starts: Vec<usize> = occs.iter().map(|o| o.range.begin).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        assert!(occs.iter().all(|o| o.distance == 0 && o.cigar == "4M"));
    }

    #[test]
    fn overlapping_exact_hits() {
        let index = toy_index(b"AAAAAAAA");
        let occs = run(&index, "pigeon", b"AAAA", 0, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5);
        let starts: Vec<usize> = occs.iter().map(|o| o.range.begin).collect();
        assert_eq!(starts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn single_substitution_everywhere() {
        let seq = b"AAAAA";
        let index = toy_index(seq);
        // 模式只有 2 个字符，只能用 2 部件的方案（k+2 部件的方案静默无匹配）
        for scheme in ["kuch1", "kianfar", "pigeon"] {
            let occs = run(&index, scheme, b"AT", 1, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5);
            let got = starts_map(&occs);
            let expect = brute_force_edit(seq, b"AT", 1);
            assert_eq!(got, expect, "scheme {}", scheme);
            // 真值包含 {0,1,2,3}，每个距离 1（末位的退化命中也在内）
            for s in 0..=3usize {
                assert_eq!(got.get(&s), Some(&1), "scheme {} start {}", scheme, s);
            }
            // 起点 0 上有两个距离相同、终点不同的窗口（"A" 与 "AA"），
            // 终末去重必须把它们当作不同命中都保留
            let mut ends_at_zero: Vec<usize> = occs
                .iter()
                .filter(|o| o.range.begin == 0)
                .map(|o| o.range.end)
                .collect();
            ends_at_zero.sort_unstable();
            assert_eq!(ends_at_zero, vec![1, 2], "scheme {}", scheme);
        }
    }

    #[test]
    fn gattaca_deletion_cigar() {
        let seq = b"GATTACA";
        let index = toy_index(seq);
        let occs = run(&index, "kuch1", b"GATACA", 1, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 0);
        let hit = occs
            .iter()
            .find(|o| o.range.begin == 0 && o.range.end == 7)
            .expect("full-length occurrence");
        assert_eq!(hit.distance, 1);
        assert_eq!(hit.cigar, "3M1D3M");
        assert_eq!(replay_cigar(hit, seq, b"GATACA"), 1);
    }

    #[test]
    fn substitution_at_pattern_head() {
        let seq = b"ACGTACGT";
        let index = toy_index(seq);
        for scheme in ALL_SCHEMES {
            let occs = run(&index, scheme, b"CCGT", 1, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5);
            let got = starts_map(&occs);
            assert_eq!(got.get(&0), Some(&1), "scheme {}", scheme);
            assert_eq!(got.get(&4), Some(&1), "scheme {}", scheme);
        }
    }

    #[test]
    fn revcomp_lane_finds_reverse_strand() {
        let seq = b"AAACCC";
        let index = toy_index(seq);
        // 正向不命中
        let fwd = run(&index, "kuch1", b"GGGTTT", 0, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5);
        assert!(fwd.is_empty());
        // 反向互补命中 0
        let rc = dna::revcomp(b"GGGTTT");
        let rev = run(&index, "kuch1", &rc, 0, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5);
        assert_eq!(rev.len(), 1);
        assert_eq!(rev[0].range.begin, 0);
    }

    #[test]
    fn invalid_and_short_patterns_are_silent() {
        let index = toy_index(b"ACGTACGT");
        assert!(run(&index, "kuch1", b"ACNT", 1, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5).is_empty());
        assert!(run(&index, "pigeon", b"AC", 3, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5).is_empty());
        assert!(run(&index, "kuch1", b"", 1, PartitionPolicy::Uniform, DistanceMetric::EditOpt, 5).is_empty());
    }

    #[test]
    fn completeness_against_brute_force() {
        let seq = make_reference(240);
        let index = toy_index(&seq);
        // 从参考采样再人为扰动的 read
        let mut reads: Vec<Vec<u8>> = Vec::new();
        for &(start, len) in &[(10usize, 24usize), (60, 30), (150, 20), (200, 24)] {
            let mut r = seq[start..start + len].to_vec();
            r[len / 2] = if r[len / 2] == b'A' { b'C' } else { b'A' };
            reads.push(r);
        }
        reads.push(seq[30..54].to_vec());
        for read in &reads {
            for k in 0..=2usize {
                let expect = brute_force_edit(&seq, read, k);
                let occs = run(&index, "kuch1", read, k, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5);
                assert_eq!(starts_map(&occs), expect, "read {:?} k {}", String::from_utf8_lossy(read), k);
            }
        }
    }

    #[test]
    fn strategy_equivalence_across_schemes_policies_metrics() {
        let seq = make_reference(160);
        let index = toy_index(&seq);
        let mut read = seq[40..66].to_vec();
        read[8] = if read[8] == b'G' { b'T' } else { b'G' };
        for k in 1..=2usize {
            let reference = starts_map(&run(
                &index, "naive", &read, k, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5,
            ));
            assert_eq!(reference, brute_force_edit(&seq, &read, k), "naive vs brute force, k={}", k);
            for scheme in ALL_SCHEMES {
                for policy in [PartitionPolicy::Uniform, PartitionPolicy::Static, PartitionPolicy::Dynamic] {
                    for metric in [DistanceMetric::EditNaive, DistanceMetric::EditOpt] {
                        let got = starts_map(&run(&index, scheme, &read, k, policy, metric, 5));
                        assert_eq!(
                            got, reference,
                            "scheme {} policy {:?} metric {:?} k {}",
                            scheme, policy, metric, k
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn blind_start_searches_agree_with_naive() {
        // kianfar k=3 的方案里有 U[0] > 0 的检索，会走盲起点路径
        let seq = make_reference(120);
        let index = toy_index(&seq);
        let mut read = seq[30..50].to_vec();
        read[4] = if read[4] == b'A' { b'G' } else { b'A' };
        read[12] = if read[12] == b'C' { b'T' } else { b'C' };
        let reference = starts_map(&run(
            &index, "naive", &read, 3, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5,
        ));
        assert_eq!(reference, brute_force_edit(&seq, &read, 3));
        let got = starts_map(&run(
            &index, "kianfar", &read, 3, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5,
        ));
        assert_eq!(got, reference);
    }

    #[test]
    fn hamming_agrees_with_direct_scan() {
        let seq = make_reference(160);
        let index = toy_index(&seq);
        let mut read = seq[25..49].to_vec();
        read[3] = if read[3] == b'C' { b'G' } else { b'C' };
        for k in 1..=2usize {
            let expect = brute_force_hamming(&seq, &read, k);
            for scheme in ["kuch1", "pigeon", "naive"] {
                let occs = run(&index, scheme, &read, k, PartitionPolicy::Uniform, DistanceMetric::Hamming, 5);
                assert_eq!(starts_map(&occs), expect, "scheme {} k {}", scheme, k);
                // Hamming 命中长度恒等于模式长度
                assert!(occs.iter().all(|o| o.len() == read.len()));
            }
        }
    }

    #[test]
    fn switch_point_does_not_change_results() {
        let seq = make_reference(200);
        let index = toy_index(&seq);
        let mut read = seq[70..98].to_vec();
        read[10] = if read[10] == b'T' { b'A' } else { b'T' };
        for k in 1..=2usize {
            let base = starts_map(&run(
                &index, "kuch1", &read, k, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 0,
            ));
            for sp in [1usize, 5, 50, 1000] {
                let got = starts_map(&run(
                    &index, "kuch1", &read, k, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, sp,
                ));
                assert_eq!(got, base, "switch point {} k {}", sp, k);
            }
        }
    }

    #[test]
    fn outputs_are_deterministic() {
        let seq = make_reference(180);
        let index = toy_index(&seq);
        let read = &seq[50..80];
        let a = run(&index, "kuch2", read, 2, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5);
        let b = run(&index, "kuch2", read, 2, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5);
        assert_eq!(a, b);
        // 输出按（起点，距离）有序
        for w in a.windows(2) {
            assert!((w[0].range.begin, w[0].distance) <= (w[1].range.begin, w[1].distance));
        }
    }

    #[test]
    fn reported_distances_and_cigars_are_consistent() {
        let seq = make_reference(200);
        let index = toy_index(&seq);
        let mut read = seq[100..128].to_vec();
        read[5] = if read[5] == b'A' { b'T' } else { b'A' };
        read.remove(20);
        for k in 1..=3usize {
            let occs = run(&index, "kuch1", &read, k, PartitionPolicy::Dynamic, DistanceMetric::EditOpt, 5);
            for occ in &occs {
                assert!(occ.distance <= k);
                let replayed = replay_cigar(occ, &seq, &read);
                assert_eq!(replayed, occ.distance, "occ {:?}", occ);
                // 报告的距离就是该窗口的编辑距离
                let text = dna::encode_pattern(&seq);
                let pat = dna::encode_pattern(&read);
                let true_d = banded_edit_distance(&pat, &text[occ.range.begin..occ.range.end], k);
                assert_eq!(true_d, Some(occ.distance));
            }
        }
    }

    #[test]
    fn manbest_requires_k4() {
        let index = toy_index(b"ACGTACGTACGTACGTACGTACGTACGT");
        let strategy = Strategy::builtin("manbest").unwrap();
        let opt = MatchOpt { max_ed: 2, ..Default::default() };
        assert!(Matcher::new(&index, &strategy, opt).is_err());
        let opt4 = MatchOpt { max_ed: 4, ..Default::default() };
        assert!(Matcher::new(&index, &strategy, opt4).is_ok());
    }

    #[test]
    fn max_ed_above_four_is_config_error() {
        let index = toy_index(b"ACGT");
        let strategy = Strategy::builtin("kuch1").unwrap();
        let opt = MatchOpt { max_ed: 5, ..Default::default() };
        assert!(Matcher::new(&index, &strategy, opt).is_err());
    }

    #[test]
    fn counters_track_in_text_switch() {
        let seq = make_reference(300);
        let index = toy_index(&seq);
        let strategy = Strategy::builtin("kuch1").unwrap();
        let read = &seq[120..152];
        let opt = MatchOpt {
            max_ed: 1,
            partition: PartitionPolicy::Dynamic,
            metric: DistanceMetric::EditOpt,
            switch_point: 1000, // 强制立即切换
        };
        let matcher = Matcher::new(&index, &strategy, opt).unwrap();
        let mut counters = Counters::default();
        let occs = matcher.match_approx(read, &mut counters);
        assert!(!occs.is_empty());
        assert!(counters.in_text_started > 0);
        assert!(counters.immediate_switch > 0);
        assert!(counters.searches_started > 0);
    }
}

use crate::index::fm::{FMIndex, SARangePair};
use crate::search::matrix::{cigar_string, BandMatrix, BitParallelED};
use crate::search::occ::{FMOcc, Occurrences, TextOcc};
use crate::search::partition::Part;
use crate::search::scheme::Search;
use crate::search::{Counters, DistanceMetric};

/// 对窗口做两端锚定的重对齐，给出真实编辑距离与 CIGAR。
/// 索引内命中的终末回溯与文本内校验的产出都走这里。
pub fn realign(bp: &mut BitParallelED, pattern: &[u8], window: &[u8], k: usize) -> (usize, String) {
    bp.set_sequence(pattern, k);
    for (r, &c) in window.iter().enumerate() {
        bp.compute_row(r + 1, c);
    }
    let tb = bp.trackback(window.len());
    (tb.distance, cigar_string(&tb.ops))
}

/// 递归下降的游标：只复制会变的东西（区间对、两侧行数、
/// 已冻结的距离），模式、部件与矩阵经由驱动器共享。
#[derive(Debug, Clone, Copy)]
struct Cursor {
    pair: SARangePair,
    /// 检索顺序中的下一个部件下标
    part_idx: usize,
    /// 已完成部件覆盖的模式窗口 [lo, hi)
    lo: usize,
    hi: usize,
    /// 两侧已消耗的文本字符数（即各自矩阵的行数）
    fw_rows: usize,
    bw_rows: usize,
    /// 两侧在最近完成的部件边界处冻结的距离
    d_fw: usize,
    d_bw: usize,
    /// Hamming 专用：两侧在途错配数
    m_fw: usize,
    m_bw: usize,
}

/// 单个模式串在一个检索方案下的匹配驱动器。
///
/// 编辑度量下每个方向各有一张位并行矩阵，以种子两缘为锚；
/// 两侧的对齐相互独立、距离相加（editopt 的跨部件状态复用
/// 即来自于此）。editnaive 不保留矩阵状态，每个结点用带状
/// 矩阵对该侧整体重算。
pub struct Driver<'a> {
    index: &'a FMIndex,
    pattern: &'a [u8],
    metric: DistanceMetric,
    k: usize,
    switch_point: usize,
    anchor_lo: usize,
    anchor_hi: usize,
    fw: BitParallelED,
    bw: BitParallelED,
    verifier: BitParallelED,
    /// 反转后的锚点左侧模式（左向对齐的水平序列）
    bw_pattern: Vec<u8>,
    /// 两侧累计的扩展文本（editnaive 的重算输入）
    fw_text: Vec<u8>,
    bw_text: Vec<u8>,
}

impl<'a> Driver<'a> {
    pub fn new(
        index: &'a FMIndex,
        pattern: &'a [u8],
        metric: DistanceMetric,
        k: usize,
        switch_point: usize,
    ) -> Self {
        Self {
            index,
            pattern,
            metric,
            k,
            switch_point,
            anchor_lo: 0,
            anchor_hi: 0,
            fw: BitParallelED::new(),
            bw: BitParallelED::new(),
            verifier: BitParallelED::new(),
            bw_pattern: Vec::new(),
            fw_text: Vec::new(),
            bw_text: Vec::new(),
        }
    }

    /// 执行一条检索。U[0]=0 时从预先算好的部件精确区间出发（种子
    /// 起点，区间为空则整条检索放弃）；否则从全区间盲起，锚定在
    /// 首部件靠向后续部件的一端。
    pub fn run_search(
        &mut self,
        search: &Search,
        parts: &[Part],
        ranges: &[SARangePair],
        occ: &mut Occurrences,
        counters: &mut Counters,
    ) {
        let p = search.num_parts();
        let mut cur = Cursor {
            pair: SARangePair::empty(),
            part_idx: 0,
            lo: 0,
            hi: 0,
            fw_rows: 0,
            bw_rows: 0,
            d_fw: 0,
            d_bw: 0,
            m_fw: 0,
            m_bw: 0,
        };

        if search.upper(0) == 0 {
            let first = search.part(0);
            let pair = ranges[first];
            if pair.is_empty() {
                return;
            }
            let w = parts[first];
            self.anchor_lo = w.begin;
            self.anchor_hi = w.end;
            cur.pair = pair;
            cur.part_idx = 1;
            cur.lo = w.begin;
            cur.hi = w.end;
        } else {
            let w = parts[search.part(0)];
            let forward_first = p < 2 || search.part(1) > search.part(0);
            let a = if forward_first { w.begin } else { w.end };
            self.anchor_lo = a;
            self.anchor_hi = a;
            cur.pair = self.index.full_range();
            cur.lo = a;
            cur.hi = a;
        }
        counters.searches_started += 1;

        if self.metric != DistanceMetric::Hamming {
            self.bw_pattern = self.pattern[..self.anchor_lo].iter().rev().copied().collect();
            self.fw_text.clear();
            self.bw_text.clear();
            if self.metric == DistanceMetric::EditOpt {
                let pat = self.pattern;
                self.fw.set_sequence(&pat[self.anchor_hi..], self.k);
                let bw_h = std::mem::take(&mut self.bw_pattern);
                self.bw.set_sequence(&bw_h, self.k);
                self.bw_pattern = bw_h;
            }
        }

        if cur.part_idx == p {
            // 单部件检索在种子处即完成
            self.report(&cur, occ);
            return;
        }
        self.step(search, parts, cur, occ, counters);
    }

    /// 进入检索顺序中的下一个部件：扩展方向由它相对已匹配块的
    /// 位置决定，目标边界列换算到对应侧的矩阵坐标。
    fn step(
        &mut self,
        search: &Search,
        parts: &[Part],
        cur: Cursor,
        occ: &mut Occurrences,
        counters: &mut Counters,
    ) {
        let part = parts[search.part(cur.part_idx)];
        let forward = part.begin >= cur.hi;
        debug_assert!(if forward { part.begin == cur.hi } else { part.end == cur.lo });
        let tcol = if forward {
            part.end - self.anchor_hi
        } else {
            self.anchor_lo - part.begin
        };
        self.extend_part(search, parts, cur, forward, tcol, occ, counters);
    }

    fn extend_part(
        &mut self,
        search: &Search,
        parts: &[Part],
        cur: Cursor,
        forward: bool,
        tcol: usize,
        occ: &mut Occurrences,
        counters: &mut Counters,
    ) {
        // 文本内切换：区间足够窄且仍有部件未完成
        if self.metric != DistanceMetric::Hamming && cur.pair.width() <= self.switch_point {
            self.switch_to_text(&cur, occ, counters);
            return;
        }

        let i = cur.part_idx;
        let part = parts[search.part(i)];
        let other = if forward { cur.d_bw } else { cur.d_fw };

        // 部件完成检查：边界列上的值落入 [L, U] 才推进
        if let Some(val) = self.side_cell(&cur, forward, tcol) {
            let total = val + other;
            if total >= search.lower(i) && total <= search.upper(i) {
                let mut ncur = cur;
                if forward {
                    ncur.hi = part.end;
                    ncur.d_fw = val;
                } else {
                    ncur.lo = part.begin;
                    ncur.d_bw = val;
                }
                ncur.part_idx = i + 1;
                if ncur.part_idx == search.num_parts() {
                    self.report(&ncur, occ);
                } else {
                    self.step(search, parts, ncur, occ, counters);
                }
            }
        }

        // 逐字符扩展，固定 A,C,G,T 顺序保证确定性
        for c in 1..=4u8 {
            let npair = if forward {
                self.index.extend_forward(&cur.pair, c)
            } else {
                self.index.extend_backward(&cur.pair, c)
            };
            if npair.is_empty() {
                continue;
            }
            counters.nodes += 1;

            let mut ncur = cur;
            ncur.pair = npair;
            let minimum = self.side_advance(&mut ncur, forward, tcol, c);
            // 带最小值加上对侧冻结距离超过 U 则分支已死
            if minimum.saturating_add(other) > search.upper(i) {
                self.side_retreat(forward);
                continue;
            }
            self.extend_part(search, parts, ncur, forward, tcol, occ, counters);
            self.side_retreat(forward);
        }
    }

    /// 在某一侧消耗一个文本字符，返回新行的带内最小值（Hamming 下
    /// 即该侧在途错配数；行数越过部件边界返回 MAX 以剪枝）。
    fn side_advance(&mut self, ncur: &mut Cursor, forward: bool, tcol: usize, c: u8) -> usize {
        let row = if forward { ncur.fw_rows + 1 } else { ncur.bw_rows + 1 };
        if forward {
            ncur.fw_rows = row;
        } else {
            ncur.bw_rows = row;
        }
        match self.metric {
            DistanceMetric::Hamming => {
                if row > tcol {
                    return usize::MAX;
                }
                let pos = if forward { self.anchor_hi + row - 1 } else { self.anchor_lo - row };
                let mm = (self.pattern[pos] != c) as usize;
                if forward {
                    ncur.m_fw += mm;
                    ncur.m_fw
                } else {
                    ncur.m_bw += mm;
                    ncur.m_bw
                }
            }
            DistanceMetric::EditOpt => {
                if forward {
                    self.fw_text.push(c);
                    self.fw.compute_row(row, c).minimum
                } else {
                    self.bw_text.push(c);
                    self.bw.compute_row(row, c).minimum
                }
            }
            DistanceMetric::EditNaive => {
                // 每个结点对该侧从头重算整个带状矩阵
                if forward {
                    self.fw_text.push(c);
                    let mat = BandMatrix::fill(&self.pattern[self.anchor_hi..], &self.fw_text, self.k);
                    mat.row_minimum(row) as usize
                } else {
                    self.bw_text.push(c);
                    let mat = BandMatrix::fill(&self.bw_pattern, &self.bw_text, self.k);
                    mat.row_minimum(row) as usize
                }
            }
        }
    }

    fn side_retreat(&mut self, forward: bool) {
        if self.metric != DistanceMetric::Hamming {
            if forward {
                self.fw_text.pop();
            } else {
                self.bw_text.pop();
            }
        }
    }

    /// 当前侧在部件边界列 tcol 处的 DP 值；带外（或 Hamming 下
    /// 行数未达边界）为 None。
    fn side_cell(&self, cur: &Cursor, forward: bool, tcol: usize) -> Option<usize> {
        let rows = if forward { cur.fw_rows } else { cur.bw_rows };
        match self.metric {
            DistanceMetric::Hamming => {
                if rows == tcol {
                    Some(if forward { cur.m_fw } else { cur.m_bw })
                } else {
                    None
                }
            }
            DistanceMetric::EditOpt => {
                let mat = if forward { &self.fw } else { &self.bw };
                mat.cell(rows, tcol)
            }
            DistanceMetric::EditNaive => {
                if rows.abs_diff(tcol) > self.k {
                    return None;
                }
                let mat = if forward {
                    BandMatrix::fill(&self.pattern[self.anchor_hi..], &self.fw_text, self.k)
                } else {
                    BandMatrix::fill(&self.bw_pattern, &self.bw_text, self.k)
                };
                let v = mat.get(rows, tcol) as usize;
                if v > self.pattern.len() + self.k {
                    None
                } else {
                    Some(v)
                }
            }
        }
    }

    fn report(&self, cur: &Cursor, occ: &mut Occurrences) {
        let length = (self.anchor_hi - self.anchor_lo) + cur.fw_rows + cur.bw_rows;
        occ.add_index(FMOcc {
            pair: cur.pair,
            length,
            distance: cur.d_fw + cur.d_bw,
        });
    }

    /// 区间足够窄：定位每个候选位置，把剩余模式交给文本内校验。
    fn switch_to_text(&mut self, cur: &Cursor, occ: &mut Occurrences, counters: &mut Counters) {
        if cur.part_idx == 1 && cur.fw_rows == 0 && cur.bw_rows == 0 {
            counters.immediate_switch += 1;
        }
        for p in self.index.locate(&cur.pair) {
            counters.in_text_started += 1;
            // 锚点（种子左缘）的文本位置：块起点加上左向消耗的字符数
            self.verify_at(p + cur.bw_rows, occ, counters);
        }
    }

    /// 文本内校验：以种子两缘为锚，左右两侧分别做带状对齐并收集
    /// 所有代价 ≤ k 的完成行，两侧代价之和不超预算的组合经终末
    /// 重对齐后报告。任一侧的带在无任何完成前死亡计为一次失败。
    fn verify_at(&mut self, s0: usize, occ: &mut Occurrences, counters: &mut Counters) {
        let index = self.index;
        let pat = self.pattern;
        let k = self.k;
        let n = index.text_len() - 1;
        let seed_len = self.anchor_hi - self.anchor_lo;
        let s1 = s0 + seed_len;
        let left_m = self.anchor_lo;
        let right_m = pat.len() - self.anchor_hi;

        // 两侧窗口，留出 k 的松弛量，且不跨越序列分隔符
        let mut wbegin = s0.saturating_sub(left_m + k);
        if let Some(sep) = index.text[wbegin..s0].iter().rposition(|&b| b == 0) {
            wbegin += sep + 1;
        }
        let mut wend = (s1 + right_m + k).min(n);
        if let Some(sep) = index.text[s1..wend].iter().position(|&b| b == 0) {
            wend = s1 + sep;
        }

        // 左侧：反转前缀对反转文本；右侧：后缀对正向文本
        let bw_h = std::mem::take(&mut self.bw_pattern);
        let (left, left_died) = side_completions(
            &mut self.verifier,
            &bw_h,
            index.text[wbegin..s0].iter().rev().copied(),
            k,
        );
        self.bw_pattern = bw_h;
        let (right, right_died) = side_completions(
            &mut self.verifier,
            &pat[self.anchor_hi..],
            index.text[s1..wend].iter().copied(),
            k,
        );

        if (left.is_empty() && left_died) || (right.is_empty() && right_died) {
            counters.aborted_in_text += 1;
            return;
        }
        for &(rl, dl) in &left {
            for &(rr, dr) in &right {
                if dl + dr > k {
                    continue;
                }
                let start = s0 - rl;
                let end = s1 + rr;
                let (d, cigar) = realign(&mut self.verifier, pat, &index.text[start..end], k);
                counters.cigars_in_text += 1;
                occ.add_text(TextOcc::new(start, end, d, cigar, true));
            }
        }
    }
}

/// 锚定对齐一侧文本，收集每个完成行 (行数, 代价 ≤ k)；
/// 带死亡时提前停止并如实报告。
fn side_completions(
    bp: &mut BitParallelED,
    h: &[u8],
    chars: impl Iterator<Item = u8>,
    k: usize,
) -> (Vec<(usize, usize)>, bool) {
    bp.set_sequence(h, k);
    let mut out = Vec::new();
    if let Some(d) = bp.cell(0, h.len()) {
        if d <= k {
            out.push((0, d));
        }
    }
    for (i, c) in chars.enumerate() {
        let state = bp.compute_row(i + 1, c);
        if let Some(d) = bp.cell(i + 1, h.len()) {
            if d <= k {
                out.push((i + 1, d));
            }
        }
        if !state.alive {
            return (out, true);
        }
    }
    (out, false)
}

/// 朴素回溯：不切分，整条模式沿索引向左逐字符扩展，
/// 编辑度量用位并行矩阵剪枝，Hamming 逐位计数。
pub fn naive_backtracking(
    index: &FMIndex,
    pattern: &[u8],
    k: usize,
    metric: DistanceMetric,
    occ: &mut Occurrences,
    counters: &mut Counters,
) {
    counters.searches_started += 1;
    match metric {
        DistanceMetric::Hamming => {
            rec_naive_hamming(index, pattern, k, index.full_range(), 0, 0, occ, counters);
        }
        _ => {
            let rev: Vec<u8> = pattern.iter().rev().copied().collect();
            let mut bp = BitParallelED::new();
            bp.set_sequence(&rev, k);
            rec_naive_edit(index, &mut bp, pattern.len(), k, index.full_range(), 0, occ, counters);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rec_naive_edit(
    index: &FMIndex,
    bp: &mut BitParallelED,
    m: usize,
    k: usize,
    pair: SARangePair,
    depth: usize,
    occ: &mut Occurrences,
    counters: &mut Counters,
) {
    if depth > 0 {
        if let Some(d) = bp.cell(depth, m) {
            if d <= k {
                occ.add_index(FMOcc { pair, length: depth, distance: d });
            }
        }
    }
    for c in 1..=4u8 {
        let npair = index.extend_backward(&pair, c);
        if npair.is_empty() {
            continue;
        }
        counters.nodes += 1;
        let state = bp.compute_row(depth + 1, c);
        if state.minimum > k {
            continue;
        }
        rec_naive_edit(index, bp, m, k, npair, depth + 1, occ, counters);
    }
}

#[allow(clippy::too_many_arguments)]
fn rec_naive_hamming(
    index: &FMIndex,
    pattern: &[u8],
    k: usize,
    pair: SARangePair,
    depth: usize,
    mismatches: usize,
    occ: &mut Occurrences,
    counters: &mut Counters,
) {
    let m = pattern.len();
    if depth == m {
        occ.add_index(FMOcc { pair, length: m, distance: mismatches });
        return;
    }
    let pos = m - 1 - depth;
    for c in 1..=4u8 {
        let npair = index.extend_backward(&pair, c);
        if npair.is_empty() {
            continue;
        }
        counters.nodes += 1;
        let nmm = mismatches + (pattern[pos] != c) as usize;
        if nmm > k {
            continue;
        }
        rec_naive_hamming(index, pattern, k, npair, depth + 1, nmm, occ, counters);
    }
}

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::index::{bwt, sa};
use crate::util::dna::SIGMA;

const FM_MAGIC: u64 = 0x5353_4D41_505F_5253; // "SSMAP_RS"
const FM_VERSION: u32 = 1;

/// SA 上的半开区间 [begin, end)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: usize,
    pub end: usize,
}

impl Range {
    #[inline]
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// 双向搜索的区间对：fwd 为正向文本 SA 上的区间，rev 为反向文本 SA 上的
/// 区间。两个区间宽度恒相等，宽度为零即整体为空。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SARangePair {
    pub fwd: Range,
    pub rev: Range,
}

impl SARangePair {
    #[inline]
    pub fn new(fwd: Range, rev: Range) -> Self {
        debug_assert_eq!(fwd.width(), rev.width(), "SA range widths diverged");
        Self { fwd, rev }
    }

    pub fn empty() -> Self {
        Self { fwd: Range::new(0, 0), rev: Range::new(0, 0) }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.fwd.width()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fwd.is_empty()
    }
}

/// 分块采样的出现次数表（rank 结构）。块首缓存累计值，块内顺扫补偿。
#[derive(Debug, Serialize, Deserialize)]
pub struct OccTable {
    block: u32,
    /// BWT 序列本体
    pub bwt: Vec<u8>,
    /// occ_samples[block_id * SIGMA + c] = 块首之前 c 的累计出现次数
    samples: Vec<u32>,
}

impl OccTable {
    pub fn build(bwt_seq: Vec<u8>, block: usize) -> Self {
        let n = bwt_seq.len();
        let num_blocks = if n == 0 { 0 } else { (n + block - 1) / block };
        let mut samples = vec![0u32; num_blocks * SIGMA];
        let mut running = vec![0u32; SIGMA];
        for bi in 0..num_blocks {
            for a in 0..SIGMA {
                samples[bi * SIGMA + a] = running[a];
            }
            let start = bi * block;
            let end = ((bi + 1) * block).min(n);
            for &ch in &bwt_seq[start..end] {
                running[ch as usize] += 1;
            }
        }
        Self { block: block as u32, bwt: bwt_seq, samples }
    }

    /// 返回 BWT[0..pos) 中 c 的出现次数
    #[inline]
    pub fn occ(&self, c: u8, pos: usize) -> usize {
        if pos == 0 {
            return 0;
        }
        let block = self.block as usize;
        let bi = (pos - 1) / block;
        let base = self.samples[bi * SIGMA + c as usize] as usize;
        let start = bi * block;
        let mut add = 0usize;
        for &ch in &self.bwt[start..pos] {
            if ch == c {
                add += 1;
            }
        }
        base + add
    }

    /// 区间 [l, r) 内字典序小于 c 的字符个数（含哨兵）。
    #[inline]
    pub fn smaller_in_range(&self, c: u8, l: usize, r: usize) -> usize {
        let mut total = 0usize;
        for d in 0..c {
            total += self.occ(d, r) - self.occ(d, l);
        }
        total
    }
}

/// 标记位向量，带按字预计算的 rank，用于稀疏 SA 的采样槽定位。
#[derive(Debug, Serialize, Deserialize)]
pub struct MarkBits {
    words: Vec<u64>,
    ranks: Vec<u32>,
    len: usize,
}

impl MarkBits {
    pub fn build(marks: &[bool]) -> Self {
        let len = marks.len();
        let n_words = (len + 63) / 64;
        let mut words = vec![0u64; n_words];
        for (i, &m) in marks.iter().enumerate() {
            if m {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        let mut ranks = Vec::with_capacity(n_words);
        let mut acc = 0u32;
        for &w in &words {
            ranks.push(acc);
            acc += w.count_ones();
        }
        Self { words, ranks, len }
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        (self.words[i / 64] >> (i % 64)) & 1 != 0
    }

    /// [0..i) 内标记位的数量
    #[inline]
    pub fn rank1(&self, i: usize) -> usize {
        debug_assert!(i <= self.len);
        if i == 0 {
            return 0;
        }
        let w = i / 64;
        let mut r = if w < self.ranks.len() { self.ranks[w] as usize } else {
            return self.ranks.last().map(|&x| x as usize).unwrap_or(0)
                + self.words.last().map(|&x| x.count_ones() as usize).unwrap_or(0);
        };
        let bit = i % 64;
        if bit > 0 {
            r += (self.words[w] & ((1u64 << bit) - 1)).count_ones() as usize;
        }
        r
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 双向 FM 索引：
/// - C 表与正反两个方向的分块 Occ 表，支持 O(1) 的双向区间扩展。
/// - 稀疏 SA：仅保留文本位置为 2^s 倍数的条目，其余通过 LF 回溯恢复。
/// - 文本全文保留，供文本内校验与 CIGAR 回溯使用。
#[derive(Debug, Serialize, Deserialize)]
pub struct FMIndex {
    pub magic: u64,
    pub version: u32,
    pub sigma: u8,
    /// 稀疏因子指数 s，步长为 2^s
    pub sparse_shift: u8,
    /// C[c] = 文本中字母 < c 的累计数量
    pub counts: Vec<u64>,
    /// 正向 BWT 的出现次数表
    pub occ: OccTable,
    /// 反向文本 BWT 的出现次数表
    pub occ_rev: OccTable,
    /// 稀疏 SA：采样槽标记 + 按槽序存放的采样值
    sa_marks: MarkBits,
    sa_samples: Vec<u32>,
    /// 原始文本（数值化字母表，含哨兵）
    pub text: Vec<u8>,
    pub meta: IndexMeta,
}

impl FMIndex {
    /// 从数值化文本构建索引。text 必须以哨兵 0 结尾。
    pub fn build(text: Vec<u8>, sparse_shift: u8, block: usize) -> Self {
        assert!(matches!(text.last(), Some(0)), "text must end with sentinel");
        let stride = 1usize << sparse_shift;

        let sa_arr = sa::build_sa(&text);
        let bwt_arr = bwt::build_bwt(&text, &sa_arr);
        let rev = bwt::reverse_text(&text);
        let rsa_arr = sa::build_sa(&rev);
        let rbwt_arr = bwt::build_bwt(&rev, &rsa_arr);

        let mut freq = vec![0u64; SIGMA];
        for &ch in &text {
            freq[ch as usize] += 1;
        }
        let mut counts = vec![0u64; SIGMA];
        let mut acc = 0u64;
        for c in 0..SIGMA {
            counts[c] = acc;
            acc += freq[c];
        }

        let marks: Vec<bool> = sa_arr.iter().map(|&v| v as usize % stride == 0).collect();
        let sa_samples: Vec<u32> = sa_arr
            .iter()
            .filter(|&&v| v as usize % stride == 0)
            .copied()
            .collect();

        Self {
            magic: FM_MAGIC,
            version: FM_VERSION,
            sigma: SIGMA as u8,
            sparse_shift,
            counts,
            occ: OccTable::build(bwt_arr, block),
            occ_rev: OccTable::build(rbwt_arr, block),
            sa_marks: MarkBits::build(&marks),
            sa_samples,
            text,
            meta: IndexMeta::default(),
        }
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    /// 文本长度（含哨兵）
    #[inline]
    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    /// 覆盖整个 SA 的初始区间对
    pub fn full_range(&self) -> SARangePair {
        let n = self.text.len();
        SARangePair::new(Range::new(0, n), Range::new(0, n))
    }

    #[inline]
    fn lf(&self, i: usize) -> usize {
        let c = self.occ.bwt[i];
        self.counts[c as usize] as usize + self.occ.occ(c, i)
    }

    /// 向左扩展一个字符（在已匹配子串前面加 c），使用正向 Occ 表，
    /// 并同步更新反向区间的起点（区间内更小扩展的个数作为偏移）。
    pub fn extend_backward(&self, pair: &SARangePair, c: u8) -> SARangePair {
        if pair.is_empty() || c as usize >= SIGMA {
            return SARangePair::empty();
        }
        let fwd = &pair.fwd;
        let base = self.counts[c as usize] as usize;
        let b = base + self.occ.occ(c, fwd.begin);
        let e = base + self.occ.occ(c, fwd.end);
        if b >= e {
            return SARangePair::empty();
        }
        let smaller = self.occ.smaller_in_range(c, fwd.begin, fwd.end);
        let rb = pair.rev.begin + smaller;
        SARangePair::new(Range::new(b, e), Range::new(rb, rb + (e - b)))
    }

    /// 向右扩展一个字符（在已匹配子串后面加 c），对称地使用反向 Occ 表。
    pub fn extend_forward(&self, pair: &SARangePair, c: u8) -> SARangePair {
        if pair.is_empty() || c as usize >= SIGMA {
            return SARangePair::empty();
        }
        let rev = &pair.rev;
        let base = self.counts[c as usize] as usize;
        let b = base + self.occ_rev.occ(c, rev.begin);
        let e = base + self.occ_rev.occ(c, rev.end);
        if b >= e {
            return SARangePair::empty();
        }
        let smaller = self.occ_rev.smaller_in_range(c, rev.begin, rev.end);
        let fb = pair.fwd.begin + smaller;
        SARangePair::new(Range::new(fb, fb + (e - b)), Range::new(b, e))
    }

    /// 从左到右逐字符精确匹配，返回双向区间对；无匹配返回空对。
    pub fn exact_match_pair(&self, pat: &[u8]) -> SARangePair {
        let mut pair = self.full_range();
        for &c in pat {
            pair = self.extend_forward(&pair, c);
            if pair.is_empty() {
                return SARangePair::empty();
            }
        }
        pair
    }

    /// 反向搜索精确匹配（仅使用正向索引），pat 为编码后的字母表。
    pub fn backward_search(&self, pat: &[u8]) -> Option<(usize, usize)> {
        if self.occ.bwt.is_empty() {
            return None;
        }
        let mut l = 0usize;
        let mut r = self.occ.bwt.len();
        for &a in pat.iter().rev() {
            if a as usize >= SIGMA {
                return None;
            }
            let base = self.counts[a as usize] as usize;
            let nl = base + self.occ.occ(a, l);
            let nr = base + self.occ.occ(a, r);
            if nl >= nr {
                return None;
            }
            l = nl;
            r = nr;
        }
        Some((l, r))
    }

    /// 恢复 SA[k]：沿 LF 回溯直到命中采样槽。
    pub fn find_sa(&self, k: usize) -> usize {
        let mut i = k;
        let mut steps = 0usize;
        while !self.sa_marks.get(i) {
            i = self.lf(i);
            steps += 1;
        }
        self.sa_samples[self.sa_marks.rank1(i)] as usize + steps
    }

    /// 将区间对展开为文本位置（升序）。
    pub fn locate(&self, pair: &SARangePair) -> Vec<usize> {
        let mut out = Vec::with_capacity(pair.width());
        for k in pair.fwd.begin..pair.fwd.end {
            out.push(self.find_sa(k));
        }
        out.sort_unstable();
        out
    }

    /// 精确匹配并取回所有起始位置（k=0 的便捷入口）。
    pub fn exact_matches(&self, pat: &[u8]) -> Vec<usize> {
        match self.backward_search(pat) {
            Some((l, r)) => {
                let mut out: Vec<usize> = (l..r).map(|k| self.find_sa(k)).collect();
                out.sort_unstable();
                out
            }
            None => Vec::new(),
        }
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let mut f = std::fs::File::create(path)?;
        bincode::serialize_into(&mut f, self)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let idx: Self = bincode::deserialize_from(std::io::BufReader::new(f))?;
        if idx.magic != FM_MAGIC {
            return Err(anyhow!(
                "invalid index file: bad magic number (expected 0x{:016X}, got 0x{:016X})",
                FM_MAGIC,
                idx.magic
            ));
        }
        if idx.version != FM_VERSION {
            return Err(anyhow!(
                "unsupported index version: expected {}, got {}",
                FM_VERSION,
                idx.version
            ));
        }
        Ok(idx)
    }
}

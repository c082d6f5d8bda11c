use crate::util::dna::SIGMA;

const INF: u32 = u32::MAX / 4;

/// 经典带状编辑距离矩阵。行对应文本字符，列对应模式字符，
/// 带半径为 band，带外视为无穷大。作为位并行矩阵的参照实现，
/// 同时充当 editnaive 度量的逐行重算引擎。
pub struct BandMatrix {
    band: usize,
    cols: usize, // 模式长度 + 1
    rows: usize, // 文本行数 + 1
    data: Vec<u32>,
}

impl BandMatrix {
    /// 对 h（水平模式）与 v（垂直文本）做锚定在原点的带状 DP。
    pub fn fill(h: &[u8], v: &[u8], band: usize) -> Self {
        let cols = h.len() + 1;
        let rows = v.len() + 1;
        let mut m = Self { band, cols, rows, data: vec![INF; rows * cols] };
        for j in 0..cols.min(band + 1) {
            m.data[j] = j as u32;
        }
        for i in 1..rows {
            if i <= band {
                m.data[i * cols] = i as u32;
            }
            let lo = m.first_column(i);
            let hi = m.last_column(i);
            for j in lo..=hi {
                let diff = (v[i - 1] != h[j - 1]) as u32;
                m.update(diff, i, j);
            }
        }
        m
    }

    /// 行 i 的首个带内列：max(1, i - band)
    #[inline]
    pub fn first_column(&self, i: usize) -> usize {
        i.saturating_sub(self.band).max(1)
    }

    /// 行 i 的最后一个带内列：min(n, i + band)
    #[inline]
    pub fn last_column(&self, i: usize) -> usize {
        (i + self.band).min(self.cols - 1)
    }

    /// (i,j) = min(上+1, 左+1, 对角+diff)
    #[inline]
    pub fn update(&mut self, diff: u32, i: usize, j: usize) {
        let up = self.get(i - 1, j).saturating_add(1);
        let left = self.get(i, j - 1).saturating_add(1);
        let diag = self.get(i - 1, j - 1).saturating_add(diff);
        self.data[i * self.cols + j] = up.min(left).min(diag);
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> u32 {
        self.data[i * self.cols + j]
    }

    /// 行 i 带内（含第 0 列边界）的最小值
    pub fn row_minimum(&self, i: usize) -> u32 {
        let mut min = if i <= self.band { i as u32 } else { INF };
        for j in self.first_column(i)..=self.last_column(i) {
            min = min.min(self.get(i, j));
        }
        min
    }

    pub fn distance(&self) -> u32 {
        self.get(self.rows - 1, self.cols - 1)
    }
}

/// 带内约束下 a 与 b 的编辑距离，超出 k 返回 None。
pub fn banded_edit_distance(a: &[u8], b: &[u8], k: usize) -> Option<usize> {
    if a.len().abs_diff(b.len()) > k {
        return None;
    }
    let m = BandMatrix::fill(a, b, k);
    let d = m.distance();
    if d as usize <= k {
        Some(d as usize)
    } else {
        None
    }
}

pub type CigarOps = Vec<(u8, u32)>;

/// 将操作序列渲染为 CIGAR 字符串
pub fn cigar_string(ops: &[(u8, u32)]) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    for &(op, len) in ops {
        let _ = write!(&mut out, "{}{}", len, op as char);
    }
    out
}

/// 一行计算结果：带内最小值与带是否存活（≤ 允许的最大距离）。
#[derive(Debug, Clone, Copy)]
pub struct RowState {
    pub minimum: usize,
    pub alive: bool,
}

/// 回溯结果
#[derive(Debug)]
pub struct Traceback {
    pub distance: usize,
    pub ops: CigarOps,
}

/// Myers/Hyyrö 风格的按行位并行带状编辑距离矩阵，两端锚定在原点
/// （D\[0\]\[j\] = j，D\[i\]\[0\] = i），带半径等于允许的最大距离。
///
/// 水平序列 H 通过 [`set_sequence`] 预编码为每个字符一张位掩码；
/// 之后逐行喂入垂直字符。每行只保存两个增量位向量（列向 +1/−1），
/// 单元格值按需由前缀 popcount 重建；存储宽度按 64 位字为步长增长，
/// 行存储随递归深度按需扩张并允许回退覆盖。
///
/// [`set_sequence`]: BitParallelED::set_sequence
pub struct BitParallelED {
    m: usize,
    words: usize,
    last_mask: u64,
    masks: Vec<Vec<u64>>,
    max_ed: usize,
    cp: Vec<u64>,
    cn: Vec<u64>,
    row_chars: Vec<u8>,
    rows: usize,
}

impl BitParallelED {
    pub fn new() -> Self {
        Self {
            m: 0,
            words: 0,
            last_mask: 0,
            masks: vec![Vec::new(); SIGMA],
            max_ed: 0,
            cp: Vec::new(),
            cn: Vec::new(),
            row_chars: Vec::new(),
            rows: 1,
        }
    }

    /// 预处理水平序列并重置矩阵，行 0 为边界行 D[0][j] = j。
    /// 必须先于任何 compute_row 调用。
    pub fn set_sequence(&mut self, h: &[u8], max_ed: usize) {
        self.m = h.len();
        self.words = (self.m + 63) / 64 + (self.m == 0) as usize;
        self.last_mask = if self.m > 0 && self.m % 64 == 0 {
            u64::MAX
        } else {
            (1u64 << (self.m % 64)) - 1
        };
        self.max_ed = max_ed;

        for mask in &mut self.masks {
            mask.clear();
            mask.resize(self.words, 0);
        }
        for (j, &c) in h.iter().enumerate() {
            if (c as usize) < SIGMA {
                self.masks[c as usize][j / 64] |= 1u64 << (j % 64);
            }
        }

        self.cp.clear();
        self.cn.clear();
        self.row_chars.clear();
        for w in 0..self.words {
            let full = if w == self.words - 1 { self.last_mask } else { u64::MAX };
            self.cp.push(full);
            self.cn.push(0);
        }
        self.rows = 1;
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.m
    }

    /// 计算第 i 行（垂直字符 c）。行必须按序喂入，允许回退后
    /// 覆盖已有的行（递归回溯再下行）。
    pub fn compute_row(&mut self, i: usize, c: u8) -> RowState {
        assert!(i >= 1 && i <= self.rows, "rows must be supplied in order");
        let need = (i + 1) * self.words;
        if self.cp.len() < need {
            self.cp.resize(need, 0);
            self.cn.resize(need, 0);
        }
        if self.row_chars.len() < i {
            self.row_chars.resize(i, 0);
        }
        self.row_chars[i - 1] = c;

        let prev = (i - 1) * self.words;
        let cur = i * self.words;
        let empty: [u64; 0] = [];
        let eq_words: &[u64] = if (c as usize) < SIGMA { &self.masks[c as usize] } else { &empty };

        let mut add_carry = 0u64;
        let mut rp_carry = 1u64; // 第 0 列边界每行 +1
        let mut rn_carry = 0u64;
        for w in 0..self.words {
            let eqw = eq_words.get(w).copied().unwrap_or(0);
            let cpw = self.cp[prev + w];
            let cnw = self.cn[prev + w];

            let xv = eqw | cnw;
            let and = eqw & cpw;
            let (s1, c1) = and.overflowing_add(cpw);
            let (sum, c2) = s1.overflowing_add(add_carry);
            add_carry = (c1 | c2) as u64;
            let xh = (sum ^ cpw) | eqw;

            let rp = cnw | !(xh | cpw);
            let rn = cpw & xh;

            let rps = (rp << 1) | rp_carry;
            rp_carry = rp >> 63;
            let rns = (rn << 1) | rn_carry;
            rn_carry = rn >> 63;

            let mut ncp = rns | !(xv | rps);
            let mut ncn = rps & xv;
            if w == self.words - 1 {
                ncp &= self.last_mask;
                ncn &= self.last_mask;
            }
            self.cp[cur + w] = ncp;
            self.cn[cur + w] = ncn;
        }
        self.rows = i + 1;

        let minimum = self.band_minimum(i);
        RowState { minimum, alive: minimum <= self.max_ed }
    }

    /// 行 i 带内最小值（含第 0 列边界，若其仍在带内）。
    pub fn band_minimum(&self, i: usize) -> usize {
        let jlo = i.saturating_sub(self.max_ed);
        let jhi = (i + self.max_ed).min(self.m);
        if jlo > jhi {
            return usize::MAX;
        }
        let mut val = self.value(i, jlo);
        let mut min = val;
        for j in jlo + 1..=jhi {
            val += self.delta(i, j);
            if val < min {
                min = val;
            }
        }
        min as usize
    }

    /// (i,j) 的单元格值；带外返回 None。
    pub fn cell(&self, i: usize, j: usize) -> Option<usize> {
        debug_assert!(i < self.rows);
        if j > self.m || j + self.max_ed < i || j > i + self.max_ed {
            return None;
        }
        Some(self.value(i, j) as usize)
    }

    #[inline]
    fn delta(&self, i: usize, j: usize) -> isize {
        let base = i * self.words;
        let w = (j - 1) / 64;
        let bit = 1u64 << ((j - 1) % 64);
        if self.cp[base + w] & bit != 0 {
            1
        } else if self.cn[base + w] & bit != 0 {
            -1
        } else {
            0
        }
    }

    fn value(&self, i: usize, j: usize) -> isize {
        let base = i * self.words;
        let mut v = i as isize;
        let full_words = j / 64;
        for w in 0..full_words {
            v += self.cp[base + w].count_ones() as isize;
            v -= self.cn[base + w].count_ones() as isize;
        }
        let rem = j % 64;
        if rem > 0 {
            let mask = (1u64 << rem) - 1;
            v += (self.cp[base + full_words] & mask).count_ones() as isize;
            v -= (self.cn[base + full_words] & mask).count_ones() as isize;
        }
        v
    }

    #[inline]
    fn is_match(&self, row: usize, j: usize) -> bool {
        let c = self.row_chars[row - 1];
        (c as usize) < SIGMA && self.masks[c as usize][(j - 1) / 64] & (1u64 << ((j - 1) % 64)) != 0
    }

    /// 从 (end_row, m) 回溯出 CIGAR。优先对角，其次模式插入，再文本删除。
    pub fn trackback(&self, end_row: usize) -> Traceback {
        let distance = self.value(end_row, self.m) as usize;
        let mut raw: Vec<u8> = Vec::new();
        let mut i = end_row;
        let mut j = self.m;
        while j > 0 {
            let here = self.value(i, j);
            if i > 0 {
                let diff = !self.is_match(i, j) as isize;
                if self.value(i - 1, j - 1) + diff == here {
                    raw.push(b'M');
                    i -= 1;
                    j -= 1;
                    continue;
                }
            }
            if self.value(i, j - 1) + 1 == here {
                raw.push(b'I');
                j -= 1;
                continue;
            }
            if i > 0 && self.value(i - 1, j) + 1 == here {
                raw.push(b'D');
                i -= 1;
                continue;
            }
            // 三种转移必有其一成立
            unreachable!("no valid traceback transition at ({}, {})", i, j);
        }
        while i > 0 {
            raw.push(b'D');
            i -= 1;
        }
        raw.reverse();
        let mut ops: CigarOps = Vec::new();
        for op in raw {
            match ops.last_mut() {
                Some(last) if last.0 == op => last.1 += 1,
                _ => ops.push((op, 1)),
            }
        }
        Traceback { distance, ops }
    }
}

impl Default for BitParallelED {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::dna;

    fn bp_distance(h: &[u8], v: &[u8], k: usize) -> Option<usize> {
        let mut bp = BitParallelED::new();
        bp.set_sequence(&dna::encode_pattern(h), k);
        for (i, &c) in v.iter().enumerate() {
            let state = bp.compute_row(i + 1, dna::to_alphabet(c));
            if !state.alive {
                return None;
            }
        }
        bp.cell(v.len(), h.len()).filter(|&d| d <= k)
    }

    #[test]
    fn band_matrix_exact() {
        let m = BandMatrix::fill(b"ACGT", b"ACGT", 1);
        assert_eq!(m.distance(), 0);
    }

    #[test]
    fn band_matrix_single_edit() {
        assert_eq!(banded_edit_distance(b"ACGT", b"AGGT", 1), Some(1));
        assert_eq!(banded_edit_distance(b"ACGT", b"ACGGT", 1), Some(1));
        assert_eq!(banded_edit_distance(b"ACGT", b"AGT", 1), Some(1));
        assert_eq!(banded_edit_distance(b"ACGT", b"TGCA", 1), None);
    }

    #[test]
    fn band_matrix_column_helpers() {
        let m = BandMatrix::fill(b"ACGTACGT", b"ACGTACGT", 2);
        assert_eq!(m.first_column(1), 1);
        assert_eq!(m.first_column(5), 3);
        assert_eq!(m.last_column(1), 3);
        assert_eq!(m.last_column(8), 8);
    }

    #[test]
    fn bit_parallel_matches_band_matrix() {
        let cases: &[(&[u8], &[u8])] = &[
            (b"ACGT", b"ACGT"),
            (b"ACGT", b"AGGT"),
            (b"GATACA", b"GATTACA"),
            (b"AAAA", b"AAAA"),
            (b"ACGTACGTACGT", b"ACGTACCTACGT"),
            (b"ACGT", b"TTTT"),
            (b"ACGTACGT", b"ACGACGT"),
            (b"A", b"ACG"),
        ];
        for k in 0..=3usize {
            for &(h, v) in cases {
                let reference = banded_edit_distance(
                    &dna::encode_pattern(h),
                    &dna::encode_pattern(v),
                    k,
                );
                let got = bp_distance(h, v, k);
                assert_eq!(got, reference, "h={:?} v={:?} k={}", h, v, k);
            }
        }
    }

    #[test]
    fn bit_parallel_row_minimum_matches_band_matrix() {
        let h = dna::encode_pattern(b"GATTACAGGT");
        let v = dna::encode_pattern(b"GATCACAGT");
        for k in 1..=3usize {
            let reference = BandMatrix::fill(&h, &v, k);
            let mut bp = BitParallelED::new();
            bp.set_sequence(&h, k);
            for (i, &c) in v.iter().enumerate() {
                let state = bp.compute_row(i + 1, c);
                let expect = reference.row_minimum(i + 1) as usize;
                if expect <= k {
                    assert_eq!(state.minimum, expect, "row {} k {}", i + 1, k);
                }
            }
        }
    }

    #[test]
    fn bit_parallel_multiword_width() {
        // 宽度超过一个 64 位字
        let h: Vec<u8> = std::iter::repeat(*b"ACGT").take(20).flatten().collect();
        let mut v = h.clone();
        v[40] = b'T'; // 一个替换
        v.remove(70); // 一个删除
        let d = bp_distance(&h, &v, 3);
        assert_eq!(d, Some(2));
    }

    #[test]
    fn bit_parallel_traceback_gattaca() {
        let mut bp = BitParallelED::new();
        bp.set_sequence(&dna::encode_pattern(b"GATACA"), 1);
        for (i, &c) in b"GATTACA".iter().enumerate() {
            bp.compute_row(i + 1, dna::to_alphabet(c));
        }
        let tb = bp.trackback(7);
        assert_eq!(tb.distance, 1);
        assert_eq!(cigar_string(&tb.ops), "3M1D3M");
    }

    #[test]
    fn bit_parallel_traceback_exact() {
        let mut bp = BitParallelED::new();
        bp.set_sequence(&dna::encode_pattern(b"ACGT"), 0);
        for (i, &c) in b"ACGT".iter().enumerate() {
            bp.compute_row(i + 1, dna::to_alphabet(c));
        }
        let tb = bp.trackback(4);
        assert_eq!(tb.distance, 0);
        assert_eq!(cigar_string(&tb.ops), "4M");
    }

    #[test]
    fn rows_can_be_overwritten_after_backtrack() {
        // 递归回溯后在同一行号重新计算
        let h = dna::encode_pattern(b"ACGT");
        let mut bp = BitParallelED::new();
        bp.set_sequence(&h, 1);
        bp.compute_row(1, dna::to_alphabet(b'A'));
        bp.compute_row(2, dna::to_alphabet(b'C'));
        bp.compute_row(3, dna::to_alphabet(b'G'));
        // 回退到第 2 行换一个分支
        bp.compute_row(2, dna::to_alphabet(b'G'));
        assert_eq!(bp.cell(2, 2), Some(1)); // AG vs AC
        bp.compute_row(2, dna::to_alphabet(b'C'));
        bp.compute_row(3, dna::to_alphabet(b'G'));
        bp.compute_row(4, dna::to_alphabet(b'T'));
        assert_eq!(bp.cell(4, 4), Some(0));
    }

    #[test]
    fn empty_horizontal_sequence() {
        let mut bp = BitParallelED::new();
        bp.set_sequence(&[], 2);
        assert_eq!(bp.cell(0, 0), Some(0));
        let st = bp.compute_row(1, 1);
        assert_eq!(st.minimum, 1); // 只能删除文本字符
        assert_eq!(bp.cell(1, 0), Some(1));
    }

    #[test]
    fn band_dies_on_garbage_text() {
        let mut bp = BitParallelED::new();
        bp.set_sequence(&dna::encode_pattern(b"AAAAAAAA"), 1);
        let mut died = false;
        for (i, &c) in b"TTTTTTTT".iter().enumerate() {
            let state = bp.compute_row(i + 1, dna::to_alphabet(c));
            if !state.alive {
                died = true;
                break;
            }
        }
        assert!(died, "band should die early against garbage");
    }

    #[test]
    fn cigar_string_rendering() {
        assert_eq!(cigar_string(&[(b'M', 4)]), "4M");
        assert_eq!(cigar_string(&[(b'M', 2), (b'I', 1), (b'M', 2)]), "2M1I2M");
        assert_eq!(cigar_string(&[]), "");
    }
}

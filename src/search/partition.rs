use crate::index::fm::{FMIndex, SARangePair};
use crate::search::scheme::SchemeForK;
use crate::search::Counters;

/// 模式的一个连续窗口 [begin, end)。检索期的扩展方向由部件相对
/// 已匹配块的位置现场推导，不在这里存储。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub begin: usize,
    pub end: usize,
}

impl Part {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }
}

/// 切分策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPolicy {
    Uniform,
    Static,
    Dynamic,
}

/// 把模式切成 p 个部件并为每个部件计算精确匹配的双向区间。
/// 模式比部件数短时返回 None（静默无匹配）。
pub fn partition(
    index: &FMIndex,
    pattern: &[u8],
    scheme: &SchemeForK,
    policy: PartitionPolicy,
    counters: &mut Counters,
) -> Option<(Vec<Part>, Vec<SARangePair>)> {
    let p = scheme.num_parts();
    let m = pattern.len();
    if m < p {
        return None;
    }
    if p == 1 {
        let parts = vec![Part { begin: 0, end: m }];
        let ranges = exact_ranges(index, pattern, &parts, counters);
        return Some((parts, ranges));
    }
    match policy {
        PartitionPolicy::Uniform => {
            let parts = uniform_parts(m, p);
            let ranges = exact_ranges(index, pattern, &parts, counters);
            Some((parts, ranges))
        }
        PartitionPolicy::Static => {
            let parts = static_parts(m, p, &scheme.begins());
            let ranges = exact_ranges(index, pattern, &parts, counters);
            Some((parts, ranges))
        }
        PartitionPolicy::Dynamic => Some(dynamic_parts(
            index,
            pattern,
            p,
            &scheme.seeds(),
            &scheme.part_weights(),
            counters,
        )),
    }
}

/// 均匀切分：等长部件，余数从左往右摊。
fn uniform_parts(m: usize, p: usize) -> Vec<Part> {
    let base = m / p;
    let rem = m % p;
    let mut parts = Vec::with_capacity(p);
    let mut begin = 0usize;
    for i in 0..p {
        let len = base + (i < rem) as usize;
        parts.push(Part { begin, end: begin + len });
        begin += len;
    }
    parts
}

/// 静态切分：按相对位置取边界，钳位保证每个部件非空。
fn static_parts(m: usize, p: usize, begins: &[f64]) -> Vec<Part> {
    debug_assert_eq!(begins.len(), p - 1);
    let mut bounds = Vec::with_capacity(p + 1);
    bounds.push(0usize);
    for (i, &f) in begins.iter().enumerate() {
        let raw = (f * m as f64).round() as usize;
        let lo = bounds[i] + 1;
        let hi = m - (p - 1 - i);
        bounds.push(raw.clamp(lo, hi));
    }
    bounds.push(m);
    bounds
        .windows(2)
        .map(|w| Part { begin: w[0], end: w[1] })
        .collect()
}

/// 逐字符右扩求每个部件的精确匹配区间（可为空）。
fn exact_ranges(
    index: &FMIndex,
    pattern: &[u8],
    parts: &[Part],
    counters: &mut Counters,
) -> Vec<SARangePair> {
    parts
        .iter()
        .map(|part| {
            let mut pair = index.full_range();
            for &c in &pattern[part.begin..part.end] {
                pair = index.extend_forward(&pair, c);
                counters.nodes += 1;
                if pair.is_empty() {
                    break;
                }
            }
            pair
        })
        .collect()
}

/// 动态切分：首尾部件固定在两端，中间部件按种子位置落点，
/// 然后贪心生长 weight × ln(区间宽度) 最大的部件，直到铺满模式。
/// 区间变空的部件死亡（之后只能被盲目扩展）。
fn dynamic_parts(
    index: &FMIndex,
    pattern: &[u8],
    p: usize,
    seeds: &[f64],
    weights: &[usize],
    counters: &mut Counters,
) -> (Vec<Part>, Vec<SARangePair>) {
    let m = pattern.len();
    debug_assert!(m >= p);

    // 落种：位置钳位成严格递增且给后续部件留出空间
    let mut pos = Vec::with_capacity(p);
    pos.push(0usize);
    for i in 1..p - 1 {
        let raw = seeds
            .get(i - 1)
            .map(|&f| (f * m as f64).round() as usize)
            .unwrap_or(i * m / (p - 1));
        let lo = pos[i - 1] + 1;
        let hi = m - 1 - (p - 1 - i);
        pos.push(raw.clamp(lo, hi));
    }
    pos.push(m - 1);

    let mut parts: Vec<Part> = pos.iter().map(|&b| Part { begin: b, end: b + 1 }).collect();
    let mut ranges: Vec<SARangePair> = parts
        .iter()
        .map(|part| {
            counters.nodes += 1;
            index.extend_forward(&index.full_range(), pattern[part.begin])
        })
        .collect();
    let mut alive: Vec<bool> = ranges.iter().map(|r| !r.is_empty()).collect();

    // 贪心生长：除最后一个部件向左外，其余部件都向右生长
    loop {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..p {
            if !alive[i] {
                continue;
            }
            let can_grow = if i + 1 < p {
                parts[i].end < parts[i + 1].begin
            } else {
                parts[i].begin > parts[i - 1].end
            };
            if !can_grow {
                continue;
            }
            let priority = weights[i] as f64 * (ranges[i].width() as f64).ln();
            if best.map(|(_, bp)| priority > bp).unwrap_or(true) {
                best = Some((i, priority));
            }
        }
        let (i, _) = match best {
            Some(b) => b,
            None => break,
        };

        counters.nodes += 1;
        if i + 1 < p {
            let c = pattern[parts[i].end];
            ranges[i] = index.extend_forward(&ranges[i], c);
            parts[i].end += 1;
        } else {
            let c = pattern[parts[i].begin - 1];
            ranges[i] = index.extend_backward(&ranges[i], c);
            parts[i].begin -= 1;
        }
        if ranges[i].is_empty() {
            alive[i] = false;
        }
    }

    extend_parts(&mut parts, m);
    (parts, ranges)
}

/// 把剩余的空隙并给左侧部件，保证部件恰好铺满 [0, m)。
/// 生长循环只在空隙仅与死部件相邻时才会停，所以被盲目扩展的
/// 部件区间都已为空。
fn extend_parts(parts: &mut [Part], m: usize) {
    let p = parts.len();
    for i in 0..p - 1 {
        if parts[i].end < parts[i + 1].begin {
            parts[i].end = parts[i + 1].begin;
        }
    }
    parts[0].begin = 0;
    parts[p - 1].end = m;
}
